//! meshguard: proactive mesh routing daemon.
//!
//! Loads the node configuration, starts the protocol tasks, and runs
//! until interrupted. All learned state is in-memory; a restart starts
//! from scratch.

use clap::Parser;
use meshguard::config::Config;
use meshguard::node::Node;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "meshguard",
    version,
    about = "OLSR-style mesh routing daemon with intrusion prevention"
)]
struct Args {
    /// Path to the node configuration file
    #[arg(default_value = "config.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    let cfg = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&cfg);

    info!("meshguard v{} — node {} ({:?})", VERSION, cfg.name, cfg.side);
    if !cfg.networks.is_empty() {
        info!("networks: {}", cfg.networks.join(", "));
    }

    let node = match Node::start(cfg).await {
        Ok(node) => node,
        Err(e) => {
            error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
    node.shutdown();
}

/// Log to stdout and to `<artifacts>/<name>.log`. A log file that cannot
/// be opened degrades to stdout only.
fn init_logging(cfg: &Config) {
    let filter = EnvFilter::from_default_env().add_directive("meshguard=info".parse().unwrap());
    let log_file = std::fs::create_dir_all(&cfg.artifacts_dir).and_then(|_| {
        std::fs::File::options()
            .create(true)
            .append(true)
            .open(cfg.artifacts_dir.join(format!("{}.log", cfg.name)))
    });
    match log_file {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::io::stdout.and(Arc::new(file)))
                .init();
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            tracing::warn!(error = %e, "log file unavailable, logging to stdout only");
        }
    }
}
