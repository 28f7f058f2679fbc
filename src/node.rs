//! Daemon assembly: wires the transport, engine and visualizer together
//! and drives the periodic activities.
//!
//! Every activity is an independent tokio task sharing the engine through
//! one coarse mutex. The lock is only held for state mutation; all
//! broadcasting and rendering happens after release.

use crate::config::{Config, Workload};
use crate::engine::{Action, Engine};
use crate::net::broadcast::{discover_interfaces, BroadcastTransport, TransportError};
use crate::types::{EMIT_JITTER_MS, STATUS_SECS};
use crate::viz::{Visualizer, VizError, VizStyle};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Viz(#[from] VizError),
}

pub struct Node {
    engine: Arc<Mutex<Engine>>,
    transport: Arc<BroadcastTransport>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Bind the transport and spawn every protocol activity. Fails only
    /// on startup problems; after this, runtime errors are absorbed and
    /// logged by the tasks themselves.
    pub async fn start(cfg: Config) -> Result<Self, StartupError> {
        let interfaces = discover_interfaces(&cfg.interface_pattern)?;
        let names: Vec<&str> = interfaces.iter().map(|i| i.name.as_str()).collect();
        info!(port = cfg.broadcast_port, "node {} on interfaces: {}", cfg.name, names.join(", "));

        let transport = Arc::new(BroadcastTransport::bind(cfg.broadcast_port, &interfaces)?);
        let engine = Arc::new(Mutex::new(Engine::new(
            &cfg.name,
            cfg.side,
            transport.local_addrs().clone(),
        )));
        let viz = Arc::new(Visualizer::new(
            cfg.artifacts_dir.clone(),
            VizStyle::parse(cfg.visualize_mode.as_deref()),
            cfg.name.clone(),
        )?);

        let (tx, rx) = mpsc::channel(256);
        let mut tasks = transport.spawn_listeners(tx);

        tasks.push(spawn_ingress(rx, engine.clone(), transport.clone(), viz.clone()));
        tasks.push(spawn_hello(cfg.timers.hello, engine.clone(), transport.clone()));
        tasks.push(spawn_tc(cfg.timers.tc, engine.clone(), transport.clone()));
        tasks.push(spawn_ips(
            cfg.timers.ips,
            engine.clone(),
            transport.clone(),
            viz.clone(),
        ));
        tasks.push(spawn_viz(cfg.timers.viz, engine.clone(), viz.clone()));
        tasks.push(spawn_status(engine.clone()));
        if let Some(workload) = cfg.workload.clone() {
            tasks.push(spawn_workload(workload, engine.clone(), transport.clone()));
        }

        Ok(Self {
            engine,
            transport,
            tasks,
        })
    }

    pub fn engine(&self) -> &Arc<Mutex<Engine>> {
        &self.engine
    }

    pub fn transport(&self) -> &Arc<BroadcastTransport> {
        &self.transport
    }

    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("node stopped");
    }
}

/// Perform handler actions with the protocol lock released.
async fn run_actions(
    actions: Vec<Action>,
    engine: &Arc<Mutex<Engine>>,
    transport: &Arc<BroadcastTransport>,
    viz: &Arc<Visualizer>,
) {
    for action in actions {
        match action {
            Action::Broadcast(msg) => match msg.encode() {
                Ok(bytes) => transport.send_broadcast(&bytes).await,
                Err(e) => warn!(kind = msg.kind(), error = %e, "cannot encode outgoing message"),
            },
            Action::Deliver { from, payload, path } => {
                info!(
                    from = %from,
                    "application payload: {}",
                    String::from_utf8_lossy(&payload)
                );
                let snap = engine.lock().snapshot();
                let viz = viz.clone();
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = viz.render_route(&snap, &path) {
                        warn!(error = %e, "route render failed");
                    }
                });
            }
        }
    }
}

fn spawn_ingress(
    mut rx: mpsc::Receiver<(Vec<u8>, std::net::IpAddr)>,
    engine: Arc<Mutex<Engine>>,
    transport: Arc<BroadcastTransport>,
    viz: Arc<Visualizer>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((data, src)) = rx.recv().await {
            if transport.is_local(&src) {
                continue;
            }
            let actions = engine.lock().handle_datagram(&data, src);
            run_actions(actions, &engine, &transport, &viz).await;
        }
    })
}

fn spawn_hello(
    period: u64,
    engine: Arc<Mutex<Engine>>,
    transport: Arc<BroadcastTransport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(jittered(period)).await;
            let msg = engine.lock().build_hello();
            match msg.encode() {
                Ok(bytes) => transport.send_broadcast(&bytes).await,
                Err(e) => warn!(error = %e, "cannot encode hello"),
            }
        }
    })
}

fn spawn_tc(
    period: u64,
    engine: Arc<Mutex<Engine>>,
    transport: Arc<BroadcastTransport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(jittered(period)).await;
            let msg = engine.lock().build_tc();
            if let Some(msg) = msg {
                match msg.encode() {
                    Ok(bytes) => transport.send_broadcast(&bytes).await,
                    Err(e) => warn!(error = %e, "cannot encode tc"),
                }
            }
        }
    })
}

fn spawn_ips(
    period: u64,
    engine: Arc<Mutex<Engine>>,
    transport: Arc<BroadcastTransport>,
    viz: Arc<Visualizer>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(period)).await;
            let actions = engine.lock().ips_tick();
            run_actions(actions, &engine, &transport, &viz).await;
        }
    })
}

fn spawn_viz(period: u64, engine: Arc<Mutex<Engine>>, viz: Arc<Visualizer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cycle: u64 = 0;
        loop {
            tokio::time::sleep(Duration::from_secs(period)).await;
            let snap = engine.lock().snapshot();
            debug!(
                nodes = snap.nodes.len(),
                edges = snap.edges.len(),
                "topology: {:?}",
                snap.edges
            );
            let viz = viz.clone();
            let postfix = cycle;
            tokio::task::spawn_blocking(move || {
                if let Err(e) = viz.render_snapshot(&snap, Some(postfix)) {
                    warn!(error = %e, "snapshot render failed");
                }
            });
            cycle += 1;
        }
    })
}

fn spawn_status(engine: Arc<Mutex<Engine>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(STATUS_SECS));
        loop {
            interval.tick().await;
            let (neighbors, nodes, relay, isolated, malformed) = {
                let e = engine.lock();
                (
                    e.topology().neighbor_table(e.name()).len(),
                    e.topology().node_count(),
                    e.is_relay(),
                    e.ips().isolated_names().len(),
                    e.decode_errors(),
                )
            };
            info!(
                neighbors,
                nodes, relay, isolated, malformed, "status"
            );
        }
    })
}

fn spawn_workload(
    workload: Workload,
    engine: Arc<Mutex<Engine>>,
    transport: Arc<BroadcastTransport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(jittered(workload.period)).await;
            let msg = {
                let mut e = engine.lock();
                let dest = workload.dest.clone().or_else(|| pick_remote_dest(&e));
                match dest {
                    Some(dest) => e.originate_custom(&dest, workload.payload.clone().into_bytes()),
                    None => None,
                }
            };
            match msg {
                Some(msg) => match msg.encode() {
                    Ok(bytes) => transport.send_broadcast(&bytes).await,
                    Err(e) => warn!(error = %e, "cannot encode workload message"),
                },
                None => debug!("workload: no eligible destination yet"),
            }
        }
    })
}

/// A random known node that is not ourselves and not a direct neighbor,
/// so the workload exercises multi-hop forwarding.
fn pick_remote_dest(engine: &Engine) -> Option<String> {
    let me = engine.name();
    let neighbors = engine.topology().neighbors(me);
    let candidates: Vec<String> = engine
        .topology()
        .names_with(|_| true)
        .into_iter()
        .filter(|n| n != me && !neighbors.contains(n))
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let pick = rand::thread_rng().gen_range(0..candidates.len());
    candidates.into_iter().nth(pick)
}

fn jittered(period_secs: u64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..EMIT_JITTER_MS);
    Duration::from_secs(period_secs) + Duration::from_millis(jitter)
}
