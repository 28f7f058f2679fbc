//! Node configuration loading.
//!
//! Configuration is a small YAML document; only `name` is required.
//! Configuration errors are fatal at startup, nothing here is recoverable.

use crate::types::{
    DEFAULT_ARTIFACTS_DIR, DEFAULT_BROADCAST_PORT, DEFAULT_HELLO_SECS, DEFAULT_INTERFACE_PATTERN,
    DEFAULT_IPS_SECS, DEFAULT_TC_SECS, DEFAULT_VIZ_SECS,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("node name must not be empty")]
    EmptyName,
}

/// Adversary-simulation switch. Evil nodes silently drop CUSTOM messages
/// they would otherwise forward; used only to exercise the IPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Good,
    Evil,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logical node name, unique across the mesh.
    pub name: String,
    /// Networks this node participates in. Informational only.
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,
    /// Substring selector on interface names.
    #[serde(default = "default_interface_pattern")]
    pub interface_pattern: String,
    /// Drawing style for snapshot rendering; unknown values fall back to
    /// the default with a warning.
    #[serde(default)]
    pub visualize_mode: Option<String>,
    #[serde(default)]
    pub side: Side,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    #[serde(default)]
    pub timers: Timers,
    /// Optional periodic traffic generator.
    #[serde(default)]
    pub workload: Option<Workload>,
}

/// Periodic task intervals, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct Timers {
    #[serde(default = "default_hello_secs")]
    pub hello: u64,
    #[serde(default = "default_tc_secs")]
    pub tc: u64,
    #[serde(default = "default_ips_secs")]
    pub ips: u64,
    #[serde(default = "default_viz_secs")]
    pub viz: u64,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            hello: DEFAULT_HELLO_SECS,
            tc: DEFAULT_TC_SECS,
            ips: DEFAULT_IPS_SECS,
            viz: DEFAULT_VIZ_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Workload {
    /// Destination node; when omitted, a random known node that is not a
    /// direct neighbor is picked each round.
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default = "default_workload_payload")]
    pub payload: String,
    /// Origination period in seconds.
    #[serde(default = "default_workload_period")]
    pub period: u64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Config = serde_yaml::from_str(&text)?;
        if cfg.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(cfg)
    }
}

fn default_broadcast_port() -> u16 {
    DEFAULT_BROADCAST_PORT
}

fn default_interface_pattern() -> String {
    DEFAULT_INTERFACE_PATTERN.to_string()
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACTS_DIR)
}

fn default_hello_secs() -> u64 {
    DEFAULT_HELLO_SECS
}

fn default_tc_secs() -> u64 {
    DEFAULT_TC_SECS
}

fn default_ips_secs() -> u64 {
    DEFAULT_IPS_SECS
}

fn default_viz_secs() -> u64 {
    DEFAULT_VIZ_SECS
}

fn default_workload_payload() -> String {
    "probe".to_string()
}

fn default_workload_period() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let cfg: Config = serde_yaml::from_str("name: nw0-n1").unwrap();
        assert_eq!(cfg.name, "nw0-n1");
        assert_eq!(cfg.broadcast_port, DEFAULT_BROADCAST_PORT);
        assert_eq!(cfg.interface_pattern, "eth");
        assert_eq!(cfg.side, Side::Good);
        assert_eq!(cfg.timers.hello, DEFAULT_HELLO_SECS);
        assert!(cfg.workload.is_none());
        assert!(cfg.visualize_mode.is_none());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
name: gw3
networks: [network0, network1]
broadcast_port: 40000
interface_pattern: veth
visualize_mode: grid
side: evil
artifacts_dir: /tmp/mesh-artifacts
timers:
  hello: 2
  ips: 7
workload:
  dest: nw1-n0
  payload: hi
  period: 3
"#;
        let cfg: Config = serde_yaml::from_str(text).unwrap();
        assert_eq!(cfg.networks.len(), 2);
        assert_eq!(cfg.broadcast_port, 40000);
        assert_eq!(cfg.side, Side::Evil);
        assert_eq!(cfg.timers.hello, 2);
        assert_eq!(cfg.timers.tc, DEFAULT_TC_SECS);
        assert_eq!(cfg.timers.ips, 7);
        let w = cfg.workload.unwrap();
        assert_eq!(w.dest.as_deref(), Some("nw1-n0"));
        assert_eq!(w.period, 3);
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = std::env::temp_dir().join("meshguard-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty-name.yml");
        std::fs::write(&path, "name: ''").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::EmptyName)
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/config.yml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
