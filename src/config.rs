//! TOML configuration for a verification run.
//!
//! The loaded [`Config`] is the explicit context value handed to every
//! subsystem: component naming, interface roles, capture windows and probe
//! parameters all come from here. Defaults match the reference testbed
//! (Open5GS core + UERANSIM radio in containers).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::topology::Slice;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "TOPOVERIFY_CONFIG";

/// Config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "topoverify.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub topology: TopologyConfig,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub probes: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration, in order:
    /// 1. An explicit path (CLI flag). A broken explicit file is an error.
    /// 2. The path in `TOPOVERIFY_CONFIG`.
    /// 3. `./topoverify.toml`.
    /// 4. Compiled-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            match Self::load(&path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{CONFIG_ENV} set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Number of UEs (one per provisioned subscriber).
    pub ue_count: usize,
    /// Radio node count. Derived as `ceil(ue_count / 3)` when absent.
    pub radio_node_count: Option<usize>,
    /// Interfaces never reported in a component's interface map.
    pub excluded_interfaces: Vec<String>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            ue_count: 3,
            radio_node_count: None,
            excluded_interfaces: vec!["lo".to_string(), "eth0".to_string()],
        }
    }
}

impl TopologyConfig {
    pub fn radio_nodes(&self) -> usize {
        self.radio_node_count
            .unwrap_or_else(|| crate::topology::radio_node_count(self.ue_count))
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Host and interface names of the emulated network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub ue_prefix: String,
    pub radio_prefix: String,
    pub upf_cloud: String,
    pub upf_edge: String,
    pub control_plane: String,
    pub edge_server: String,
    /// UE tunnel interface of the cloud slice.
    pub cloud_tunnel: String,
    /// UE tunnel interface of the edge slice.
    pub edge_tunnel: String,
    /// Tunnel-facing interface on both user-plane functions.
    pub core_capture_interface: String,
    /// Appended to a radio node name to get its access-facing interface.
    pub access_interface_suffix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            ue_prefix: "ue".to_string(),
            radio_prefix: "gnb".to_string(),
            upf_cloud: "upf_cld".to_string(),
            upf_edge: "upf_mec".to_string(),
            control_plane: "cp".to_string(),
            edge_server: "mec_server".to_string(),
            cloud_tunnel: "uesimtun0".to_string(),
            edge_tunnel: "uesimtun1".to_string(),
            core_capture_interface: "ogstun".to_string(),
            access_interface_suffix: "-s1".to_string(),
        }
    }
}

impl NamingConfig {
    /// Host name of the UE with 1-based `index`.
    pub fn ue(&self, index: usize) -> String {
        format!("{}{}", self.ue_prefix, index)
    }

    /// Host name of the radio node with 1-based `index`.
    pub fn radio_node(&self, index: usize) -> String {
        format!("{}{}", self.radio_prefix, index)
    }

    /// Access-facing interface of a radio node, e.g. `gnb2-s1`.
    pub fn access_interface(&self, radio_node: &str) -> String {
        format!("{}{}", radio_node, self.access_interface_suffix)
    }

    /// Tunnel interface a UE uses for `slice`.
    pub fn tunnel_for(&self, slice: Slice) -> &str {
        match slice {
            Slice::Cloud => &self.cloud_tunnel,
            Slice::Edge => &self.edge_tunnel,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Path to the docker CLI.
    pub docker_binary: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Docker,
            docker_binary: "docker".to_string(),
        }
    }
}

/// How commands reach the emulated hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// `docker exec <host> ...`
    Docker,
    /// Run on this machine; host names are labels only.
    Local,
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture window on access (radio-side) hops.
    pub access_timeout_secs: u64,
    /// Capture window on core (user-plane) hops.
    pub core_timeout_secs: u64,
    /// Wait after launching a capture before probing through it.
    pub settle_delay_ms: u64,
    /// Grace between the graceful and the forced stop.
    pub stop_grace_ms: u64,
    /// Upper bound on reading trailing output after a capture ended.
    pub drain_timeout_ms: u64,
    /// Protocol token an access-hop line must contain to count for a UE.
    pub protocol_token: String,
    pub tcpdump_path: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            access_timeout_secs: 4,
            core_timeout_secs: 12,
            settle_delay_ms: 2000,
            stop_grace_ms: 2000,
            drain_timeout_ms: 1000,
            protocol_token: "UDP".to_string(),
            tcpdump_path: "tcpdump".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub ping_count: u32,
    pub ping_timeout_secs: u64,
    pub iperf_path: String,
    pub iperf_duration_secs: u64,
    /// Internet destination reached through the cloud slice.
    pub cloud_destination: String,
    /// Bound for short housekeeping commands (listing, address queries, pkill).
    pub command_timeout_secs: u64,
    /// Also run `traceroute` on each routing check.
    pub traceroute: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ping_count: 8,
            ping_timeout_secs: 20,
            iperf_path: "iperf3".to_string(),
            iperf_duration_secs: 5,
            cloud_destination: "www.google.com".to_string(),
            command_timeout_secs: 10,
            traceroute: false,
        }
    }
}

impl ProbeConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// The client runs for `iperf_duration_secs`; allow setup and teardown on top.
    pub fn iperf_timeout(&self) -> Duration {
        Duration::from_secs(self.iperf_duration_secs + 10)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_testbed() {
        let cfg = Config::default();

        assert_eq!(cfg.topology.ue_count, 3);
        assert_eq!(cfg.topology.radio_nodes(), 1);
        assert_eq!(cfg.topology.excluded_interfaces, ["lo", "eth0"]);

        assert_eq!(cfg.naming.ue(1), "ue1");
        assert_eq!(cfg.naming.radio_node(2), "gnb2");
        assert_eq!(cfg.naming.access_interface("gnb2"), "gnb2-s1");
        assert_eq!(cfg.naming.upf_cloud, "upf_cld");
        assert_eq!(cfg.naming.upf_edge, "upf_mec");

        assert_eq!(cfg.transport.kind, TransportKind::Docker);

        assert_eq!(cfg.capture.access_timeout_secs, 4);
        assert_eq!(cfg.capture.core_timeout_secs, 12);
        assert_eq!(cfg.capture.settle_delay(), Duration::from_secs(2));

        assert_eq!(cfg.probes.ping_count, 8);
        assert_eq!(cfg.probes.iperf_duration_secs, 5);
        assert!(!cfg.probes.traceroute);

        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_slice_interface_mapping() {
        let naming = NamingConfig::default();
        assert_eq!(naming.tunnel_for(Slice::Cloud), "uesimtun0");
        assert_eq!(naming.tunnel_for(Slice::Edge), "uesimtun1");
        assert_eq!(naming.access_interface("gnb2"), "gnb2-s1");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[topology]
ue_count = 7

[capture]
settle_delay_ms = 500

[logging]
format = "json"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.topology.ue_count, 7);
        assert_eq!(cfg.topology.radio_nodes(), 3);
        assert_eq!(cfg.capture.settle_delay(), Duration::from_millis(500));
        assert_eq!(cfg.capture.core_timeout_secs, 12);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.probes.cloud_destination, "www.google.com");
    }

    #[test]
    fn test_radio_node_override() {
        let cfg: Config = toml::from_str("[topology]\nue_count = 4\nradio_node_count = 2\n").unwrap();
        assert_eq!(cfg.topology.radio_nodes(), 2);
    }

    #[test]
    fn test_transport_kind_parses_snake_case() {
        let cfg: Config = toml::from_str("[transport]\nkind = \"local\"\n").unwrap();
        assert_eq!(cfg.transport.kind, TransportKind::Local);
        assert_eq!(cfg.transport.docker_binary, "docker");
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[probes]\nping_count = 3\ntraceroute = true").unwrap();
        let cfg = Config::load_or_default(Some(file.path())).unwrap();
        assert_eq!(cfg.probes.ping_count, 3);
        assert!(cfg.probes.traceroute);
    }

    #[test]
    fn test_broken_explicit_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[probes\nping_count = ").unwrap();
        assert!(Config::load_or_default(Some(file.path())).is_err());
    }
}
