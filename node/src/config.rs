//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use weave_types::{Amount, NetworkId};

use crate::NodeError;

/// Configuration for a weave node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to connect to.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Data directory for ledger storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// P2P listening port; defaults to the network's standard port.
    #[serde(default)]
    pub peering_port: Option<u16>,

    /// Cap on simultaneous incoming bootstrap connections.
    #[serde(default = "default_tcp_incoming_connections_max")]
    pub tcp_incoming_connections_max: usize,

    /// Base number of outgoing bootstrap connections.
    #[serde(default = "default_bootstrap_connections")]
    pub bootstrap_connections: usize,

    /// Upper bound the connection pool scales toward on large pulls.
    #[serde(default = "default_bootstrap_connections_max")]
    pub bootstrap_connections_max: usize,

    /// Minimum amount the node bothers auto-receiving.
    #[serde(default = "default_receive_minimum")]
    pub receive_minimum: u128,

    /// Floor for the online-weight estimate used in quorum math.
    #[serde(default = "default_online_weight_minimum")]
    pub online_weight_minimum: u128,

    /// Percentage of online weight required for quorum.
    #[serde(default = "default_online_weight_quorum")]
    pub online_weight_quorum: u8,

    /// Outbound publish budget in bytes/second; zero disables limiting.
    #[serde(default = "default_bandwidth_limit")]
    pub bandwidth_limit: u64,

    /// Time budget of one block-processor write transaction.
    #[serde(default = "default_block_processor_batch_max_time_ms")]
    pub block_processor_batch_max_time_ms: u64,

    /// Lower bound between confirmation-height write batches.
    #[serde(default = "default_conf_height_processor_batch_min_time_ms")]
    pub conf_height_processor_batch_min_time_ms: u64,

    /// Accept peers in loopback/private ranges (dev networks).
    #[serde(default)]
    pub allow_local_peers: bool,

    /// Unchecked entries older than this many days are garbage-collected.
    #[serde(default = "default_unchecked_cutoff_days")]
    pub unchecked_cutoff_days: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl NodeConfig {
    /// Load a config from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, NodeError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Defaults for a dev-network node rooted at `data_dir`.
    pub fn dev(data_dir: PathBuf) -> Self {
        let mut config = Self::default();
        config.network = NetworkId::Dev;
        config.data_dir = data_dir;
        config.allow_local_peers = true;
        config
    }

    /// The effective P2P port.
    pub fn port(&self) -> u16 {
        self.peering_port.unwrap_or_else(|| self.network.default_port())
    }

    pub fn receive_minimum(&self) -> Amount {
        Amount::new(self.receive_minimum)
    }

    pub fn online_weight_minimum(&self) -> Amount {
        Amount::new(self.online_weight_minimum)
    }

    pub fn unchecked_cutoff_secs(&self) -> u64 {
        self.unchecked_cutoff_days * 24 * 60 * 60
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            data_dir: default_data_dir(),
            peering_port: None,
            tcp_incoming_connections_max: default_tcp_incoming_connections_max(),
            bootstrap_connections: default_bootstrap_connections(),
            bootstrap_connections_max: default_bootstrap_connections_max(),
            receive_minimum: default_receive_minimum(),
            online_weight_minimum: default_online_weight_minimum(),
            online_weight_quorum: default_online_weight_quorum(),
            bandwidth_limit: default_bandwidth_limit(),
            block_processor_batch_max_time_ms: default_block_processor_batch_max_time_ms(),
            conf_height_processor_batch_min_time_ms:
                default_conf_height_processor_batch_min_time_ms(),
            allow_local_peers: false,
            unchecked_cutoff_days: default_unchecked_cutoff_days(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Live
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./weave_data")
}

fn default_tcp_incoming_connections_max() -> usize {
    128
}

fn default_bootstrap_connections() -> usize {
    4
}

fn default_bootstrap_connections_max() -> usize {
    64
}

fn default_receive_minimum() -> u128 {
    // 10^24 raw.
    1_000_000_000_000_000_000_000_000
}

fn default_online_weight_minimum() -> u128 {
    // 6 * 10^28 raw.
    60_000_000_000_000_000_000_000_000_000
}

fn default_online_weight_quorum() -> u8 {
    50
}

fn default_bandwidth_limit() -> u64 {
    10 * 1024 * 1024
}

fn default_block_processor_batch_max_time_ms() -> u64 {
    250
}

fn default_conf_height_processor_batch_min_time_ms() -> u64 {
    50
}

fn default_unchecked_cutoff_days() -> u64 {
    7
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
