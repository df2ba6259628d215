//! Node configuration with TOML file support.
//!
//! Every field has a serde default, so a partial file (or none at all) is
//! valid. CLI flags override whatever the file says.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use accountant_protocol::network::GossipConfig;

/// File name looked up inside the data directory when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// File name of the hex-encoded node signing key.
pub const KEY_FILE_NAME: &str = "node.key";

/// Configuration for an accountant node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory holding the key file and the vertex store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Default `EnvFilter` directives when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub gossip: GossipConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Parameters of the in-process `simulate` cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of nodes, fully connected.
    pub nodes: usize,
    /// Transfer rounds after the distribution round.
    pub rounds: usize,
    /// Whole units minted by genesis.
    pub genesis_amount: u64,
    /// Whole units node 0 hands to every other node before the rounds start.
    pub distribution_amount: u64,
    /// Whole units each node passes to its neighbour per round.
    pub transfer_amount: u64,
    /// Upper bound on the wait for each round to settle.
    pub quiescence_timeout_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 4,
            rounds: 5,
            genesis_amount: 1_000_000,
            distribution_amount: 10_000,
            transfer_amount: 7,
            quiescence_timeout_secs: 30,
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./accountant_data")
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "accountant_node=info,accountant_protocol=info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolves the config to use: an explicit file, else `config.toml` in
    /// `data_dir` if present, else defaults rooted at `data_dir`.
    pub fn load(explicit: Option<&Path>, data_dir: Option<&Path>) -> Result<Self> {
        let mut config = match (explicit, data_dir) {
            (Some(path), _) => Self::from_toml_file(path)?,
            (None, Some(dir)) if dir.join(CONFIG_FILE_NAME).is_file() => {
                Self::from_toml_file(&dir.join(CONFIG_FILE_NAME))?
            }
            _ => Self::default(),
        };
        if let Some(dir) = data_dir {
            config.data_dir = dir.to_path_buf();
        }
        Ok(config)
    }

    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join(KEY_FILE_NAME)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            gossip: GossipConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}
