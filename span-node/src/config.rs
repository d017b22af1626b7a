use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use span_types::constants::{
    BLOCK_TIME_TARGET, DEFAULT_CONFIRMATION_DEPTH, DEFAULT_MAINCHAIN_ID, DEFAULT_MAX_BLOCK_RANGE,
    DEFAULT_POLL_INTERVAL,
};
use span_types::genesis::GenesisConfig;
use span_types::primitives::{BlockHeight, ChainId};

use crate::error::NodeError;

/// Name of the config file written by `span init`.
pub const CONFIG_FILE_NAME: &str = "span.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub chain: ChainConfig,
    pub storage: StorageConfig,
    pub validator: ValidatorConfig,
    pub watcher: WatcherConfig,
    pub rpc: RpcConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Inline genesis config (programmatic only, not serialized to TOML).
    #[serde(skip)]
    pub genesis_config: Option<GenesisConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Identifier of the chain this node runs.
    pub chain_id: ChainId,
    pub mainchain_id: ChainId,
    /// Path to a genesis JSON file. Without one the node boots a devnet genesis.
    #[serde(default)]
    pub genesis_path: Option<String>,
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
}

fn default_block_time_ms() -> u64 {
    BLOCK_TIME_TARGET.as_millis() as u64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Storage backend: "memory" or "sqlite"
    pub db_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub enabled: bool,
    /// Hex-encoded 32-byte seed for the validator key.
    pub keypair_seed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub enabled: bool,
    /// Blocks a foreign event must be buried under before it is attested.
    pub confirmation_depth: u64,
    pub poll_interval_ms: u64,
    pub max_block_range: u64,
    /// Capacity of the channel between watchers and the block loop.
    pub channel_capacity: usize,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// One foreign chain to watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub chain_id: ChainId,
    pub rpc_url: String,
    /// Overrides `watcher.confirmation_depth` for this source.
    #[serde(default)]
    pub confirmation_depth: Option<u64>,
    #[serde(default = "default_start_height")]
    pub start_height: BlockHeight,
}

fn default_start_height() -> BlockHeight {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig {
                chain_id: DEFAULT_MAINCHAIN_ID,
                mainchain_id: DEFAULT_MAINCHAIN_ID,
                genesis_path: None,
                block_time_ms: default_block_time_ms(),
            },
            storage: StorageConfig {
                data_dir: "./span-data".to_string(),
                db_type: "memory".to_string(),
            },
            validator: ValidatorConfig {
                enabled: true,
                keypair_seed: None,
            },
            watcher: WatcherConfig {
                enabled: true,
                confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
                poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
                max_block_range: DEFAULT_MAX_BLOCK_RANGE,
                channel_capacity: 1_024,
                sources: Vec::new(),
            },
            rpc: RpcConfig {
                enabled: true,
                listen_addr: "127.0.0.1:9841".to_string(),
                max_connections: 100,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            metrics: MetricsConfig::default(),
            genesis_config: None,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path, e),
        })?;
        let config: NodeConfig = toml::from_str(&contents).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to parse config file '{}': {}", path, e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Initialize a default configuration file in the given directory.
    pub fn init(dir: &str) -> Result<(), NodeError> {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            std::fs::create_dir_all(dir_path)?;
        }

        let config = NodeConfig::default();
        let toml_str = toml::to_string_pretty(&config).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to serialize default config: {}", e),
        })?;

        let config_path = dir_path.join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, toml_str)?;

        Ok(())
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if !matches!(self.storage.db_type.as_str(), "memory" | "sqlite") {
            return Err(NodeError::ConfigError {
                reason: format!("unknown storage backend '{}'", self.storage.db_type),
            });
        }
        if self.chain.block_time_ms == 0 {
            return Err(NodeError::ConfigError {
                reason: "chain.block_time_ms must be positive".to_string(),
            });
        }
        if self.watcher.max_block_range == 0 || self.watcher.channel_capacity == 0 {
            return Err(NodeError::ConfigError {
                reason: "watcher.max_block_range and watcher.channel_capacity must be positive"
                    .to_string(),
            });
        }
        for source in &self.watcher.sources {
            if source.chain_id == self.chain.chain_id {
                return Err(NodeError::ConfigError {
                    reason: format!("watcher source {} is the local chain", source.chain_id),
                });
            }
        }
        Ok(())
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.chain.block_time_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watcher.poll_interval_ms)
    }

    /// Confirmation depth for a source, falling back to the watcher default.
    pub fn confirmation_depth_for(&self, source: &SourceConfig) -> u64 {
        source
            .confirmation_depth
            .unwrap_or(self.watcher.confirmation_depth)
    }
}
