use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use span_crypto::keys::Keypair;
use span_types::constants::DEFAULT_MAINCHAIN_ID;
use span_types::primitives::{format_address, ChainId};

use crate::config::{NodeConfig, SourceConfig};
use crate::error::NodeError;

#[derive(Parser)]
#[command(
    name = "span",
    about = "Span bridge node: token banks and validator-attested cross-chain transfers",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "span.toml")]
        config: String,
        /// Start a single-validator devnet with default settings
        #[arg(long)]
        dev: bool,
        /// Override the local chain id
        #[arg(long)]
        chain_id: Option<ChainId>,
        /// Override the mainchain id
        #[arg(long)]
        mainchain_id: Option<ChainId>,
        /// Override RPC listen address (e.g., "0.0.0.0:9841" for LAN access)
        #[arg(long)]
        rpc_addr: Option<String>,
        /// Storage backend: "memory" or "sqlite"
        #[arg(long)]
        storage: Option<String>,
        /// Override data directory path
        #[arg(long)]
        data_dir: Option<String>,
        /// Wipe the data directory before starting
        #[arg(long)]
        reset_state: bool,
        /// Hex-encoded 32-byte seed for the validator keypair
        #[arg(long)]
        keypair_seed: Option<String>,
        /// Foreign chain to watch, as CHAIN_ID=RPC_URL (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Initialize a new node configuration
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
    /// Validate a genesis config and write the genesis file. Without
    /// --config, writes a devnet genesis config instead.
    Genesis {
        /// Path to genesis config file
        #[arg(short, long)]
        config: Option<String>,
        /// Output path
        #[arg(short, long, default_value = "genesis.json")]
        output: String,
        /// Chain id for the devnet template
        #[arg(long, default_value_t = DEFAULT_MAINCHAIN_ID)]
        chain_id: ChainId,
        /// Mainchain id for the devnet template
        #[arg(long, default_value_t = DEFAULT_MAINCHAIN_ID)]
        mainchain_id: ChainId,
    },
    /// Generate a new validator keypair
    Keygen {
        /// Derive from this hex seed instead of a random one
        #[arg(long)]
        seed: Option<String>,
    },
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Parse a `--source CHAIN_ID=URL` argument.
fn parse_source(arg: &str) -> Result<SourceConfig, NodeError> {
    let (chain, url) = arg.split_once('=').ok_or_else(|| NodeError::ConfigError {
        reason: format!("invalid source '{}', expected CHAIN_ID=URL", arg),
    })?;
    let chain_id = chain.trim().parse().map_err(|e| NodeError::ConfigError {
        reason: format!("invalid source chain id '{}': {}", chain, e),
    })?;
    Ok(SourceConfig {
        chain_id,
        rpc_url: url.trim().to_string(),
        confirmation_depth: None,
        start_height: 1,
    })
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Command::Run {
            config,
            dev,
            chain_id,
            mainchain_id,
            rpc_addr,
            storage,
            data_dir,
            reset_state,
            keypair_seed,
            sources,
        } => {
            let mut config = if dev {
                NodeConfig::default()
            } else {
                NodeConfig::load(&config)?
            };
            init_tracing(&config.logging.level);

            // Apply CLI overrides.
            if let Some(id) = chain_id {
                config.chain.chain_id = id;
            }
            if let Some(id) = mainchain_id {
                config.chain.mainchain_id = id;
            }
            if let Some(addr) = rpc_addr {
                config.rpc.listen_addr = addr;
            }
            if let Some(db) = storage {
                config.storage.db_type = db;
            }
            if let Some(dir) = data_dir {
                config.storage.data_dir = dir;
            }
            if let Some(seed) = keypair_seed {
                config.validator.keypair_seed = Some(seed);
            }
            for source in &sources {
                config.watcher.sources.push(parse_source(source)?);
            }
            config.validate()?;

            // Wipe data directory if requested.
            if reset_state {
                let data_dir = &config.storage.data_dir;
                let path = std::path::Path::new(data_dir);
                if path.exists() {
                    tracing::warn!(data_dir = %data_dir, "wiping data directory (--reset-state)");
                    std::fs::remove_dir_all(path)?;
                } else {
                    tracing::info!(data_dir = %data_dir, "data directory does not exist, nothing to reset");
                }
            }

            tracing::info!(
                chain_id = config.chain.chain_id,
                mainchain_id = config.chain.mainchain_id,
                storage = %config.storage.db_type,
                rpc = %config.rpc.listen_addr,
                dev,
                "starting span node"
            );

            let mut node = crate::node::Node::new(config).await?;
            node.run().await
        }
        Command::Init { dir } => {
            init_tracing("info");
            NodeConfig::init(&dir)?;
            tracing::info!("Node configuration initialized in {}", dir);
            Ok(())
        }
        Command::Genesis {
            config,
            output,
            chain_id,
            mainchain_id,
        } => {
            init_tracing("info");
            match config {
                Some(path) => {
                    crate::genesis::generate_genesis(&path, &output)?;
                    tracing::info!("Genesis written to {}", output);
                }
                None => {
                    let peers = [mainchain_id];
                    let template = crate::genesis::devnet_genesis(chain_id, mainchain_id, &peers);
                    let json = serde_json::to_string_pretty(&template).map_err(|e| {
                        NodeError::GenesisError {
                            reason: format!("failed to serialize genesis config: {}", e),
                        }
                    })?;
                    std::fs::write(&output, json)?;
                    tracing::info!("Devnet genesis config written to {}", output);
                }
            }
            Ok(())
        }
        Command::Keygen { seed } => {
            let keypair = match seed {
                Some(hex_seed) => {
                    Keypair::from_seed_hex(&hex_seed).map_err(|e| NodeError::ConfigError {
                        reason: e.to_string(),
                    })?
                }
                None => Keypair::generate(),
            };
            println!("Seed:       {}", hex::encode(keypair.seed()));
            println!("Public key: {}", hex::encode(keypair.public_key()));
            println!("Address:    {}", format_address(&keypair.address()));
            Ok(())
        }
    }
}
