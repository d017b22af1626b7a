use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use span_bridge::engine::BridgeEngine;
use span_bridge::error::BridgeError;
use span_bridge::ledger::MemoryLedger;
use span_crypto::address::{bank_escrow_address, staking_escrow_address};
use span_crypto::hash::blake3_hash_domain;
use span_crypto::keys::Keypair;
use span_types::bridge::Asset;
use span_types::constants::{
    DEFAULT_CONFIRMATION_DEPTH, DEFAULT_CROSS_CHAIN_FEE, DYNASTY_LENGTH, ONE_COIN,
};
use span_types::denom::TokenKind;
use span_types::genesis::{GenesisAllocation, GenesisConfig, GenesisParameters, GenesisValidator};
use span_types::primitives::{format_address, Address, ChainId, Hash};

use crate::error::NodeError;

const GENESIS_HASH_CONTEXT: &str = "span genesis v1";

/// Seed of the single devnet validator. Public on purpose: `--dev` nodes
/// must agree on it.
pub const DEVNET_VALIDATOR_SEED: [u8; 32] = [0x5a; 32];

/// Account that collects cross-chain fees on a devnet.
const DEVNET_FEE_COLLECTOR: Address = [
    0xfe, 0xe0, 0xc0, 0x11, 0xec, 0x70, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x01,
];

/// Devnet genesis: one validator holding all stake, pre-funded with 1M coins,
/// and channels open to `peers`.
pub fn devnet_genesis(chain_id: ChainId, mainchain_id: ChainId, peers: &[ChainId]) -> GenesisConfig {
    let validator = Keypair::from_seed(&DEVNET_VALIDATOR_SEED);
    GenesisConfig {
        chain_id,
        mainchain_id,
        timestamp: 1_700_000_000,
        validators: vec![GenesisValidator {
            pubkey: validator.public_key(),
            address: validator.address(),
            stake: 1_000 * ONE_COIN,
        }],
        allocations: vec![GenesisAllocation {
            address: validator.address(),
            amount: 1_000_000 * ONE_COIN,
        }],
        parameters: GenesisParameters {
            dynasty_length: DYNASTY_LENGTH,
            cross_chain_fee: DEFAULT_CROSS_CHAIN_FEE,
            confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
            channels: peers.iter().copied().filter(|p| *p != chain_id).collect(),
            fee_collector: DEVNET_FEE_COLLECTOR,
        },
    }
}

/// Deterministic digest of a genesis config. Nodes on the same chain must
/// report the same value.
pub fn genesis_hash(config: &GenesisConfig) -> Result<Hash, NodeError> {
    let bytes = borsh::to_vec(config).map_err(|e| NodeError::SerializationError {
        reason: e.to_string(),
    })?;
    Ok(blake3_hash_domain(GENESIS_HASH_CONTEXT, &bytes))
}

/// Start a bridge engine from genesis: dynasty 1 from the validators and the
/// allocations credited as native coin.
pub fn build_engine(config: &GenesisConfig) -> Result<BridgeEngine<MemoryLedger>, NodeError> {
    if config.parameters.dynasty_length == 0 {
        return Err(NodeError::GenesisError {
            reason: "dynasty_length must be positive".to_string(),
        });
    }
    let mut ledger = MemoryLedger::new();
    for alloc in &config.allocations {
        ledger
            .credit(&alloc.address, Asset::Native, alloc.amount)
            .map_err(BridgeError::from)?;
    }
    // Genesis stake is bonded, so unstaking it draws on the staking escrow.
    let bonded = config
        .validators
        .iter()
        .try_fold(0u128, |acc, v| acc.checked_add(v.stake))
        .ok_or_else(|| NodeError::GenesisError {
            reason: "total validator stake overflows".to_string(),
        })?;
    if bonded > 0 {
        ledger
            .credit(
                &staking_escrow_address(config.chain_id),
                Asset::Native,
                bonded,
            )
            .map_err(BridgeError::from)?;
    }
    let engine = BridgeEngine::from_genesis(config, ledger).map_err(|e| NodeError::GenesisError {
        reason: e.to_string(),
    })?;
    Ok(engine)
}

/// Written by `span genesis`: the config plus values derived from it.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenesisFile {
    pub config: GenesisConfig,
    /// Hex digest from [`genesis_hash`].
    pub genesis_hash: String,
    pub dynasty: GenesisDynasty,
    /// Escrow account of each bank, as hex.
    pub escrows: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenesisDynasty {
    pub id: u64,
    pub total_shares: String,
    pub quorum_threshold: String,
}

/// Validate a genesis config file and write it, with its derived values, to
/// `output_path`.
pub fn generate_genesis(config_path: &str, output_path: &str) -> Result<(), NodeError> {
    let config = read_genesis_config(config_path)?;
    let engine = build_engine(&config)?;
    let dynasty = engine.current_dynasty();

    let escrows = [TokenKind::Native, TokenKind::Fungible]
        .into_iter()
        .map(|kind| {
            (
                kind.to_string(),
                format_address(&bank_escrow_address(config.chain_id, kind)),
            )
        })
        .collect();
    let output = GenesisFile {
        genesis_hash: hex::encode(genesis_hash(&config)?),
        dynasty: GenesisDynasty {
            id: dynasty.id,
            total_shares: dynasty.total_shares.to_string(),
            quorum_threshold: dynasty.quorum_threshold().to_string(),
        },
        escrows,
        config,
    };

    let json_str = serde_json::to_string_pretty(&output).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to serialize genesis data: {}", e),
    })?;

    std::fs::write(output_path, json_str)?;

    Ok(())
}

/// Load a genesis config. Accepts either a bare config or a [`GenesisFile`].
pub fn load_genesis(path: &str) -> Result<GenesisConfig, NodeError> {
    let contents = std::fs::read_to_string(path).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to read genesis file '{}': {}", path, e),
    })?;

    if let Ok(file) = serde_json::from_str::<GenesisFile>(&contents) {
        return Ok(file.config);
    }
    serde_json::from_str(&contents).map_err(|e| NodeError::GenesisError {
        reason: format!("invalid genesis config: {}", e),
    })
}

fn read_genesis_config(path: &str) -> Result<GenesisConfig, NodeError> {
    let config_str = std::fs::read_to_string(path).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to read genesis config '{}': {}", path, e),
    })?;
    serde_json::from_str(&config_str).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to parse genesis config: {}", e),
    })
}
