use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::*;

/// Chain-start configuration consumed by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Local chain identifier.
    pub chain_id: ChainId,
    /// Identifier of the mainchain this chain is anchored to.
    pub mainchain_id: ChainId,
    /// Genesis timestamp.
    pub timestamp: Timestamp,
    /// Initial validators; they form dynasty 1.
    pub validators: Vec<GenesisValidator>,
    /// Initial native-coin balances.
    pub allocations: Vec<GenesisAllocation>,
    /// Protocol parameters.
    pub parameters: GenesisParameters,
}

/// A validator in the genesis configuration.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Validator's public key.
    pub pubkey: PublicKey,
    /// Validator's address.
    pub address: Address,
    /// Stake share.
    pub stake: Amount,
}

/// An initial native-coin allocation.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct GenesisAllocation {
    /// Recipient address.
    pub address: Address,
    /// Amount to allocate.
    pub amount: Amount,
}

/// Protocol parameters set at genesis.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct GenesisParameters {
    /// Blocks per dynasty.
    pub dynasty_length: u64,
    /// Flat fee charged on every lock and burn.
    pub cross_chain_fee: Amount,
    /// Default confirmation depth for foreign events.
    pub confirmation_depth: u64,
    /// Foreign chains with an open channel at genesis.
    pub channels: Vec<ChainId>,
    /// Account receiving cross-chain fees.
    pub fee_collector: Address,
}
