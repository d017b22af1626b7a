use serde::{Deserialize, Serialize};

use span_bridge::attestation::{EventKey, VotingRecord};
use span_types::bridge::{InterChainMessage, TransferKind};
use span_types::dynasty::Dynasty;
use span_types::primitives::format_address;

/// A cross-chain message as exported to watchers on other chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    /// Chain that emitted the message.
    pub source_chain: u64,
    /// Chain the message is addressed to.
    pub target_chain: u64,
    /// "token_lock" or "voucher_burn".
    pub kind: TransferKind,
    /// Source block that emitted the event.
    pub block_height: u64,
    /// Emitting transaction identifier as hex string.
    pub tx_hash: String,
    /// Borsh-encoded transfer payload as hex string.
    pub payload: String,
}

impl From<&InterChainMessage> for MessageInfo {
    fn from(msg: &InterChainMessage) -> Self {
        Self {
            source_chain: msg.source_chain,
            target_chain: msg.target_chain,
            kind: msg.kind,
            block_height: msg.block_height,
            tx_hash: hex::encode(msg.tx_hash),
            payload: hex::encode(&msg.payload),
        }
    }
}

impl TryFrom<MessageInfo> for InterChainMessage {
    type Error = String;

    fn try_from(info: MessageInfo) -> Result<Self, Self::Error> {
        let tx_hash: [u8; 32] = hex::decode(&info.tx_hash)
            .map_err(|e| format!("invalid tx_hash hex: {}", e))?
            .try_into()
            .map_err(|_| "tx_hash must be 32 bytes".to_string())?;
        let payload = hex::decode(&info.payload).map_err(|e| format!("invalid payload hex: {}", e))?;
        Ok(InterChainMessage {
            source_chain: info.source_chain,
            target_chain: info.target_chain,
            kind: info.kind,
            block_height: info.block_height,
            tx_hash,
            payload,
        })
    }
}

/// A validator and its stake share in a dynasty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorShare {
    /// Validator address as hex string.
    pub address: String,
    /// Stake share in base units, as a decimal string.
    pub share: String,
}

/// The active validator dynasty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynastyInfo {
    /// Dynasty identifier.
    pub id: u64,
    /// Sum of all shares, as a decimal string.
    pub total_shares: String,
    /// Share needed to finalize an event, as a decimal string.
    pub quorum_threshold: String,
    /// Blocks per dynasty.
    pub dynasty_length: u64,
    /// Members of the dynasty.
    pub validators: Vec<ValidatorShare>,
}

impl DynastyInfo {
    pub fn new(dynasty: &Dynasty, dynasty_length: u64) -> Self {
        Self {
            id: dynasty.id,
            total_shares: dynasty.total_shares.to_string(),
            quorum_threshold: dynasty.quorum_threshold().to_string(),
            dynasty_length,
            validators: dynasty
                .shares
                .iter()
                .map(|(address, share)| ValidatorShare {
                    address: format_address(address),
                    share: share.to_string(),
                })
                .collect(),
        }
    }
}

/// A registered denom and the voucher program that represents it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenomEntry {
    /// Canonical denom string.
    pub denom: String,
    /// Voucher address as hex string.
    pub voucher: String,
}

/// Summary of one token bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankInfo {
    /// "native" or "fungible".
    pub kind: String,
    /// Escrow account holding locked collateral, as hex string.
    pub escrow: String,
    /// Whether this chain is the mainchain.
    pub is_on_mainchain: bool,
    pub mainchain_id: u64,
    /// Registered denoms in registration order.
    pub denoms: Vec<DenomEntry>,
}

/// A bridge channel to a foreign chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub chain_id: u64,
    pub active: bool,
}

/// Votes gathered for one event digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingRecordInfo {
    /// Event digest as hex string.
    pub digest: String,
    /// Dynasty whose shares weight the votes.
    pub dynasty: u64,
    /// Accumulated stake share, as a decimal string.
    pub accumulated_shares: String,
    /// Validators that voted, as hex strings.
    pub voters: Vec<String>,
    pub finalized: bool,
}

impl VotingRecordInfo {
    pub fn new(key: &EventKey, record: &VotingRecord) -> Self {
        Self {
            digest: hex::encode(key.digest),
            dynasty: record.dynasty,
            accumulated_shares: record.accumulated_shares.to_string(),
            voters: record.voted.iter().map(format_address).collect(),
            finalized: record.finalized,
        }
    }
}

/// Node and engine status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub chain_id: u64,
    pub mainchain_id: u64,
    /// Height of the last executed block.
    pub height: u64,
    /// Active dynasty identifier.
    pub dynasty: u64,
    /// Finalized events waiting for an earlier nonce.
    pub deferred_events: usize,
    /// Events with votes still below quorum.
    pub pending_votes: usize,
    /// Items queued for the next block.
    pub mempool_size: usize,
    /// Cross-chain fee in base units, as a decimal string.
    pub cross_chain_fee: String,
}

/// Result of submitting a call or attestation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResult {
    /// Whether the item was queued.
    pub success: bool,
    /// Reason for rejection, if any.
    pub reason: Option<String>,
}

impl SubmitResult {
    pub fn accepted() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}
