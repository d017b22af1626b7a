use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::denom::{Denom, TokenKind};
use crate::error::SpanError;
use crate::primitives::*;

/// Source-side action that a cross-chain message reports.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Origin asset locked on the source chain; the target mints vouchers.
    TokenLock,
    /// Vouchers burned on the source chain; the target unlocks collateral.
    VoucherBurn,
}

/// The four nonce sequences a bank assigns per counterparty chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub enum NonceKind {
    TokenLock,
    TokenUnlock,
    VoucherBurn,
    VoucherMint,
}

/// An asset held on the local ledger.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum Asset {
    /// The local native coin.
    Native,
    /// A token program (origin token or voucher) at the given address.
    Token(Address),
}

/// Wire payload carried by a lock or burn event.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct TransferPayload {
    /// Denom string, validated by the receiving side.
    pub denom: String,
    /// Account that locked or burned on the source chain.
    pub sender: Address,
    /// Account credited on the target chain.
    pub receiver: Address,
    /// Transferred amount.
    pub amount: Amount,
    /// Source-chain lock or burn nonce.
    pub nonce: Nonce,
}

/// A raw message observed on a foreign chain, before validation.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct InterChainMessage {
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub kind: TransferKind,
    /// Height of the source-chain block that emitted the event.
    pub block_height: BlockHeight,
    /// Identifier of the emitting transaction on the source chain.
    pub tx_hash: Hash,
    /// Borsh-encoded [`TransferPayload`].
    pub payload: Vec<u8>,
}

impl InterChainMessage {
    /// Build a message around an encoded payload.
    pub fn new(
        source_chain: ChainId,
        target_chain: ChainId,
        kind: TransferKind,
        block_height: BlockHeight,
        tx_hash: Hash,
        payload: &TransferPayload,
    ) -> Result<Self, SpanError> {
        let payload = borsh::to_vec(payload).map_err(|e| SpanError::SerializationError {
            reason: e.to_string(),
        })?;
        Ok(Self {
            source_chain,
            target_chain,
            kind,
            block_height,
            tx_hash,
            payload,
        })
    }
}

/// A validated cross-chain transfer.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct CrossChainTransferEvent {
    pub kind: TransferKind,
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub denom: Denom,
    #[serde(with = "serde_address")]
    pub sender: Address,
    #[serde(with = "serde_address")]
    pub receiver: Address,
    pub amount: Amount,
    pub nonce: Nonce,
}

impl CrossChainTransferEvent {
    /// Token kind of the transferred asset.
    pub fn token_kind(&self) -> TokenKind {
        self.denom.kind
    }
}

/// Immutable record of a lock on this chain.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct LockRecord {
    pub denom: Denom,
    #[serde(with = "serde_address")]
    pub source_owner: Address,
    #[serde(with = "serde_address")]
    pub target_receiver: Address,
    pub amount: Amount,
    pub nonce: Nonce,
    /// Target chain of the lock.
    pub chain_id: ChainId,
}

/// Immutable record of a voucher burn on this chain.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BurnRecord {
    pub denom: Denom,
    #[serde(with = "serde_address")]
    pub source_owner: Address,
    #[serde(with = "serde_address")]
    pub target_receiver: Address,
    pub amount: Amount,
    pub nonce: Nonce,
    /// Origin chain the collateral will be unlocked on.
    pub chain_id: ChainId,
}

/// Events emitted by a token bank.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BankEvent {
    TokenLocked {
        denom: Denom,
        #[serde(with = "serde_address")]
        sender: Address,
        target_chain: ChainId,
        #[serde(with = "serde_address")]
        receiver: Address,
        amount: Amount,
        nonce: Nonce,
    },
    TokenUnlocked {
        denom: Denom,
        source_chain: ChainId,
        #[serde(with = "serde_address")]
        receiver: Address,
        amount: Amount,
        source_burn_nonce: Nonce,
        unlock_nonce: Nonce,
    },
    VoucherBurned {
        denom: Denom,
        #[serde(with = "serde_address")]
        voucher: Address,
        #[serde(with = "serde_address")]
        owner: Address,
        target_chain: ChainId,
        #[serde(with = "serde_address")]
        receiver: Address,
        amount: Amount,
        nonce: Nonce,
    },
    VoucherMinted {
        denom: Denom,
        #[serde(with = "serde_address")]
        voucher: Address,
        source_chain: ChainId,
        #[serde(with = "serde_address")]
        receiver: Address,
        amount: Amount,
        source_lock_nonce: Nonce,
        mint_nonce: Nonce,
    },
}

impl BankEvent {
    pub fn denom(&self) -> &Denom {
        match self {
            BankEvent::TokenLocked { denom, .. }
            | BankEvent::TokenUnlocked { denom, .. }
            | BankEvent::VoucherBurned { denom, .. }
            | BankEvent::VoucherMinted { denom, .. } => denom,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BankEvent::TokenLocked { .. } => "token_locked",
            BankEvent::TokenUnlocked { .. } => "token_unlocked",
            BankEvent::VoucherBurned { .. } => "voucher_burned",
            BankEvent::VoucherMinted { .. } => "voucher_minted",
        }
    }
}

/// A validator's signed vote that a foreign event happened.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Attestation {
    /// Validator public key.
    pub validator: PublicKey,
    /// Dynasty the validator votes under.
    pub dynasty: DynastyId,
    /// The attested event.
    pub event: CrossChainTransferEvent,
    /// Ed25519 signature over the attestation signing data.
    #[serde(with = "serde_sig")]
    pub signature: Signature,
}

/// Privileged calls the bridge issues to a bank once quorum is reached.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum SystemCall {
    MintVouchers {
        source_chain: ChainId,
        denom: Denom,
        #[serde(with = "serde_address")]
        receiver: Address,
        amount: Amount,
        dynasty: DynastyId,
        source_nonce: Nonce,
    },
    UnlockTokens {
        source_chain: ChainId,
        denom: Denom,
        #[serde(with = "serde_address")]
        receiver: Address,
        amount: Amount,
        dynasty: DynastyId,
        source_nonce: Nonce,
    },
}

/// Unsigned system transaction included by the block proposer.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SystemTransaction {
    /// Bank the call is routed to.
    pub bank: TokenKind,
    /// Proposer that built the transaction.
    #[serde(with = "serde_address")]
    pub proposer: Address,
    pub call: SystemCall,
}

/// User-facing bank calls carried in blocks.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum UserCall {
    LockTokens {
        #[serde(with = "serde_address")]
        sender: Address,
        target_chain: ChainId,
        asset: Asset,
        #[serde(with = "serde_address")]
        receiver: Address,
        amount: Amount,
        fee: Amount,
    },
    BurnVouchers {
        #[serde(with = "serde_address")]
        owner: Address,
        bank: TokenKind,
        #[serde(with = "serde_address")]
        voucher: Address,
        #[serde(with = "serde_address")]
        receiver: Address,
        amount: Amount,
        fee: Amount,
    },
    /// Bond native coin as validator stake. Counts from the next dynasty.
    Stake {
        #[serde(with = "serde_address")]
        validator: Address,
        amount: Amount,
    },
    /// Withdraw bonded stake. Also takes effect at the next rotation.
    Unstake {
        #[serde(with = "serde_address")]
        validator: Address,
        amount: Amount,
    },
    /// Open, pause or resume the channel to a foreign chain.
    SetChannel { chain: ChainId, active: bool },
}

/// A local block as seen by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct BridgeBlock {
    pub height: BlockHeight,
    pub timestamp: Timestamp,
    pub proposer: Address,
    pub calls: Vec<UserCall>,
    pub attestations: Vec<Attestation>,
}
