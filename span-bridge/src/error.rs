use thiserror::Error;

use span_types::denom::TokenKind;
use span_types::error::SpanError;
use span_types::primitives::{Address, Amount, BlockHeight, ChainId, DynastyId, Nonce};

use crate::ledger::ExecutionError;

/// How a rejection should be handled by the block executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input. Reject the item and surface the error to the submitter.
    Validation,
    /// Replay or duplicate. Expected during normal operation.
    Ordering,
    /// A broken bridge invariant. Abort the block candidate.
    Invariant,
}

/// Errors raised by the bridge state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    // ─── Validation ──────────────────────────────────────────────────────────
    #[error("malformed denom {denom:?}: {reason}")]
    MalformedDenom { denom: String, reason: String },

    #[error("unknown token kind tag {tag}")]
    UnknownTokenKind { tag: u64 },

    #[error("token kind mismatch: {bank} bank cannot process {actual} asset")]
    TokenKindMismatch { bank: TokenKind, actual: TokenKind },

    #[error("denom conflict: {reason}")]
    DenomConflict { reason: String },

    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("invalid amount: amount must be positive")]
    InvalidAmount,

    #[error("channel to chain {chain} is not active")]
    ChannelInactive { chain: ChainId },

    #[error("insufficient cross-chain fee: paid {paid}, required {required}")]
    InsufficientFee { paid: Amount, required: Amount },

    #[error("address {voucher:?} is not a voucher of the {bank} bank")]
    UnknownVoucher { bank: TokenKind, voucher: Address },

    #[error("voucher {voucher:?} cannot be locked, burn it instead")]
    VoucherNotLockable { voucher: Address },

    #[error("wrong chain: expected {expected}, got {actual}")]
    WrongChain { expected: ChainId, actual: ChainId },

    #[error("validator {validator:?} has no stake in dynasty {dynasty}")]
    UnknownValidator { validator: Address, dynasty: DynastyId },

    #[error("validator {validator:?} has {staked} bonded, cannot withdraw {requested}")]
    InsufficientStake {
        validator: Address,
        staked: Amount,
        requested: Amount,
    },

    #[error("invalid attestation signature")]
    InvalidSignature,

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    // ─── Ordering ────────────────────────────────────────────────────────────
    #[error("nonce out of order on chain {chain}: expected {expected}, got {actual}")]
    NonceOutOfOrder {
        chain: ChainId,
        expected: Nonce,
        actual: Nonce,
    },

    #[error("validator {validator:?} already voted for this event")]
    AlreadyVoted { validator: Address },

    #[error("event already finalized")]
    AlreadyFinalized,

    #[error("unexpected block height: expected {expected}, got {actual}")]
    UnexpectedHeight {
        expected: BlockHeight,
        actual: BlockHeight,
    },

    #[error("stale dynasty: attested under {attested}, current is {current}")]
    StaleDynasty {
        attested: DynastyId,
        current: DynastyId,
    },

    // ─── Invariant Violations ────────────────────────────────────────────────
    #[error("insufficient collateral on chain {chain}: locked {locked}, requested {requested}")]
    InsufficientCollateral {
        chain: ChainId,
        locked: Amount,
        requested: Amount,
    },

    #[error("denom registry bijection broken: {reason}")]
    BrokenBijection { reason: String },

    #[error("dynasty gap: expected {expected}, got {actual}")]
    DynastyGap {
        expected: DynastyId,
        actual: DynastyId,
    },

    #[error("arithmetic overflow in {context}")]
    Overflow { context: String },
}

impl BridgeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BridgeError::NonceOutOfOrder { .. }
            | BridgeError::AlreadyVoted { .. }
            | BridgeError::AlreadyFinalized
            | BridgeError::UnexpectedHeight { .. }
            | BridgeError::StaleDynasty { .. } => ErrorClass::Ordering,
            BridgeError::InsufficientCollateral { .. }
            | BridgeError::BrokenBijection { .. }
            | BridgeError::DynastyGap { .. }
            | BridgeError::Overflow { .. } => ErrorClass::Invariant,
            _ => ErrorClass::Validation,
        }
    }

    /// Whether this error must abort the enclosing block.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Invariant
    }
}

impl From<SpanError> for BridgeError {
    fn from(err: SpanError) -> Self {
        match err {
            SpanError::MalformedDenom { denom, reason } => {
                BridgeError::MalformedDenom { denom, reason }
            }
            SpanError::UnknownTokenKind { tag } => BridgeError::UnknownTokenKind { tag },
            SpanError::InvalidAmount => BridgeError::InvalidAmount,
            SpanError::InvalidKeyMaterial | SpanError::InvalidSignature { .. } => {
                BridgeError::InvalidSignature
            }
            SpanError::InsufficientBalance {
                available,
                required,
            } => BridgeError::Execution(ExecutionError::InsufficientBalance {
                available,
                required,
            }),
            SpanError::BalanceOverflow => BridgeError::Overflow {
                context: "balance".to_string(),
            },
            SpanError::SerializationError { reason }
            | SpanError::DeserializationError { reason } => {
                BridgeError::InvalidMessage { reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy() {
        assert_eq!(
            BridgeError::TokenKindMismatch {
                bank: TokenKind::Native,
                actual: TokenKind::Fungible
            }
            .class(),
            ErrorClass::Validation
        );
        assert_eq!(
            BridgeError::DenomConflict {
                reason: String::new()
            }
            .class(),
            ErrorClass::Validation
        );
        assert_eq!(BridgeError::AlreadyFinalized.class(), ErrorClass::Ordering);
        assert_eq!(
            BridgeError::NonceOutOfOrder {
                chain: 1,
                expected: 6,
                actual: 7
            }
            .class(),
            ErrorClass::Ordering
        );
        assert!(BridgeError::InsufficientCollateral {
            chain: 1,
            locked: 0,
            requested: 1
        }
        .is_fatal());
        assert!(!BridgeError::AlreadyVoted { validator: [0; 20] }.is_fatal());
    }

    #[test]
    fn test_span_error_mapping() {
        let err: BridgeError = SpanError::UnknownTokenKind { tag: 9 }.into();
        assert_eq!(err, BridgeError::UnknownTokenKind { tag: 9 });
        let err: BridgeError = SpanError::MalformedDenom {
            denom: "x".into(),
            reason: "bad".into(),
        }
        .into();
        assert_eq!(err.class(), ErrorClass::Validation);
    }
}
