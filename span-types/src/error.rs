use thiserror::Error;

/// Protocol-level error codes shared by every Span crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpanError {
    // ─── Denom Errors ────────────────────────────────────────────────────────
    #[error("malformed denom {denom:?}: {reason}")]
    MalformedDenom { denom: String, reason: String },

    #[error("unknown token kind tag {tag}")]
    UnknownTokenKind { tag: u64 },

    // ─── Amount Errors ───────────────────────────────────────────────────────
    #[error("invalid amount: amount must be positive")]
    InvalidAmount,

    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: u128, required: u128 },

    #[error("balance overflow")]
    BalanceOverflow,

    // ─── Crypto Errors ───────────────────────────────────────────────────────
    #[error("invalid key material")]
    InvalidKeyMaterial,

    #[error("invalid signature from validator {signer_index}")]
    InvalidSignature { signer_index: usize },

    // ─── Encoding Errors ─────────────────────────────────────────────────────
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    #[error("deserialization error: {reason}")]
    DeserializationError { reason: String },
}
