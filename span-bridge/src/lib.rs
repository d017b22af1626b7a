//! Bridge core for the Span protocol.
//!
//! Implements the denom registry, per-chain nonce ledgers, inbound message
//! validation, validator dynasties, stake-weighted attestation quorum, the
//! native and fungible token banks, and the engine that executes blocks
//! against them.

pub mod attestation;
pub mod bank;
pub mod channel;
pub mod dynasty;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod message;
pub mod nonce;
pub mod proxy;
pub mod registry;
