//! Storage for the Span bridge.
//!
//! A small [`KvStore`](traits::KvStore) abstraction with in-memory and SQLite
//! backends, and [`BridgeStore`](bridge_store::BridgeStore), which persists
//! engine snapshots and per-block bank events on top of any backend.

pub mod bridge_store;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;
