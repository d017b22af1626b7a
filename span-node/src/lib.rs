//! Span bridge node: configuration, chain watchers, block production,
//! persistence, and the `bridge_*` JSON-RPC surface.

pub mod cli;
pub mod config;
pub mod error;
pub mod genesis;
pub mod mempool;
pub mod metrics;
pub mod node;
pub mod rpc;
pub mod rpc_source;
pub mod watcher;
