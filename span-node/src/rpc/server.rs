use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use jsonrpsee::server::{ServerBuilder, ServerHandle};

use span_bridge::engine::BridgeEngine;
use span_bridge::ledger::MemoryLedger;
use span_storage::bridge_store::BridgeStore;
use span_storage::traits::KvStore;

use super::handlers::{BridgeRpcImpl, BridgeRpcServer};
use crate::error::NodeError;
use crate::mempool::Mempool;
use crate::metrics::NodeMetrics;

/// Start the JSON-RPC HTTP+WS server.
pub async fn start_rpc_server(
    addr: &str,
    max_connections: u32,
    engine: Arc<RwLock<BridgeEngine<MemoryLedger>>>,
    store: Arc<BridgeStore<Arc<dyn KvStore>>>,
    mempool: Arc<Mutex<Mempool>>,
    metrics: Arc<NodeMetrics>,
) -> Result<ServerHandle, NodeError> {
    let server = ServerBuilder::default()
        .max_connections(max_connections)
        .build(addr)
        .await
        .map_err(|e| NodeError::RpcError {
            reason: format!("failed to build RPC server: {}", e),
        })?;

    let rpc_impl = BridgeRpcImpl {
        engine,
        store,
        mempool,
        metrics,
    };

    let handle = server.start(rpc_impl.into_rpc());

    tracing::info!(addr = %addr, "RPC server started");

    Ok(handle)
}
