use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;

use span_types::bridge::InterChainMessage;
use span_types::primitives::{BlockHeight, ChainId};

use crate::error::NodeError;
use crate::rpc::types::MessageInfo;
use crate::watcher::EventSource;

/// Default RPC request timeout in seconds.
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// Reads bridge messages from another span node over JSON-RPC.
pub struct RpcEventSource {
    chain_id: ChainId,
    client: HttpClient,
}

impl RpcEventSource {
    pub fn new(chain_id: ChainId, url: &str) -> Result<Self, NodeError> {
        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS))
            .build(url)
            .map_err(|e| NodeError::WatcherError {
                reason: format!("failed to build client for '{}': {}", url, e),
            })?;
        Ok(Self { chain_id, client })
    }
}

fn source_error(chain: ChainId, e: impl std::fmt::Display) -> NodeError {
    NodeError::WatcherError {
        reason: format!("source {}: {}", chain, e),
    }
}

#[async_trait]
impl EventSource for RpcEventSource {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn latest_height(&self) -> Result<BlockHeight, NodeError> {
        self.client
            .request("bridge_blockNumber", rpc_params![])
            .await
            .map_err(|e| source_error(self.chain_id, e))
    }

    async fn messages(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> Result<Vec<InterChainMessage>, NodeError> {
        let infos: Vec<MessageInfo> = self
            .client
            .request("bridge_getMessages", rpc_params![from, to])
            .await
            .map_err(|e| source_error(self.chain_id, e))?;
        infos
            .into_iter()
            .map(|info| InterChainMessage::try_from(info).map_err(|e| source_error(self.chain_id, e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_url() {
        assert!(matches!(
            RpcEventSource::new(366, "not a url"),
            Err(NodeError::WatcherError { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_source_reports_watcher_error() {
        let source = RpcEventSource::new(366, "http://127.0.0.1:1").unwrap();
        assert_eq!(source.chain_id(), 366);
        assert!(matches!(
            source.latest_height().await,
            Err(NodeError::WatcherError { .. })
        ));
    }
}
