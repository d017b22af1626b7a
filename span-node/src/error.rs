use thiserror::Error;

use span_bridge::error::BridgeError;
use span_storage::error::StorageError;

/// Errors that can occur in the node.
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum NodeError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("genesis error: {reason}")]
    GenesisError { reason: String },

    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("bridge error: {0}")]
    BridgeError(#[from] BridgeError),

    #[error("watcher error: {reason}")]
    WatcherError { reason: String },

    #[error("mempool full (capacity {capacity})")]
    MempoolFull { capacity: usize },

    #[error("rpc error: {reason}")]
    RpcError { reason: String },

    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = NodeError::ConfigError {
            reason: "missing field".to_string(),
        };
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_watcher_error_display() {
        let err = NodeError::WatcherError {
            reason: "source 366 unreachable".to_string(),
        };
        assert_eq!(err.to_string(), "watcher error: source 366 unreachable");
    }

    #[test]
    fn test_bridge_error_from() {
        let err: NodeError = BridgeError::ChannelInactive { chain: 366 }.into();
        assert!(matches!(
            err,
            NodeError::BridgeError(BridgeError::ChannelInactive { chain: 366 })
        ));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let node_err: NodeError = io_err.into();
        assert!(matches!(node_err, NodeError::IoError(_)));
    }
}
