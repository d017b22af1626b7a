//! Chain watchers: poll foreign chains for bridge messages that are buried
//! deep enough and hand them to the block loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use span_types::bridge::InterChainMessage;
use span_types::primitives::{BlockHeight, ChainId};

use crate::error::NodeError;

/// A foreign chain the node can read bridge messages from.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn chain_id(&self) -> ChainId;

    /// Height of the source chain's newest block.
    async fn latest_height(&self) -> Result<BlockHeight, NodeError>;

    /// Messages emitted in blocks `from..=to`, in height order.
    async fn messages(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> Result<Vec<InterChainMessage>, NodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherSettings {
    pub confirmation_depth: u64,
    pub poll_interval: Duration,
    pub max_block_range: u64,
    /// First source height to scan.
    pub start_height: BlockHeight,
}

/// Polls one source and forwards messages addressed to `local_chain`.
pub struct ChainWatcher {
    source: Arc<dyn EventSource>,
    local_chain: ChainId,
    settings: WatcherSettings,
}

impl ChainWatcher {
    pub fn new(source: Arc<dyn EventSource>, local_chain: ChainId, settings: WatcherSettings) -> Self {
        Self {
            source,
            local_chain,
            settings,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.source.chain_id()
    }

    /// Run until shutdown or until the receiving side is dropped.
    ///
    /// Source errors are logged and retried after the poll interval.
    pub async fn run(
        self,
        tx: mpsc::Sender<InterChainMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), NodeError> {
        let chain = self.source.chain_id();
        let max_range = self.settings.max_block_range.max(1);
        let mut cursor = self.settings.start_height;
        tracing::info!(
            chain,
            from = cursor,
            depth = self.settings.confirmation_depth,
            "chain watcher started"
        );

        loop {
            if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }

            let finalized = match self.source.latest_height().await {
                Ok(latest) => latest.saturating_sub(self.settings.confirmation_depth),
                Err(e) => {
                    tracing::warn!(chain, error = %e, "failed to read source height");
                    if self.wait(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if cursor > finalized {
                if self.wait(&mut shutdown).await {
                    break;
                }
                continue;
            }

            let to = finalized.min(cursor.saturating_add(max_range - 1));
            let messages = match self.source.messages(cursor, to).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(chain, from = cursor, to, error = %e, "failed to fetch messages");
                    if self.wait(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            let mut forwarded = 0usize;
            for msg in messages {
                if msg.source_chain != chain || msg.target_chain != self.local_chain {
                    tracing::debug!(
                        chain,
                        source = msg.source_chain,
                        target = msg.target_chain,
                        "skipping message for another route"
                    );
                    continue;
                }
                tokio::select! {
                    sent = tx.send(msg) => {
                        if sent.is_err() {
                            tracing::info!(chain, "message receiver closed, watcher stopping");
                            return Ok(());
                        }
                        forwarded += 1;
                    }
                    _ = shutdown.recv() => {
                        tracing::info!(chain, "chain watcher stopped");
                        return Ok(());
                    }
                }
            }
            if forwarded > 0 {
                tracing::debug!(chain, from = cursor, to, forwarded, "forwarded source messages");
            }
            cursor = to + 1;
        }

        tracing::info!(chain, "chain watcher stopped");
        Ok(())
    }

    /// Sleep one poll interval. Returns true if shutdown arrived first.
    async fn wait(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.poll_interval) => false,
            _ = shutdown.recv() => true,
        }
    }
}

/// Runs one [`ChainWatcher`] task per source.
#[derive(Default)]
pub struct WatcherManager {
    watchers: Vec<ChainWatcher>,
}

impl WatcherManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, watcher: ChainWatcher) {
        if self.watchers.iter().any(|w| w.chain_id() == watcher.chain_id()) {
            tracing::warn!(chain = watcher.chain_id(), "duplicate watcher source ignored");
            return;
        }
        self.watchers.push(watcher);
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Run all watchers concurrently.
    /// Returns when shutdown is signalled or a watcher task fails.
    pub async fn run(
        self,
        tx: mpsc::Sender<InterChainMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), NodeError> {
        if self.watchers.is_empty() {
            return Ok(());
        }
        tracing::info!(watchers = self.watchers.len(), "watcher manager started");

        let mut join_set = JoinSet::new();
        for watcher in self.watchers {
            let tx = tx.clone();
            let rx = shutdown.resubscribe();
            join_set.spawn(async move { watcher.run(tx, rx).await });
        }
        drop(tx);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown signal received, stopping watchers");
                    join_set.abort_all();
                    return Ok(());
                }
                maybe_done = join_set.join_next() => {
                    match maybe_done {
                        Some(Ok(Ok(()))) => continue,
                        Some(Ok(Err(e))) => {
                            tracing::error!(error = %e, "a watcher stopped with error");
                            join_set.abort_all();
                            return Err(e);
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "a watcher task panicked");
                            join_set.abort_all();
                            return Err(NodeError::WatcherError {
                                reason: format!("watcher task panicked: {}", e),
                            });
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}
