use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use span_bridge::attestation::attestation_signing_data;
use span_bridge::engine::{BlockReceipt, BridgeEngine, EngineState};
use span_bridge::ledger::MemoryLedger;
use span_bridge::message::{parse_transfer_event, validate_for_bank};
use span_crypto::keys::Keypair;
use span_storage::bridge_store::BridgeStore;
use span_storage::memory::MemoryStore;
use span_storage::sqlite::SqliteStore;
use span_storage::traits::KvStore;
use span_types::bridge::{Attestation, BridgeBlock, CrossChainTransferEvent, InterChainMessage};
use span_types::constants::MAX_ITEMS_PER_BLOCK;
use span_types::genesis::GenesisConfig;
use span_types::primitives::{format_address, Address, DynastyId, ZERO_ADDRESS};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::genesis::{build_engine, devnet_genesis, load_genesis, DEVNET_VALIDATOR_SEED};
use crate::mempool::{BlockContents, Mempool};
use crate::metrics::NodeMetrics;
use crate::rpc_source::RpcEventSource;
use crate::watcher::{ChainWatcher, WatcherManager, WatcherSettings};

/// Items the mempool holds before submissions are refused.
const MEMPOOL_CAPACITY: usize = MAX_ITEMS_PER_BLOCK * 4;

type Engine = BridgeEngine<MemoryLedger>;

/// The bridge node: block loop, chain watchers, persistence, and RPC.
pub struct Node {
    config: NodeConfig,
    keypair: Option<Keypair>,
    engine: Arc<RwLock<Engine>>,
    store: Arc<BridgeStore<Arc<dyn KvStore>>>,
    mempool: Arc<Mutex<Mempool>>,
    metrics: Arc<NodeMetrics>,
    rpc_handle: Option<jsonrpsee::server::ServerHandle>,
    inbound_tx: mpsc::Sender<InterChainMessage>,
    inbound_rx: mpsc::Receiver<InterChainMessage>,
    /// Message received while the message queue was full. Nothing more is
    /// read from the watchers until it is queued.
    held_message: Option<InterChainMessage>,
    shutdown_tx: broadcast::Sender<()>,
    watchers: Option<WatcherManager>,
    watcher_task: Option<JoinHandle<Result<(), NodeError>>>,
}

/// Create a storage backend from the node configuration.
fn create_store(config: &NodeConfig) -> Result<Arc<dyn KvStore>, NodeError> {
    match config.storage.db_type.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sqlite" => {
            let data_dir = std::path::Path::new(&config.storage.data_dir);
            std::fs::create_dir_all(data_dir)?;
            let store = SqliteStore::open(data_dir.join("span.db"))?;
            Ok(Arc::new(store))
        }
        other => Err(NodeError::ConfigError {
            reason: format!(
                "unknown storage backend '{}', expected 'memory' or 'sqlite'",
                other
            ),
        }),
    }
}

/// Borsh bytes of the full engine, as written on every block.
fn encode_snapshot(engine: &Engine) -> Result<Vec<u8>, NodeError> {
    borsh::to_vec(&engine.snapshot()).map_err(|e| NodeError::SerializationError {
        reason: format!("failed to encode engine snapshot: {}", e),
    })
}

fn decode_snapshot(bytes: &[u8]) -> Result<Engine, NodeError> {
    let (state, ledger): (EngineState, MemoryLedger) =
        borsh::from_slice(bytes).map_err(|e| NodeError::SerializationError {
            reason: format!("corrupt engine snapshot: {}", e),
        })?;
    Ok(BridgeEngine::restore(state, ledger))
}

impl Node {
    /// Create a new node from the given configuration.
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let devnet = config.genesis_config.is_none() && config.chain.genesis_path.is_none();

        // Validator key: configured seed, the shared devnet seed, or a fresh key.
        let keypair = if !config.validator.enabled {
            None
        } else if let Some(ref seed_hex) = config.validator.keypair_seed {
            Some(
                Keypair::from_seed_hex(seed_hex).map_err(|e| NodeError::ConfigError {
                    reason: format!("invalid keypair seed: {}", e),
                })?,
            )
        } else if devnet {
            Some(Keypair::from_seed(&DEVNET_VALIDATOR_SEED))
        } else {
            tracing::warn!("no validator seed configured, generating an ephemeral key");
            Some(Keypair::generate())
        };

        let genesis = Self::resolve_genesis(&config)?;
        if genesis.chain_id != config.chain.chain_id {
            return Err(NodeError::GenesisError {
                reason: format!(
                    "genesis is for chain {}, node is configured for {}",
                    genesis.chain_id, config.chain.chain_id
                ),
            });
        }

        let store = Arc::new(BridgeStore::new(create_store(&config)?));
        let engine = match store.load_snapshot()? {
            Some((height, bytes)) => {
                let engine = decode_snapshot(&bytes)?;
                if engine.local_chain() != config.chain.chain_id {
                    return Err(NodeError::GenesisError {
                        reason: format!(
                            "stored state belongs to chain {}, node is configured for {}",
                            engine.local_chain(),
                            config.chain.chain_id
                        ),
                    });
                }
                tracing::info!(height, "restored bridge state from storage");
                engine
            }
            None => build_engine(&genesis)?,
        };

        let metrics = Arc::new(NodeMetrics::new());
        metrics.bridge_height.set(engine.height() as i64);
        metrics.current_dynasty.set(engine.current_dynasty().id as i64);
        metrics.deferred_events.set(engine.deferred_count() as i64);

        if let Some(ref kp) = keypair {
            let address = kp.address();
            if !engine.current_dynasty().contains(&address) {
                tracing::warn!(
                    validator = %format_address(&address),
                    "validator key is not in the current dynasty"
                );
            }
        }

        let engine = Arc::new(RwLock::new(engine));
        let mempool = Arc::new(Mutex::new(Mempool::new(MEMPOOL_CAPACITY)));

        let rpc_handle = if config.rpc.enabled {
            let handle = crate::rpc::server::start_rpc_server(
                &config.rpc.listen_addr,
                config.rpc.max_connections,
                Arc::clone(&engine),
                Arc::clone(&store),
                Arc::clone(&mempool),
                Arc::clone(&metrics),
            )
            .await?;
            Some(handle)
        } else {
            None
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(config.watcher.channel_capacity);
        let (shutdown_tx, _) = broadcast::channel(4);
        let watchers = if config.watcher.enabled {
            Some(Self::build_watchers(&config)?)
        } else {
            None
        };

        tracing::info!(
            chain_id = config.chain.chain_id,
            mainchain_id = config.chain.mainchain_id,
            validator = keypair.is_some(),
            sources = config.watcher.sources.len(),
            "node initialized"
        );

        Ok(Self {
            config,
            keypair,
            engine,
            store,
            mempool,
            metrics,
            rpc_handle,
            inbound_tx,
            inbound_rx,
            held_message: None,
            shutdown_tx,
            watchers,
            watcher_task: None,
        })
    }

    fn resolve_genesis(config: &NodeConfig) -> Result<GenesisConfig, NodeError> {
        if let Some(ref genesis) = config.genesis_config {
            return Ok(genesis.clone());
        }
        if let Some(ref path) = config.chain.genesis_path {
            return load_genesis(path);
        }
        let mut peers: Vec<_> = config.watcher.sources.iter().map(|s| s.chain_id).collect();
        peers.push(config.chain.mainchain_id);
        Ok(devnet_genesis(
            config.chain.chain_id,
            config.chain.mainchain_id,
            &peers,
        ))
    }

    fn build_watchers(config: &NodeConfig) -> Result<WatcherManager, NodeError> {
        let mut manager = WatcherManager::new();
        for source in &config.watcher.sources {
            let rpc = RpcEventSource::new(source.chain_id, &source.rpc_url)?;
            let settings = WatcherSettings {
                confirmation_depth: config.confirmation_depth_for(source),
                poll_interval: config.poll_interval(),
                max_block_range: config.watcher.max_block_range,
                start_height: source.start_height,
            };
            manager.add(ChainWatcher::new(
                Arc::new(rpc),
                config.chain.chain_id,
                settings,
            ));
        }
        Ok(manager)
    }

    /// Run the node main loop.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        if let Some(manager) = self.watchers.take() {
            if !manager.is_empty() {
                let tx = self.inbound_tx.clone();
                let rx = self.shutdown_tx.subscribe();
                self.watcher_task = Some(tokio::spawn(manager.run(tx, rx)));
            }
        }

        let mut block_interval = tokio::time::interval(self.config.block_time());
        let producing = self.keypair.is_some();

        tracing::info!("Node is running. Press Ctrl+C to stop.");

        loop {
            tokio::select! {
                _ = block_interval.tick() => {
                    if !producing {
                        continue;
                    }
                    if let Err(e) = self.produce_block().await {
                        tracing::error!(error = %e, "block production failed");
                    }
                }
                Some(msg) = self.inbound_rx.recv(), if self.held_message.is_none() => {
                    self.queue_message(msg).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received shutdown signal");
                    self.shutdown().await?;
                    return Ok(());
                }
            }
        }
    }

    async fn queue_message(&mut self, msg: InterChainMessage) {
        self.metrics.watcher_messages.inc();
        let mut mempool = self.mempool.lock().await;
        if mempool.add_message(msg.clone()).is_err() {
            tracing::debug!(
                source = msg.source_chain,
                block = msg.block_height,
                "message queue full, holding watched message"
            );
            self.held_message = Some(msg);
        }
        self.metrics.pending_messages.set(mempool.total_size() as i64);
    }

    /// Move the held message and whatever the watchers delivered since into
    /// the mempool, stopping as soon as the message queue is full again.
    async fn pull_messages(&mut self) {
        if let Some(msg) = self.held_message.take() {
            let mut mempool = self.mempool.lock().await;
            if let Err(e) = mempool.add_message(msg.clone()) {
                tracing::debug!(error = %e, "message queue still full");
                self.held_message = Some(msg);
                return;
            }
        }
        while self.held_message.is_none() {
            match self.inbound_rx.try_recv() {
                Ok(msg) => self.queue_message(msg).await,
                Err(_) => break,
            }
        }
    }

    /// Build, execute, and persist the next block from the mempool.
    ///
    /// Watched messages are turned into attestations signed by this node for
    /// the dynasty the block will run under. Returns `None` if the block was
    /// aborted by an invariant violation. State is then unchanged, the items
    /// that caused the violation are dropped and the rest go back to the
    /// mempool for the next block.
    pub async fn produce_block(&mut self) -> Result<Option<BlockReceipt>, NodeError> {
        self.pull_messages().await;
        let contents = {
            let mut mempool = self.mempool.lock().await;
            let contents = mempool.drain_for_block(MAX_ITEMS_PER_BLOCK);
            self.metrics.pending_messages.set(mempool.total_size() as i64);
            contents
        };
        // Freed message slots take what the watchers are waiting to deliver.
        self.pull_messages().await;

        let mut engine = self.engine.write().await;
        let height = engine.height() + 1;
        let dynasty = engine.dynasty_at(height);
        let local_chain = engine.local_chain();

        let submitted = contents.attestations.len();
        let mut attestations = contents.attestations;
        // Source message of each attestation past `submitted`.
        let mut signed_messages = Vec::new();
        for msg in &contents.messages {
            match self.sign_message(msg, dynasty) {
                Ok(Some(att)) if att.event.target_chain == local_chain => {
                    attestations.push(att);
                    signed_messages.push(msg.clone());
                }
                Ok(Some(_)) => {
                    tracing::debug!(source = msg.source_chain, "message not addressed to this chain");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        source = msg.source_chain,
                        block = msg.block_height,
                        error = %e,
                        "discarding invalid message"
                    );
                    self.metrics.attestations_rejected.inc();
                }
            }
        }

        let block = BridgeBlock {
            height,
            timestamp: current_timestamp(),
            proposer: self.keypair.as_ref().map(|kp| kp.address()).unwrap_or(ZERO_ADDRESS),
            calls: contents.calls,
            attestations,
        };

        let receipt = match engine.execute_block(&block) {
            Ok(receipt) => receipt,
            Err(e) if e.is_fatal() => {
                self.metrics.blocks_aborted.inc();
                tracing::error!(height, error = %e, "block candidate aborted");
                let (bad_calls, bad_attestations) = find_offenders(&engine, &block);
                drop(engine);

                let mut retry = BlockContents::default();
                let BridgeBlock {
                    calls,
                    attestations,
                    ..
                } = block;
                for (index, call) in calls.into_iter().enumerate() {
                    if bad_calls.contains(&index) {
                        tracing::warn!(height, index, "dropping call that aborted the block");
                    } else {
                        retry.calls.push(call);
                    }
                }
                let mut signed_messages = signed_messages.into_iter();
                for (index, att) in attestations.into_iter().enumerate() {
                    // Own votes go back as messages so they are re-signed for
                    // the dynasty of the retry block.
                    let source = (index >= submitted).then(|| signed_messages.next()).flatten();
                    if bad_attestations.contains(&index) {
                        tracing::warn!(
                            height,
                            index,
                            nonce = att.event.nonce,
                            source_chain = att.event.source_chain,
                            "dropping attestation that aborted the block"
                        );
                        continue;
                    }
                    match source {
                        Some(msg) => retry.messages.push(msg),
                        None => retry.attestations.push(att),
                    }
                }

                let mut mempool = self.mempool.lock().await;
                mempool.requeue(retry);
                self.metrics.pending_messages.set(mempool.total_size() as i64);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot = encode_snapshot(&engine)?;
        self.store.commit_block(height, &snapshot, &receipt.events)?;
        self.metrics.record_block(&receipt, engine.deferred_count());

        if let Some(id) = receipt.rotated {
            tracing::info!(height, dynasty = id, "dynasty rotated");
        }
        tracing::debug!(
            height,
            calls = receipt.applied_calls,
            attestations = receipt.accepted_attestations,
            events = receipt.events.len(),
            "block committed"
        );
        Ok(Some(receipt))
    }

    /// Attest to a watched message. `None` if this node does not validate.
    fn sign_message(
        &self,
        msg: &InterChainMessage,
        dynasty: DynastyId,
    ) -> Result<Option<Attestation>, NodeError> {
        let Some(ref kp) = self.keypair else {
            return Ok(None);
        };
        let event = parse_transfer_event(msg)?;
        validate_for_bank(&event, event.token_kind())?;
        Ok(Some(sign_event(kp, dynasty, event)))
    }

    /// Graceful shutdown.
    pub async fn shutdown(&mut self) -> Result<(), NodeError> {
        tracing::info!("Shutting down node...");

        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.watcher_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "watchers stopped with error"),
                Err(e) => tracing::warn!(error = %e, "watcher task failed"),
            }
        }

        if let Some(handle) = self.rpc_handle.take() {
            handle.stop().map_err(|e| NodeError::RpcError {
                reason: format!("failed to stop RPC server: {}", e),
            })?;
        }

        tracing::info!("Node shutdown complete");
        Ok(())
    }

    pub fn engine(&self) -> &Arc<RwLock<Engine>> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<BridgeStore<Arc<dyn KvStore>>> {
        &self.store
    }

    pub fn mempool(&self) -> &Arc<Mutex<Mempool>> {
        &self.mempool
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    /// Sender the watchers deliver into. Messages sent here are picked up by
    /// the next block.
    pub fn inbound_sender(&self) -> mpsc::Sender<InterChainMessage> {
        self.inbound_tx.clone()
    }

    pub fn validator_address(&self) -> Option<Address> {
        self.keypair.as_ref().map(|kp| kp.address())
    }
}

/// Replay an aborted block item by item on a scratch copy of the engine and
/// return the indices of the calls and attestations that hit an invariant
/// violation. If the empty block itself cannot run, every item is blamed.
fn find_offenders(engine: &Engine, block: &BridgeBlock) -> (Vec<usize>, Vec<usize>) {
    let mut trial = engine.clone();
    let empty = BridgeBlock {
        height: block.height,
        timestamp: block.timestamp,
        proposer: block.proposer,
        ..Default::default()
    };
    if let Err(e) = trial.execute_block(&empty) {
        tracing::error!(height = block.height, error = %e, "empty block cannot execute");
        return (
            (0..block.calls.len()).collect(),
            (0..block.attestations.len()).collect(),
        );
    }

    let bad_calls = block
        .calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(trial.apply_call(call), Err(e) if e.is_fatal()))
        .map(|(index, _)| index)
        .collect();
    let bad_attestations = block
        .attestations
        .iter()
        .enumerate()
        .filter(|(_, att)| {
            matches!(trial.submit_attestation(att, block.proposer), Err(e) if e.is_fatal())
        })
        .map(|(index, _)| index)
        .collect();
    (bad_calls, bad_attestations)
}

fn sign_event(
    kp: &Keypair,
    dynasty: DynastyId,
    event: CrossChainTransferEvent,
) -> Attestation {
    let signature = kp.sign(&attestation_signing_data(dynasty, &event));
    Attestation {
        validator: kp.public_key(),
        dynasty,
        event,
        signature,
    }
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use span_bridge::bank::LockRequest;
    use span_bridge::ledger::AssetLedger;
    use span_types::bridge::{Asset, TransferKind, TransferPayload, UserCall};
    use span_types::constants::{
        DEFAULT_CROSS_CHAIN_FEE, DEFAULT_MAINCHAIN_ID, DEFAULT_SUBCHAIN_ID, ONE_COIN,
    };
    use span_types::denom::{Denom, TokenKind};

    fn test_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        // Disable RPC to avoid port conflicts in tests.
        config.rpc.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_node_creation() {
        let node = Node::new(test_config()).await.unwrap();
        let engine = node.engine().read().await;
        assert_eq!(engine.height(), 0);
        assert_eq!(engine.current_dynasty().id, 1);
        assert_eq!(
            node.validator_address(),
            Some(Keypair::from_seed(&DEVNET_VALIDATOR_SEED).address())
        );
    }

    #[tokio::test]
    async fn test_node_without_validator_has_no_key() {
        let mut config = test_config();
        config.validator.enabled = false;
        let node = Node::new(config).await.unwrap();
        assert_eq!(node.validator_address(), None);
    }

    #[tokio::test]
    async fn test_invalid_seed_rejected() {
        let mut config = test_config();
        config.validator.keypair_seed = Some("not-hex".to_string());
        assert!(matches!(
            Node::new(config).await,
            Err(NodeError::ConfigError { .. })
        ));
    }

    #[tokio::test]
    async fn test_genesis_chain_mismatch_rejected() {
        let mut config = test_config();
        config.genesis_config = Some(devnet_genesis(999, 999, &[]));
        assert!(matches!(
            Node::new(config).await,
            Err(NodeError::GenesisError { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_block_advances_and_persists() {
        let mut node = Node::new(test_config()).await.unwrap();
        let receipt = node.produce_block().await.unwrap().unwrap();
        assert_eq!(receipt.height, 1);
        assert!(receipt.events.is_empty());

        node.produce_block().await.unwrap();
        assert_eq!(node.store().latest_height().unwrap(), Some(2));
        assert_eq!(node.metrics().blocks_produced.get(), 2);
        assert_eq!(node.metrics().bridge_height.get(), 2);
    }

    fn main_config() -> NodeConfig {
        let mut config = test_config();
        config.genesis_config = Some(devnet_genesis(
            DEFAULT_MAINCHAIN_ID,
            DEFAULT_MAINCHAIN_ID,
            &[DEFAULT_SUBCHAIN_ID],
        ));
        config
    }

    /// A burn on the subchain releasing mainchain coin to `receiver`.
    fn burn_message(amount: u128, nonce: u64) -> InterChainMessage {
        let payload = TransferPayload {
            denom: Denom::native(DEFAULT_MAINCHAIN_ID).to_string(),
            sender: [0xb0; 20],
            receiver: [0xa1; 20],
            amount,
            nonce,
        };
        InterChainMessage::new(
            DEFAULT_SUBCHAIN_ID,
            DEFAULT_MAINCHAIN_ID,
            TransferKind::VoucherBurn,
            7,
            [7u8; 32],
            &payload,
        )
        .unwrap()
    }

    /// A message whose payload does not decode.
    fn junk_message(block_height: u64) -> InterChainMessage {
        InterChainMessage {
            source_chain: DEFAULT_SUBCHAIN_ID,
            target_chain: DEFAULT_MAINCHAIN_ID,
            kind: TransferKind::TokenLock,
            block_height,
            tx_hash: [0u8; 32],
            payload: Vec::new(),
        }
    }

    fn lock_call(sender: Address, amount: u128) -> UserCall {
        UserCall::LockTokens {
            sender,
            target_chain: DEFAULT_SUBCHAIN_ID,
            asset: Asset::Native,
            receiver: [0xb0; 20],
            amount,
            fee: DEFAULT_CROSS_CHAIN_FEE,
        }
    }

    #[tokio::test]
    async fn test_aborted_block_keeps_innocent_items() {
        let mut node = Node::new(main_config()).await.unwrap();
        let alice = node.validator_address().unwrap();

        node.mempool()
            .lock()
            .await
            .add_call(lock_call(alice, 5 * ONE_COIN))
            .unwrap();
        // Releases more than the same-block lock puts in escrow.
        node.inbound_sender()
            .send(burn_message(6 * ONE_COIN, 1))
            .await
            .unwrap();

        assert!(node.produce_block().await.unwrap().is_none());
        assert_eq!(node.metrics().blocks_aborted.get(), 1);
        assert_eq!(node.engine().read().await.height(), 0);
        assert_eq!(node.mempool().lock().await.total_size(), 1);

        let receipt = node.produce_block().await.unwrap().unwrap();
        assert_eq!(receipt.height, 1);
        assert_eq!(receipt.applied_calls, 1);
        assert_eq!(
            node.engine().read().await.total_locked(
                TokenKind::Native,
                DEFAULT_SUBCHAIN_ID,
                &Denom::native(DEFAULT_MAINCHAIN_ID)
            ),
            5 * ONE_COIN
        );
    }

    #[tokio::test]
    async fn test_aborted_block_requeues_own_votes_as_messages() {
        let mut node = Node::new(main_config()).await.unwrap();
        let alice = node.validator_address().unwrap();
        node.mempool()
            .lock()
            .await
            .add_call(lock_call(alice, 5 * ONE_COIN))
            .unwrap();
        let sender = node.inbound_sender();
        sender.send(burn_message(2 * ONE_COIN, 1)).await.unwrap();
        sender.send(burn_message(9 * ONE_COIN, 2)).await.unwrap();

        assert!(node.produce_block().await.unwrap().is_none());
        {
            let pool = node.mempool().lock().await;
            assert_eq!(pool.message_count(), 1);
            assert_eq!(pool.total_size(), 2);
        }

        let receipt = node.produce_block().await.unwrap().unwrap();
        assert_eq!(receipt.applied_calls, 1);
        assert_eq!(receipt.finalized, 1);
        let engine = node.engine().read().await;
        assert_eq!(
            engine.max_processed_voucher_burn_nonce(TokenKind::Native, DEFAULT_SUBCHAIN_ID),
            1
        );
        assert_eq!(engine.ledger().balance_of(&[0xa1; 20], &Asset::Native), 2 * ONE_COIN);
    }

    #[tokio::test]
    async fn test_watched_message_not_crowded_out_by_calls() {
        let mut node = Node::new(main_config()).await.unwrap();
        {
            let mut pool = node.mempool().lock().await;
            // Unfunded senders: every call is rejected cheaply.
            for i in 0..MEMPOOL_CAPACITY {
                pool.add_call(lock_call([i as u8; 20], 1)).unwrap();
            }
        }
        let alice = node.validator_address().unwrap();
        node.engine()
            .write()
            .await
            .lock_tokens(&LockRequest {
                sender: alice,
                target_chain: DEFAULT_SUBCHAIN_ID,
                asset: Asset::Native,
                receiver: [0xb0; 20],
                amount: 3 * ONE_COIN,
                fee: DEFAULT_CROSS_CHAIN_FEE,
            })
            .unwrap();
        node.inbound_sender()
            .send(burn_message(ONE_COIN, 1))
            .await
            .unwrap();

        let receipt = node.produce_block().await.unwrap().unwrap();
        assert_eq!(receipt.finalized, 1);
        assert_eq!(
            node.mempool().lock().await.total_size(),
            MEMPOOL_CAPACITY - (MAX_ITEMS_PER_BLOCK - 1)
        );
    }

    #[tokio::test]
    async fn test_full_message_queue_holds_instead_of_dropping() {
        let mut node = Node::new(test_config()).await.unwrap();
        {
            let mut pool = node.mempool().lock().await;
            for i in 0..MEMPOOL_CAPACITY {
                pool.add_message(junk_message(i as u64)).unwrap();
            }
        }
        node.inbound_sender().send(burn_message(1, 1)).await.unwrap();

        node.produce_block().await.unwrap().unwrap();
        assert!(node.held_message.is_none());
        let pool = node.mempool().lock().await;
        assert_eq!(
            pool.message_count(),
            MEMPOOL_CAPACITY - MAX_ITEMS_PER_BLOCK + 1
        );
    }

    #[tokio::test]
    async fn test_shutdown_without_run() {
        let mut node = Node::new(test_config()).await.unwrap();
        assert!(node.shutdown().await.is_ok());
    }
}
