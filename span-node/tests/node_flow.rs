//! Two nodes bridging a native coin: lock on the mainchain, mint on the
//! subchain, burn back, and unlock. Messages are handed over through the
//! inbound channel the watchers normally feed.

use span_bridge::ledger::AssetLedger;
use span_bridge::message::outbound_message;
use span_crypto::keys::Keypair;
use span_node::config::NodeConfig;
use span_node::genesis::{devnet_genesis, DEVNET_VALIDATOR_SEED};
use span_node::node::Node;
use span_types::bridge::{Asset, BankEvent, UserCall};
use span_types::constants::{DEFAULT_CROSS_CHAIN_FEE, ONE_COIN};
use span_types::denom::{Denom, TokenKind};
use span_types::genesis::GenesisAllocation;
use span_types::primitives::{Address, ChainId};

const MAIN: ChainId = 366;
const SUB: ChainId = 360_777;
const BOB: Address = [0xb0; 20];

fn node_config(chain_id: ChainId, peer: ChainId) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.chain.chain_id = chain_id;
    config.chain.mainchain_id = MAIN;
    config.storage.db_type = "memory".to_string();
    config.rpc.enabled = false;
    config.watcher.enabled = false;
    config.validator.keypair_seed = Some(hex::encode(DEVNET_VALIDATOR_SEED));
    config.genesis_config = Some(devnet_genesis(chain_id, MAIN, &[peer]));
    config
}

/// Forward every lock and burn committed at `height` on `from` to `to`.
async fn relay(from: &Node, height: u64, to: &Node) -> usize {
    let source = from.engine().read().await.local_chain();
    let events = from.store().load_events(height).unwrap();
    let mut sent = 0;
    for event in &events {
        if let Some(msg) = outbound_message(source, height, event).unwrap() {
            to.inbound_sender().send(msg).await.unwrap();
            sent += 1;
        }
    }
    sent
}

#[tokio::test]
async fn test_lock_mint_burn_unlock_between_nodes() {
    let mut main = Node::new(node_config(MAIN, SUB)).await.unwrap();
    let mut sub = Node::new(node_config(SUB, MAIN)).await.unwrap();
    let alice = main.validator_address().unwrap();
    let amount = 5 * ONE_COIN;

    let start_balance = main
        .engine()
        .read()
        .await
        .ledger()
        .balance_of(&alice, &Asset::Native);

    // Lock on the mainchain.
    main.mempool()
        .lock()
        .await
        .add_call(UserCall::LockTokens {
            sender: alice,
            target_chain: SUB,
            asset: Asset::Native,
            receiver: BOB,
            amount,
            fee: DEFAULT_CROSS_CHAIN_FEE,
        })
        .unwrap();
    let receipt = main.produce_block().await.unwrap().unwrap();
    assert_eq!(receipt.applied_calls, 1);
    assert!(matches!(receipt.events[0], BankEvent::TokenLocked { .. }));
    assert_eq!(
        main.engine()
            .read()
            .await
            .total_locked(TokenKind::Native, SUB, &Denom::native(MAIN)),
        amount
    );

    // The subchain's single validator attests and the voucher is minted.
    assert_eq!(relay(&main, 1, &sub).await, 1);
    let receipt = sub.produce_block().await.unwrap().unwrap();
    assert_eq!(receipt.finalized, 1);

    let voucher = {
        let engine = sub.engine().read().await;
        let voucher = engine
            .get_voucher(TokenKind::Native, &Denom::native(MAIN))
            .unwrap();
        assert_eq!(engine.ledger().balance_of(&BOB, &Asset::Token(voucher)), amount);
        assert_eq!(engine.max_processed_token_lock_nonce(TokenKind::Native, MAIN), 1);
        voucher
    };

    // Bob needs native coin on the subchain to pay the burn fee.
    sub.engine()
        .write()
        .await
        .ledger_mut()
        .transfer(&alice, &BOB, &Asset::Native, ONE_COIN)
        .unwrap();

    // Burn part of it back to Alice.
    sub.mempool()
        .lock()
        .await
        .add_call(UserCall::BurnVouchers {
            owner: BOB,
            bank: TokenKind::Native,
            voucher,
            receiver: alice,
            amount: 2 * ONE_COIN,
            fee: DEFAULT_CROSS_CHAIN_FEE,
        })
        .unwrap();
    let receipt = sub.produce_block().await.unwrap().unwrap();
    assert_eq!(receipt.applied_calls, 1);

    assert_eq!(relay(&sub, 2, &main).await, 1);
    let receipt = main.produce_block().await.unwrap().unwrap();
    assert_eq!(receipt.finalized, 1);

    let engine = main.engine().read().await;
    assert_eq!(
        engine.ledger().balance_of(&alice, &Asset::Native),
        start_balance - amount - DEFAULT_CROSS_CHAIN_FEE + 2 * ONE_COIN
    );
    assert_eq!(
        engine.total_locked(TokenKind::Native, SUB, &Denom::native(MAIN)),
        3 * ONE_COIN
    );
    assert_eq!(engine.max_processed_voucher_burn_nonce(TokenKind::Native, SUB), 1);
}

#[tokio::test]
async fn test_replayed_message_is_not_minted_twice() {
    let mut main = Node::new(node_config(MAIN, SUB)).await.unwrap();
    let mut sub = Node::new(node_config(SUB, MAIN)).await.unwrap();
    let alice = main.validator_address().unwrap();

    main.mempool()
        .lock()
        .await
        .add_call(UserCall::LockTokens {
            sender: alice,
            target_chain: SUB,
            asset: Asset::Native,
            receiver: BOB,
            amount: ONE_COIN,
            fee: DEFAULT_CROSS_CHAIN_FEE,
        })
        .unwrap();
    main.produce_block().await.unwrap().unwrap();

    relay(&main, 1, &sub).await;
    sub.produce_block().await.unwrap().unwrap();
    relay(&main, 1, &sub).await;
    let receipt = sub.produce_block().await.unwrap().unwrap();
    assert_eq!(receipt.finalized, 0);

    let engine = sub.engine().read().await;
    let voucher = engine
        .get_voucher(TokenKind::Native, &Denom::native(MAIN))
        .unwrap();
    assert_eq!(engine.ledger().balance_of(&BOB, &Asset::Token(voucher)), ONE_COIN);
}

#[tokio::test]
async fn test_sqlite_state_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = node_config(MAIN, SUB);
    config.storage.db_type = "sqlite".to_string();
    config.storage.data_dir = tmp.path().to_str().unwrap().to_string();

    {
        let mut node = Node::new(config.clone()).await.unwrap();
        node.produce_block().await.unwrap().unwrap();
        node.produce_block().await.unwrap().unwrap();
        assert_eq!(node.store().latest_height().unwrap(), Some(2));
    }

    let mut node = Node::new(config).await.unwrap();
    assert_eq!(node.engine().read().await.height(), 2);
    let receipt = node.produce_block().await.unwrap().unwrap();
    assert_eq!(receipt.height, 3);
}

#[tokio::test]
async fn test_stake_call_changes_next_dynasty() {
    let newcomer = Keypair::from_seed(&[0x51; 32]).address();
    let mut config = node_config(MAIN, SUB);
    if let Some(genesis) = config.genesis_config.as_mut() {
        genesis.parameters.dynasty_length = 2;
        genesis.allocations.push(GenesisAllocation {
            address: newcomer,
            amount: 600 * ONE_COIN,
        });
    }
    let mut node = Node::new(config).await.unwrap();
    let alice = node.validator_address().unwrap();

    node.mempool()
        .lock()
        .await
        .add_call(UserCall::Stake {
            validator: newcomer,
            amount: 500 * ONE_COIN,
        })
        .unwrap();
    let receipt = node.produce_block().await.unwrap().unwrap();
    assert_eq!(receipt.applied_calls, 1);
    assert_eq!(receipt.rotated, None);
    assert_eq!(node.engine().read().await.current_dynasty().len(), 1);

    let receipt = node.produce_block().await.unwrap().unwrap();
    assert_eq!(receipt.rotated, Some(2));

    let engine = node.engine().read().await;
    let dynasty = engine.current_dynasty();
    assert_eq!(dynasty.id, 2);
    assert_eq!(dynasty.share_of(&newcomer), Some(500 * ONE_COIN));
    assert_eq!(dynasty.share_of(&alice), Some(1_000 * ONE_COIN));
    assert_eq!(dynasty.total_shares, 1_500 * ONE_COIN);
    // The devnet validator alone no longer reaches quorum.
    assert!(!dynasty.has_quorum(1_000 * ONE_COIN));
    assert_eq!(
        engine.ledger().balance_of(&newcomer, &Asset::Native),
        100 * ONE_COIN
    );
}
