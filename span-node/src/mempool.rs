use std::collections::HashSet;

use span_bridge::message::event_digest;
use span_types::bridge::{Attestation, InterChainMessage, UserCall};
use span_types::primitives::{Hash, PublicKey};

use crate::error::NodeError;

/// Items drained from the mempool for one block.
#[derive(Debug, Clone, Default)]
pub struct BlockContents {
    pub calls: Vec<UserCall>,
    pub attestations: Vec<Attestation>,
    /// Foreign messages this node still has to sign.
    pub messages: Vec<InterChainMessage>,
}

impl BlockContents {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.attestations.is_empty() && self.messages.is_empty()
    }
}

/// Pending user calls, externally submitted attestations, and watched
/// messages waiting for the next block.
///
/// Watched messages have their own queue of `max_size` slots, so a flood of
/// submitted calls cannot crowd them out.
pub struct Mempool {
    calls: Vec<UserCall>,
    attestations: Vec<Attestation>,
    /// (validator, event digest) pairs already queued.
    seen_votes: HashSet<(PublicKey, Hash)>,
    messages: Vec<InterChainMessage>,
    /// Capacity of the submission queue and, separately, of the message queue.
    max_size: usize,
}

impl Mempool {
    /// Create a new mempool with the given capacity.
    pub fn new(max_size: usize) -> Self {
        Self {
            calls: Vec::new(),
            attestations: Vec::new(),
            seen_votes: HashSet::new(),
            messages: Vec::new(),
            max_size,
        }
    }

    /// Total number of items in the mempool.
    pub fn total_size(&self) -> usize {
        self.calls.len() + self.attestations.len() + self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_size() == 0
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Queue a user call.
    pub fn add_call(&mut self, call: UserCall) -> Result<(), NodeError> {
        self.ensure_room()?;
        self.calls.push(call);
        Ok(())
    }

    /// Queue an attestation. A second vote from the same validator on the same
    /// event is dropped here rather than rejected later by the quorum ledger.
    pub fn add_attestation(&mut self, attestation: Attestation) -> Result<bool, NodeError> {
        let key = (attestation.validator, event_digest(&attestation.event));
        if self.seen_votes.contains(&key) {
            return Ok(false);
        }
        self.ensure_room()?;
        self.seen_votes.insert(key);
        self.attestations.push(attestation);
        Ok(true)
    }

    /// Queue a message delivered by a chain watcher.
    pub fn add_message(&mut self, message: InterChainMessage) -> Result<(), NodeError> {
        if self.messages.len() >= self.max_size {
            return Err(NodeError::MempoolFull {
                capacity: self.max_size,
            });
        }
        self.messages.push(message);
        Ok(())
    }

    /// Drain up to `max_items` items, messages first, then attestations, then
    /// calls. Whatever does not fit stays queued in order.
    pub fn drain_for_block(&mut self, max_items: usize) -> BlockContents {
        let mut budget = max_items;
        let messages = take_front(&mut self.messages, &mut budget);
        let attestations = take_front(&mut self.attestations, &mut budget);
        let calls = take_front(&mut self.calls, &mut budget);
        for att in &attestations {
            self.seen_votes
                .remove(&(att.validator, event_digest(&att.event)));
        }
        BlockContents {
            calls,
            attestations,
            messages,
        }
    }

    /// Put items from an aborted block back at the front of their queues, in
    /// their original order. Capacity is not checked; they were admitted once.
    pub fn requeue(&mut self, contents: BlockContents) {
        for att in &contents.attestations {
            self.seen_votes
                .insert((att.validator, event_digest(&att.event)));
        }
        self.calls.splice(0..0, contents.calls);
        self.attestations.splice(0..0, contents.attestations);
        self.messages.splice(0..0, contents.messages);
    }

    fn ensure_room(&self) -> Result<(), NodeError> {
        if self.calls.len() + self.attestations.len() >= self.max_size {
            return Err(NodeError::MempoolFull {
                capacity: self.max_size,
            });
        }
        Ok(())
    }
}

fn take_front<T>(items: &mut Vec<T>, budget: &mut usize) -> Vec<T> {
    let n = items.len().min(*budget);
    *budget -= n;
    items.drain(..n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use span_types::bridge::{Asset, CrossChainTransferEvent, TransferKind};
    use span_types::denom::Denom;

    fn call(amount: u128) -> UserCall {
        UserCall::LockTokens {
            sender: [1u8; 20],
            target_chain: 360_777,
            asset: Asset::Native,
            receiver: [2u8; 20],
            amount,
            fee: 10,
        }
    }

    fn attestation(validator: u8, nonce: u64) -> Attestation {
        Attestation {
            validator: [validator; 32],
            dynasty: 1,
            event: CrossChainTransferEvent {
                kind: TransferKind::TokenLock,
                source_chain: 360_777,
                target_chain: 366,
                denom: Denom::native(360_777),
                sender: [3u8; 20],
                receiver: [4u8; 20],
                amount: 5,
                nonce,
            },
            signature: [0u8; 64],
        }
    }

    fn message(nonce: u64) -> InterChainMessage {
        InterChainMessage {
            source_chain: 360_777,
            target_chain: 366,
            kind: TransferKind::TokenLock,
            block_height: nonce,
            tx_hash: [nonce as u8; 32],
            payload: vec![nonce as u8],
        }
    }

    #[test]
    fn test_capacity_enforced() {
        let mut pool = Mempool::new(2);
        pool.add_call(call(1)).unwrap();
        pool.add_call(call(2)).unwrap();
        assert!(matches!(
            pool.add_call(call(3)),
            Err(NodeError::MempoolFull { capacity: 2 })
        ));
    }

    #[test]
    fn test_messages_have_their_own_capacity() {
        let mut pool = Mempool::new(2);
        pool.add_call(call(1)).unwrap();
        pool.add_attestation(attestation(1, 1)).unwrap();
        assert!(pool.add_call(call(2)).is_err());

        pool.add_message(message(1)).unwrap();
        pool.add_message(message(2)).unwrap();
        assert!(matches!(
            pool.add_message(message(3)),
            Err(NodeError::MempoolFull { capacity: 2 })
        ));
        // Draining a message frees a message slot only.
        pool.drain_for_block(1);
        assert_eq!(pool.message_count(), 1);
        assert!(pool.add_call(call(3)).is_err());
        pool.add_message(message(3)).unwrap();
    }

    #[test]
    fn test_requeue_restores_order_and_votes() {
        let mut pool = Mempool::new(4);
        pool.add_call(call(1)).unwrap();
        pool.add_attestation(attestation(1, 1)).unwrap();
        pool.add_message(message(1)).unwrap();
        let drained = pool.drain_for_block(10);
        assert!(pool.is_empty());

        pool.add_call(call(2)).unwrap();
        pool.add_call(call(3)).unwrap();
        pool.add_call(call(4)).unwrap();
        pool.requeue(drained);
        assert_eq!(pool.total_size(), 6);
        // The requeued vote is known again.
        assert!(!pool.add_attestation(attestation(1, 1)).unwrap());

        let next = pool.drain_for_block(10);
        assert_eq!(next.calls, vec![call(1), call(2), call(3), call(4)]);
        assert_eq!(next.messages, vec![message(1)]);
    }

    #[test]
    fn test_duplicate_vote_dropped() {
        let mut pool = Mempool::new(10);
        assert!(pool.add_attestation(attestation(1, 1)).unwrap());
        assert!(!pool.add_attestation(attestation(1, 1)).unwrap());
        assert!(pool.add_attestation(attestation(2, 1)).unwrap());
        assert_eq!(pool.total_size(), 2);
    }

    #[test]
    fn test_drain_respects_budget_and_order() {
        let mut pool = Mempool::new(10);
        pool.add_call(call(1)).unwrap();
        pool.add_call(call(2)).unwrap();
        pool.add_attestation(attestation(1, 1)).unwrap();

        pool.add_message(message(1)).unwrap();

        let first = pool.drain_for_block(2);
        assert_eq!(first.messages, vec![message(1)]);
        assert_eq!(first.attestations.len(), 1);
        assert!(first.calls.is_empty());

        let second = pool.drain_for_block(10);
        assert_eq!(second.calls, vec![call(1), call(2)]);
        assert!(pool.is_empty());

        // Once drained, the same vote can be queued again.
        assert!(pool.add_attestation(attestation(1, 1)).unwrap());
    }
}
