use std::collections::{BTreeMap, VecDeque};

use borsh::{BorshDeserialize, BorshSerialize};

use span_types::constants::DYNASTY_HISTORY;
use span_types::dynasty::Dynasty;
use span_types::primitives::*;

use crate::error::BridgeError;

/// Live stake table that dynasties are snapshotted from.
///
/// Stake updates take effect at the next rotation; the current dynasty never
/// changes underneath pending votes.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StakeTable {
    stakes: BTreeMap<Address, Amount>,
}

impl StakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a validator's stake. Zero removes it.
    pub fn set_stake(&mut self, validator: Address, stake: Amount) {
        if stake == 0 {
            self.stakes.remove(&validator);
        } else {
            self.stakes.insert(validator, stake);
        }
    }

    pub fn stake_of(&self, validator: &Address) -> Amount {
        self.stakes.get(validator).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.stakes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stakes.is_empty()
    }

    /// Freeze the table into a dynasty.
    pub fn snapshot(&self, id: DynastyId) -> Result<Dynasty, BridgeError> {
        Ok(Dynasty::new(
            id,
            self.stakes.iter().map(|(a, s)| (*a, *s)),
        )?)
    }
}

/// Current dynasty plus a bounded history, rotated on a fixed block cadence.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DynastySchedule {
    dynasty_length: u64,
    current: Dynasty,
    history: VecDeque<Dynasty>,
}

impl DynastySchedule {
    /// Start from the genesis dynasty.
    pub fn new(dynasty_length: u64, genesis: Dynasty) -> Self {
        Self {
            dynasty_length: dynasty_length.max(1),
            current: genesis,
            history: VecDeque::new(),
        }
    }

    pub fn dynasty_length(&self) -> u64 {
        self.dynasty_length
    }

    pub fn current(&self) -> &Dynasty {
        &self.current
    }

    /// Dynasty id in force at `height`.
    pub fn dynasty_for_height(&self, height: BlockHeight) -> DynastyId {
        height / self.dynasty_length + 1
    }

    /// Whether executing a block at `height` needs a newer dynasty.
    pub fn is_rotation_due(&self, height: BlockHeight) -> bool {
        self.dynasty_for_height(height) > self.current.id
    }

    /// Install the next dynasty. Ids must be consecutive.
    pub fn rotate(&mut self, next: Dynasty) -> Result<(), BridgeError> {
        let expected = self.current.id + 1;
        if next.id != expected {
            return Err(BridgeError::DynastyGap {
                expected,
                actual: next.id,
            });
        }
        tracing::info!(
            from = self.current.id,
            to = next.id,
            validators = next.len(),
            total_shares = %next.total_shares,
            "dynasty rotated"
        );
        let previous = std::mem::replace(&mut self.current, next);
        self.history.push_back(previous);
        while self.history.len() > DYNASTY_HISTORY {
            self.history.pop_front();
        }
        Ok(())
    }

    /// Look up the current or a retained past dynasty.
    pub fn get(&self, id: DynastyId) -> Option<&Dynasty> {
        if id == self.current.id {
            return Some(&self.current);
        }
        self.history.iter().find(|d| d.id == id)
    }

    /// Quorum threshold of the current dynasty.
    pub fn quorum_threshold(&self) -> Amount {
        self.current.quorum_threshold()
    }
}
