use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::constants::{QUORUM_DENOMINATOR, QUORUM_NUMERATOR};
use crate::error::SpanError;
use crate::primitives::*;

/// Immutable snapshot of the validator set and stake shares for one epoch.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Dynasty {
    /// Epoch identifier.
    pub id: DynastyId,
    /// Stake share per validator address.
    pub shares: BTreeMap<Address, Amount>,
    /// Sum of all shares; the quorum denominator.
    pub total_shares: Amount,
}

impl Dynasty {
    /// Build a dynasty from `(address, share)` pairs. Zero shares are dropped
    /// and duplicate addresses are summed.
    pub fn new(
        id: DynastyId,
        members: impl IntoIterator<Item = (Address, Amount)>,
    ) -> Result<Self, SpanError> {
        let mut shares: BTreeMap<Address, Amount> = BTreeMap::new();
        let mut total_shares: Amount = 0;
        for (address, share) in members {
            if share == 0 {
                continue;
            }
            let entry = shares.entry(address).or_insert(0);
            *entry = entry.checked_add(share).ok_or(SpanError::BalanceOverflow)?;
            total_shares = total_shares
                .checked_add(share)
                .ok_or(SpanError::BalanceOverflow)?;
        }
        Ok(Self {
            id,
            shares,
            total_shares,
        })
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn contains(&self, validator: &Address) -> bool {
        self.shares.contains_key(validator)
    }

    /// Stake share of a validator, if it is a member.
    pub fn share_of(&self, validator: &Address) -> Option<Amount> {
        self.shares.get(validator).copied()
    }

    /// Minimum accumulated share that finalizes an event: strictly more
    /// than two thirds of the total.
    pub fn quorum_threshold(&self) -> Amount {
        let t = self.total_shares;
        let q = t / QUORUM_DENOMINATOR;
        let r = t % QUORUM_DENOMINATOR;
        q * QUORUM_NUMERATOR + (r * QUORUM_NUMERATOR) / QUORUM_DENOMINATOR + 1
    }

    /// Whether `accumulated` meets the quorum threshold.
    pub fn has_quorum(&self, accumulated: Amount) -> bool {
        accumulated >= self.quorum_threshold()
    }
}
