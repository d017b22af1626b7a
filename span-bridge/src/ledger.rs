//! Balance-moving collaborator the banks drive.
//!
//! The bridge never stores balances itself. Every coin or token movement goes
//! through an [`AssetLedger`], which stands in for the chain's execution
//! engine. [`MemoryLedger`] is the in-process implementation used by dev nodes
//! and tests.

use std::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};
use thiserror::Error;

use span_crypto::address::voucher_address;
use span_types::bridge::Asset;
use span_types::denom::Denom;
use span_types::primitives::{Address, Amount};

/// Failures reported by the execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Amount, required: Amount },

    #[error("balance overflow")]
    BalanceOverflow,

    #[error("no token program at {0:?}")]
    UnknownToken(Address),

    #[error("voucher deployment failed: {reason}")]
    DeploymentFailed { reason: String },
}

/// Balance operations the banks rely on.
pub trait AssetLedger {
    /// Current balance of `owner` in `asset`.
    fn balance_of(&self, owner: &Address, asset: &Asset) -> Amount;

    /// Move `amount` of `asset` between two accounts.
    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        asset: &Asset,
        amount: Amount,
    ) -> Result<(), ExecutionError>;

    /// Create `amount` new units of a voucher program.
    fn mint(&mut self, token: &Address, to: &Address, amount: Amount)
        -> Result<(), ExecutionError>;

    /// Destroy `amount` units of a voucher program held by `from`.
    fn burn(
        &mut self,
        token: &Address,
        from: &Address,
        amount: Amount,
    ) -> Result<(), ExecutionError>;

    /// Deploy a voucher program for `denom` and return its address.
    fn deploy_voucher(
        &mut self,
        deployer: &Address,
        denom: &Denom,
    ) -> Result<Address, ExecutionError>;

    /// Whether `balance_of(owner, asset) >= amount`.
    fn ensure_balance(
        &self,
        owner: &Address,
        asset: &Asset,
        amount: Amount,
    ) -> Result<(), ExecutionError> {
        let available = self.balance_of(owner, asset);
        if available < amount {
            return Err(ExecutionError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        Ok(())
    }
}

/// In-memory ledger: balances per (owner, asset) plus the set of deployed
/// voucher programs.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct MemoryLedger {
    balances: BTreeMap<(Address, Asset), Amount>,
    vouchers: BTreeSet<Address>,
    supply: BTreeMap<Asset, Amount>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a balance out of thin air (genesis allocations, tests).
    pub fn credit(
        &mut self,
        owner: &Address,
        asset: Asset,
        amount: Amount,
    ) -> Result<(), ExecutionError> {
        let balance = self.balances.entry((*owner, asset)).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(ExecutionError::BalanceOverflow)?;
        let supply = self.supply.entry(asset).or_insert(0);
        *supply = supply
            .checked_add(amount)
            .ok_or(ExecutionError::BalanceOverflow)?;
        Ok(())
    }

    /// Total units in circulation for an asset.
    pub fn total_supply(&self, asset: &Asset) -> Amount {
        self.supply.get(asset).copied().unwrap_or(0)
    }

    pub fn is_voucher(&self, token: &Address) -> bool {
        self.vouchers.contains(token)
    }

    fn debit(
        &mut self,
        owner: &Address,
        asset: Asset,
        amount: Amount,
    ) -> Result<(), ExecutionError> {
        let key = (*owner, asset);
        let available = self.balances.get(&key).copied().unwrap_or(0);
        let remaining = available
            .checked_sub(amount)
            .ok_or(ExecutionError::InsufficientBalance {
                available,
                required: amount,
            })?;
        if remaining == 0 {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, remaining);
        }
        Ok(())
    }
}

impl AssetLedger for MemoryLedger {
    fn balance_of(&self, owner: &Address, asset: &Asset) -> Amount {
        self.balances.get(&(*owner, *asset)).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        asset: &Asset,
        amount: Amount,
    ) -> Result<(), ExecutionError> {
        if amount == 0 || from == to {
            return self.ensure_balance(from, asset, amount);
        }
        let receiver = self.balance_of(to, asset);
        receiver
            .checked_add(amount)
            .ok_or(ExecutionError::BalanceOverflow)?;
        self.debit(from, *asset, amount)?;
        *self.balances.entry((*to, *asset)).or_insert(0) += amount;
        Ok(())
    }

    fn mint(
        &mut self,
        token: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), ExecutionError> {
        if !self.vouchers.contains(token) {
            return Err(ExecutionError::UnknownToken(*token));
        }
        self.credit(to, Asset::Token(*token), amount)
    }

    fn burn(
        &mut self,
        token: &Address,
        from: &Address,
        amount: Amount,
    ) -> Result<(), ExecutionError> {
        if !self.vouchers.contains(token) {
            return Err(ExecutionError::UnknownToken(*token));
        }
        let asset = Asset::Token(*token);
        self.debit(from, asset, amount)?;
        if let Some(supply) = self.supply.get_mut(&asset) {
            *supply = supply.saturating_sub(amount);
        }
        Ok(())
    }

    fn deploy_voucher(
        &mut self,
        deployer: &Address,
        denom: &Denom,
    ) -> Result<Address, ExecutionError> {
        let address = voucher_address(deployer, denom);
        if !self.vouchers.insert(address) {
            return Err(ExecutionError::DeploymentFailed {
                reason: format!("program already deployed for {denom}"),
            });
        }
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [1u8; 20];
    const BOB: Address = [2u8; 20];

    #[test]
    fn test_transfer_moves_balance() {
        let mut ledger = MemoryLedger::new();
        ledger.credit(&ALICE, Asset::Native, 100).unwrap();
        ledger.transfer(&ALICE, &BOB, &Asset::Native, 40).unwrap();
        assert_eq!(ledger.balance_of(&ALICE, &Asset::Native), 60);
        assert_eq!(ledger.balance_of(&BOB, &Asset::Native), 40);
        assert_eq!(ledger.total_supply(&Asset::Native), 100);
    }

    #[test]
    fn test_transfer_insufficient_leaves_balances() {
        let mut ledger = MemoryLedger::new();
        ledger.credit(&ALICE, Asset::Native, 10).unwrap();
        let err = ledger
            .transfer(&ALICE, &BOB, &Asset::Native, 11)
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::InsufficientBalance {
                available: 10,
                required: 11
            }
        );
        assert_eq!(ledger.balance_of(&ALICE, &Asset::Native), 10);
        assert_eq!(ledger.balance_of(&BOB, &Asset::Native), 0);
    }

    #[test]
    fn test_mint_and_burn_require_deployed_voucher() {
        let mut ledger = MemoryLedger::new();
        let denom = Denom::native(366);
        assert!(ledger.mint(&[9u8; 20], &ALICE, 1).is_err());

        let voucher = ledger.deploy_voucher(&[7u8; 20], &denom).unwrap();
        assert!(ledger.is_voucher(&voucher));
        ledger.mint(&voucher, &ALICE, 50).unwrap();
        ledger.burn(&voucher, &ALICE, 20).unwrap();
        assert_eq!(ledger.balance_of(&ALICE, &Asset::Token(voucher)), 30);
        assert_eq!(ledger.total_supply(&Asset::Token(voucher)), 30);
    }

    #[test]
    fn test_double_deploy_fails() {
        let mut ledger = MemoryLedger::new();
        let denom = Denom::native(366);
        ledger.deploy_voucher(&[7u8; 20], &denom).unwrap();
        assert!(matches!(
            ledger.deploy_voucher(&[7u8; 20], &denom),
            Err(ExecutionError::DeploymentFailed { .. })
        ));
    }
}
