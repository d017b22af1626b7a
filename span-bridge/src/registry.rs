use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use span_types::denom::Denom;
use span_types::primitives::{format_address, Address};

use crate::error::BridgeError;
use crate::ledger::ExecutionError;

/// Bijection between foreign denoms and the voucher programs deployed for
/// them on this chain. Entries are never changed or removed once written.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DenomRegistry {
    by_denom: BTreeMap<Denom, Address>,
    by_voucher: BTreeMap<Address, Denom>,
    /// Registration order, for `denoms()` / `vouchers()` listings.
    order: Vec<Denom>,
}

impl DenomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `denom ⇄ voucher`. Re-registering the identical pair is a no-op.
    pub fn register(&mut self, denom: Denom, voucher: Address) -> Result<(), BridgeError> {
        self.check_free(&denom, &voucher)?;
        if self.by_denom.contains_key(&denom) {
            return Ok(());
        }
        self.by_denom.insert(denom.clone(), voucher);
        self.by_voucher.insert(voucher, denom.clone());
        self.order.push(denom);
        Ok(())
    }

    /// Voucher for a denom, if registered.
    pub fn lookup_by_denom(&self, denom: &Denom) -> Option<Address> {
        self.by_denom.get(denom).copied()
    }

    /// Denom behind a voucher address, if registered.
    pub fn lookup_by_address(&self, voucher: &Address) -> Option<&Denom> {
        self.by_voucher.get(voucher)
    }

    pub fn contains_denom(&self, denom: &Denom) -> bool {
        self.by_denom.contains_key(denom)
    }

    pub fn contains_voucher(&self, voucher: &Address) -> bool {
        self.by_voucher.contains_key(voucher)
    }

    /// Return the voucher for `denom`, deploying and registering one first if
    /// the denom is new. The boolean is `true` when a deployment happened.
    ///
    /// A deployed address that collides with an existing voucher is a broken
    /// bijection; nothing is registered in that case.
    pub fn resolve_or_deploy<F>(
        &mut self,
        denom: &Denom,
        deploy: F,
    ) -> Result<(Address, bool), BridgeError>
    where
        F: FnOnce(&Denom) -> Result<Address, ExecutionError>,
    {
        if let Some(existing) = self.lookup_by_denom(denom) {
            return Ok((existing, false));
        }
        let voucher = deploy(denom)?;
        if let Some(other) = self.by_voucher.get(&voucher) {
            return Err(BridgeError::BrokenBijection {
                reason: format!(
                    "deployed voucher {} for {} already backs {}",
                    format_address(&voucher),
                    denom,
                    other
                ),
            });
        }
        self.register(denom.clone(), voucher)?;
        tracing::info!(denom = %denom, voucher = %format_address(&voucher), "voucher deployed");
        Ok((voucher, true))
    }

    /// All registered denoms in registration order.
    pub fn denoms(&self) -> &[Denom] {
        &self.order
    }

    /// All voucher addresses in denom registration order.
    pub fn vouchers(&self) -> Vec<Address> {
        self.order
            .iter()
            .filter_map(|d| self.by_denom.get(d).copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Check that both directions agree entry for entry.
    pub fn verify_bijection(&self) -> Result<(), BridgeError> {
        if self.by_denom.len() != self.by_voucher.len() || self.by_denom.len() != self.order.len()
        {
            return Err(BridgeError::BrokenBijection {
                reason: format!(
                    "{} denoms, {} vouchers, {} listed",
                    self.by_denom.len(),
                    self.by_voucher.len(),
                    self.order.len()
                ),
            });
        }
        for (denom, voucher) in &self.by_denom {
            if self.by_voucher.get(voucher) != Some(denom) {
                return Err(BridgeError::BrokenBijection {
                    reason: format!("{} does not map back from its voucher", denom),
                });
            }
        }
        Ok(())
    }

    fn check_free(&self, denom: &Denom, voucher: &Address) -> Result<(), BridgeError> {
        if let Some(existing) = self.by_denom.get(denom) {
            if existing != voucher {
                return Err(BridgeError::DenomConflict {
                    reason: format!(
                        "{} already maps to {}",
                        denom,
                        format_address(existing)
                    ),
                });
            }
        }
        if let Some(existing) = self.by_voucher.get(voucher) {
            if existing != denom {
                return Err(BridgeError::DenomConflict {
                    reason: format!(
                        "{} already backs {}",
                        format_address(voucher),
                        existing
                    ),
                });
            }
        }
        Ok(())
    }
}
