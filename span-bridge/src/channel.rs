use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use span_types::primitives::{Address, Amount, ChainId};

use crate::error::BridgeError;

/// Foreign chains this chain bridges to, with their on/off switch, plus the
/// flat fee every lock and burn pays.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ChannelRegistry {
    channels: BTreeMap<ChainId, bool>,
    cross_chain_fee: Amount,
    fee_collector: Address,
}

impl ChannelRegistry {
    pub fn new(cross_chain_fee: Amount, fee_collector: Address) -> Self {
        Self {
            channels: BTreeMap::new(),
            cross_chain_fee,
            fee_collector,
        }
    }

    /// Open a channel. New channels start active; re-registering is a no-op.
    pub fn register(&mut self, chain: ChainId) {
        self.channels.entry(chain).or_insert(true);
    }

    /// Pause or resume a registered channel. Returns false if unknown.
    pub fn set_active(&mut self, chain: ChainId, active: bool) -> bool {
        match self.channels.get_mut(&chain) {
            Some(flag) => {
                *flag = active;
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, chain: ChainId) -> bool {
        self.channels.contains_key(&chain)
    }

    pub fn is_active(&self, chain: ChainId) -> bool {
        self.channels.get(&chain).copied().unwrap_or(false)
    }

    pub fn ensure_active(&self, chain: ChainId) -> Result<(), BridgeError> {
        if !self.is_active(chain) {
            return Err(BridgeError::ChannelInactive { chain });
        }
        Ok(())
    }

    pub fn cross_chain_fee(&self) -> Amount {
        self.cross_chain_fee
    }

    pub fn fee_collector(&self) -> Address {
        self.fee_collector
    }

    pub fn ensure_fee(&self, paid: Amount) -> Result<(), BridgeError> {
        if paid < self.cross_chain_fee {
            return Err(BridgeError::InsufficientFee {
                paid,
                required: self.cross_chain_fee,
            });
        }
        Ok(())
    }

    /// Registered chains with their active flag.
    pub fn channels(&self) -> impl Iterator<Item = (ChainId, bool)> + '_ {
        self.channels.iter().map(|(c, a)| (*c, *a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_toggle() {
        let mut channels = ChannelRegistry::new(10, [0xfe; 20]);
        assert!(!channels.is_active(366));
        assert!(!channels.set_active(366, true));

        channels.register(366);
        assert!(channels.is_active(366));
        assert!(channels.set_active(366, false));
        assert_eq!(
            channels.ensure_active(366).unwrap_err(),
            BridgeError::ChannelInactive { chain: 366 }
        );
        // Registering again does not silently re-open it.
        channels.register(366);
        assert!(!channels.is_active(366));
        assert!(channels.is_registered(366));
    }

    #[test]
    fn test_fee_check() {
        let channels = ChannelRegistry::new(10, [0xfe; 20]);
        assert!(channels.ensure_fee(10).is_ok());
        assert_eq!(
            channels.ensure_fee(9).unwrap_err(),
            BridgeError::InsufficientFee {
                paid: 9,
                required: 10
            }
        );
    }
}
