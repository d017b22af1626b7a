use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use span_types::bridge::{NonceKind, TransferKind};
use span_types::primitives::{ChainId, Nonce};

use crate::error::BridgeError;

/// Outbound nonce counters and inbound processing watermarks for one bank.
///
/// Counters are per counterparty chain and start at zero, so the first
/// assigned nonce is 1. Watermarks record the highest source nonce already
/// executed per (source chain, transfer kind) and only ever move up by one.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NonceLedger {
    counters: BTreeMap<(ChainId, NonceKind), Nonce>,
    watermarks: BTreeMap<(ChainId, TransferKind), Nonce>,
}

impl NonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last nonce assigned on a counter, 0 if none yet.
    pub fn current(&self, chain: ChainId, kind: NonceKind) -> Nonce {
        self.counters.get(&(chain, kind)).copied().unwrap_or(0)
    }

    /// Assign and return the next nonce on a counter.
    pub fn next_nonce(&mut self, chain: ChainId, kind: NonceKind) -> Result<Nonce, BridgeError> {
        let counter = self.counters.entry((chain, kind)).or_insert(0);
        *counter = counter.checked_add(1).ok_or_else(|| BridgeError::Overflow {
            context: format!("{kind:?} nonce for chain {chain}"),
        })?;
        Ok(*counter)
    }

    /// Highest source nonce processed on an inbound route.
    pub fn max_processed(&self, chain: ChainId, direction: TransferKind) -> Nonce {
        self.watermarks
            .get(&(chain, direction))
            .copied()
            .unwrap_or(0)
    }

    /// The only source nonce the route will accept next.
    pub fn next_expected(&self, chain: ChainId, direction: TransferKind) -> Nonce {
        self.max_processed(chain, direction).saturating_add(1)
    }

    /// Fail unless `nonce` is exactly the next expected one.
    pub fn check_next(
        &self,
        chain: ChainId,
        direction: TransferKind,
        nonce: Nonce,
    ) -> Result<(), BridgeError> {
        let expected = self.next_expected(chain, direction);
        if nonce != expected {
            return Err(BridgeError::NonceOutOfOrder {
                chain,
                expected,
                actual: nonce,
            });
        }
        Ok(())
    }

    /// Advance the watermark to `nonce`, which must be exactly one above it.
    /// Replays (at or below the watermark) and gaps are both rejected.
    pub fn mark_processed(
        &mut self,
        chain: ChainId,
        direction: TransferKind,
        nonce: Nonce,
    ) -> Result<(), BridgeError> {
        self.check_next(chain, direction, nonce)?;
        self.watermarks.insert((chain, direction), nonce);
        Ok(())
    }
}
