use std::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};

use span_types::bridge::{CrossChainTransferEvent, TransferKind};
use span_types::denom::TokenKind;
use span_types::dynasty::Dynasty;
use span_types::primitives::*;

use crate::error::BridgeError;
use crate::message::event_digest;

const ATTESTATION_DOMAIN: &[u8] = b"span:attestation:v1";

/// Identity of an attested event.
///
/// Two events with the same route and nonce but different contents get
/// different keys, so a forged event never borrows votes from the real one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct EventKey {
    pub bank: TokenKind,
    pub direction: TransferKind,
    pub source_chain: ChainId,
    pub nonce: Nonce,
    pub digest: Hash,
}

impl EventKey {
    pub fn for_event(event: &CrossChainTransferEvent) -> Self {
        Self {
            bank: event.denom.kind,
            direction: event.kind,
            source_chain: event.source_chain,
            nonce: event.nonce,
            digest: event_digest(event),
        }
    }
}

/// Tally for one event key.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct VotingRecord {
    /// Dynasty whose shares weight the votes.
    pub dynasty: DynastyId,
    pub accumulated_shares: Amount,
    pub voted: BTreeSet<Address>,
    pub finalized: bool,
}

impl VotingRecord {
    fn new(dynasty: DynastyId) -> Self {
        Self {
            dynasty,
            accumulated_shares: 0,
            voted: BTreeSet::new(),
            finalized: false,
        }
    }
}

/// Result of a counted vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestOutcome {
    /// Below quorum.
    Pending {
        accumulated: Amount,
        threshold: Amount,
    },
    /// This vote crossed the threshold. Returned exactly once per key.
    Finalized,
}

/// Stake-weighted vote ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QuorumLedger {
    records: BTreeMap<EventKey, VotingRecord>,
}

impl QuorumLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `validator`'s vote for `key` under `dynasty`.
    ///
    /// The share comes from the dynasty snapshot. A pending record opened
    /// under an older dynasty is restarted under `dynasty` and earlier votes
    /// must be cast again. Finalized records never change.
    pub fn attest(
        &mut self,
        validator: &Address,
        dynasty: &Dynasty,
        key: EventKey,
    ) -> Result<AttestOutcome, BridgeError> {
        let share = dynasty
            .share_of(validator)
            .ok_or(BridgeError::UnknownValidator {
                validator: *validator,
                dynasty: dynasty.id,
            })?;

        let record = self
            .records
            .entry(key)
            .or_insert_with(|| VotingRecord::new(dynasty.id));

        if record.finalized {
            return Err(BridgeError::AlreadyFinalized);
        }
        if record.dynasty > dynasty.id {
            return Err(BridgeError::StaleDynasty {
                attested: dynasty.id,
                current: record.dynasty,
            });
        }
        if record.dynasty < dynasty.id {
            tracing::debug!(
                nonce = key.nonce,
                source_chain = key.source_chain,
                old = record.dynasty,
                new = dynasty.id,
                dropped = record.voted.len(),
                "voting record restarted under new dynasty"
            );
            *record = VotingRecord::new(dynasty.id);
        }
        if record.voted.contains(validator) {
            return Err(BridgeError::AlreadyVoted {
                validator: *validator,
            });
        }

        record.accumulated_shares =
            record
                .accumulated_shares
                .checked_add(share)
                .ok_or_else(|| BridgeError::Overflow {
                    context: "accumulated shares".to_string(),
                })?;
        record.voted.insert(*validator);

        if dynasty.has_quorum(record.accumulated_shares) {
            record.finalized = true;
            Ok(AttestOutcome::Finalized)
        } else {
            Ok(AttestOutcome::Pending {
                accumulated: record.accumulated_shares,
                threshold: dynasty.quorum_threshold(),
            })
        }
    }

    pub fn record(&self, key: &EventKey) -> Option<&VotingRecord> {
        self.records.get(key)
    }

    /// Put back a record captured before a vote whose execution failed.
    pub fn reinstate(&mut self, key: EventKey, prior: Option<VotingRecord>) {
        match prior {
            Some(record) => {
                self.records.insert(key, record);
            }
            None => {
                self.records.remove(&key);
            }
        }
    }

    /// `(dynasty, accumulated_shares)` for a route and nonce, across all
    /// digests seen for it. Finalized records sort first.
    pub fn records_for(
        &self,
        bank: TokenKind,
        direction: TransferKind,
        source_chain: ChainId,
        nonce: Nonce,
    ) -> Vec<(&EventKey, &VotingRecord)> {
        let mut out: Vec<_> = self
            .records
            .iter()
            .filter(|(k, _)| {
                k.bank == bank
                    && k.direction == direction
                    && k.source_chain == source_chain
                    && k.nonce == nonce
            })
            .collect();
        out.sort_by_key(|(_, r)| !r.finalized);
        out
    }

    /// Remove records on a route at or below `watermark`.
    ///
    /// Records that never finalized can no longer do so and all go. Finalized
    /// records are kept for the last `retain` nonces. Returns how many were
    /// removed.
    pub fn prune(
        &mut self,
        bank: TokenKind,
        direction: TransferKind,
        source_chain: ChainId,
        watermark: Nonce,
        retain: u64,
    ) -> usize {
        let start = EventKey {
            bank,
            direction,
            source_chain,
            nonce: 0,
            digest: [0u8; 32],
        };
        let end = EventKey {
            nonce: watermark,
            digest: [0xff; 32],
            ..start
        };
        let keep_from = watermark.saturating_sub(retain);
        let stale: Vec<EventKey> = self
            .records
            .range(start..=end)
            .filter(|(k, r)| !r.finalized || k.nonce <= keep_from)
            .map(|(k, _)| *k)
            .collect();
        for key in &stale {
            self.records.remove(key);
        }
        stale.len()
    }

    /// Records that have not reached quorum.
    pub fn pending_count(&self) -> usize {
        self.records.values().filter(|r| !r.finalized).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Bytes a validator signs to attest to `event` under `dynasty`.
pub fn attestation_signing_data(dynasty: DynastyId, event: &CrossChainTransferEvent) -> Vec<u8> {
    let mut data = Vec::with_capacity(ATTESTATION_DOMAIN.len() + 8 + 32);
    data.extend_from_slice(ATTESTATION_DOMAIN);
    data.extend_from_slice(&dynasty.to_le_bytes());
    data.extend_from_slice(&event_digest(event));
    data
}
