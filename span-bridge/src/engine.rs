use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use rayon::prelude::*;

use span_crypto::address::{pubkey_to_address, staking_escrow_address};
use span_crypto::keys::{batch_verify, verify};
use span_types::bridge::{
    Asset, Attestation, BankEvent, BridgeBlock, BurnRecord, CrossChainTransferEvent, LockRecord,
    TransferKind, UserCall,
};
use span_types::constants::{FINALIZED_VOTE_RETENTION, MAX_ITEMS_PER_BLOCK};
use span_types::denom::{Denom, TokenKind};
use span_types::dynasty::Dynasty;
use span_types::genesis::GenesisConfig;
use span_types::primitives::*;

use crate::attestation::{attestation_signing_data, AttestOutcome, EventKey, QuorumLedger};
use crate::bank::{BurnRequest, LockRequest, TokenBank};
use crate::channel::ChannelRegistry;
use crate::dynasty::{DynastySchedule, StakeTable};
use crate::error::BridgeError;
use crate::ledger::AssetLedger;
use crate::message::validate_for_bank;
use crate::proxy::build_proxy_transaction;

/// Chain-level parameters the engine is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub local_chain: ChainId,
    pub mainchain_id: ChainId,
    pub dynasty_length: u64,
    pub cross_chain_fee: Amount,
    pub fee_collector: Address,
    /// Foreign chains with an open channel at start.
    pub channels: Vec<ChainId>,
}

impl EngineParams {
    pub fn from_genesis(genesis: &GenesisConfig) -> Self {
        Self {
            local_chain: genesis.chain_id,
            mainchain_id: genesis.mainchain_id,
            dynasty_length: genesis.parameters.dynasty_length,
            cross_chain_fee: genesis.parameters.cross_chain_fee,
            fee_collector: genesis.parameters.fee_collector,
            channels: genesis.parameters.channels.clone(),
        }
    }
}

/// A finalized event position: bank, direction, source chain and nonce.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct RouteNonce {
    pub bank: TokenKind,
    pub direction: TransferKind,
    pub source_chain: ChainId,
    pub nonce: Nonce,
}

impl RouteNonce {
    fn for_event(event: &CrossChainTransferEvent) -> Self {
        Self {
            bank: event.denom.kind,
            direction: event.kind,
            source_chain: event.source_chain,
            nonce: event.nonce,
        }
    }
}

/// A finalized event waiting for its predecessor to execute.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DeferredEvent {
    pub event: CrossChainTransferEvent,
    pub dynasty: DynastyId,
}

/// What happened to an accepted attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationResult {
    /// Counted, still below quorum.
    Pending {
        accumulated: Amount,
        threshold: Amount,
    },
    /// Reached quorum and executed. `drained` counts deferred successors
    /// executed right after it.
    Executed { event: BankEvent, drained: usize },
    /// Reached quorum ahead of its predecessor; parked until `expected`
    /// executes.
    Deferred { expected: Nonce },
}

/// Position of an item inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockItem {
    Call(usize),
    Attestation(usize),
}

/// A block item that was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub item: BlockItem,
    pub error: BridgeError,
}

/// Summary of an executed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReceipt {
    pub height: BlockHeight,
    pub dynasty: DynastyId,
    /// New dynasty id if this block rotated.
    pub rotated: Option<DynastyId>,
    pub applied_calls: usize,
    pub accepted_attestations: usize,
    /// Events that reached quorum in this block.
    pub finalized: usize,
    /// Proxy transactions executed, including drained deferrals.
    pub executed: usize,
    pub deferred: usize,
    pub rejections: Vec<Rejection>,
    /// Bank events in execution order.
    pub events: Vec<BankEvent>,
}

impl BlockReceipt {
    fn new(height: BlockHeight, dynasty: DynastyId, rotated: Option<DynastyId>) -> Self {
        Self {
            height,
            dynasty,
            rotated,
            applied_calls: 0,
            accepted_attestations: 0,
            finalized: 0,
            executed: 0,
            deferred: 0,
            rejections: Vec::new(),
            events: Vec::new(),
        }
    }

    fn count(&mut self, result: &AttestationResult) {
        self.accepted_attestations += 1;
        match result {
            AttestationResult::Pending { .. } => {}
            AttestationResult::Executed { drained, .. } => {
                self.finalized += 1;
                self.executed += 1 + drained;
            }
            AttestationResult::Deferred { .. } => {
                self.finalized += 1;
                self.deferred += 1;
            }
        }
    }

    /// Record a skipped item, or hand back an invariant violation so the
    /// caller can abort the block.
    fn reject(&mut self, item: BlockItem, error: BridgeError) -> Result<(), BridgeError> {
        if error.is_fatal() {
            tracing::error!(height = self.height, ?item, error = %error, "invariant violated, block aborted");
            return Err(error);
        }
        tracing::debug!(height = self.height, ?item, error = %error, "block item rejected");
        self.rejections.push(Rejection { item, error });
        Ok(())
    }
}

/// All bridge state except balances. Borsh-encodable for persistence.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct EngineState {
    height: BlockHeight,
    local_chain: ChainId,
    native: TokenBank,
    fungible: TokenBank,
    channels: ChannelRegistry,
    dynasties: DynastySchedule,
    stakes: StakeTable,
    quorum: QuorumLedger,
    deferred: BTreeMap<RouteNonce, DeferredEvent>,
}

impl EngineState {
    fn new(params: &EngineParams, stakes: StakeTable, genesis: Dynasty) -> Self {
        let mut channels = ChannelRegistry::new(params.cross_chain_fee, params.fee_collector);
        for chain in &params.channels {
            if *chain != params.local_chain {
                channels.register(*chain);
            }
        }
        Self {
            height: 0,
            local_chain: params.local_chain,
            native: TokenBank::new(TokenKind::Native, params.local_chain, params.mainchain_id),
            fungible: TokenBank::new(TokenKind::Fungible, params.local_chain, params.mainchain_id),
            channels,
            dynasties: DynastySchedule::new(params.dynasty_length, genesis),
            stakes,
            quorum: QuorumLedger::new(),
            deferred: BTreeMap::new(),
        }
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    fn bank(&self, kind: TokenKind) -> &TokenBank {
        match kind {
            TokenKind::Native => &self.native,
            TokenKind::Fungible => &self.fungible,
        }
    }

    fn bank_mut(&mut self, kind: TokenKind) -> &mut TokenBank {
        match kind {
            TokenKind::Native => &mut self.native,
            TokenKind::Fungible => &mut self.fungible,
        }
    }

    fn bank_and_channels(&mut self, kind: TokenKind) -> (&mut TokenBank, &ChannelRegistry) {
        let bank = match kind {
            TokenKind::Native => &mut self.native,
            TokenKind::Fungible => &mut self.fungible,
        };
        (bank, &self.channels)
    }

    fn drain_events(&mut self) -> Vec<BankEvent> {
        let mut events = self.native.take_events();
        events.extend(self.fungible.take_events());
        events
    }

    // ─── User Calls ──────────────────────────────────────────────────────────

    fn lock<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        req: &LockRequest,
    ) -> Result<LockRecord, BridgeError> {
        let kind = match req.asset {
            Asset::Native => TokenKind::Native,
            Asset::Token(token) => {
                // Native-coin vouchers are tokens too, but live in the native bank.
                if self.native.exists_voucher(&token) {
                    return Err(BridgeError::VoucherNotLockable { voucher: token });
                }
                TokenKind::Fungible
            }
        };
        let (bank, channels) = self.bank_and_channels(kind);
        let record = bank.lock_tokens(ledger, channels, req)?;
        tracing::info!(
            bank = %kind,
            target_chain = req.target_chain,
            nonce = record.nonce,
            amount = %record.amount,
            "tokens locked"
        );
        Ok(record)
    }

    fn burn<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        kind: TokenKind,
        req: &BurnRequest,
    ) -> Result<BurnRecord, BridgeError> {
        let (bank, channels) = self.bank_and_channels(kind);
        let record = bank.burn_vouchers(ledger, channels, req)?;
        tracing::info!(
            bank = %kind,
            target_chain = record.chain_id,
            nonce = record.nonce,
            amount = %record.amount,
            "vouchers burned"
        );
        Ok(record)
    }

    fn apply_call<L: AssetLedger>(&mut self, ledger: &mut L, call: &UserCall) -> Result<(), BridgeError> {
        match call {
            UserCall::LockTokens {
                sender,
                target_chain,
                asset,
                receiver,
                amount,
                fee,
            } => {
                let req = LockRequest {
                    sender: *sender,
                    target_chain: *target_chain,
                    asset: *asset,
                    receiver: *receiver,
                    amount: *amount,
                    fee: *fee,
                };
                self.lock(ledger, &req).map(|_| ())
            }
            UserCall::BurnVouchers {
                owner,
                bank,
                voucher,
                receiver,
                amount,
                fee,
            } => {
                let req = BurnRequest {
                    owner: *owner,
                    voucher: *voucher,
                    receiver: *receiver,
                    amount: *amount,
                    fee: *fee,
                };
                self.burn(ledger, *bank, &req).map(|_| ())
            }
            UserCall::Stake { validator, amount } => self.stake(ledger, *validator, *amount),
            UserCall::Unstake { validator, amount } => self.unstake(ledger, *validator, *amount),
            UserCall::SetChannel { chain, active } => self.set_channel(*chain, *active),
        }
    }

    /// Bond native coin into the staking escrow.
    fn stake<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        validator: Address,
        amount: Amount,
    ) -> Result<(), BridgeError> {
        if amount == 0 {
            return Err(BridgeError::InvalidAmount);
        }
        let staked = self.stakes.stake_of(&validator);
        let total = staked.checked_add(amount).ok_or_else(|| BridgeError::Overflow {
            context: "validator stake".to_string(),
        })?;
        let escrow = staking_escrow_address(self.local_chain);
        ledger.transfer(&validator, &escrow, &Asset::Native, amount)?;
        self.stakes.set_stake(validator, total);
        tracing::info!(validator = %format_address(&validator), stake = %total, "stake bonded");
        Ok(())
    }

    fn unstake<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        validator: Address,
        amount: Amount,
    ) -> Result<(), BridgeError> {
        if amount == 0 {
            return Err(BridgeError::InvalidAmount);
        }
        let staked = self.stakes.stake_of(&validator);
        if amount > staked {
            return Err(BridgeError::InsufficientStake {
                validator,
                staked,
                requested: amount,
            });
        }
        let escrow = staking_escrow_address(self.local_chain);
        ledger.transfer(&escrow, &validator, &Asset::Native, amount)?;
        self.stakes.set_stake(validator, staked - amount);
        tracing::info!(
            validator = %format_address(&validator),
            stake = %(staked - amount),
            "stake withdrawn"
        );
        Ok(())
    }

    /// Opening an unknown channel registers it. Closing one requires it to exist.
    fn set_channel(&mut self, chain: ChainId, active: bool) -> Result<(), BridgeError> {
        if chain == self.local_chain {
            return Err(BridgeError::InvalidMessage {
                reason: format!("chain {chain} is the local chain"),
            });
        }
        if !self.channels.is_registered(chain) {
            if !active {
                return Err(BridgeError::ChannelInactive { chain });
            }
            self.channels.register(chain);
        } else {
            self.channels.set_active(chain, active);
        }
        tracing::info!(chain, active, "channel updated");
        Ok(())
    }

    // ─── Attestations ────────────────────────────────────────────────────────

    /// Count a signature-checked attestation and execute the event once it
    /// reaches quorum.
    fn apply_attestation<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        att: &Attestation,
        proposer: Address,
    ) -> Result<AttestationResult, BridgeError> {
        let event = &att.event;

        // 1. The event must be addressed to this chain.
        if event.target_chain != self.local_chain {
            return Err(BridgeError::WrongChain {
                expected: self.local_chain,
                actual: event.target_chain,
            });
        }

        // 2. Votes are only accepted under the current dynasty.
        let current = self.dynasties.current().id;
        if att.dynasty < current {
            return Err(BridgeError::StaleDynasty {
                attested: att.dynasty,
                current,
            });
        }
        if att.dynasty > current {
            return Err(BridgeError::InvalidMessage {
                reason: format!("attestation names future dynasty {}", att.dynasty),
            });
        }

        // 3. Event shape for its bank.
        let kind = event.token_kind();
        validate_for_bank(event, kind)?;

        // 4. Already-executed nonces can never be voted in again.
        let processed = self
            .bank(kind)
            .nonces()
            .max_processed(event.source_chain, event.kind);
        if event.nonce <= processed {
            let executed = self
                .quorum
                .record(&EventKey::for_event(event))
                .is_some_and(|r| r.finalized);
            if executed {
                return Err(BridgeError::AlreadyFinalized);
            }
            return Err(BridgeError::NonceOutOfOrder {
                chain: event.source_chain,
                expected: processed.saturating_add(1),
                actual: event.nonce,
            });
        }

        // 5. Vote.
        let validator = pubkey_to_address(&att.validator);
        let key = EventKey::for_event(event);
        let prior = self.quorum.record(&key).cloned();
        match self
            .quorum
            .attest(&validator, self.dynasties.current(), key)?
        {
            AttestOutcome::Pending {
                accumulated,
                threshold,
            } => {
                return Ok(AttestationResult::Pending {
                    accumulated,
                    threshold,
                })
            }
            AttestOutcome::Finalized => {}
        }
        tracing::info!(
            bank = %kind,
            direction = ?event.kind,
            source_chain = event.source_chain,
            nonce = event.nonce,
            dynasty = att.dynasty,
            "event finalized"
        );

        // 6. Execute; a failed execution un-counts the deciding vote.
        match self.execute_finalized(ledger, event, att.dynasty, proposer) {
            Ok(result) => {
                if matches!(result, AttestationResult::Executed { .. }) {
                    self.prune_votes(kind, event.kind, event.source_chain);
                }
                Ok(result)
            }
            Err(err) => {
                self.quorum.reinstate(key, prior);
                Err(err)
            }
        }
    }

    /// Drop voting records the route's watermark has made unreachable.
    fn prune_votes(&mut self, bank: TokenKind, direction: TransferKind, source_chain: ChainId) {
        let watermark = self
            .bank(bank)
            .nonces()
            .max_processed(source_chain, direction);
        let pruned = self.quorum.prune(
            bank,
            direction,
            source_chain,
            watermark,
            FINALIZED_VOTE_RETENTION,
        );
        if pruned > 0 {
            tracing::debug!(bank = %bank, source_chain, watermark, pruned, "voting records pruned");
        }
    }

    fn execute_finalized<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        event: &CrossChainTransferEvent,
        dynasty: DynastyId,
        proposer: Address,
    ) -> Result<AttestationResult, BridgeError> {
        let route = RouteNonce::for_event(event);
        let tx = build_proxy_transaction(event, route.bank, dynasty, proposer)?;
        match self.bank_mut(route.bank).execute(ledger, &tx) {
            Ok(executed) => {
                let drained = self.drain_deferred(ledger, route, proposer)?;
                Ok(AttestationResult::Executed {
                    event: executed,
                    drained,
                })
            }
            Err(BridgeError::NonceOutOfOrder {
                expected, actual, ..
            }) if actual > expected => {
                if self.deferred.contains_key(&route) {
                    return Err(BridgeError::AlreadyFinalized);
                }
                self.deferred.insert(
                    route,
                    DeferredEvent {
                        event: event.clone(),
                        dynasty,
                    },
                );
                tracing::info!(
                    bank = %route.bank,
                    source_chain = route.source_chain,
                    nonce = actual,
                    waiting_for = expected,
                    "finalized event deferred"
                );
                Ok(AttestationResult::Deferred { expected })
            }
            Err(err) => Err(err),
        }
    }

    /// Execute parked successors of `route` in nonce order.
    fn drain_deferred<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        mut route: RouteNonce,
        proposer: Address,
    ) -> Result<usize, BridgeError> {
        let mut drained = 0;
        loop {
            let Some(next) = route.nonce.checked_add(1) else {
                break;
            };
            route.nonce = next;
            let Some(parked) = self.deferred.remove(&route) else {
                break;
            };
            let tx = build_proxy_transaction(&parked.event, route.bank, parked.dynasty, proposer)?;
            match self.bank_mut(route.bank).execute(ledger, &tx) {
                Ok(_) => drained += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    // Reopen the vote so the event can be finalized again.
                    self.quorum
                        .reinstate(EventKey::for_event(&parked.event), None);
                    tracing::warn!(
                        bank = %route.bank,
                        source_chain = route.source_chain,
                        nonce = route.nonce,
                        error = %err,
                        "deferred event failed, voting record reset"
                    );
                    break;
                }
            }
        }
        Ok(drained)
    }

    // ─── Dynasty ─────────────────────────────────────────────────────────────

    fn rotate_if_due(&mut self, height: BlockHeight) -> Result<Option<DynastyId>, BridgeError> {
        let mut rotated = None;
        while self.dynasties.is_rotation_due(height) {
            let current = self.dynasties.current();
            let id = current.id + 1;
            let next = if self.stakes.is_empty() {
                tracing::warn!(dynasty = id, "stake table empty, carrying validator set forward");
                Dynasty::new(id, current.shares.iter().map(|(a, s)| (*a, *s)))?
            } else {
                self.stakes.snapshot(id)?
            };
            self.dynasties.rotate(next)?;
            rotated = Some(id);
        }
        Ok(rotated)
    }
}

/// Bridge core: both banks, the channel registry, the dynasty schedule and
/// the attestation ledger, driven against an [`AssetLedger`].
///
/// Every state-changing entry point runs on a staged copy and only replaces
/// the live state when it succeeds.
#[derive(Debug, Clone)]
pub struct BridgeEngine<L> {
    state: EngineState,
    ledger: L,
}

impl<L: AssetLedger + Clone> BridgeEngine<L> {
    /// Create an engine whose stake table mirrors `genesis_dynasty`.
    pub fn new(params: EngineParams, genesis_dynasty: Dynasty, ledger: L) -> Self {
        let mut stakes = StakeTable::new();
        for (validator, share) in &genesis_dynasty.shares {
            stakes.set_stake(*validator, *share);
        }
        Self {
            state: EngineState::new(&params, stakes, genesis_dynasty),
            ledger,
        }
    }

    /// Build dynasty 1 from the genesis validators.
    pub fn from_genesis(genesis: &GenesisConfig, ledger: L) -> Result<Self, BridgeError> {
        for v in &genesis.validators {
            if pubkey_to_address(&v.pubkey) != v.address {
                return Err(BridgeError::InvalidMessage {
                    reason: format!(
                        "genesis validator {} does not match its public key",
                        format_address(&v.address)
                    ),
                });
            }
        }
        let dynasty = Dynasty::new(1, genesis.validators.iter().map(|v| (v.address, v.stake)))?;
        if dynasty.is_empty() {
            return Err(BridgeError::InvalidMessage {
                reason: "genesis has no staked validators".to_string(),
            });
        }
        Ok(Self::new(EngineParams::from_genesis(genesis), dynasty, ledger))
    }

    /// Resume from persisted parts.
    pub fn restore(state: EngineState, ledger: L) -> Self {
        Self { state, ledger }
    }

    /// Copy of the full state, for persistence.
    pub fn snapshot(&self) -> (EngineState, L) {
        (self.state.clone(), self.ledger.clone())
    }

    fn staged<T>(
        &mut self,
        f: impl FnOnce(&mut EngineState, &mut L) -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        let mut state = self.state.clone();
        let mut ledger = self.ledger.clone();
        let out = f(&mut state, &mut ledger)?;
        self.state = state;
        self.ledger = ledger;
        Ok(out)
    }

    // ─── Entry Points ────────────────────────────────────────────────────────

    pub fn lock_tokens(&mut self, req: &LockRequest) -> Result<LockRecord, BridgeError> {
        self.staged(|state, ledger| state.lock(ledger, req))
    }

    pub fn burn_vouchers(
        &mut self,
        bank: TokenKind,
        req: &BurnRequest,
    ) -> Result<BurnRecord, BridgeError> {
        self.staged(|state, ledger| state.burn(ledger, bank, req))
    }

    pub fn apply_call(&mut self, call: &UserCall) -> Result<(), BridgeError> {
        self.staged(|state, ledger| state.apply_call(ledger, call))
    }

    /// Verify and count one attestation outside of block execution.
    pub fn submit_attestation(
        &mut self,
        att: &Attestation,
        proposer: Address,
    ) -> Result<AttestationResult, BridgeError> {
        let data = attestation_signing_data(att.dynasty, &att.event);
        verify(&data, &att.signature, &att.validator)?;
        self.staged(|state, ledger| state.apply_attestation(ledger, att, proposer))
    }

    /// Execute a block.
    ///
    /// Rotates the dynasty when `block.height` starts a new one, verifies all
    /// attestation signatures in parallel, then applies calls and
    /// attestations in order. Rejected items are listed in the receipt. An
    /// invariant violation discards the whole block.
    pub fn execute_block(&mut self, block: &BridgeBlock) -> Result<BlockReceipt, BridgeError> {
        let expected = self.state.height.saturating_add(1);
        if block.height != expected {
            return Err(BridgeError::UnexpectedHeight {
                expected,
                actual: block.height,
            });
        }
        let items = block.calls.len() + block.attestations.len();
        if items > MAX_ITEMS_PER_BLOCK {
            return Err(BridgeError::InvalidMessage {
                reason: format!("block carries {items} items, limit is {MAX_ITEMS_PER_BLOCK}"),
            });
        }

        let signatures_ok = verify_signatures(&block.attestations);

        let receipt = self.staged(|state, ledger| {
            state.height = block.height;
            let rotated = state.rotate_if_due(block.height)?;
            let mut receipt =
                BlockReceipt::new(block.height, state.dynasties.current().id, rotated);

            for (index, call) in block.calls.iter().enumerate() {
                match state.apply_call(ledger, call) {
                    Ok(()) => receipt.applied_calls += 1,
                    Err(err) => receipt.reject(BlockItem::Call(index), err)?,
                }
                receipt.events.extend(state.drain_events());
            }

            for (index, att) in block.attestations.iter().enumerate() {
                let result = if signatures_ok[index] {
                    state.apply_attestation(ledger, att, block.proposer)
                } else {
                    Err(BridgeError::InvalidSignature)
                };
                match result {
                    Ok(result) => receipt.count(&result),
                    Err(err) => receipt.reject(BlockItem::Attestation(index), err)?,
                }
                receipt.events.extend(state.drain_events());
            }
            Ok(receipt)
        })?;

        tracing::info!(
            height = receipt.height,
            dynasty = receipt.dynasty,
            calls = receipt.applied_calls,
            attestations = receipt.accepted_attestations,
            finalized = receipt.finalized,
            rejected = receipt.rejections.len(),
            events = receipt.events.len(),
            "block executed"
        );
        Ok(receipt)
    }

    // ─── Administration ──────────────────────────────────────────────────────

    /// Update a validator's stake; takes effect at the next rotation.
    pub fn set_stake(&mut self, validator: Address, stake: Amount) {
        self.state.stakes.set_stake(validator, stake);
    }

    pub fn register_channel(&mut self, chain: ChainId) {
        if chain != self.state.local_chain {
            self.state.channels.register(chain);
        }
    }

    pub fn set_channel_active(&mut self, chain: ChainId, active: bool) -> bool {
        self.state.channels.set_active(chain, active)
    }

    /// Drain bank events produced outside of block execution.
    pub fn take_events(&mut self) -> Vec<BankEvent> {
        self.state.drain_events()
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn height(&self) -> BlockHeight {
        self.state.height
    }

    pub fn local_chain(&self) -> ChainId {
        self.state.local_chain
    }

    pub fn mainchain_id(&self) -> ChainId {
        self.state.native.mainchain_id()
    }

    pub fn is_on_mainchain(&self) -> bool {
        self.state.native.is_on_mainchain()
    }

    pub fn bank(&self, kind: TokenKind) -> &TokenBank {
        self.state.bank(kind)
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.state.channels
    }

    pub fn current_dynasty(&self) -> &Dynasty {
        self.state.dynasties.current()
    }

    pub fn dynasty_schedule(&self) -> &DynastySchedule {
        &self.state.dynasties
    }

    /// Dynasty a block at `height` will execute under.
    pub fn dynasty_at(&self, height: BlockHeight) -> DynastyId {
        self.state
            .dynasties
            .dynasty_for_height(height)
            .max(self.state.dynasties.current().id)
    }

    pub fn stakes(&self) -> &StakeTable {
        &self.state.stakes
    }

    pub fn quorum(&self) -> &QuorumLedger {
        &self.state.quorum
    }

    pub fn deferred_count(&self) -> usize {
        self.state.deferred.len()
    }

    pub fn get_denom(&self, kind: TokenKind, voucher: &Address) -> Option<&Denom> {
        self.bank(kind).get_denom(voucher)
    }

    pub fn get_voucher(&self, kind: TokenKind, denom: &Denom) -> Option<Address> {
        self.bank(kind).get_voucher(denom)
    }

    pub fn max_processed_token_lock_nonce(&self, kind: TokenKind, chain: ChainId) -> Nonce {
        self.bank(kind).max_processed_token_lock_nonce(chain)
    }

    pub fn max_processed_voucher_burn_nonce(&self, kind: TokenKind, chain: ChainId) -> Nonce {
        self.bank(kind).max_processed_voucher_burn_nonce(chain)
    }

    pub fn total_locked(&self, kind: TokenKind, chain: ChainId, denom: &Denom) -> Amount {
        self.bank(kind).total_locked(chain, denom)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access for genesis allocations and tests.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }
}

/// Check every attestation signature. A single batch verification covers the
/// common case; when it fails each signature is checked on its own.
fn verify_signatures(attestations: &[Attestation]) -> Vec<bool> {
    if attestations.is_empty() {
        return Vec::new();
    }
    let payloads: Vec<Vec<u8>> = attestations
        .par_iter()
        .map(|a| attestation_signing_data(a.dynasty, &a.event))
        .collect();
    let messages: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
    let signatures: Vec<Signature> = attestations.iter().map(|a| a.signature).collect();
    let keys: Vec<PublicKey> = attestations.iter().map(|a| a.validator).collect();

    if batch_verify(&messages, &signatures, &keys).is_ok() {
        return vec![true; attestations.len()];
    }
    attestations
        .par_iter()
        .zip(payloads.par_iter())
        .map(|(a, data)| verify(data, &a.signature, &a.validator).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use span_crypto::keys::Keypair;

    const MAIN: ChainId = 366;
    const SUB: ChainId = 360_777;

    fn keys() -> Vec<Keypair> {
        (1u8..=3).map(|i| Keypair::from_seed(&[i; 32])).collect()
    }

    fn engine(dynasty_length: u64) -> BridgeEngine<MemoryLedger> {
        let kps = keys();
        let dynasty = Dynasty::new(
            1,
            kps.iter()
                .zip([40u128, 35, 25])
                .map(|(k, s)| (k.address(), s)),
        )
        .unwrap();
        let params = EngineParams {
            local_chain: SUB,
            mainchain_id: MAIN,
            dynasty_length,
            cross_chain_fee: 0,
            fee_collector: [0xfe; 20],
            channels: vec![MAIN, SUB],
        };
        BridgeEngine::new(params, dynasty, MemoryLedger::new())
    }

    fn lock_event(nonce: Nonce) -> CrossChainTransferEvent {
        CrossChainTransferEvent {
            kind: TransferKind::TokenLock,
            source_chain: MAIN,
            target_chain: SUB,
            denom: Denom::native(MAIN),
            sender: [1u8; 20],
            receiver: [2u8; 20],
            amount: 500,
            nonce,
        }
    }

    fn attest(kp: &Keypair, dynasty: DynastyId, event: CrossChainTransferEvent) -> Attestation {
        let signature = kp.sign(&attestation_signing_data(dynasty, &event));
        Attestation {
            validator: kp.public_key(),
            dynasty,
            event,
            signature,
        }
    }

    fn block(height: BlockHeight, attestations: Vec<Attestation>) -> BridgeBlock {
        BridgeBlock {
            height,
            attestations,
            ..Default::default()
        }
    }

    #[test]
    fn test_local_chain_never_becomes_a_channel() {
        let e = engine(100);
        assert!(e.channels().is_active(MAIN));
        assert!(!e.channels().is_registered(SUB));
    }

    #[test]
    fn test_height_must_be_sequential() {
        let mut e = engine(100);
        assert_eq!(
            e.execute_block(&block(2, vec![])).unwrap_err(),
            BridgeError::UnexpectedHeight {
                expected: 1,
                actual: 2
            }
        );
        e.execute_block(&block(1, vec![])).unwrap();
        assert_eq!(e.height(), 1);
    }

    #[test]
    fn test_bad_signature_rejected_others_counted() {
        let mut e = engine(100);
        let kps = keys();
        let good = attest(&kps[0], 1, lock_event(1));
        let mut bad = attest(&kps[1], 1, lock_event(1));
        bad.signature[0] ^= 0xff;

        let receipt = e.execute_block(&block(1, vec![good, bad])).unwrap();
        assert_eq!(receipt.accepted_attestations, 1);
        assert_eq!(receipt.rejections.len(), 1);
        assert_eq!(receipt.rejections[0].item, BlockItem::Attestation(1));
        assert_eq!(receipt.rejections[0].error, BridgeError::InvalidSignature);
    }

    #[test]
    fn test_submit_attestation_checks_signature() {
        let mut e = engine(100);
        let kps = keys();
        let mut att = attest(&kps[0], 1, lock_event(1));
        att.event.amount += 1;
        assert_eq!(
            e.submit_attestation(&att, [0u8; 20]).unwrap_err(),
            BridgeError::InvalidSignature
        );
        assert!(e.quorum().is_empty());
    }

    #[test]
    fn test_attestation_for_other_chain_rejected() {
        let mut e = engine(100);
        let kps = keys();
        let mut event = lock_event(1);
        event.target_chain = 7;
        assert_eq!(
            e.submit_attestation(&attest(&kps[0], 1, event), [0u8; 20])
                .unwrap_err(),
            BridgeError::WrongChain {
                expected: SUB,
                actual: 7
            }
        );
    }

    #[test]
    fn test_rotation_uses_stake_table_and_restarts_votes() {
        let mut e = engine(2);
        let kps = keys();
        e.execute_block(&block(1, vec![attest(&kps[0], 1, lock_event(1))]))
            .unwrap();

        // Validator 0's stake drops before dynasty 2 starts at height 2.
        e.set_stake(kps[0].address(), 5);
        let receipt = e
            .execute_block(&block(
                2,
                vec![
                    attest(&kps[1], 1, lock_event(1)),
                    attest(&kps[1], 2, lock_event(1)),
                ],
            ))
            .unwrap();
        assert_eq!(receipt.rotated, Some(2));
        assert!(matches!(
            receipt.rejections[0].error,
            BridgeError::StaleDynasty {
                attested: 1,
                current: 2
            }
        ));
        assert_eq!(receipt.finalized, 0);
        assert_eq!(e.current_dynasty().total_shares, 65);

        let key = EventKey::for_event(&lock_event(1));
        let record = e.quorum().record(&key).unwrap();
        assert_eq!(record.dynasty, 2);
        assert_eq!(record.accumulated_shares, 35);
    }

    #[test]
    fn test_replayed_nonce_rejected_before_voting() {
        let mut e = engine(100);
        let kps = keys();
        e.execute_block(&block(
            1,
            vec![
                attest(&kps[0], 1, lock_event(1)),
                attest(&kps[1], 1, lock_event(1)),
            ],
        ))
        .unwrap();

        let mut replay = lock_event(1);
        replay.amount = 9_999;
        let err = e
            .submit_attestation(&attest(&kps[2], 1, replay), [0u8; 20])
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::NonceOutOfOrder {
                chain: MAIN,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_stake_call_bonds_and_rotates_in() {
        let mut e = engine(2);
        let newcomer = [0x42; 20];
        e.ledger_mut().credit(&newcomer, Asset::Native, 100).unwrap();

        let stake = UserCall::Stake {
            validator: newcomer,
            amount: 60,
        };
        let receipt = e
            .execute_block(&BridgeBlock {
                height: 1,
                calls: vec![stake],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(receipt.applied_calls, 1);
        assert_eq!(e.stakes().stake_of(&newcomer), 60);
        assert_eq!(e.ledger().balance_of(&newcomer, &Asset::Native), 40);
        assert_eq!(
            e.ledger()
                .balance_of(&staking_escrow_address(SUB), &Asset::Native),
            60
        );
        // Bonded stake is not counted until the next dynasty.
        assert_eq!(e.current_dynasty().share_of(&newcomer), None);

        let receipt = e.execute_block(&block(2, vec![])).unwrap();
        assert_eq!(receipt.rotated, Some(2));
        assert_eq!(e.current_dynasty().share_of(&newcomer), Some(60));
    }

    #[test]
    fn test_unstake_limited_to_bonded_amount() {
        let mut e = engine(100);
        let v = [0x42; 20];
        e.ledger_mut().credit(&v, Asset::Native, 50).unwrap();
        e.apply_call(&UserCall::Stake {
            validator: v,
            amount: 50,
        })
        .unwrap();

        let err = e
            .apply_call(&UserCall::Unstake {
                validator: v,
                amount: 51,
            })
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::InsufficientStake {
                validator: v,
                staked: 50,
                requested: 51
            }
        );
        assert_eq!(err.class(), crate::error::ErrorClass::Validation);

        e.apply_call(&UserCall::Unstake {
            validator: v,
            amount: 50,
        })
        .unwrap();
        assert_eq!(e.stakes().stake_of(&v), 0);
        assert_eq!(e.ledger().balance_of(&v, &Asset::Native), 50);
        assert_eq!(
            e.apply_call(&UserCall::Stake {
                validator: v,
                amount: 0
            })
            .unwrap_err(),
            BridgeError::InvalidAmount
        );
    }

    #[test]
    fn test_stake_without_funds_leaves_table_unchanged() {
        let mut e = engine(100);
        let v = [0x42; 20];
        let err = e
            .apply_call(&UserCall::Stake {
                validator: v,
                amount: 10,
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::Execution(_)));
        assert_eq!(e.stakes().stake_of(&v), 0);
    }

    #[test]
    fn test_set_channel_call() {
        let mut e = engine(100);
        let other: ChainId = 42;

        assert_eq!(
            e.apply_call(&UserCall::SetChannel {
                chain: other,
                active: false
            })
            .unwrap_err(),
            BridgeError::ChannelInactive { chain: other }
        );
        e.apply_call(&UserCall::SetChannel {
            chain: other,
            active: true,
        })
        .unwrap();
        assert!(e.channels().is_active(other));

        e.apply_call(&UserCall::SetChannel {
            chain: MAIN,
            active: false,
        })
        .unwrap();
        assert!(e.channels().is_registered(MAIN));
        assert!(!e.channels().is_active(MAIN));

        assert!(matches!(
            e.apply_call(&UserCall::SetChannel {
                chain: SUB,
                active: true
            }),
            Err(BridgeError::InvalidMessage { .. })
        ));
    }
}
