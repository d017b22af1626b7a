use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use span_crypto::address::bank_escrow_address;
use span_types::bridge::{
    Asset, BankEvent, BurnRecord, LockRecord, NonceKind, SystemCall, SystemTransaction,
    TransferKind,
};
use span_types::denom::{Denom, TokenKind};
use span_types::primitives::*;

use crate::channel::ChannelRegistry;
use crate::error::BridgeError;
use crate::ledger::AssetLedger;
use crate::nonce::NonceLedger;
use crate::registry::DenomRegistry;

/// A user's request to lock an origin asset for transfer to another chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub sender: Address,
    pub target_chain: ChainId,
    pub asset: Asset,
    pub receiver: Address,
    pub amount: Amount,
    /// Native coin paid on top of the locked amount.
    pub fee: Amount,
}

/// A user's request to burn vouchers and release the collateral at home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnRequest {
    pub owner: Address,
    pub voucher: Address,
    pub receiver: Address,
    pub amount: Amount,
    pub fee: Amount,
}

/// Lock/mint and burn/unlock state machine for one asset kind.
///
/// The bank owns its nonce counters, lock and burn records, voucher registry
/// and collateral totals. Balances live in the [`AssetLedger`]. Every
/// transition runs all of its checks before the first mutation, so a rejected
/// call leaves both the bank and the ledger untouched.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TokenBank {
    kind: TokenKind,
    local_chain: ChainId,
    mainchain_id: ChainId,
    escrow: Address,
    nonces: NonceLedger,
    registry: DenomRegistry,
    /// Locked collateral per (counterparty chain, denom).
    locked: BTreeMap<(ChainId, Denom), Amount>,
    lock_records: BTreeMap<(ChainId, Nonce), LockRecord>,
    burn_records: BTreeMap<(ChainId, Nonce), BurnRecord>,
    events: Vec<BankEvent>,
}

impl TokenBank {
    pub fn new(kind: TokenKind, local_chain: ChainId, mainchain_id: ChainId) -> Self {
        Self {
            kind,
            local_chain,
            mainchain_id,
            escrow: bank_escrow_address(local_chain, kind),
            nonces: NonceLedger::new(),
            registry: DenomRegistry::new(),
            locked: BTreeMap::new(),
            lock_records: BTreeMap::new(),
            burn_records: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    // ─── Lock ────────────────────────────────────────────────────────────────

    /// Lock an origin asset and assign the next token-lock nonce for the
    /// target chain.
    pub fn lock_tokens<L: AssetLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        channels: &ChannelRegistry,
        req: &LockRequest,
    ) -> Result<LockRecord, BridgeError> {
        // 1. Shape, channel and fee.
        if req.amount == 0 {
            return Err(BridgeError::InvalidAmount);
        }
        channels.ensure_active(req.target_chain)?;
        channels.ensure_fee(req.fee)?;

        // 2. The asset must be something this bank escrows.
        let denom = self.origin_denom(&req.asset)?;

        // 3. Funds for amount and fee.
        match req.asset {
            Asset::Native => {
                let total = req
                    .amount
                    .checked_add(req.fee)
                    .ok_or_else(|| overflow("lock amount plus fee"))?;
                ledger.ensure_balance(&req.sender, &Asset::Native, total)?;
            }
            Asset::Token(_) => {
                ledger.ensure_balance(&req.sender, &req.asset, req.amount)?;
                ledger.ensure_balance(&req.sender, &Asset::Native, req.fee)?;
            }
        }

        // 4. Precompute bookkeeping that can overflow.
        let key = (req.target_chain, denom.clone());
        let collateral = self
            .total_locked(req.target_chain, &denom)
            .checked_add(req.amount)
            .ok_or_else(|| overflow("locked collateral"))?;
        self.ensure_counter_room(req.target_chain, NonceKind::TokenLock)?;

        // 5. Move funds.
        ledger.transfer(&req.sender, &self.escrow, &req.asset, req.amount)?;
        if req.fee > 0 {
            ledger.transfer(
                &req.sender,
                &channels.fee_collector(),
                &Asset::Native,
                req.fee,
            )?;
        }

        // 6. Record.
        let nonce = self
            .nonces
            .next_nonce(req.target_chain, NonceKind::TokenLock)?;
        self.locked.insert(key, collateral);
        let record = LockRecord {
            denom: denom.clone(),
            source_owner: req.sender,
            target_receiver: req.receiver,
            amount: req.amount,
            nonce,
            chain_id: req.target_chain,
        };
        self.lock_records
            .insert((req.target_chain, nonce), record.clone());
        self.emit(BankEvent::TokenLocked {
            denom,
            sender: req.sender,
            target_chain: req.target_chain,
            receiver: req.receiver,
            amount: req.amount,
            nonce,
        });
        Ok(record)
    }

    // ─── Mint ────────────────────────────────────────────────────────────────

    /// Mint vouchers for a finalized foreign lock. Deploys the voucher the
    /// first time a denom arrives.
    pub fn mint_vouchers<L: AssetLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        source_chain: ChainId,
        denom: &Denom,
        receiver: Address,
        amount: Amount,
        source_nonce: Nonce,
    ) -> Result<BankEvent, BridgeError> {
        // 1. Re-validate against this bank.
        self.ensure_kind(denom)?;
        if amount == 0 {
            return Err(BridgeError::InvalidAmount);
        }
        if source_chain == self.local_chain {
            return Err(BridgeError::InvalidMessage {
                reason: "cannot mint vouchers for a local lock".to_string(),
            });
        }
        if denom.origin_chain != source_chain {
            return Err(BridgeError::WrongChain {
                expected: source_chain,
                actual: denom.origin_chain,
            });
        }

        // 2. Strict ordering on the inbound route.
        self.nonces
            .check_next(source_chain, TransferKind::TokenLock, source_nonce)?;
        self.ensure_counter_room(source_chain, NonceKind::VoucherMint)?;

        // 3. Voucher, deployed on first sight.
        let deployer = self.escrow;
        let (voucher, _) = self
            .registry
            .resolve_or_deploy(denom, |d| ledger.deploy_voucher(&deployer, d))?;

        // 4. Credit.
        ledger.mint(&voucher, &receiver, amount)?;

        // 5. Advance.
        let mint_nonce = self
            .nonces
            .next_nonce(source_chain, NonceKind::VoucherMint)?;
        self.nonces
            .mark_processed(source_chain, TransferKind::TokenLock, source_nonce)?;
        let event = BankEvent::VoucherMinted {
            denom: denom.clone(),
            voucher,
            source_chain,
            receiver,
            amount,
            source_lock_nonce: source_nonce,
            mint_nonce,
        };
        self.emit(event.clone());
        Ok(event)
    }

    // ─── Burn ────────────────────────────────────────────────────────────────

    /// Burn vouchers so the collateral can be unlocked on the origin chain.
    pub fn burn_vouchers<L: AssetLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        channels: &ChannelRegistry,
        req: &BurnRequest,
    ) -> Result<BurnRecord, BridgeError> {
        // 1. Shape.
        if req.amount == 0 {
            return Err(BridgeError::InvalidAmount);
        }

        // 2. The voucher must be ours.
        let denom = self
            .registry
            .lookup_by_address(&req.voucher)
            .cloned()
            .ok_or(BridgeError::UnknownVoucher {
                bank: self.kind,
                voucher: req.voucher,
            })?;
        self.ensure_kind(&denom)?;
        let target_chain = denom.origin_chain;

        // 3. Channel home and fee.
        channels.ensure_active(target_chain)?;
        channels.ensure_fee(req.fee)?;

        // 4. Funds.
        ledger.ensure_balance(&req.owner, &Asset::Token(req.voucher), req.amount)?;
        ledger.ensure_balance(&req.owner, &Asset::Native, req.fee)?;
        self.ensure_counter_room(target_chain, NonceKind::VoucherBurn)?;

        // 5. Burn and pay.
        ledger.burn(&req.voucher, &req.owner, req.amount)?;
        if req.fee > 0 {
            ledger.transfer(
                &req.owner,
                &channels.fee_collector(),
                &Asset::Native,
                req.fee,
            )?;
        }

        // 6. Record.
        let nonce = self
            .nonces
            .next_nonce(target_chain, NonceKind::VoucherBurn)?;
        let record = BurnRecord {
            denom: denom.clone(),
            source_owner: req.owner,
            target_receiver: req.receiver,
            amount: req.amount,
            nonce,
            chain_id: target_chain,
        };
        self.burn_records.insert((target_chain, nonce), record.clone());
        self.emit(BankEvent::VoucherBurned {
            denom,
            voucher: req.voucher,
            owner: req.owner,
            target_chain,
            receiver: req.receiver,
            amount: req.amount,
            nonce,
        });
        Ok(record)
    }

    // ─── Unlock ──────────────────────────────────────────────────────────────

    /// Release collateral for a finalized foreign burn.
    ///
    /// Asking for more than was locked toward `source_chain` is an
    /// invariant violation.
    pub fn unlock_tokens<L: AssetLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        source_chain: ChainId,
        denom: &Denom,
        receiver: Address,
        amount: Amount,
        source_nonce: Nonce,
    ) -> Result<BankEvent, BridgeError> {
        // 1. Re-validate against this bank.
        self.ensure_kind(denom)?;
        if amount == 0 {
            return Err(BridgeError::InvalidAmount);
        }
        if denom.origin_chain != self.local_chain {
            return Err(BridgeError::WrongChain {
                expected: self.local_chain,
                actual: denom.origin_chain,
            });
        }

        // 2. Strict ordering on the inbound route.
        self.nonces
            .check_next(source_chain, TransferKind::VoucherBurn, source_nonce)?;
        self.ensure_counter_room(source_chain, NonceKind::TokenUnlock)?;

        // 3. Collateral.
        let key = (source_chain, denom.clone());
        let locked = self.locked.get(&key).copied().unwrap_or(0);
        if amount > locked {
            return Err(BridgeError::InsufficientCollateral {
                chain: source_chain,
                locked,
                requested: amount,
            });
        }

        // 4. Release.
        let asset = match denom.kind {
            TokenKind::Native => Asset::Native,
            TokenKind::Fungible => Asset::Token(denom.asset),
        };
        ledger.transfer(&self.escrow, &receiver, &asset, amount)?;

        // 5. Advance.
        if locked == amount {
            self.locked.remove(&key);
        } else {
            self.locked.insert(key, locked - amount);
        }
        let unlock_nonce = self
            .nonces
            .next_nonce(source_chain, NonceKind::TokenUnlock)?;
        self.nonces
            .mark_processed(source_chain, TransferKind::VoucherBurn, source_nonce)?;
        let event = BankEvent::TokenUnlocked {
            denom: denom.clone(),
            source_chain,
            receiver,
            amount,
            source_burn_nonce: source_nonce,
            unlock_nonce,
        };
        self.emit(event.clone());
        Ok(event)
    }

    // ─── System Transactions ─────────────────────────────────────────────────

    /// Run a proxy transaction built for this bank.
    pub fn execute<L: AssetLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        tx: &SystemTransaction,
    ) -> Result<BankEvent, BridgeError> {
        if tx.bank != self.kind {
            return Err(BridgeError::TokenKindMismatch {
                bank: self.kind,
                actual: tx.bank,
            });
        }
        match &tx.call {
            SystemCall::MintVouchers {
                source_chain,
                denom,
                receiver,
                amount,
                source_nonce,
                ..
            } => self.mint_vouchers(
                ledger,
                *source_chain,
                denom,
                *receiver,
                *amount,
                *source_nonce,
            ),
            SystemCall::UnlockTokens {
                source_chain,
                denom,
                receiver,
                amount,
                source_nonce,
                ..
            } => self.unlock_tokens(
                ledger,
                *source_chain,
                denom,
                *receiver,
                *amount,
                *source_nonce,
            ),
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn local_chain(&self) -> ChainId {
        self.local_chain
    }

    pub fn mainchain_id(&self) -> ChainId {
        self.mainchain_id
    }

    pub fn is_on_mainchain(&self) -> bool {
        self.local_chain == self.mainchain_id
    }

    /// Account holding this bank's locked collateral.
    pub fn escrow(&self) -> Address {
        self.escrow
    }

    pub fn get_denom(&self, voucher: &Address) -> Option<&Denom> {
        self.registry.lookup_by_address(voucher)
    }

    pub fn get_voucher(&self, denom: &Denom) -> Option<Address> {
        self.registry.lookup_by_denom(denom)
    }

    pub fn exists_denom(&self, denom: &Denom) -> bool {
        self.registry.contains_denom(denom)
    }

    pub fn exists_voucher(&self, voucher: &Address) -> bool {
        self.registry.contains_voucher(voucher)
    }

    pub fn denoms(&self) -> &[Denom] {
        self.registry.denoms()
    }

    pub fn vouchers(&self) -> Vec<Address> {
        self.registry.vouchers()
    }

    pub fn registry(&self) -> &DenomRegistry {
        &self.registry
    }

    pub fn nonces(&self) -> &NonceLedger {
        &self.nonces
    }

    pub fn max_processed_token_lock_nonce(&self, source_chain: ChainId) -> Nonce {
        self.nonces
            .max_processed(source_chain, TransferKind::TokenLock)
    }

    pub fn max_processed_voucher_burn_nonce(&self, source_chain: ChainId) -> Nonce {
        self.nonces
            .max_processed(source_chain, TransferKind::VoucherBurn)
    }

    pub fn token_lock_nonce(&self, target_chain: ChainId) -> Nonce {
        self.nonces.current(target_chain, NonceKind::TokenLock)
    }

    pub fn token_unlock_nonce(&self, source_chain: ChainId) -> Nonce {
        self.nonces.current(source_chain, NonceKind::TokenUnlock)
    }

    pub fn voucher_burn_nonce(&self, target_chain: ChainId) -> Nonce {
        self.nonces.current(target_chain, NonceKind::VoucherBurn)
    }

    pub fn voucher_mint_nonce(&self, source_chain: ChainId) -> Nonce {
        self.nonces.current(source_chain, NonceKind::VoucherMint)
    }

    /// Collateral locked toward `chain` for `denom`.
    pub fn total_locked(&self, chain: ChainId, denom: &Denom) -> Amount {
        self.locked
            .get(&(chain, denom.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn lock_record(&self, target_chain: ChainId, nonce: Nonce) -> Option<&LockRecord> {
        self.lock_records.get(&(target_chain, nonce))
    }

    pub fn burn_record(&self, target_chain: ChainId, nonce: Nonce) -> Option<&BurnRecord> {
        self.burn_records.get(&(target_chain, nonce))
    }

    /// Drain events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<BankEvent> {
        std::mem::take(&mut self.events)
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    fn emit(&mut self, event: BankEvent) {
        tracing::debug!(bank = %self.kind, event = event.name(), denom = %event.denom(), "bank event");
        self.events.push(event);
    }

    fn ensure_kind(&self, denom: &Denom) -> Result<(), BridgeError> {
        if denom.kind != self.kind {
            return Err(BridgeError::TokenKindMismatch {
                bank: self.kind,
                actual: denom.kind,
            });
        }
        Ok(())
    }

    fn ensure_counter_room(&self, chain: ChainId, kind: NonceKind) -> Result<(), BridgeError> {
        if self.nonces.current(chain, kind) == Nonce::MAX {
            return Err(overflow("nonce counter"));
        }
        Ok(())
    }

    /// Denom of a local origin asset this bank can lock.
    fn origin_denom(&self, asset: &Asset) -> Result<Denom, BridgeError> {
        match (self.kind, asset) {
            (TokenKind::Native, Asset::Native) => Ok(Denom::native(self.local_chain)),
            (_, Asset::Token(token)) if self.registry.contains_voucher(token) => {
                Err(BridgeError::VoucherNotLockable { voucher: *token })
            }
            (TokenKind::Fungible, Asset::Token(token)) => {
                Ok(Denom::fungible(self.local_chain, *token))
            }
            (TokenKind::Native, Asset::Token(_)) => Err(BridgeError::TokenKindMismatch {
                bank: TokenKind::Native,
                actual: TokenKind::Fungible,
            }),
            (TokenKind::Fungible, Asset::Native) => Err(BridgeError::TokenKindMismatch {
                bank: TokenKind::Fungible,
                actual: TokenKind::Native,
            }),
        }
    }
}

fn overflow(context: &str) -> BridgeError {
    BridgeError::Overflow {
        context: context.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    const MAIN: ChainId = 366;
    const SUB: ChainId = 360_777;
    const ALICE: Address = [0xa1; 20];
    const BOB: Address = [0xb0; 20];
    const COLLECTOR: Address = [0xfe; 20];
    const TOKEN: Address = [0x70; 20];

    fn channels() -> ChannelRegistry {
        let mut c = ChannelRegistry::new(1, COLLECTOR);
        c.register(SUB);
        c.register(MAIN);
        c
    }

    fn funded_ledger() -> MemoryLedger {
        let mut ledger = MemoryLedger::new();
        ledger.credit(&ALICE, Asset::Native, 1_000).unwrap();
        ledger.credit(&ALICE, Asset::Token(TOKEN), 500).unwrap();
        ledger
    }

    fn lock(asset: Asset, amount: Amount) -> LockRequest {
        LockRequest {
            sender: ALICE,
            target_chain: SUB,
            asset,
            receiver: BOB,
            amount,
            fee: 1,
        }
    }

    #[test]
    fn test_native_lock_escrows_and_assigns_nonce() {
        let mut bank = TokenBank::new(TokenKind::Native, MAIN, MAIN);
        let mut ledger = funded_ledger();

        let r1 = bank
            .lock_tokens(&mut ledger, &channels(), &lock(Asset::Native, 100))
            .unwrap();
        let r2 = bank
            .lock_tokens(&mut ledger, &channels(), &lock(Asset::Native, 50))
            .unwrap();
        assert_eq!((r1.nonce, r2.nonce), (1, 2));
        assert_eq!(r1.denom, Denom::native(MAIN));
        assert_eq!(ledger.balance_of(&ALICE, &Asset::Native), 1_000 - 152);
        assert_eq!(ledger.balance_of(&bank.escrow(), &Asset::Native), 150);
        assert_eq!(ledger.balance_of(&COLLECTOR, &Asset::Native), 2);
        assert_eq!(bank.total_locked(SUB, &Denom::native(MAIN)), 150);
        assert_eq!(bank.token_lock_nonce(SUB), 2);
        assert_eq!(bank.lock_record(SUB, 2).unwrap().amount, 50);
        assert!(bank.is_on_mainchain());

        let events = bank.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], BankEvent::TokenLocked { nonce: 1, .. }));
        assert!(bank.take_events().is_empty());
    }

    #[test]
    fn test_lock_rejections_change_nothing() {
        let mut bank = TokenBank::new(TokenKind::Native, MAIN, MAIN);
        let mut ledger = funded_ledger();
        let before = ledger.clone();

        let err = bank
            .lock_tokens(&mut ledger, &channels(), &lock(Asset::Native, 1_000))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Execution(_)));

        let mut req = lock(Asset::Native, 10);
        req.fee = 0;
        assert!(matches!(
            bank.lock_tokens(&mut ledger, &channels(), &req),
            Err(BridgeError::InsufficientFee { .. })
        ));

        let mut req = lock(Asset::Native, 10);
        req.target_chain = 42;
        assert_eq!(
            bank.lock_tokens(&mut ledger, &channels(), &req)
                .unwrap_err(),
            BridgeError::ChannelInactive { chain: 42 }
        );

        assert!(matches!(
            bank.lock_tokens(&mut ledger, &channels(), &lock(Asset::Token(TOKEN), 10)),
            Err(BridgeError::TokenKindMismatch { .. })
        ));

        assert_eq!(ledger, before);
        assert_eq!(bank.token_lock_nonce(SUB), 0);
        assert!(bank.take_events().is_empty());
    }

    #[test]
    fn test_fungible_lock_uses_token_denom() {
        let mut bank = TokenBank::new(TokenKind::Fungible, MAIN, MAIN);
        let mut ledger = funded_ledger();
        let record = bank
            .lock_tokens(&mut ledger, &channels(), &lock(Asset::Token(TOKEN), 200))
            .unwrap();
        assert_eq!(record.denom, Denom::fungible(MAIN, TOKEN));
        assert_eq!(ledger.balance_of(&ALICE, &Asset::Token(TOKEN)), 300);
        assert_eq!(ledger.balance_of(&ALICE, &Asset::Native), 999);
    }

    #[test]
    fn test_mint_deploys_voucher_once_and_advances_watermark() {
        let mut bank = TokenBank::new(TokenKind::Native, SUB, MAIN);
        let mut ledger = MemoryLedger::new();
        let denom = Denom::native(MAIN);

        let ev = bank
            .mint_vouchers(&mut ledger, MAIN, &denom, BOB, 70, 1)
            .unwrap();
        let BankEvent::VoucherMinted { voucher, mint_nonce, .. } = ev else {
            panic!("expected VoucherMinted");
        };
        assert_eq!(mint_nonce, 1);
        bank.mint_vouchers(&mut ledger, MAIN, &denom, ALICE, 30, 2)
            .unwrap();

        assert_eq!(bank.get_voucher(&denom), Some(voucher));
        assert_eq!(bank.get_denom(&voucher), Some(&denom));
        assert_eq!(bank.vouchers(), vec![voucher]);
        assert_eq!(ledger.balance_of(&BOB, &Asset::Token(voucher)), 70);
        assert_eq!(ledger.total_supply(&Asset::Token(voucher)), 100);
        assert_eq!(bank.max_processed_token_lock_nonce(MAIN), 2);
        assert_eq!(bank.voucher_mint_nonce(MAIN), 2);
        assert!(!bank.is_on_mainchain());
    }

    #[test]
    fn test_mint_out_of_order_and_replay() {
        let mut bank = TokenBank::new(TokenKind::Native, SUB, MAIN);
        let mut ledger = MemoryLedger::new();
        let denom = Denom::native(MAIN);

        assert_eq!(
            bank.mint_vouchers(&mut ledger, MAIN, &denom, BOB, 5, 2)
                .unwrap_err(),
            BridgeError::NonceOutOfOrder {
                chain: MAIN,
                expected: 1,
                actual: 2
            }
        );
        // Nothing deployed by a rejected mint.
        assert!(bank.denoms().is_empty());

        bank.mint_vouchers(&mut ledger, MAIN, &denom, BOB, 5, 1)
            .unwrap();
        assert!(matches!(
            bank.mint_vouchers(&mut ledger, MAIN, &denom, BOB, 5, 1),
            Err(BridgeError::NonceOutOfOrder { .. })
        ));
        let voucher = bank.get_voucher(&denom).unwrap();
        assert_eq!(ledger.balance_of(&BOB, &Asset::Token(voucher)), 5);
    }

    #[test]
    fn test_mint_rejects_wrong_kind() {
        let mut bank = TokenBank::new(TokenKind::Native, SUB, MAIN);
        let mut ledger = MemoryLedger::new();
        let err = bank
            .mint_vouchers(
                &mut ledger,
                MAIN,
                &Denom::fungible(MAIN, TOKEN),
                BOB,
                5,
                1,
            )
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::TokenKindMismatch {
                bank: TokenKind::Native,
                actual: TokenKind::Fungible
            }
        );
    }

    #[test]
    fn test_voucher_cannot_be_locked_but_can_be_burned() {
        let mut bank = TokenBank::new(TokenKind::Fungible, SUB, MAIN);
        let mut ledger = MemoryLedger::new();
        ledger.credit(&BOB, Asset::Native, 10).unwrap();
        let denom = Denom::fungible(MAIN, TOKEN);
        bank.mint_vouchers(&mut ledger, MAIN, &denom, BOB, 40, 1)
            .unwrap();
        let voucher = bank.get_voucher(&denom).unwrap();

        let req = LockRequest {
            sender: BOB,
            target_chain: MAIN,
            asset: Asset::Token(voucher),
            receiver: ALICE,
            amount: 10,
            fee: 1,
        };
        assert_eq!(
            bank.lock_tokens(&mut ledger, &channels(), &req)
                .unwrap_err(),
            BridgeError::VoucherNotLockable { voucher }
        );

        let record = bank
            .burn_vouchers(
                &mut ledger,
                &channels(),
                &BurnRequest {
                    owner: BOB,
                    voucher,
                    receiver: ALICE,
                    amount: 15,
                    fee: 1,
                },
            )
            .unwrap();
        assert_eq!(record.nonce, 1);
        assert_eq!(record.chain_id, MAIN);
        assert_eq!(ledger.balance_of(&BOB, &Asset::Token(voucher)), 25);
        assert_eq!(ledger.total_supply(&Asset::Token(voucher)), 25);
        assert_eq!(bank.voucher_burn_nonce(MAIN), 1);
        assert_eq!(bank.burn_record(MAIN, 1).unwrap().amount, 15);
    }

    #[test]
    fn test_burn_unknown_voucher() {
        let mut bank = TokenBank::new(TokenKind::Fungible, SUB, MAIN);
        let mut ledger = MemoryLedger::new();
        let err = bank
            .burn_vouchers(
                &mut ledger,
                &channels(),
                &BurnRequest {
                    owner: BOB,
                    voucher: TOKEN,
                    receiver: ALICE,
                    amount: 1,
                    fee: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownVoucher { .. }));
    }

    #[test]
    fn test_unlock_releases_collateral() {
        let mut bank = TokenBank::new(TokenKind::Native, MAIN, MAIN);
        let mut ledger = funded_ledger();
        bank.lock_tokens(&mut ledger, &channels(), &lock(Asset::Native, 100))
            .unwrap();

        bank.unlock_tokens(&mut ledger, SUB, &Denom::native(MAIN), BOB, 60, 1)
            .unwrap();
        assert_eq!(ledger.balance_of(&BOB, &Asset::Native), 60);
        assert_eq!(bank.total_locked(SUB, &Denom::native(MAIN)), 40);
        assert_eq!(bank.max_processed_voucher_burn_nonce(SUB), 1);
        assert_eq!(bank.token_unlock_nonce(SUB), 1);
    }

    #[test]
    fn test_unlock_beyond_collateral_is_fatal_and_inert() {
        let mut bank = TokenBank::new(TokenKind::Native, MAIN, MAIN);
        let mut ledger = funded_ledger();
        bank.lock_tokens(&mut ledger, &channels(), &lock(Asset::Native, 100))
            .unwrap();
        bank.take_events();
        let before = ledger.clone();

        let err = bank
            .unlock_tokens(&mut ledger, SUB, &Denom::native(MAIN), BOB, 101, 1)
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::InsufficientCollateral {
                chain: SUB,
                locked: 100,
                requested: 101
            }
        );
        assert!(err.is_fatal());
        assert_eq!(ledger, before);
        assert_eq!(bank.max_processed_voucher_burn_nonce(SUB), 0);
        assert!(bank.take_events().is_empty());
    }

    #[test]
    fn test_unlock_of_foreign_denom_rejected() {
        let mut bank = TokenBank::new(TokenKind::Native, MAIN, MAIN);
        let mut ledger = MemoryLedger::new();
        let err = bank
            .unlock_tokens(&mut ledger, SUB, &Denom::native(SUB), BOB, 1, 1)
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::WrongChain {
                expected: MAIN,
                actual: SUB
            }
        );
    }

    #[test]
    fn test_execute_routes_by_bank() {
        let mut bank = TokenBank::new(TokenKind::Native, SUB, MAIN);
        let mut ledger = MemoryLedger::new();
        let tx = SystemTransaction {
            bank: TokenKind::Fungible,
            proposer: [0u8; 20],
            call: SystemCall::MintVouchers {
                source_chain: MAIN,
                denom: Denom::native(MAIN),
                receiver: BOB,
                amount: 1,
                dynasty: 1,
                source_nonce: 1,
            },
        };
        assert!(matches!(
            bank.execute(&mut ledger, &tx),
            Err(BridgeError::TokenKindMismatch { .. })
        ));
        let tx = SystemTransaction {
            bank: TokenKind::Native,
            ..tx
        };
        assert!(matches!(
            bank.execute(&mut ledger, &tx).unwrap(),
            BankEvent::VoucherMinted { amount: 1, .. }
        ));
    }
}
