use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;

use span_bridge::attestation::attestation_signing_data;
use span_bridge::engine::BridgeEngine;
use span_bridge::ledger::{AssetLedger, MemoryLedger};
use span_bridge::message::outbound_message;
use span_crypto::keys::verify;
use span_storage::bridge_store::BridgeStore;
use span_storage::traits::KvStore;
use span_types::bridge::{Asset, Attestation, TransferKind, UserCall};
use span_types::constants::DEFAULT_MAX_BLOCK_RANGE;
use span_types::denom::{Denom, TokenKind};
use span_types::primitives::{format_address, parse_address, Address};

use super::types::{
    BankInfo, ChannelInfo, DenomEntry, DynastyInfo, MessageInfo, StatusInfo, SubmitResult,
    VotingRecordInfo,
};
use crate::mempool::Mempool;
use crate::metrics::NodeMetrics;

/// JSON-RPC trait for the bridge node.
#[rpc(server)]
pub trait BridgeRpc {
    /// Height of the last executed block.
    #[method(name = "bridge_blockNumber")]
    async fn block_number(&self) -> Result<u64, ErrorObjectOwned>;

    /// Node and engine status.
    #[method(name = "bridge_getStatus")]
    async fn get_status(&self) -> Result<StatusInfo, ErrorObjectOwned>;

    /// Outbound messages emitted in blocks `from..=to`.
    #[method(name = "bridge_getMessages")]
    async fn get_messages(&self, from: u64, to: u64) -> Result<Vec<MessageInfo>, ErrorObjectOwned>;

    /// Denom represented by a voucher.
    #[method(name = "bridge_getDenom")]
    async fn get_denom(&self, kind: String, voucher: String)
        -> Result<Option<String>, ErrorObjectOwned>;

    /// Voucher representing a denom.
    #[method(name = "bridge_getVoucher")]
    async fn get_voucher(&self, kind: String, denom: String)
        -> Result<Option<String>, ErrorObjectOwned>;

    /// Whether a denom has a registered voucher.
    #[method(name = "bridge_exists")]
    async fn exists(&self, kind: String, denom: String) -> Result<bool, ErrorObjectOwned>;

    /// Highest executed lock nonce from `chain`.
    #[method(name = "bridge_maxProcessedTokenLockNonce")]
    async fn max_processed_token_lock_nonce(
        &self,
        kind: String,
        chain: u64,
    ) -> Result<u64, ErrorObjectOwned>;

    /// Highest executed burn nonce from `chain`.
    #[method(name = "bridge_maxProcessedVoucherBurnNonce")]
    async fn max_processed_voucher_burn_nonce(
        &self,
        kind: String,
        chain: u64,
    ) -> Result<u64, ErrorObjectOwned>;

    /// Collateral locked toward `chain` for a denom, as a decimal string.
    #[method(name = "bridge_totalLocked")]
    async fn total_locked(
        &self,
        kind: String,
        chain: u64,
        denom: String,
    ) -> Result<String, ErrorObjectOwned>;

    /// The active dynasty.
    #[method(name = "bridge_getDynasty")]
    async fn get_dynasty(&self) -> Result<DynastyInfo, ErrorObjectOwned>;

    /// Escrow and registered denoms of a bank.
    #[method(name = "bridge_getBankInfo")]
    async fn get_bank_info(&self, kind: String) -> Result<BankInfo, ErrorObjectOwned>;

    /// Channels to foreign chains.
    #[method(name = "bridge_getChannels")]
    async fn get_channels(&self) -> Result<Vec<ChannelInfo>, ErrorObjectOwned>;

    /// Voting records for one event nonce. `direction` is "token_lock" or
    /// "voucher_burn". Conflicting digests for the same nonce each get an entry.
    #[method(name = "bridge_getVotingRecords")]
    async fn get_voting_records(
        &self,
        kind: String,
        direction: String,
        chain: u64,
        nonce: u64,
    ) -> Result<Vec<VotingRecordInfo>, ErrorObjectOwned>;

    /// Bonded stake of a validator, as a decimal string.
    #[method(name = "bridge_getStake")]
    async fn get_stake(&self, address: String) -> Result<String, ErrorObjectOwned>;

    /// Balance of `address` in `asset` ("native" or a token address).
    #[method(name = "bridge_getBalance")]
    async fn get_balance(&self, address: String, asset: String)
        -> Result<String, ErrorObjectOwned>;

    /// Queue a user call (hex-encoded borsh bytes) for the next block.
    #[method(name = "bridge_submitCall")]
    async fn submit_call(&self, call: String) -> Result<SubmitResult, ErrorObjectOwned>;

    /// Queue a signed attestation (hex-encoded borsh bytes) for the next block.
    #[method(name = "bridge_submitAttestation")]
    async fn submit_attestation(&self, attestation: String)
        -> Result<SubmitResult, ErrorObjectOwned>;

    /// Node metrics in Prometheus text exposition format.
    #[method(name = "bridge_getMetrics")]
    async fn get_metrics(&self) -> Result<String, ErrorObjectOwned>;
}

/// Implementation of the BridgeRpc trait.
pub struct BridgeRpcImpl {
    pub engine: Arc<RwLock<BridgeEngine<MemoryLedger>>>,
    pub store: Arc<BridgeStore<Arc<dyn KvStore>>>,
    pub mempool: Arc<Mutex<Mempool>>,
    pub metrics: Arc<NodeMetrics>,
}

fn invalid_params(msg: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32602, msg.into(), None::<()>)
}

fn internal_error(msg: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32603, msg.into(), None::<()>)
}

fn parse_kind(kind: &str) -> Result<TokenKind, ErrorObjectOwned> {
    kind.parse::<TokenKind>()
        .map_err(|e| invalid_params(format!("invalid token kind '{}': {}", kind, e)))
}

fn parse_denom(denom: &str) -> Result<Denom, ErrorObjectOwned> {
    Denom::parse(denom).map_err(|e| invalid_params(format!("invalid denom: {}", e)))
}

fn parse_direction(direction: &str) -> Result<TransferKind, ErrorObjectOwned> {
    match direction {
        "token_lock" => Ok(TransferKind::TokenLock),
        "voucher_burn" => Ok(TransferKind::VoucherBurn),
        other => Err(invalid_params(format!("invalid direction '{}'", other))),
    }
}

fn parse_address_hex(hex_str: &str) -> Result<Address, ErrorObjectOwned> {
    parse_address(hex_str).ok_or_else(|| invalid_params("address must be 20 bytes of hex"))
}

fn parse_asset(asset: &str) -> Result<Asset, ErrorObjectOwned> {
    if asset == "native" {
        return Ok(Asset::Native);
    }
    Ok(Asset::Token(parse_address_hex(asset)?))
}

fn decode_hex_borsh<T: borsh::BorshDeserialize>(
    hex_str: &str,
    what: &str,
) -> Result<T, ErrorObjectOwned> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| invalid_params(format!("invalid hex: {}", e)))?;
    borsh::from_slice(&bytes).map_err(|e| invalid_params(format!("invalid {}: {}", what, e)))
}

#[async_trait]
impl BridgeRpcServer for BridgeRpcImpl {
    async fn block_number(&self) -> Result<u64, ErrorObjectOwned> {
        Ok(self.engine.read().await.height())
    }

    async fn get_status(&self) -> Result<StatusInfo, ErrorObjectOwned> {
        let mempool_size = self.mempool.lock().await.total_size();
        let engine = self.engine.read().await;
        Ok(StatusInfo {
            chain_id: engine.local_chain(),
            mainchain_id: engine.mainchain_id(),
            height: engine.height(),
            dynasty: engine.current_dynasty().id,
            deferred_events: engine.deferred_count(),
            pending_votes: engine.quorum().pending_count(),
            mempool_size,
            cross_chain_fee: engine.channels().cross_chain_fee().to_string(),
        })
    }

    async fn get_messages(&self, from: u64, to: u64) -> Result<Vec<MessageInfo>, ErrorObjectOwned> {
        if to < from {
            return Err(invalid_params("'to' must not be below 'from'"));
        }
        let to = to.min(from.saturating_add(DEFAULT_MAX_BLOCK_RANGE - 1));
        let local_chain = self.engine.read().await.local_chain();

        let blocks = self
            .store
            .events_in_range(from, to)
            .map_err(|e| internal_error(format!("storage error: {}", e)))?;

        let mut out = Vec::new();
        for (height, events) in blocks {
            for event in &events {
                let msg = outbound_message(local_chain, height, event)
                    .map_err(|e| internal_error(e.to_string()))?;
                if let Some(msg) = msg {
                    out.push(MessageInfo::from(&msg));
                }
            }
        }
        Ok(out)
    }

    async fn get_denom(
        &self,
        kind: String,
        voucher: String,
    ) -> Result<Option<String>, ErrorObjectOwned> {
        let kind = parse_kind(&kind)?;
        let voucher = parse_address_hex(&voucher)?;
        let engine = self.engine.read().await;
        Ok(engine.get_denom(kind, &voucher).map(|d| d.to_string()))
    }

    async fn get_voucher(
        &self,
        kind: String,
        denom: String,
    ) -> Result<Option<String>, ErrorObjectOwned> {
        let kind = parse_kind(&kind)?;
        let denom = parse_denom(&denom)?;
        let engine = self.engine.read().await;
        Ok(engine.get_voucher(kind, &denom).map(|v| format_address(&v)))
    }

    async fn exists(&self, kind: String, denom: String) -> Result<bool, ErrorObjectOwned> {
        let kind = parse_kind(&kind)?;
        let denom = parse_denom(&denom)?;
        Ok(self.engine.read().await.bank(kind).exists_denom(&denom))
    }

    async fn max_processed_token_lock_nonce(
        &self,
        kind: String,
        chain: u64,
    ) -> Result<u64, ErrorObjectOwned> {
        let kind = parse_kind(&kind)?;
        Ok(self
            .engine
            .read()
            .await
            .max_processed_token_lock_nonce(kind, chain))
    }

    async fn max_processed_voucher_burn_nonce(
        &self,
        kind: String,
        chain: u64,
    ) -> Result<u64, ErrorObjectOwned> {
        let kind = parse_kind(&kind)?;
        Ok(self
            .engine
            .read()
            .await
            .max_processed_voucher_burn_nonce(kind, chain))
    }

    async fn total_locked(
        &self,
        kind: String,
        chain: u64,
        denom: String,
    ) -> Result<String, ErrorObjectOwned> {
        let kind = parse_kind(&kind)?;
        let denom = parse_denom(&denom)?;
        let engine = self.engine.read().await;
        Ok(engine.total_locked(kind, chain, &denom).to_string())
    }

    async fn get_dynasty(&self) -> Result<DynastyInfo, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(DynastyInfo::new(
            engine.current_dynasty(),
            engine.dynasty_schedule().dynasty_length(),
        ))
    }

    async fn get_bank_info(&self, kind: String) -> Result<BankInfo, ErrorObjectOwned> {
        let kind = parse_kind(&kind)?;
        let engine = self.engine.read().await;
        let bank = engine.bank(kind);
        let denoms = bank
            .denoms()
            .iter()
            .filter_map(|d| {
                bank.get_voucher(d).map(|v| DenomEntry {
                    denom: d.to_string(),
                    voucher: format_address(&v),
                })
            })
            .collect();
        Ok(BankInfo {
            kind: kind.to_string(),
            escrow: format_address(&bank.escrow()),
            is_on_mainchain: bank.is_on_mainchain(),
            mainchain_id: bank.mainchain_id(),
            denoms,
        })
    }

    async fn get_channels(&self) -> Result<Vec<ChannelInfo>, ErrorObjectOwned> {
        let engine = self.engine.read().await;
        Ok(engine
            .channels()
            .channels()
            .map(|(chain_id, active)| ChannelInfo { chain_id, active })
            .collect())
    }

    async fn get_voting_records(
        &self,
        kind: String,
        direction: String,
        chain: u64,
        nonce: u64,
    ) -> Result<Vec<VotingRecordInfo>, ErrorObjectOwned> {
        let kind = parse_kind(&kind)?;
        let direction = parse_direction(&direction)?;
        let engine = self.engine.read().await;
        Ok(engine
            .quorum()
            .records_for(kind, direction, chain, nonce)
            .into_iter()
            .map(|(key, record)| VotingRecordInfo::new(key, record))
            .collect())
    }

    async fn get_stake(&self, address: String) -> Result<String, ErrorObjectOwned> {
        let address = parse_address_hex(&address)?;
        Ok(self.engine.read().await.stakes().stake_of(&address).to_string())
    }

    async fn get_balance(
        &self,
        address: String,
        asset: String,
    ) -> Result<String, ErrorObjectOwned> {
        let address = parse_address_hex(&address)?;
        let asset = parse_asset(&asset)?;
        let engine = self.engine.read().await;
        Ok(engine.ledger().balance_of(&address, &asset).to_string())
    }

    async fn submit_call(&self, call_hex: String) -> Result<SubmitResult, ErrorObjectOwned> {
        let call: UserCall = decode_hex_borsh(&call_hex, "call")?;
        let mut mempool = self.mempool.lock().await;
        match mempool.add_call(call) {
            Ok(()) => Ok(SubmitResult::accepted()),
            Err(e) => Ok(SubmitResult::rejected(e.to_string())),
        }
    }

    async fn submit_attestation(
        &self,
        attestation_hex: String,
    ) -> Result<SubmitResult, ErrorObjectOwned> {
        let att: Attestation = decode_hex_borsh(&attestation_hex, "attestation")?;
        let data = attestation_signing_data(att.dynasty, &att.event);
        if let Err(e) = verify(&data, &att.signature, &att.validator) {
            return Ok(SubmitResult::rejected(format!("bad signature: {}", e)));
        }

        let mut mempool = self.mempool.lock().await;
        match mempool.add_attestation(att) {
            Ok(true) => Ok(SubmitResult::accepted()),
            Ok(false) => Ok(SubmitResult::rejected("duplicate attestation")),
            Err(e) => Ok(SubmitResult::rejected(e.to_string())),
        }
    }

    async fn get_metrics(&self) -> Result<String, ErrorObjectOwned> {
        self.metrics
            .encode()
            .map_err(|e| internal_error(format!("failed to encode metrics: {}", e)))
    }
}
