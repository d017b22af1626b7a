use span_types::bridge::{CrossChainTransferEvent, SystemCall, SystemTransaction, TransferKind};
use span_types::denom::TokenKind;
use span_types::primitives::{Address, DynastyId};

use crate::error::BridgeError;

/// Build the system transaction that executes a finalized event.
///
/// A foreign lock becomes a voucher mint and a foreign burn becomes an
/// unlock. The transaction is routed to `bank`, which must match the kind of
/// the event's denom.
pub fn build_proxy_transaction(
    event: &CrossChainTransferEvent,
    bank: TokenKind,
    dynasty: DynastyId,
    proposer: Address,
) -> Result<SystemTransaction, BridgeError> {
    if event.denom.kind != bank {
        return Err(BridgeError::TokenKindMismatch {
            bank,
            actual: event.denom.kind,
        });
    }

    let call = match event.kind {
        TransferKind::TokenLock => SystemCall::MintVouchers {
            source_chain: event.source_chain,
            denom: event.denom.clone(),
            receiver: event.receiver,
            amount: event.amount,
            dynasty,
            source_nonce: event.nonce,
        },
        TransferKind::VoucherBurn => SystemCall::UnlockTokens {
            source_chain: event.source_chain,
            denom: event.denom.clone(),
            receiver: event.receiver,
            amount: event.amount,
            dynasty,
            source_nonce: event.nonce,
        },
    };

    Ok(SystemTransaction {
        bank,
        proposer,
        call,
    })
}
