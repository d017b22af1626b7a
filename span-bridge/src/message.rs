use borsh::BorshDeserialize;

use span_crypto::hash::blake3_hash_parts;
use span_types::bridge::{
    BankEvent, CrossChainTransferEvent, InterChainMessage, TransferKind, TransferPayload,
};
use span_types::denom::{Denom, TokenKind};
use span_types::error::SpanError;
use span_types::primitives::{BlockHeight, ChainId, Hash};

use crate::error::BridgeError;

const EVENT_DIGEST_CONTEXT: &str = "span bridge event v1";
const OUTBOUND_TX_CONTEXT: &str = "span outbound tx v1";

/// Decode a raw message into a typed event.
///
/// Payload decoding comes first, then denom syntax (`MalformedDenom`), then
/// the kind tag (`UnknownTokenKind`). No bank-specific checks happen here.
pub fn parse_transfer_event(
    msg: &InterChainMessage,
) -> Result<CrossChainTransferEvent, BridgeError> {
    let payload = TransferPayload::try_from_slice(&msg.payload).map_err(|e| {
        BridgeError::InvalidMessage {
            reason: format!("undecodable payload: {e}"),
        }
    })?;
    let denom = Denom::parse(&payload.denom)?;

    Ok(CrossChainTransferEvent {
        kind: msg.kind,
        source_chain: msg.source_chain,
        target_chain: msg.target_chain,
        denom,
        sender: payload.sender,
        receiver: payload.receiver,
        amount: payload.amount,
        nonce: payload.nonce,
    })
}

/// Check that a typed event can be processed by the `bank` bank.
pub fn validate_for_bank(
    event: &CrossChainTransferEvent,
    bank: TokenKind,
) -> Result<(), BridgeError> {
    if event.denom.kind != bank {
        return Err(BridgeError::TokenKindMismatch {
            bank,
            actual: event.denom.kind,
        });
    }
    validate_structure(event)
}

/// Parse and validate in one go, in the order the checks are specified.
pub fn parse_for_bank(
    msg: &InterChainMessage,
    bank: TokenKind,
) -> Result<CrossChainTransferEvent, BridgeError> {
    let event = parse_transfer_event(msg)?;
    validate_for_bank(&event, bank)?;
    Ok(event)
}

fn validate_structure(event: &CrossChainTransferEvent) -> Result<(), BridgeError> {
    if event.amount == 0 {
        return Err(SpanError::InvalidAmount.into());
    }
    if event.nonce == 0 {
        return Err(BridgeError::InvalidMessage {
            reason: "nonce 0 is never assigned".to_string(),
        });
    }
    if event.source_chain == event.target_chain {
        return Err(BridgeError::InvalidMessage {
            reason: format!("source and target are both chain {}", event.source_chain),
        });
    }
    // Locks move origin assets out; burns send vouchers home.
    let (expected_origin, side) = match event.kind {
        TransferKind::TokenLock => (event.source_chain, "source"),
        TransferKind::VoucherBurn => (event.target_chain, "target"),
    };
    if event.denom.origin_chain != expected_origin {
        return Err(BridgeError::InvalidMessage {
            reason: format!(
                "{:?} of {} must originate on the {side} chain {expected_origin}",
                event.kind, event.denom
            ),
        });
    }
    Ok(())
}

/// Digest that identifies an event inside the attestation ledger.
pub fn event_digest(event: &CrossChainTransferEvent) -> Hash {
    let kind = [match event.kind {
        TransferKind::TokenLock => 0u8,
        TransferKind::VoucherBurn => 1u8,
    }];
    let denom = event.denom.to_string();
    blake3_hash_parts(
        EVENT_DIGEST_CONTEXT,
        &[
            &kind,
            &event.source_chain.to_le_bytes(),
            &event.target_chain.to_le_bytes(),
            denom.as_bytes(),
            &event.sender,
            &event.receiver,
            &event.amount.to_le_bytes(),
            &event.nonce.to_le_bytes(),
        ],
    )
}

/// Turn a locally emitted lock or burn into the message a foreign chain's
/// watcher consumes. Mint and unlock events have no outbound counterpart.
pub fn outbound_message(
    local_chain: ChainId,
    height: BlockHeight,
    event: &BankEvent,
) -> Result<Option<InterChainMessage>, BridgeError> {
    let (kind, target_chain, payload) = match event {
        BankEvent::TokenLocked {
            denom,
            sender,
            target_chain,
            receiver,
            amount,
            nonce,
        } => (
            TransferKind::TokenLock,
            *target_chain,
            TransferPayload {
                denom: denom.to_string(),
                sender: *sender,
                receiver: *receiver,
                amount: *amount,
                nonce: *nonce,
            },
        ),
        BankEvent::VoucherBurned {
            denom,
            owner,
            target_chain,
            receiver,
            amount,
            nonce,
            ..
        } => (
            TransferKind::VoucherBurn,
            *target_chain,
            TransferPayload {
                denom: denom.to_string(),
                sender: *owner,
                receiver: *receiver,
                amount: *amount,
                nonce: *nonce,
            },
        ),
        BankEvent::TokenUnlocked { .. } | BankEvent::VoucherMinted { .. } => return Ok(None),
    };

    let tx_hash = blake3_hash_parts(
        OUTBOUND_TX_CONTEXT,
        &[
            &local_chain.to_le_bytes(),
            &height.to_le_bytes(),
            payload.denom.as_bytes(),
            &payload.nonce.to_le_bytes(),
        ],
    );
    let msg = InterChainMessage::new(local_chain, target_chain, kind, height, tx_hash, &payload)?;
    Ok(Some(msg))
}
