use span_types::denom::{Denom, TokenKind};
use span_types::primitives::{Address, ChainId, PublicKey};

use crate::hash::{blake3_hash, blake3_hash_parts};

const VOUCHER_CONTEXT: &str = "span voucher address v1";
const ESCROW_CONTEXT: &str = "span bank escrow v1";
const STAKING_CONTEXT: &str = "span staking escrow v1";

/// Derive an address from a public key.
/// Address = BLAKE3(pubkey)[0..20]
pub fn pubkey_to_address(pubkey: &PublicKey) -> Address {
    truncate(&blake3_hash(pubkey))
}

/// Deterministic address of the voucher program a bank deploys for `denom`.
pub fn voucher_address(deployer: &Address, denom: &Denom) -> Address {
    let denom = denom.to_string();
    truncate(&blake3_hash_parts(
        VOUCHER_CONTEXT,
        &[deployer, denom.as_bytes()],
    ))
}

/// Escrow account that holds a bank's locked collateral on `chain`.
pub fn bank_escrow_address(chain: ChainId, kind: TokenKind) -> Address {
    truncate(&blake3_hash_parts(
        ESCROW_CONTEXT,
        &[&chain.to_le_bytes(), &[kind.tag()]],
    ))
}

/// Account holding bonded validator stake on `chain`.
pub fn staking_escrow_address(chain: ChainId) -> Address {
    truncate(&blake3_hash_parts(STAKING_CONTEXT, &[&chain.to_le_bytes()]))
}

fn truncate(hash: &[u8; 32]) -> Address {
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[..20]);
    address
}
