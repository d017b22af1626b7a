/// 32-byte BLAKE3 hash.
pub type Hash = [u8; 32];

/// 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// 20-byte address derived from BLAKE3(pubkey)[0..20].
pub type Address = [u8; 20];

/// Numeric chain identifier (mainchain and subchains alike).
pub type ChainId = u64;

/// Per-route sequence number. The first assigned nonce on a route is 1.
pub type Nonce = u64;

/// Validator-set epoch identifier.
pub type DynastyId = u64;

/// Block height on the local chain.
pub type BlockHeight = u64;

/// Amount of coins or tokens in base units.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// The all-zero address. Used as the asset address of the native coin.
pub const ZERO_ADDRESS: Address = [0u8; 20];

/// Format an address as `0x`-prefixed lowercase hex.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Parse a `0x`-prefixed (or bare) hex address.
pub fn parse_address(s: &str) -> Option<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// Serde helper for [u8; 64] fields.
pub mod serde_sig {
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<u8> = Vec::deserialize(deserializer)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes for signature"))
    }
}

/// Serde helper that renders a 20-byte address as a hex string.
pub mod serde_address {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_address(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 20], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_address(&s)
            .ok_or_else(|| serde::de::Error::custom("expected 20-byte hex address"))
    }
}
