use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{FUNGIBLE_KIND_TAG, MAX_DENOM_LEN, NATIVE_KIND_TAG};
use crate::error::SpanError;
use crate::primitives::{format_address, Address, ChainId, ZERO_ADDRESS};

/// The asset class a bank handles.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// The chain's native coin.
    Native,
    /// A fungible token program.
    Fungible,
}

impl TokenKind {
    /// Numeric tag used inside denom strings.
    pub fn tag(self) -> u8 {
        match self {
            TokenKind::Native => NATIVE_KIND_TAG,
            TokenKind::Fungible => FUNGIBLE_KIND_TAG,
        }
    }

    /// Map a numeric tag back to a kind.
    pub fn from_tag(tag: u64) -> Result<Self, SpanError> {
        match tag {
            t if t == NATIVE_KIND_TAG as u64 => Ok(TokenKind::Native),
            t if t == FUNGIBLE_KIND_TAG as u64 => Ok(TokenKind::Fungible),
            _ => Err(SpanError::UnknownTokenKind { tag }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Native => "native",
            TokenKind::Fungible => "fungible",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = SpanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(TokenKind::Native),
            "fungible" => Ok(TokenKind::Fungible),
            other => match parse_canonical_u64(other) {
                Some(tag) => TokenKind::from_tag(tag),
                None => Err(SpanError::UnknownTokenKind { tag: u64::MAX }),
            },
        }
    }
}

/// Canonical cross-chain asset identifier.
///
/// Rendered as `{origin_chain}/{kind_tag}/0x{asset}` where the asset is 40
/// lowercase hex digits. The native coin always carries the zero address, so
/// there is exactly one native denom per chain.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct Denom {
    /// Chain the asset was originally issued on.
    pub origin_chain: ChainId,
    /// Asset class.
    pub kind: TokenKind,
    /// Program address of the asset on its origin chain.
    pub asset: Address,
}

impl Denom {
    /// The native coin of `chain`.
    pub fn native(chain: ChainId) -> Self {
        Self {
            origin_chain: chain,
            kind: TokenKind::Native,
            asset: ZERO_ADDRESS,
        }
    }

    /// A fungible token issued at `asset` on `chain`.
    pub fn fungible(chain: ChainId, asset: Address) -> Self {
        Self {
            origin_chain: chain,
            kind: TokenKind::Fungible,
            asset,
        }
    }

    /// Parse a denom string.
    ///
    /// Syntax problems surface as `MalformedDenom`. A well-formed tag that
    /// names no known kind surfaces as `UnknownTokenKind`.
    pub fn parse(s: &str) -> Result<Self, SpanError> {
        let malformed = |reason: &str| SpanError::MalformedDenom {
            denom: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(malformed("empty denom"));
        }
        if s.len() > MAX_DENOM_LEN {
            return Err(malformed("denom too long"));
        }

        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 3 {
            return Err(malformed("expected three '/'-separated segments"));
        }

        let origin_chain = parse_canonical_u64(parts[0])
            .ok_or_else(|| malformed("origin chain is not a canonical decimal integer"))?;
        let tag = parse_canonical_u64(parts[1])
            .ok_or_else(|| malformed("kind tag is not a canonical decimal integer"))?;
        let asset = parse_canonical_address(parts[2])
            .ok_or_else(|| malformed("asset must be 0x followed by 40 lowercase hex digits"))?;

        let kind = TokenKind::from_tag(tag)?;
        if kind == TokenKind::Native && asset != ZERO_ADDRESS {
            return Err(malformed("native denom must carry the zero address"));
        }

        Ok(Self {
            origin_chain,
            kind,
            asset,
        })
    }
}

impl fmt::Display for Denom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.origin_chain,
            self.kind.tag(),
            format_address(&self.asset)
        )
    }
}

impl FromStr for Denom {
    type Err = SpanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Denom::parse(s)
    }
}

impl Serialize for Denom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Denom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        Denom::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Decimal digits only, no sign, no leading zeros.
fn parse_canonical_u64(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

fn parse_canonical_address(s: &str) -> Option<Address> {
    let digits = s.strip_prefix("0x")?;
    if digits.len() != 40
        || !digits
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return None;
    }
    let bytes = hex::decode(digits).ok()?;
    bytes.try_into().ok()
}
