use crate::primitives::{Amount, ChainId};
use std::time::Duration;

// ─── Chain Identity ──────────────────────────────────────────────────────────

/// Default mainchain identifier.
pub const DEFAULT_MAINCHAIN_ID: ChainId = 366;

/// Default subchain identifier used by the dev network.
pub const DEFAULT_SUBCHAIN_ID: ChainId = 360_777;

// ─── Dynasty Parameters ──────────────────────────────────────────────────────

/// Number of blocks per dynasty. The dynasty at height `h` is `h / 100 + 1`.
pub const DYNASTY_LENGTH: u64 = 100;

/// Quorum fraction numerator. Finalization needs strictly more than 2/3 of stake.
pub const QUORUM_NUMERATOR: u128 = 2;

/// Quorum fraction denominator.
pub const QUORUM_DENOMINATOR: u128 = 3;

/// How many past dynasties are retained for lookups.
pub const DYNASTY_HISTORY: usize = 16;

/// Executed nonces per route whose finalized voting records are kept, so a
/// late vote for one of them is answered with `AlreadyFinalized`. Older
/// records are pruned.
pub const FINALIZED_VOTE_RETENTION: u64 = 64;

// ─── Bank Parameters ─────────────────────────────────────────────────────────

/// Number of decimal places for the native coin.
pub const NATIVE_DECIMALS: u32 = 18;

/// One full native coin in base units (10^18).
pub const ONE_COIN: Amount = 1_000_000_000_000_000_000;

/// Default flat fee charged on every lock and burn, in native base units.
pub const DEFAULT_CROSS_CHAIN_FEE: Amount = ONE_COIN / 10;

/// Maximum byte length of a denom string.
pub const MAX_DENOM_LEN: usize = 96;

/// Kind tag for the native coin inside a denom.
pub const NATIVE_KIND_TAG: u8 = 0;

/// Kind tag for fungible tokens inside a denom.
pub const FUNGIBLE_KIND_TAG: u8 = 1;

// ─── Watcher Parameters ──────────────────────────────────────────────────────

/// Blocks a foreign event must be buried under before a validator attests to it.
pub const DEFAULT_CONFIRMATION_DEPTH: u64 = 6;

/// Default delay between polls once a watcher has caught up.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum number of foreign blocks fetched in one poll.
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 500;

// ─── Block Production ────────────────────────────────────────────────────────

/// Target time between local blocks.
pub const BLOCK_TIME_TARGET: Duration = Duration::from_secs(3);

/// Maximum number of attestations and calls in one block.
pub const MAX_ITEMS_PER_BLOCK: usize = 4_096;
