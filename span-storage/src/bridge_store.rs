use borsh::BorshDeserialize;

use span_types::bridge::BankEvent;
use span_types::primitives::BlockHeight;

use crate::error::StorageError;
use crate::traits::{BatchOp, KvStore};

const SNAPSHOT_KEY: &[u8] = b"bridge:snapshot";
const HEIGHT_KEY: &[u8] = b"bridge:height";
const EVENTS_PREFIX: &[u8] = b"bridge:events:";

/// Persists the bridge engine state and the bank events of each block.
///
/// Everything written for one block goes through a single batch, so a crash
/// leaves either the previous block or the new one, never a mix.
pub struct BridgeStore<S: KvStore> {
    store: S,
}

impl<S: KvStore> BridgeStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record a committed block: its events and the engine snapshot after it.
    pub fn commit_block(
        &self,
        height: BlockHeight,
        snapshot: &[u8],
        events: &[BankEvent],
    ) -> Result<(), StorageError> {
        let encoded_events = borsh::to_vec(events).map_err(|e| StorageError::SerializationError {
            reason: e.to_string(),
        })?;
        let mut ops = vec![
            BatchOp::put(SNAPSHOT_KEY.to_vec(), snapshot.to_vec()),
            BatchOp::put(HEIGHT_KEY.to_vec(), height.to_be_bytes().to_vec()),
        ];
        if !events.is_empty() {
            ops.push(BatchOp::put(events_key(height), encoded_events));
        }
        self.store.write_batch(ops)
    }

    /// Height of the last committed block.
    pub fn latest_height(&self) -> Result<Option<BlockHeight>, StorageError> {
        match self.store.get(HEIGHT_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.try_into().map_err(|_| StorageError::Corrupt {
                    key: String::from_utf8_lossy(HEIGHT_KEY).into_owned(),
                    reason: "height is not 8 bytes".to_string(),
                })?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Latest engine snapshot together with the height it was taken at.
    pub fn load_snapshot(&self) -> Result<Option<(BlockHeight, Vec<u8>)>, StorageError> {
        let Some(height) = self.latest_height()? else {
            return Ok(None);
        };
        match self.store.get(SNAPSHOT_KEY)? {
            Some(bytes) => Ok(Some((height, bytes))),
            None => Err(StorageError::Corrupt {
                key: String::from_utf8_lossy(SNAPSHOT_KEY).into_owned(),
                reason: format!("height {height} recorded without a snapshot"),
            }),
        }
    }

    /// Bank events emitted in the block at `height`.
    pub fn load_events(&self, height: BlockHeight) -> Result<Vec<BankEvent>, StorageError> {
        match self.store.get(&events_key(height))? {
            Some(bytes) => decode_events(&bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Bank events for every block in `from..=to`, in height order.
    pub fn events_in_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> Result<Vec<(BlockHeight, Vec<BankEvent>)>, StorageError> {
        let mut out = Vec::new();
        for (key, value) in self.store.prefix_scan(EVENTS_PREFIX)? {
            let height = height_from_key(&key)?;
            if height < from {
                continue;
            }
            if height > to {
                break;
            }
            out.push((height, decode_events(&value)?));
        }
        Ok(out)
    }
}

fn events_key(height: BlockHeight) -> Vec<u8> {
    let mut key = Vec::with_capacity(EVENTS_PREFIX.len() + 8);
    key.extend_from_slice(EVENTS_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

fn height_from_key(key: &[u8]) -> Result<BlockHeight, StorageError> {
    let suffix = &key[EVENTS_PREFIX.len()..];
    let raw: [u8; 8] = suffix.try_into().map_err(|_| StorageError::Corrupt {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: "event key suffix is not a height".to_string(),
    })?;
    Ok(u64::from_be_bytes(raw))
}

fn decode_events(bytes: &[u8]) -> Result<Vec<BankEvent>, StorageError> {
    Vec::<BankEvent>::try_from_slice(bytes).map_err(|e| StorageError::DeserializationError {
        reason: e.to_string(),
    })
}
