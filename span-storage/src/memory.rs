use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StorageError;
use crate::traits::{BatchOp, KvPairs, KvStore};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory store for dev nodes and tests.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Table>, StorageError> {
        self.data.read().map_err(|e| StorageError::LockPoisoned {
            reason: e.to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Table>, StorageError> {
        self.data.write().map_err(|e| StorageError::LockPoisoned {
            reason: e.to_string(),
        })
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.write()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.write()?.remove(key);
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        Ok(self
            .read()?
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        // One write guard for the whole batch, so readers never see half of it.
        let mut table = self.write()?;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    table.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    table.remove(&key);
                }
            }
        }
        Ok(())
    }
}
