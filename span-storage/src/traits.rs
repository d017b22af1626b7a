use std::sync::Arc;

use crate::error::StorageError;

/// Ordered list of key-value pairs returned by a prefix scan.
pub type KvPairs = Vec<(Vec<u8>, Vec<u8>)>;

/// One write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Byte-oriented key-value store.
///
/// Keys are compared bytewise, so big-endian integer suffixes scan in
/// numeric order.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;
    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError>;

    /// Apply every op or none of them.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError>;

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        (**self).delete(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        (**self).prefix_scan(prefix)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        (**self).write_batch(ops)
    }
}

impl KvStore for Box<dyn KvStore> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        (**self).delete(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        (**self).prefix_scan(prefix)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        (**self).write_batch(ops)
    }
}
