use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("lock poisoned: {reason}")]
    LockPoisoned { reason: String },

    #[error("SQLite error: {reason}")]
    SqliteError { reason: String },

    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    #[error("deserialization error: {reason}")]
    DeserializationError { reason: String },

    #[error("corrupt record under key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::SqliteError {
            reason: err.to_string(),
        }
    }
}
