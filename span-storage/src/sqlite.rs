use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use crate::error::StorageError;
use crate::traits::{BatchOp, KvPairs, KvStore};

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS entries (
        key   BLOB PRIMARY KEY,
        value BLOB NOT NULL
    ) WITHOUT ROWID;
";

/// SQLite-backed store with a single `entries` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::init(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|e| StorageError::LockPoisoned {
            reason: e.to_string(),
        })
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT value FROM entries WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO entries (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.conn()?
            .execute("DELETE FROM entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached("SELECT key, value FROM entries WHERE key >= ?1 ORDER BY key")?;
        let mut rows = stmt.query(params![prefix])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let key: Vec<u8> = row.get(0)?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key, row.get(1)?));
        }
        Ok(out)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO entries (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                }
                BatchOp::Delete { key } => {
                    tx.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_overwrite_delete() {
        let store = SqliteStore::in_memory().unwrap();
        store.put(b"k", b"v1").unwrap();
        store.put(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
        store.delete(b"k").unwrap();
        assert!(!store.exists(b"k").unwrap());
    }

    #[test]
    fn test_prefix_scan_stops_at_prefix_boundary() {
        let store = SqliteStore::in_memory().unwrap();
        store.put(b"a:1", b"1").unwrap();
        store.put(b"a:2", b"2").unwrap();
        store.put(b"b:1", b"3").unwrap();
        let rows = store.prefix_scan(b"a:").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, b"a:2".to_vec());
        assert!(store.prefix_scan(b"c:").unwrap().is_empty());
    }

    #[test]
    fn test_batch_commits_atomically() {
        let store = SqliteStore::in_memory().unwrap();
        store.put(b"gone", b"x").unwrap();
        store
            .write_batch(vec![
                BatchOp::put(b"x".to_vec(), b"1".to_vec()),
                BatchOp::Delete {
                    key: b"gone".to_vec(),
                },
            ])
            .unwrap();
        assert_eq!(store.get(b"x").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"gone").unwrap(), None);
    }

    #[test]
    fn test_reopen_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("span.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(b"height", &7u64.to_be_bytes()).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.get(b"height").unwrap(),
            Some(7u64.to_be_bytes().to_vec())
        );
    }
}
