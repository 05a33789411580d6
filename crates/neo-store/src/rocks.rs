//! RocksDB-backed store.

use crate::error::StoreError;
use crate::store::{BatchOp, SeekDirection, Store, WriteBatch};
use rocksdb::{IteratorMode, Options, DB};
use std::path::Path;
use tracing::info;

/// Embedded RocksDB store; the production backend.
pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    /// Open (creating if missing) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path.as_ref())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        info!(path = %path.as_ref().display(), "opened rocksdb store");
        Ok(Self { db })
    }
}

impl Store for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(key)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db
            .put(key, value)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db
            .delete(key)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn seek(
        &self,
        prefix: &[u8],
        direction: SeekDirection,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mode = IteratorMode::From(prefix, rocksdb::Direction::Forward);
        let mut matches = Vec::new();
        for item in self.db.iterator(mode) {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            matches.push((key.to_vec(), value.to_vec()));
        }
        if direction == SeekDirection::Backward {
            matches.reverse();
        }
        Ok(matches)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(key, value) => rocks_batch.put(key, value),
                BatchOp::Delete(key) => rocks_batch.delete(key),
            }
        }
        self.db
            .write(rocks_batch)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        store.put(b"key", b"value").unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));

        let mut batch = WriteBatch::new();
        batch.put(b"a1".to_vec(), b"1".to_vec());
        batch.put(b"a2".to_vec(), b"2".to_vec());
        batch.delete(b"key".to_vec());
        store.write_batch(batch).unwrap();

        assert_eq!(store.get(b"key").unwrap(), None);
        let found = store.seek(b"a", SeekDirection::Forward).unwrap();
        assert_eq!(found.len(), 2);
    }
}
