//! In-memory ordered store for tests and light tooling.

use crate::error::StoreError;
use crate::store::{BatchOp, SeekDirection, Store, WriteBatch};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A `BTreeMap`-backed store. Batches hold the write lock for their whole
/// application, which makes them atomic with respect to readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn seek(
        &self,
        prefix: &[u8],
        direction: SeekDirection,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let entries = self.entries.read();
        let mut matches: Vec<(Vec<u8>, Vec<u8>)> = entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if direction == SeekDirection::Backward {
            matches.reverse();
        }
        Ok(matches)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        for op in batch.ops {
            match op {
                BatchOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn test_seek_is_prefix_bounded_and_ordered() {
        let store = MemoryStore::new();
        store.put(b"aa", b"1").unwrap();
        store.put(b"ab", b"2").unwrap();
        store.put(b"b", b"3").unwrap();

        let forward = store.seek(b"a", SeekDirection::Forward).unwrap();
        assert_eq!(forward.len(), 2);
        assert_eq!(forward[0].0, b"aa".to_vec());
        assert_eq!(forward[1].0, b"ab".to_vec());

        let backward = store.seek(b"a", SeekDirection::Backward).unwrap();
        assert_eq!(backward[0].0, b"ab".to_vec());
    }

    #[test]
    fn test_batch_applies_in_order() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), b"1".to_vec());
        batch.delete(b"k".to_vec());
        batch.put(b"k".to_vec(), b"2".to_vec());
        store.write_batch(batch).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"2".to_vec()));
    }
}
