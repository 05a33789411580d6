//! Snapshot + write-back cache over the backend store.
//!
//! Reads populate per-key records; writes flip record states without
//! touching the backend until `commit`. Caches nest by cloning: a child
//! snapshot sees everything its parent saw and folds its own dirty
//! records back with `commit_into`. Block persistence executes every
//! transaction against one cache and flushes a single atomic batch.

use crate::error::StoreError;
use crate::keys::{StorageItem, StorageKey};
use crate::store::{SeekDirection, Store, WriteBatch};
use neo_types::io::Serializable;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle of one cached record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// Read from the backend, not modified.
    Unchanged,
    /// Created in this cache; absent from the backend.
    Added,
    /// Present in the backend, overwritten here.
    Changed,
    /// Present in the backend, removed here.
    Deleted,
}

#[derive(Clone, Debug)]
struct Trackable {
    item: Option<StorageItem>,
    state: TrackState,
}

/// A snapshotable write-back cache.
#[derive(Clone)]
pub struct DataCache {
    store: Arc<dyn Store>,
    entries: HashMap<StorageKey, Trackable>,
}

impl DataCache {
    /// A fresh cache over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            entries: HashMap::new(),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// A child cache seeing this cache's state, including uncommitted
    /// writes. Commit back with [`DataCache::commit_into`], or drop to
    /// discard.
    #[must_use]
    pub fn snapshot(&self) -> DataCache {
        self.clone()
    }

    fn load_from_store(&self, key: &StorageKey) -> Result<Option<StorageItem>, StoreError> {
        let Some(bytes) = self.store.get(&key.to_store_key())? else {
            return Ok(None);
        };
        StorageItem::from_bytes(&bytes).map(Some).map_err(|e| {
            StoreError::Corrupted {
                key: hex::encode(key.to_store_key()),
                reason: e.to_string(),
            }
        })
    }

    /// Read one cell, caching the backend answer.
    pub fn get(&mut self, key: &StorageKey) -> Result<Option<StorageItem>, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            return Ok(match entry.state {
                TrackState::Deleted => None,
                _ => entry.item.clone(),
            });
        }
        let loaded = self.load_from_store(key)?;
        if let Some(item) = &loaded {
            self.entries.insert(
                key.clone(),
                Trackable {
                    item: Some(item.clone()),
                    state: TrackState::Unchanged,
                },
            );
        }
        Ok(loaded)
    }

    /// True if the cell currently exists.
    pub fn contains(&mut self, key: &StorageKey) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert or overwrite one cell.
    pub fn put(&mut self, key: StorageKey, item: StorageItem) -> Result<(), StoreError> {
        let state = match self.entries.get(&key).map(|e| e.state) {
            Some(TrackState::Added) => TrackState::Added,
            Some(_) => TrackState::Changed,
            None => {
                // Distinguish a fresh insert from an overwrite of a
                // backend cell the cache has not read yet.
                if self.load_from_store(&key)?.is_some() {
                    TrackState::Changed
                } else {
                    TrackState::Added
                }
            }
        };
        self.entries.insert(
            key,
            Trackable {
                item: Some(item),
                state,
            },
        );
        Ok(())
    }

    /// Remove one cell.
    pub fn delete(&mut self, key: &StorageKey) -> Result<(), StoreError> {
        match self.entries.get(key).map(|e| e.state) {
            Some(TrackState::Added) => {
                self.entries.remove(key);
            }
            Some(TrackState::Deleted) => {}
            Some(_) => {
                self.entries.insert(
                    key.clone(),
                    Trackable {
                        item: None,
                        state: TrackState::Deleted,
                    },
                );
            }
            None => {
                if self.load_from_store(key)?.is_some() {
                    self.entries.insert(
                        key.clone(),
                        Trackable {
                            item: None,
                            state: TrackState::Deleted,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// All live cells whose flat key starts with `prefix`, cache records
    /// overlaid on a backend seek, ascending by key.
    pub fn find(&self, prefix: &[u8]) -> Result<Vec<(StorageKey, StorageItem)>, StoreError> {
        let mut merged: std::collections::BTreeMap<Vec<u8>, Option<StorageItem>> =
            std::collections::BTreeMap::new();

        for (flat_key, bytes) in self.store.seek(prefix, SeekDirection::Forward)? {
            let item = StorageItem::from_bytes(&bytes).map_err(|e| StoreError::Corrupted {
                key: hex::encode(&flat_key),
                reason: e.to_string(),
            })?;
            merged.insert(flat_key, Some(item));
        }

        for (key, entry) in &self.entries {
            let flat_key = key.to_store_key();
            if !flat_key.starts_with(prefix) {
                continue;
            }
            match entry.state {
                TrackState::Deleted => {
                    merged.insert(flat_key, None);
                }
                _ => {
                    merged.insert(flat_key, entry.item.clone());
                }
            }
        }

        let mut results = Vec::new();
        for (flat_key, item) in merged {
            if let Some(item) = item {
                results.push((
                    StorageKey::from_store_key(&flat_key).map_err(|e| StoreError::Corrupted {
                        key: hex::encode(&flat_key),
                        reason: e.to_string(),
                    })?,
                    item,
                ));
            }
        }
        Ok(results)
    }

    /// Fold this cache's dirty records into `parent`.
    pub fn commit_into(self, parent: &mut DataCache) -> Result<(), StoreError> {
        for (key, entry) in self.entries {
            match entry.state {
                TrackState::Unchanged => {}
                TrackState::Added | TrackState::Changed => {
                    parent.put(key, entry.item.expect("live record has an item"))?;
                }
                TrackState::Deleted => parent.delete(&key)?,
            }
        }
        Ok(())
    }

    /// Every dirty record: `Some(item)` for live writes, `None` for
    /// deletes. The trie layer replays these into the state root.
    #[must_use]
    pub fn dirty_entries(&self) -> Vec<(StorageKey, Option<StorageItem>)> {
        let mut dirty = Vec::new();
        for (key, entry) in &self.entries {
            match entry.state {
                TrackState::Unchanged => {}
                TrackState::Added | TrackState::Changed => {
                    dirty.push((key.clone(), entry.item.clone()));
                }
                TrackState::Deleted => dirty.push((key.clone(), None)),
            }
        }
        dirty
    }

    /// The batch this cache would write on commit.
    #[must_use]
    pub fn build_batch(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (key, entry) in &self.entries {
            match entry.state {
                TrackState::Unchanged => {}
                TrackState::Added | TrackState::Changed => {
                    let item = entry.item.as_ref().expect("live record has an item");
                    batch.put(key.to_store_key(), item.to_bytes());
                }
                TrackState::Deleted => batch.delete(key.to_store_key()),
            }
        }
        batch
    }

    /// Flush dirty records (plus `extra` operations) to the backend in
    /// one atomic batch, then reset every record to `Unchanged`.
    pub fn commit(&mut self, extra: WriteBatch) -> Result<(), StoreError> {
        let mut batch = self.build_batch();
        batch.ops.extend(extra.ops);
        self.store.write_batch(batch)?;

        self.entries.retain(|_, entry| entry.state != TrackState::Deleted);
        for entry in self.entries.values_mut() {
            entry.state = TrackState::Unchanged;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn key(id: i32, suffix: &[u8]) -> StorageKey {
        StorageKey::new(id, suffix.to_vec())
    }

    fn fresh_cache() -> DataCache {
        DataCache::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_read_your_writes() {
        let mut cache = fresh_cache();
        cache.put(key(1, b"a"), StorageItem::new(b"v1".to_vec())).unwrap();
        assert_eq!(
            cache.get(&key(1, b"a")).unwrap().unwrap().value,
            b"v1".to_vec()
        );
        cache.delete(&key(1, b"a")).unwrap();
        assert!(cache.get(&key(1, b"a")).unwrap().is_none());
    }

    #[test]
    fn test_commit_equivalence() {
        let store = Arc::new(MemoryStore::new());
        let mut cache = DataCache::new(store.clone());
        cache.put(key(1, b"x"), StorageItem::new(b"1".to_vec())).unwrap();
        cache.put(key(2, b"y"), StorageItem::new(b"2".to_vec())).unwrap();
        cache.delete(&key(1, b"x")).unwrap();

        let before: Vec<_> = cache.find(&[]).unwrap();
        cache.commit(WriteBatch::new()).unwrap();

        let mut reloaded = DataCache::new(store);
        let after: Vec<_> = reloaded.find(&[]).unwrap();
        assert_eq!(before, after);
        assert!(reloaded.get(&key(1, b"x")).unwrap().is_none());
        assert_eq!(
            reloaded.get(&key(2, b"y")).unwrap().unwrap().value,
            b"2".to_vec()
        );
    }

    #[test]
    fn test_delete_of_added_leaves_no_trace() {
        let mut cache = fresh_cache();
        cache.put(key(1, b"a"), StorageItem::new(b"v".to_vec())).unwrap();
        cache.delete(&key(1, b"a")).unwrap();
        assert!(cache.build_batch().is_empty());
    }

    #[test]
    fn test_delete_of_backend_value_is_tracked() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                &key(1, b"a").to_store_key(),
                &StorageItem::new(b"v".to_vec()).to_bytes(),
            )
            .unwrap();
        let mut cache = DataCache::new(store);
        cache.delete(&key(1, b"a")).unwrap();
        let batch = cache.build_batch();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_snapshot_isolation_and_commit_into() {
        let mut parent = fresh_cache();
        parent.put(key(1, b"a"), StorageItem::new(b"1".to_vec())).unwrap();

        let mut child = parent.snapshot();
        child.put(key(1, b"b"), StorageItem::new(b"2".to_vec())).unwrap();

        // Parent does not see the child's write until commit_into.
        assert!(parent.get(&key(1, b"b")).unwrap().is_none());
        child.commit_into(&mut parent).unwrap();
        assert!(parent.get(&key(1, b"b")).unwrap().is_some());
    }

    #[test]
    fn test_find_merges_cache_and_backend() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                &key(1, b"a").to_store_key(),
                &StorageItem::new(b"backend".to_vec()).to_bytes(),
            )
            .unwrap();
        let mut cache = DataCache::new(store);
        cache.put(key(1, b"b"), StorageItem::new(b"cached".to_vec())).unwrap();
        cache.delete(&key(1, b"a")).unwrap();

        let found = cache.find(&StorageKey::prefix_for(1)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, key(1, b"b"));
    }
}
