//! The trie proper: lookup, insert, canonical delete, commit.

use super::nibbles::{common_prefix, to_nibbles};
use super::node::{MptNode, BRANCH_VALUE_SLOT};
use super::node_store_key;
use crate::error::StoreError;
use crate::store::{Store, WriteBatch};
use neo_types::Hash256;
use std::sync::Arc;

/// A Merkle Patricia Trie rooted at a content hash, resolving stored
/// nodes through the backend on demand.
pub struct MptTrie {
    root: MptNode,
    store: Arc<dyn Store>,
}

impl MptTrie {
    /// Open a trie. `root` of `None` (or the zero hash) starts empty;
    /// otherwise nodes resolve lazily from the store.
    #[must_use]
    pub fn new(root: Option<Hash256>, store: Arc<dyn Store>) -> Self {
        let root = match root {
            None => MptNode::Empty,
            Some(hash) if hash.is_zero() => MptNode::Empty,
            Some(hash) => MptNode::HashRef(hash),
        };
        Self { root, store }
    }

    /// The state commitment. Zero for an empty trie.
    #[must_use]
    pub fn root_hash(&self) -> Hash256 {
        if self.root.is_empty() {
            Hash256::zero()
        } else {
            self.root.hash()
        }
    }

    fn resolve(&self, hash: &Hash256) -> Result<MptNode, StoreError> {
        let bytes = self
            .store
            .get(&node_store_key(hash))?
            .ok_or_else(|| StoreError::MissingTrieNode(hash.to_string()))?;
        MptNode::decode(&bytes).map_err(|e| StoreError::Corrupted {
            key: hash.to_string(),
            reason: e.to_string(),
        })
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Read the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let path = to_nibbles(key);
        self.get_at(&self.root, &path)
    }

    fn get_at(&self, node: &MptNode, path: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match node {
            MptNode::Empty => Ok(None),
            MptNode::Leaf { value } => {
                if path.is_empty() {
                    Ok(Some(value.clone()))
                } else {
                    Ok(None)
                }
            }
            MptNode::Extension { path: run, child } => {
                if path.len() >= run.len() && &path[..run.len()] == run.as_slice() {
                    self.get_at(child, &path[run.len()..])
                } else {
                    Ok(None)
                }
            }
            MptNode::Branch { children } => {
                if path.is_empty() {
                    self.get_at(&children[BRANCH_VALUE_SLOT], &[])
                } else {
                    self.get_at(&children[path[0] as usize], &path[1..])
                }
            }
            MptNode::HashRef(hash) => {
                let resolved = self.resolve(hash)?;
                self.get_at(&resolved, path)
            }
        }
    }

    // =========================================================================
    // INSERT
    // =========================================================================

    /// Insert or replace the value under `key`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let path = to_nibbles(key);
        let root = std::mem::replace(&mut self.root, MptNode::Empty);
        self.root = self.put_at(root, &path, value.to_vec())?;
        Ok(())
    }

    fn put_at(
        &self,
        node: MptNode,
        path: &[u8],
        value: Vec<u8>,
    ) -> Result<MptNode, StoreError> {
        match node {
            MptNode::Empty => {
                let leaf = MptNode::Leaf { value };
                if path.is_empty() {
                    Ok(leaf)
                } else {
                    Ok(MptNode::Extension {
                        path: path.to_vec(),
                        child: Box::new(leaf),
                    })
                }
            }
            MptNode::Leaf { value: existing } => {
                if path.is_empty() {
                    return Ok(MptNode::Leaf { value });
                }
                // The stored key ends here; fork into a branch holding the
                // old value in the end-of-key slot.
                let mut branch = MptNode::empty_branch();
                if let MptNode::Branch { children } = &mut branch {
                    children[BRANCH_VALUE_SLOT] = MptNode::Leaf { value: existing };
                    children[path[0] as usize] =
                        self.put_at(MptNode::Empty, &path[1..], value)?;
                }
                Ok(branch)
            }
            MptNode::Extension { path: run, child } => {
                let shared = common_prefix(&run, path);
                if shared == run.len() {
                    let new_child = self.put_at(*child, &path[shared..], value)?;
                    return Ok(MptNode::Extension {
                        path: run,
                        child: Box::new(new_child),
                    });
                }

                // Split at the divergence point.
                let mut branch = MptNode::empty_branch();
                if let MptNode::Branch { children } = &mut branch {
                    let run_rest = &run[shared..];
                    children[run_rest[0] as usize] = if run_rest.len() == 1 {
                        *child
                    } else {
                        MptNode::Extension {
                            path: run_rest[1..].to_vec(),
                            child,
                        }
                    };

                    let path_rest = &path[shared..];
                    if path_rest.is_empty() {
                        children[BRANCH_VALUE_SLOT] = MptNode::Leaf { value };
                    } else {
                        children[path_rest[0] as usize] =
                            self.put_at(MptNode::Empty, &path_rest[1..], value)?;
                    }
                }

                if shared == 0 {
                    Ok(branch)
                } else {
                    Ok(MptNode::Extension {
                        path: path[..shared].to_vec(),
                        child: Box::new(branch),
                    })
                }
            }
            MptNode::Branch { mut children } => {
                if path.is_empty() {
                    children[BRANCH_VALUE_SLOT] = MptNode::Leaf { value };
                } else {
                    let slot = path[0] as usize;
                    let existing = std::mem::replace(&mut children[slot], MptNode::Empty);
                    children[slot] = self.put_at(existing, &path[1..], value)?;
                }
                Ok(MptNode::Branch { children })
            }
            MptNode::HashRef(hash) => {
                let resolved = self.resolve(&hash)?;
                self.put_at(resolved, path, value)
            }
        }
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    /// Remove the value under `key` (no-op when absent), restoring
    /// canonical form on the way back up.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        let path = to_nibbles(key);
        let root = std::mem::replace(&mut self.root, MptNode::Empty);
        self.root = self.delete_at(root, &path)?;
        Ok(())
    }

    fn delete_at(&self, node: MptNode, path: &[u8]) -> Result<MptNode, StoreError> {
        match node {
            MptNode::Empty => Ok(MptNode::Empty),
            MptNode::Leaf { value } => {
                if path.is_empty() {
                    Ok(MptNode::Empty)
                } else {
                    Ok(MptNode::Leaf { value })
                }
            }
            MptNode::Extension { path: run, child } => {
                if path.len() < run.len() || path[..run.len()] != run[..] {
                    return Ok(MptNode::Extension { path: run, child });
                }
                let new_child = self.delete_at(*child, &path[run.len()..])?;
                match new_child {
                    MptNode::Empty => Ok(MptNode::Empty),
                    MptNode::Extension {
                        path: child_run,
                        child: grandchild,
                    } => {
                        let mut merged = run;
                        merged.extend_from_slice(&child_run);
                        Ok(MptNode::Extension {
                            path: merged,
                            child: grandchild,
                        })
                    }
                    other => Ok(MptNode::Extension {
                        path: run,
                        child: Box::new(other),
                    }),
                }
            }
            MptNode::Branch { mut children } => {
                if path.is_empty() {
                    children[BRANCH_VALUE_SLOT] = MptNode::Empty;
                } else {
                    let slot = path[0] as usize;
                    let existing = std::mem::replace(&mut children[slot], MptNode::Empty);
                    children[slot] = self.delete_at(existing, &path[1..])?;
                }
                self.collapse_branch(children)
            }
            MptNode::HashRef(hash) => {
                let resolved = self.resolve(&hash)?;
                self.delete_at(resolved, path)
            }
        }
    }

    /// A branch with one surviving child is not canonical; fold it into
    /// its survivor.
    fn collapse_branch(
        &self,
        children: Box<[MptNode; 17]>,
    ) -> Result<MptNode, StoreError> {
        let live: Vec<usize> = children
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(i, _)| i)
            .collect();

        match live.len() {
            0 => Ok(MptNode::Empty),
            1 => {
                let slot = live[0];
                let mut children = children;
                let survivor =
                    std::mem::replace(&mut children[slot], MptNode::Empty);
                let survivor = match survivor {
                    MptNode::HashRef(hash) => self.resolve(&hash)?,
                    other => other,
                };
                if slot == BRANCH_VALUE_SLOT {
                    // End-of-key subtree: the key terminates exactly here.
                    return Ok(survivor);
                }
                let nibble = slot as u8;
                Ok(match survivor {
                    MptNode::Extension { path, child } => {
                        let mut merged = vec![nibble];
                        merged.extend_from_slice(&path);
                        MptNode::Extension {
                            path: merged,
                            child,
                        }
                    }
                    other => MptNode::Extension {
                        path: vec![nibble],
                        child: Box::new(other),
                    },
                })
            }
            _ => Ok(MptNode::Branch { children }),
        }
    }

    // =========================================================================
    // PROOFS & COMMIT
    // =========================================================================

    /// The ordered node encodings along the lookup path for `key`, root
    /// first, or `None` when the key is absent.
    pub fn get_proof(&self, key: &[u8]) -> Result<Option<Vec<Vec<u8>>>, StoreError> {
        let path = to_nibbles(key);
        let mut proof = Vec::new();
        if self.prove_at(&self.root, &path, &mut proof)? {
            Ok(Some(proof))
        } else {
            Ok(None)
        }
    }

    fn prove_at(
        &self,
        node: &MptNode,
        path: &[u8],
        proof: &mut Vec<Vec<u8>>,
    ) -> Result<bool, StoreError> {
        match node {
            MptNode::Empty => Ok(false),
            MptNode::Leaf { .. } => {
                if path.is_empty() {
                    proof.push(node.encode());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MptNode::Extension { path: run, child } => {
                if path.len() >= run.len() && &path[..run.len()] == run.as_slice() {
                    proof.push(node.encode());
                    let found = self.prove_at(child, &path[run.len()..], proof)?;
                    if !found {
                        proof.pop();
                    }
                    Ok(found)
                } else {
                    Ok(false)
                }
            }
            MptNode::Branch { children } => {
                proof.push(node.encode());
                let found = if path.is_empty() {
                    self.prove_at(&children[BRANCH_VALUE_SLOT], &[], proof)?
                } else {
                    self.prove_at(&children[path[0] as usize], &path[1..], proof)?
                };
                if !found {
                    proof.pop();
                }
                Ok(found)
            }
            MptNode::HashRef(hash) => {
                let resolved = self.resolve(hash)?;
                self.prove_at(&resolved, path, proof)
            }
        }
    }

    /// Every resolved node's `hash -> encoding` pair, ready to join the
    /// block's atomic batch under the trie prefix.
    #[must_use]
    pub fn commit(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        Self::collect_nodes(&self.root, &mut batch);
        batch
    }

    fn collect_nodes(node: &MptNode, batch: &mut WriteBatch) {
        match node {
            MptNode::Empty | MptNode::HashRef(_) => {}
            MptNode::Leaf { .. } => {
                batch.put(node_store_key(&node.hash()), node.encode());
            }
            MptNode::Extension { child, .. } => {
                batch.put(node_store_key(&node.hash()), node.encode());
                Self::collect_nodes(child, batch);
            }
            MptNode::Branch { children } => {
                batch.put(node_store_key(&node.hash()), node.encode());
                for child in children.iter() {
                    Self::collect_nodes(child, batch);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn empty_trie() -> MptTrie {
        MptTrie::new(None, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_get_put_delete() {
        let mut trie = empty_trie();
        trie.put(b"dog", b"puppy").unwrap();
        trie.put(b"do", b"verb").unwrap();
        trie.put(b"doge", b"coin").unwrap();

        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(b"do").unwrap(), Some(b"verb".to_vec()));
        assert_eq!(trie.get(b"doge").unwrap(), Some(b"coin".to_vec()));
        assert_eq!(trie.get(b"cat").unwrap(), None);

        trie.delete(b"do").unwrap();
        assert_eq!(trie.get(b"do").unwrap(), None);
        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let mut trie = empty_trie();
        trie.put(b"key", b"one").unwrap();
        trie.put(b"key", b"two").unwrap();
        assert_eq!(trie.get(b"key").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn test_canonical_root_is_order_independent() {
        let mut forward = empty_trie();
        forward.put(b"dog", b"puppy").unwrap();
        forward.put(b"do", b"verb").unwrap();
        forward.put(b"doge", b"coin").unwrap();

        let mut reverse = empty_trie();
        reverse.put(b"doge", b"coin").unwrap();
        reverse.put(b"do", b"verb").unwrap();
        reverse.put(b"dog", b"puppy").unwrap();

        assert_eq!(forward.root_hash(), reverse.root_hash());
    }

    #[test]
    fn test_delete_then_reinsert_restores_root() {
        let mut trie = empty_trie();
        trie.put(b"dog", b"puppy").unwrap();
        trie.put(b"do", b"verb").unwrap();
        trie.put(b"doge", b"coin").unwrap();
        let original = trie.root_hash();

        trie.delete(b"do").unwrap();
        assert_ne!(trie.root_hash(), original);
        trie.put(b"do", b"verb").unwrap();
        assert_eq!(trie.root_hash(), original);
    }

    #[test]
    fn test_delete_everything_returns_to_zero_root() {
        let mut trie = empty_trie();
        trie.put(b"a", b"1").unwrap();
        trie.put(b"b", b"2").unwrap();
        trie.delete(b"a").unwrap();
        trie.delete(b"b").unwrap();
        assert_eq!(trie.root_hash(), Hash256::zero());
    }

    #[test]
    fn test_commit_and_reload() {
        let store = Arc::new(MemoryStore::new());
        let root = {
            let mut trie = MptTrie::new(None, store.clone());
            trie.put(b"alpha", b"1").unwrap();
            trie.put(b"beta", b"2").unwrap();
            store.write_batch(trie.commit()).unwrap();
            trie.root_hash()
        };

        let reloaded = MptTrie::new(Some(root), store);
        assert_eq!(reloaded.get(b"alpha").unwrap(), Some(b"1".to_vec()));
        assert_eq!(reloaded.get(b"beta").unwrap(), Some(b"2".to_vec()));
        assert_eq!(reloaded.root_hash(), root);
    }

    #[test]
    fn test_missing_node_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let trie = MptTrie::new(Some(Hash256([0xAB; 32])), store);
        assert!(matches!(
            trie.get(b"anything"),
            Err(StoreError::MissingTrieNode(_))
        ));
    }
}
