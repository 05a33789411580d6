//! Stateless proof verification.
//!
//! A proof is the ordered node encodings along a lookup path. The
//! verifier trusts nothing but the root hash: every step rehashes the
//! supplied bytes before following them.

use super::nibbles::to_nibbles;
use super::node::{MptNode, BRANCH_VALUE_SLOT};
use neo_types::Hash256;
use std::collections::HashMap;

/// Verify `proof` against `root` for `key`; returns the proven value.
#[must_use]
pub fn verify_proof(root: &Hash256, key: &[u8], proof: &[Vec<u8>]) -> Option<Vec<u8>> {
    let nodes: HashMap<Hash256, MptNode> = proof
        .iter()
        .filter_map(|bytes| {
            let node = MptNode::decode(bytes).ok()?;
            Some((Hash256::from_data(bytes), node))
        })
        .collect();

    let mut current = nodes.get(root)?.clone();
    let nibbles = to_nibbles(key);
    let mut path: &[u8] = &nibbles;

    loop {
        match current {
            MptNode::Leaf { value } => {
                return if path.is_empty() { Some(value) } else { None };
            }
            MptNode::Extension { path: run, child } => {
                if path.len() < run.len() || path[..run.len()] != run[..] {
                    return None;
                }
                path = &path[run.len()..];
                current = resolve(&nodes, &child)?;
            }
            MptNode::Branch { children } => {
                let next = if path.is_empty() {
                    children[BRANCH_VALUE_SLOT].clone()
                } else {
                    let slot = path[0] as usize;
                    path = &path[1..];
                    children[slot].clone()
                };
                current = resolve(&nodes, &next)?;
            }
            MptNode::Empty | MptNode::HashRef(_) => return None,
        }
    }
}

fn resolve(nodes: &HashMap<Hash256, MptNode>, node: &MptNode) -> Option<MptNode> {
    match node {
        MptNode::HashRef(hash) => nodes.get(hash).cloned(),
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::mpt::MptTrie;
    use std::sync::Arc;

    #[test]
    fn test_proof_round_trip() {
        let mut trie = MptTrie::new(None, Arc::new(MemoryStore::new()));
        trie.put(b"dog", b"puppy").unwrap();
        trie.put(b"do", b"verb").unwrap();
        trie.put(b"doge", b"coin").unwrap();
        let root = trie.root_hash();

        for (key, value) in [
            (&b"dog"[..], &b"puppy"[..]),
            (b"do", b"verb"),
            (b"doge", b"coin"),
        ] {
            let proof = trie.get_proof(key).unwrap().expect("key present");
            assert_eq!(verify_proof(&root, key, &proof), Some(value.to_vec()));
        }
    }

    #[test]
    fn test_proof_fails_for_other_key() {
        let mut trie = MptTrie::new(None, Arc::new(MemoryStore::new()));
        trie.put(b"dog", b"puppy").unwrap();
        let root = trie.root_hash();
        let proof = trie.get_proof(b"dog").unwrap().unwrap();
        assert_eq!(verify_proof(&root, b"cat", &proof), None);
    }

    #[test]
    fn test_proof_fails_against_wrong_root() {
        let mut trie = MptTrie::new(None, Arc::new(MemoryStore::new()));
        trie.put(b"dog", b"puppy").unwrap();
        let proof = trie.get_proof(b"dog").unwrap().unwrap();
        assert_eq!(verify_proof(&Hash256([9u8; 32]), b"dog", &proof), None);
    }

    #[test]
    fn test_tampered_proof_rejected() {
        let mut trie = MptTrie::new(None, Arc::new(MemoryStore::new()));
        trie.put(b"dog", b"puppy").unwrap();
        trie.put(b"dot", b"mark").unwrap();
        let root = trie.root_hash();
        let mut proof = trie.get_proof(b"dog").unwrap().unwrap();
        let last = proof.len() - 1;
        proof[last][1] ^= 0x01;
        assert_eq!(verify_proof(&root, b"dog", &proof), None);
    }

    #[test]
    fn test_absent_key_has_no_proof() {
        let mut trie = MptTrie::new(None, Arc::new(MemoryStore::new()));
        trie.put(b"dog", b"puppy").unwrap();
        assert!(trie.get_proof(b"cat").unwrap().is_none());
    }
}
