//! Merkle Patricia Trie over the key-value store.
//!
//! Nodes are content-addressed: a node's identity is the double SHA-256
//! of its compact serialization, and committed nodes persist under the
//! reserved `0xF0` prefix as `hash -> bytes`. The root hash is the state
//! commitment written with every block.

mod nibbles;
mod node;
mod proof;
mod trie;

pub use nibbles::{common_prefix, to_nibbles};
pub use node::MptNode;
pub use proof::verify_proof;
pub use trie::MptTrie;

/// Backend key prefix reserved for trie nodes.
pub const MPT_PREFIX: u8 = 0xF0;

/// Flat store key for a node hash.
#[must_use]
pub fn node_store_key(hash: &neo_types::Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(MPT_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key
}
