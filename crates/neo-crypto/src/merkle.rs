//! Merkle root over transaction hashes.
//!
//! Pairwise double SHA-256 with the odd leaf duplicated at each level.
//! The root of an empty list is all zeroes; a single leaf is its own root.

use crate::hash::hash256;

/// Merkle tree over 32-byte leaves.
pub struct MerkleTree;

impl MerkleTree {
    /// Compute the root of `leaves`.
    #[must_use]
    pub fn compute_root(leaves: &[[u8; 32]]) -> [u8; 32] {
        match leaves.len() {
            0 => [0u8; 32],
            1 => leaves[0],
            _ => {
                let mut level: Vec<[u8; 32]> = leaves.to_vec();
                while level.len() > 1 {
                    level = Self::next_level(&level);
                }
                level[0]
            }
        }
    }

    fn next_level(level: &[[u8; 32]]) -> Vec<[u8; 32]> {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(&left);
            buf[32..].copy_from_slice(&right);
            next.push(hash256(&buf));
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_root_is_zero() {
        assert_eq!(MerkleTree::compute_root(&[]), [0u8; 32]);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let leaf = [7u8; 32];
        assert_eq!(MerkleTree::compute_root(&[leaf]), leaf);
    }

    #[test]
    fn test_two_leaves() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&a);
        buf[32..].copy_from_slice(&b);
        assert_eq!(MerkleTree::compute_root(&[a, b]), hash256(&buf));
    }

    #[test]
    fn test_odd_leaf_duplicated() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let c = [3u8; 32];
        // Three leaves hash as [(a,b), (c,c)].
        let root3 = MerkleTree::compute_root(&[a, b, c]);
        let root4 = MerkleTree::compute_root(&[a, b, c, c]);
        assert_eq!(root3, root4);
    }

    #[test]
    fn test_order_sensitivity() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(
            MerkleTree::compute_root(&[a, b]),
            MerkleTree::compute_root(&[b, a])
        );
    }
}
