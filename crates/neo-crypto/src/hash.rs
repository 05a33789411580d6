//! Digest functions used throughout the node.
//!
//! `hash160` (RIPEMD-160 over SHA-256) produces script hashes and account
//! addresses; `hash256` (double SHA-256) produces block and transaction
//! hashes; `murmur32` feeds the Bloom filter protocol.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Double SHA-256 digest.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD-160 digest.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// RIPEMD-160 over SHA-256. Script-hash and address digest.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// Double SHA-256. Block and transaction identity digest.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    sha256d(data)
}

/// MurmurHash3 x86 32-bit with an explicit seed.
pub fn murmur32(data: &[u8], seed: u32) -> u32 {
    let mut cursor = Cursor::new(data);
    murmur3::murmur3_32(&mut cursor, seed).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_ripemd160_known_vector() {
        // RIPEMD-160("abc")
        let digest = ripemd160(b"abc");
        assert_eq!(hex::encode(digest), "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc");
    }

    #[test]
    fn test_hash160_composition() {
        let data = b"neo-core";
        assert_eq!(hash160(data), ripemd160(&sha256(data)));
    }

    #[test]
    fn test_hash256_composition() {
        let data = b"neo-core";
        assert_eq!(hash256(data), sha256(&sha256(data)));
    }

    #[test]
    fn test_murmur32_deterministic() {
        let h1 = murmur32(b"hello", 42);
        let h2 = murmur32(b"hello", 42);
        assert_eq!(h1, h2);
        assert_ne!(murmur32(b"hello", 42), murmur32(b"hello", 43));
    }

    #[test]
    fn test_murmur32_empty_input() {
        // Seed 0 over empty input is the murmur3 identity value.
        assert_eq!(murmur32(b"", 0), 0);
    }
}
