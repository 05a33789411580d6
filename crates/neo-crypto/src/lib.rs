//! # Neo Crypto - Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hash` | SHA-256, RIPEMD-160, Murmur32 | Entity hashing, script hashes, Bloom filters |
//! | `base58` | Base58 / Base58Check | Addresses, WIF, NEP-2 |
//! | `ecdsa` | secp256r1 (NIST P-256) | Transaction and block witness signatures |
//! | `wif` / `nep2` | Base58Check, scrypt | Private key export formats |
//! | `bloom` | m-bit / k-function filter | SPV filterload protocol |
//! | `merkle` | Pairwise double-SHA-256 | Block merkle root |
//! | `bls` | BLS12-381 via blst | CryptoLib group operations |

#![warn(clippy::all)]

pub mod base58;
pub mod bloom;
pub mod bls;
pub mod ecdsa;
pub mod errors;
pub mod hash;
pub mod merkle;
pub mod nep2;
pub mod wif;

pub use ecdsa::{ECPoint, KeyPair, Secp256r1Signature};
pub use errors::CryptoError;
pub use hash::{hash160, hash256, murmur32, ripemd160, sha256, sha256d};
