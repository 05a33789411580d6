//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid private key material
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Invalid public key encoding
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid signature encoding
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Signature did not verify
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Base58 or Base58Check decoding failed
    #[error("Base58 decoding failed: {0}")]
    Base58(String),

    /// Base58Check checksum mismatch
    #[error("Checksum mismatch")]
    ChecksumMismatch,

    /// WIF payload has the wrong version, length or compression flag
    #[error("Invalid WIF: {0}")]
    InvalidWif(String),

    /// NEP-2 payload malformed or passphrase wrong
    #[error("Invalid NEP-2 key: {0}")]
    InvalidNep2(String),

    /// Key derivation (scrypt) failed
    #[error("Key derivation failed")]
    KeyDerivationFailed,

    /// BLS12-381 point failed to decode or is not in the group
    #[error("Invalid BLS12-381 point")]
    InvalidBlsPoint,

    /// BLS12-381 operands belong to mismatched groups
    #[error("Mismatched BLS12-381 groups")]
    BlsGroupMismatch,

    /// Invalid input for a cryptographic operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
