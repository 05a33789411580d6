//! ECDSA over secp256r1 (NIST P-256).
//!
//! Witness verification scripts carry 33-byte compressed public keys and
//! 64-byte `r || s` signatures over the SHA-256 digest of the signed data.
//! Committee and multi-sig addresses sort public keys lexicographically by
//! their compressed encoding, so `ECPoint` implements `Ord` over it.

use crate::errors::CryptoError;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use std::cmp::Ordering;
use std::fmt;

/// Compressed public key length.
pub const COMPRESSED_LEN: usize = 33;
/// Uncompressed public key length.
pub const UNCOMPRESSED_LEN: usize = 65;
/// Raw signature length (`r || s`).
pub const SIGNATURE_LEN: usize = 64;

// =============================================================================
// EC POINT
// =============================================================================

/// A validated point on the secp256r1 curve.
#[derive(Clone, PartialEq, Eq)]
pub struct ECPoint {
    key: PublicKey,
    compressed: [u8; COMPRESSED_LEN],
}

impl ECPoint {
    /// Decode a SEC1-encoded point (33-byte compressed or 65-byte uncompressed).
    ///
    /// # Errors
    ///
    /// Returns `InvalidPublicKey` if the bytes do not describe a point on the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != COMPRESSED_LEN && bytes.len() != UNCOMPRESSED_LEN {
            return Err(CryptoError::InvalidPublicKey);
        }
        let key = PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self::from_key(key))
    }

    fn from_key(key: PublicKey) -> Self {
        let encoded = key.to_encoded_point(true);
        let mut compressed = [0u8; COMPRESSED_LEN];
        compressed.copy_from_slice(encoded.as_bytes());
        Self { key, compressed }
    }

    /// The 33-byte compressed encoding.
    #[must_use]
    pub fn encode_compressed(&self) -> [u8; COMPRESSED_LEN] {
        self.compressed
    }

    /// The 65-byte uncompressed encoding.
    #[must_use]
    pub fn encode_uncompressed(&self) -> [u8; UNCOMPRESSED_LEN] {
        let encoded = self.key.to_encoded_point(false);
        let mut out = [0u8; UNCOMPRESSED_LEN];
        out.copy_from_slice(encoded.as_bytes());
        out
    }

    /// Verify a 64-byte `r || s` signature over `message` (hashed with SHA-256).
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &Secp256r1Signature) -> bool {
        let Ok(sig) = Signature::from_slice(&signature.0) else {
            return false;
        };
        VerifyingKey::from(&self.key).verify(message, &sig).is_ok()
    }
}

impl Ord for ECPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compressed.cmp(&other.compressed)
    }
}

impl PartialOrd for ECPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ECPoint({})", hex::encode(self.compressed))
    }
}

impl fmt::Display for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.compressed))
    }
}

// =============================================================================
// SIGNATURE
// =============================================================================

/// A raw 64-byte `r || s` secp256r1 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Secp256r1Signature(pub [u8; SIGNATURE_LEN]);

impl Secp256r1Signature {
    /// Wrap raw signature bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSignatureFormat` unless exactly 64 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        Ok(Self(arr))
    }

    /// The raw `r || s` bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Secp256r1Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secp256r1Signature({})", hex::encode(self.0))
    }
}

// =============================================================================
// KEY PAIR
// =============================================================================

/// A secp256r1 private/public key pair.
pub struct KeyPair {
    signing: SigningKey,
    public: ECPoint,
}

impl KeyPair {
    /// Construct from 32 raw private-key bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPrivateKey` if the scalar is zero or out of range.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidPrivateKey);
        }
        let signing = SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let public = ECPoint::from_key(PublicKey::from(*signing.verifying_key()));
        Ok(Self { signing, public })
    }

    /// Generate a fresh random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let signing = SigningKey::random(&mut rand::rngs::OsRng);
        let public = ECPoint::from_key(PublicKey::from(*signing.verifying_key()));
        Self { signing, public }
    }

    /// The 32 raw private-key bytes.
    #[must_use]
    pub fn private_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes().into()
    }

    /// The public key point.
    #[must_use]
    pub fn public_key(&self) -> &ECPoint {
        &self.public
    }

    /// Sign `message` (hashed with SHA-256), producing a 64-byte `r || s` signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Secp256r1Signature {
        let sig: Signature = self.signing.sign(message);
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&sig.to_bytes());
        Secp256r1Signature(out)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print private material.
        write!(f, "KeyPair(public: {})", hex::encode(self.public.compressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"transfer 100 gas";
        let signature = keypair.sign(message);
        assert!(keypair.public_key().verify(message, &signature));
        assert!(!keypair.public_key().verify(b"transfer 200 gas", &signature));
    }

    #[test]
    fn test_public_key_round_trip() {
        let keypair = KeyPair::generate();
        let compressed = keypair.public_key().encode_compressed();
        let decoded = ECPoint::from_bytes(&compressed).unwrap();
        assert_eq!(&decoded, keypair.public_key());

        let uncompressed = keypair.public_key().encode_uncompressed();
        let decoded = ECPoint::from_bytes(&uncompressed).unwrap();
        assert_eq!(&decoded, keypair.public_key());
    }

    #[test]
    fn test_private_key_determinism() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_private_bytes(&keypair.private_bytes()).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
    }

    #[test]
    fn test_rejects_invalid_point() {
        let mut bad = [0u8; 33];
        bad[0] = 0x05; // invalid SEC1 tag
        assert!(ECPoint::from_bytes(&bad).is_err());
        assert!(ECPoint::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_zero_private_key_rejected() {
        assert!(KeyPair::from_private_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_point_ordering_is_lexicographic() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let ord = a.public_key().cmp(b.public_key());
        let byte_ord = a
            .public_key()
            .encode_compressed()
            .cmp(&b.public_key().encode_compressed());
        assert_eq!(ord, byte_ord);
    }
}
