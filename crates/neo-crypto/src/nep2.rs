//! NEP-2 passphrase-protected private-key export.
//!
//! Layout: `0x01 0x42 0xE0 || addrhash(4) || priv XOR derived(32)` in
//! Base58Check, where `addrhash` is the first four bytes of the double
//! SHA-256 of the key's address string and `derived` comes from scrypt
//! (`N = 16384, r = 8, p = 8`) keyed by the passphrase and salted with
//! `addrhash`. Decryption recovers the key and re-derives the address to
//! validate the passphrase.

use crate::ecdsa::{ECPoint, KeyPair};
use crate::errors::CryptoError;
use crate::hash::sha256d;
use crate::base58;
use scrypt::Params;

const NEP2_PREFIX: [u8; 3] = [0x01, 0x42, 0xE0];
const SCRYPT_LOG_N: u8 = 14; // N = 16384
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 8;

fn derive_key(passphrase: &str, addrhash: &[u8; 4]) -> Result<[u8; 32], CryptoError> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    let mut derived = [0u8; 32];
    scrypt::scrypt(passphrase.as_bytes(), addrhash, &params, &mut derived)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(derived)
}

fn address_hash(address: &str) -> [u8; 4] {
    let digest = sha256d(address.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Encrypt a key pair under a passphrase.
///
/// `derive_address` maps the public key to its address string; the caller
/// supplies it because address rendering (script hash + version byte) lives
/// above this crate.
pub fn encrypt(
    keypair: &KeyPair,
    passphrase: &str,
    derive_address: impl Fn(&ECPoint) -> String,
) -> Result<String, CryptoError> {
    let address = derive_address(keypair.public_key());
    let addrhash = address_hash(&address);
    let derived = derive_key(passphrase, &addrhash)?;

    let private = keypair.private_bytes();
    let mut payload = Vec::with_capacity(3 + 4 + 32);
    payload.extend_from_slice(&NEP2_PREFIX);
    payload.extend_from_slice(&addrhash);
    for i in 0..32 {
        payload.push(private[i] ^ derived[i]);
    }
    Ok(base58::encode_check(&payload))
}

/// Decrypt a NEP-2 string, validating the passphrase via the address hash.
pub fn decrypt(
    nep2: &str,
    passphrase: &str,
    derive_address: impl Fn(&ECPoint) -> String,
) -> Result<KeyPair, CryptoError> {
    let payload = base58::decode_check(nep2)?;
    if payload.len() != 39 {
        return Err(CryptoError::InvalidNep2(format!(
            "expected 39 payload bytes, got {}",
            payload.len()
        )));
    }
    if payload[..3] != NEP2_PREFIX {
        return Err(CryptoError::InvalidNep2("bad prefix".into()));
    }
    let addrhash: [u8; 4] = payload[3..7].try_into().expect("length checked");
    let derived = derive_key(passphrase, &addrhash)?;

    let mut private = [0u8; 32];
    for i in 0..32 {
        private[i] = payload[7 + i] ^ derived[i];
    }
    let keypair = KeyPair::from_private_bytes(&private)
        .map_err(|_| CryptoError::InvalidNep2("recovered key invalid".into()))?;

    let address = derive_address(keypair.public_key());
    if address_hash(&address) != addrhash {
        return Err(CryptoError::InvalidNep2("wrong passphrase".into()));
    }
    Ok(keypair)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_address(point: &ECPoint) -> String {
        // Tests only need a deterministic mapping, not real address rendering.
        hex::encode(point.encode_compressed())
    }

    #[test]
    fn test_nep2_round_trip() {
        let keypair = KeyPair::generate();
        let nep2 = encrypt(&keypair, "correct horse", fake_address).unwrap();
        let restored = decrypt(&nep2, "correct horse", fake_address).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
    }

    #[test]
    fn test_nep2_wrong_passphrase() {
        let keypair = KeyPair::generate();
        let nep2 = encrypt(&keypair, "correct horse", fake_address).unwrap();
        let err = decrypt(&nep2, "battery staple", fake_address).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidNep2(_)));
    }

    #[test]
    fn test_nep2_rejects_bad_prefix() {
        let mut payload = vec![0x01, 0x43, 0xE0];
        payload.extend_from_slice(&[0u8; 36]);
        let bad = base58::encode_check(&payload);
        assert!(decrypt(&bad, "pw", fake_address).is_err());
    }
}
