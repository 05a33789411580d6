//! Wallet Import Format private-key export.
//!
//! Layout: `0x80 || priv(32) || 0x01` wrapped in Base58Check. The trailing
//! byte marks the key as compressed and is mandatory here.

use crate::base58;
use crate::ecdsa::KeyPair;
use crate::errors::CryptoError;

const WIF_VERSION: u8 = 0x80;
const COMPRESSED_FLAG: u8 = 0x01;

/// Export 32 private-key bytes as WIF.
pub fn encode(private_key: &[u8; 32]) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(WIF_VERSION);
    payload.extend_from_slice(private_key);
    payload.push(COMPRESSED_FLAG);
    base58::encode_check(&payload)
}

/// Import a WIF string back into a key pair.
///
/// # Errors
///
/// Rejects bad Base58Check, wrong version byte, wrong length, or a missing
/// compression flag.
pub fn decode(wif: &str) -> Result<KeyPair, CryptoError> {
    let payload = base58::decode_check(wif)?;
    if payload.len() != 34 {
        return Err(CryptoError::InvalidWif(format!(
            "expected 34 payload bytes, got {}",
            payload.len()
        )));
    }
    if payload[0] != WIF_VERSION {
        return Err(CryptoError::InvalidWif(format!(
            "bad version byte 0x{:02x}",
            payload[0]
        )));
    }
    if payload[33] != COMPRESSED_FLAG {
        return Err(CryptoError::InvalidWif("missing compressed flag".into()));
    }
    KeyPair::from_private_bytes(&payload[1..33])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wif_round_trip() {
        let keypair = KeyPair::generate();
        let wif = encode(&keypair.private_bytes());
        let restored = decode(&wif).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
    }

    #[test]
    fn test_wif_rejects_tampering() {
        let keypair = KeyPair::generate();
        let wif = encode(&keypair.private_bytes());
        let mut chars: Vec<char> = wif.chars().collect();
        chars[5] = if chars[5] == 'K' { 'L' } else { 'K' };
        let tampered: String = chars.into_iter().collect();
        assert!(decode(&tampered).is_err());
    }

    #[test]
    fn test_wif_rejects_short_payload() {
        let short = base58::encode_check(&[WIF_VERSION, 0x01, 0x02]);
        assert!(matches!(decode(&short), Err(CryptoError::InvalidWif(_))));
    }
}
