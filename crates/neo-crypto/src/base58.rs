//! Base58 and Base58Check encoding.
//!
//! Base58Check appends the first four bytes of a double SHA-256 checksum
//! before encoding; WIF, NEP-2 and address rendering all go through it.

use crate::errors::CryptoError;
use crate::hash::sha256d;

/// Encode bytes as plain Base58.
pub fn encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decode plain Base58.
pub fn decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    bs58::decode(s)
        .into_vec()
        .map_err(|e| CryptoError::Base58(e.to_string()))
}

/// Encode bytes as Base58Check (payload || first 4 bytes of sha256d(payload)).
pub fn encode_check(data: &[u8]) -> String {
    let checksum = sha256d(data);
    let mut buf = Vec::with_capacity(data.len() + 4);
    buf.extend_from_slice(data);
    buf.extend_from_slice(&checksum[..4]);
    encode(&buf)
}

/// Decode Base58Check, validating and stripping the checksum.
pub fn decode_check(s: &str) -> Result<Vec<u8>, CryptoError> {
    let raw = decode(s)?;
    if raw.len() < 4 {
        return Err(CryptoError::Base58("payload too short".into()));
    }
    let (payload, checksum) = raw.split_at(raw.len() - 4);
    let expected = sha256d(payload);
    if checksum != &expected[..4] {
        return Err(CryptoError::ChecksumMismatch);
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base58_round_trip() {
        let data = b"hello base58".to_vec();
        let encoded = encode(&data);
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_base58check_round_trip() {
        let data = vec![0x17, 0xAB, 0xCD, 0xEF, 0x01];
        let encoded = encode_check(&data);
        assert_eq!(decode_check(&encoded).unwrap(), data);
    }

    #[test]
    fn test_base58check_rejects_corruption() {
        let encoded = encode_check(&[0x17, 0x01, 0x02, 0x03]);
        // Flip one character; either decoding fails or the checksum does.
        let mut chars: Vec<char> = encoded.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '1' { '2' } else { '1' };
        let corrupted: String = chars.into_iter().collect();
        assert!(decode_check(&corrupted).is_err());
    }

    #[test]
    fn test_base58_rejects_invalid_alphabet() {
        assert!(decode("0OIl").is_err());
    }
}
