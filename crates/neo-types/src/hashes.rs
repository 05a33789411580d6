//! Primitive identifiers: `Hash160` and `Hash256`.
//!
//! Both store raw little-endian bytes exactly as serialized. The string
//! form is the conventional `0x…` big-endian rendering, so parsing and
//! formatting reverse the byte order.

use crate::error::TypeError;
use crate::io::{BinaryReader, BinaryWriter, Serializable};
use neo_crypto::{hash160, hash256};
use std::fmt;
use std::str::FromStr;

/// 20-byte account / contract identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash160(pub [u8; 20]);

/// 32-byte block / transaction identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash160 {
    /// The all-zero hash.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 20])
    }

    /// Script hash of a verification script.
    #[must_use]
    pub fn from_script(script: &[u8]) -> Self {
        Self(hash160(script))
    }

    /// Raw little-endian bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// True if every byte is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Render as a Base58Check address with the given version byte.
    #[must_use]
    pub fn to_address(&self, version: u8) -> String {
        let mut payload = Vec::with_capacity(21);
        payload.push(version);
        payload.extend_from_slice(&self.0);
        neo_crypto::base58::encode_check(&payload)
    }

    /// Parse a Base58Check address, validating the version byte.
    pub fn from_address(address: &str, version: u8) -> Result<Self, TypeError> {
        let payload = neo_crypto::base58::decode_check(address)
            .map_err(|e| TypeError::InvalidEncoding(e.to_string()))?;
        if payload.len() != 21 || payload[0] != version {
            return Err(TypeError::InvalidEncoding("bad address payload".into()));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&payload[1..]);
        Ok(Self(bytes))
    }
}

impl Hash256 {
    /// The all-zero hash.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Double SHA-256 of `data`.
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        Self(hash256(data))
    }

    /// Raw little-endian bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True if every byte is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

macro_rules! impl_hash_common {
    ($name:ident, $len:expr) => {
        impl Serializable for $name {
            fn serialize(&self, writer: &mut BinaryWriter) {
                writer.write_bytes(&self.0);
            }

            fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
                Ok(Self(reader.read_array::<$len>()?))
            }

            fn size(&self) -> usize {
                $len
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut reversed = self.0;
                reversed.reverse();
                write!(f, "0x{}", hex::encode(reversed))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                let decoded = hex::decode(stripped)
                    .map_err(|e| TypeError::InvalidEncoding(e.to_string()))?;
                if decoded.len() != $len {
                    return Err(TypeError::InvalidEncoding(format!(
                        "expected {} hex bytes, got {}",
                        $len,
                        decoded.len()
                    )));
                }
                let mut bytes = [0u8; $len];
                bytes.copy_from_slice(&decoded);
                bytes.reverse();
                Ok(Self(bytes))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

impl_hash_common!(Hash160, 20);
impl_hash_common!(Hash256, 32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_reverses_bytes() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[31] = 0xFF;
        let hash = Hash256(bytes);
        let text = hash.to_string();
        assert!(text.starts_with("0xff"));
        assert!(text.ends_with("01"));
    }

    #[test]
    fn test_from_str_round_trip() {
        let hash: Hash256 =
            "0x1f4d1defa46faa5e7b9b8d3f79a06bd777d2f0b3a52ce36bd9e1e845d9cab756"
                .parse()
                .unwrap();
        assert_eq!(
            hash.to_string(),
            "0x1f4d1defa46faa5e7b9b8d3f79a06bd777d2f0b3a52ce36bd9e1e845d9cab756"
        );
    }

    #[test]
    fn test_serialization_is_raw_bytes() {
        let hash = Hash160([7u8; 20]);
        let bytes = hash.to_bytes();
        assert_eq!(bytes, vec![7u8; 20]);
        assert_eq!(Hash160::from_bytes(&bytes).unwrap(), hash);
    }

    #[test]
    fn test_address_round_trip() {
        let hash = Hash160::from_script(&[0x51]);
        let address = hash.to_address(0x35);
        assert_eq!(Hash160::from_address(&address, 0x35).unwrap(), hash);
        assert!(Hash160::from_address(&address, 0x17).is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let low = Hash160([0u8; 20]);
        let mut high_bytes = [0u8; 20];
        high_bytes[0] = 1;
        let high = Hash160(high_bytes);
        assert!(low < high);
    }

    #[test]
    fn test_from_str_rejects_bad_length() {
        assert!("0x1234".parse::<Hash256>().is_err());
    }
}
