//! Storage cells: `(contract id, suffix)` keys and their values.

use neo_types::io::{var_bytes_size, BinaryReader, BinaryWriter, Serializable};
use neo_types::TypeError;

/// A persisted cell's key: owning contract id (little-endian) plus an
/// application-chosen suffix.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    /// Owning contract; negative ids are native contracts, zero is ledger
    /// metadata.
    pub id: i32,
    /// Application suffix.
    pub suffix: Vec<u8>,
}

impl StorageKey {
    /// Build a key.
    #[must_use]
    pub fn new(id: i32, suffix: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            suffix: suffix.into(),
        }
    }

    /// The flat backend key: `id LE || suffix`.
    #[must_use]
    pub fn to_store_key(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.suffix.len());
        bytes.extend_from_slice(&self.id.to_le_bytes());
        bytes.extend_from_slice(&self.suffix);
        bytes
    }

    /// Parse a flat backend key.
    pub fn from_store_key(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() < 4 {
            return Err(TypeError::InvalidFormat("storage key shorter than id".into()));
        }
        Ok(Self {
            id: i32::from_le_bytes(bytes[..4].try_into().expect("len 4")),
            suffix: bytes[4..].to_vec(),
        })
    }

    /// The backend prefix shared by all of a contract's cells.
    #[must_use]
    pub fn prefix_for(id: i32) -> Vec<u8> {
        id.to_le_bytes().to_vec()
    }
}

/// A persisted cell's value.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StorageItem {
    /// Raw value bytes.
    pub value: Vec<u8>,
    /// Constant cells reject writes after creation.
    pub is_constant: bool,
}

impl StorageItem {
    /// A mutable item.
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            is_constant: false,
        }
    }

    /// A write-once item.
    #[must_use]
    pub fn constant(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            is_constant: true,
        }
    }
}

impl Serializable for StorageItem {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bool(self.is_constant);
        writer.write_var_bytes(&self.value);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let is_constant = reader.read_bool()?;
        let value = reader.read_var_bytes(u32::MAX as usize)?;
        Ok(Self { value, is_constant })
    }

    fn size(&self) -> usize {
        1 + var_bytes_size(self.value.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_round_trip() {
        let key = StorageKey::new(-5, vec![0x20, 0xAA]);
        let flat = key.to_store_key();
        assert_eq!(flat.len(), 6);
        assert_eq!(StorageKey::from_store_key(&flat).unwrap(), key);
    }

    #[test]
    fn test_prefix_matches_keys() {
        let key = StorageKey::new(7, vec![1, 2, 3]);
        assert!(key.to_store_key().starts_with(&StorageKey::prefix_for(7)));
    }

    #[test]
    fn test_item_round_trip() {
        let item = StorageItem::constant(vec![9, 9, 9]);
        let bytes = item.to_bytes();
        assert_eq!(bytes.len(), item.size());
        assert_eq!(StorageItem::from_bytes(&bytes).unwrap(), item);
    }
}
