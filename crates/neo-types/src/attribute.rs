//! Transaction attributes.

use crate::error::TypeError;
use crate::hashes::Hash256;
use crate::io::{var_bytes_size, BinaryReader, BinaryWriter, Serializable};

/// Maximum oracle response payload.
pub const MAX_ORACLE_RESULT: usize = 0xFFFF;

/// Typed transaction attributes. At most one `HighPriority` and one
/// `OracleResponse` may appear per transaction; duplicate checks live in
/// transaction verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionAttribute {
    /// Committee-signed transactions jump the fee queue.
    HighPriority,
    /// Carries an oracle answer back on-chain.
    OracleResponse {
        /// The request being answered.
        id: u64,
        /// Response code (0 = success).
        code: u8,
        /// Response payload.
        result: Vec<u8>,
    },
    /// Transaction invalid before this height.
    NotValidBefore {
        /// First height at which the transaction may be included.
        height: u32,
    },
    /// Declares this transaction in conflict with another; only one side
    /// can ever be included.
    Conflicts {
        /// Hash of the conflicting transaction.
        hash: Hash256,
    },
    /// Marks a transaction completed by notary nodes.
    NotaryAssisted {
        /// Number of keys involved in the notary completion.
        n_keys: u8,
    },
}

impl TransactionAttribute {
    const TYPE_HIGH_PRIORITY: u8 = 0x01;
    const TYPE_ORACLE_RESPONSE: u8 = 0x11;
    const TYPE_NOT_VALID_BEFORE: u8 = 0x20;
    const TYPE_CONFLICTS: u8 = 0x21;
    const TYPE_NOTARY_ASSISTED: u8 = 0x22;

    /// The wire discriminant.
    #[must_use]
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::HighPriority => Self::TYPE_HIGH_PRIORITY,
            Self::OracleResponse { .. } => Self::TYPE_ORACLE_RESPONSE,
            Self::NotValidBefore { .. } => Self::TYPE_NOT_VALID_BEFORE,
            Self::Conflicts { .. } => Self::TYPE_CONFLICTS,
            Self::NotaryAssisted { .. } => Self::TYPE_NOTARY_ASSISTED,
        }
    }

    /// True for attribute kinds that may appear at most once.
    #[must_use]
    pub fn exclusive(&self) -> bool {
        matches!(self, Self::HighPriority | Self::OracleResponse { .. })
    }
}

impl Serializable for TransactionAttribute {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.type_byte());
        match self {
            Self::HighPriority => {}
            Self::OracleResponse { id, code, result } => {
                writer.write_u64(*id);
                writer.write_u8(*code);
                writer.write_var_bytes(result);
            }
            Self::NotValidBefore { height } => writer.write_u32(*height),
            Self::Conflicts { hash } => hash.serialize(writer),
            Self::NotaryAssisted { n_keys } => writer.write_u8(*n_keys),
        }
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        match reader.read_u8()? {
            Self::TYPE_HIGH_PRIORITY => Ok(Self::HighPriority),
            Self::TYPE_ORACLE_RESPONSE => Ok(Self::OracleResponse {
                id: reader.read_u64()?,
                code: reader.read_u8()?,
                result: reader.read_var_bytes(MAX_ORACLE_RESULT)?,
            }),
            Self::TYPE_NOT_VALID_BEFORE => Ok(Self::NotValidBefore {
                height: reader.read_u32()?,
            }),
            Self::TYPE_CONFLICTS => Ok(Self::Conflicts {
                hash: Hash256::deserialize(reader)?,
            }),
            Self::TYPE_NOTARY_ASSISTED => Ok(Self::NotaryAssisted {
                n_keys: reader.read_u8()?,
            }),
            other => Err(TypeError::OutOfRange(format!(
                "attribute type 0x{other:02x}"
            ))),
        }
    }

    fn size(&self) -> usize {
        1 + match self {
            Self::HighPriority => 0,
            Self::OracleResponse { result, .. } => 8 + 1 + var_bytes_size(result.len()),
            Self::NotValidBefore { .. } => 4,
            Self::Conflicts { .. } => 32,
            Self::NotaryAssisted { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_round_trips() {
        let attributes = [
            TransactionAttribute::HighPriority,
            TransactionAttribute::OracleResponse {
                id: 7,
                code: 0,
                result: vec![1, 2, 3],
            },
            TransactionAttribute::NotValidBefore { height: 1000 },
            TransactionAttribute::Conflicts {
                hash: Hash256([5u8; 32]),
            },
            TransactionAttribute::NotaryAssisted { n_keys: 4 },
        ];
        for attribute in attributes {
            let bytes = attribute.to_bytes();
            assert_eq!(bytes.len(), attribute.size());
            assert_eq!(TransactionAttribute::from_bytes(&bytes).unwrap(), attribute);
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(TransactionAttribute::from_bytes(&[0x7F]).is_err());
    }
}
