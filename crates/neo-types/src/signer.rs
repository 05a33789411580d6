//! Transaction signers.

use crate::error::TypeError;
use crate::hashes::Hash160;
use crate::io::{BinaryReader, BinaryWriter, Serializable};
use crate::witness::{WitnessRule, WitnessScopes, MAX_SUBITEMS};
use neo_crypto::ecdsa::ECPoint;

/// An account whose witness must authorize the transaction, plus the
/// scope that witness is valid in. The first signer pays the fees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signer {
    /// The witnessed account.
    pub account: Hash160,
    /// Scope mask.
    pub scopes: WitnessScopes,
    /// Contracts the witness covers (CustomContracts scope).
    pub allowed_contracts: Vec<Hash160>,
    /// Contract groups the witness covers (CustomGroups scope).
    pub allowed_groups: Vec<ECPoint>,
    /// Witness rules (WitnessRules scope).
    pub rules: Vec<WitnessRule>,
}

impl Signer {
    /// A signer with only the given scope flag and no lists.
    #[must_use]
    pub fn with_scope(account: Hash160, scope_flag: u8) -> Self {
        Self {
            account,
            scopes: WitnessScopes::from_flag(scope_flag),
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl Serializable for Signer {
    fn serialize(&self, writer: &mut BinaryWriter) {
        self.account.serialize(writer);
        writer.write_u8(self.scopes.bits());
        if self.scopes.contains(WitnessScopes::CUSTOM_CONTRACTS) {
            writer.write_serializable_vec(&self.allowed_contracts);
        }
        if self.scopes.contains(WitnessScopes::CUSTOM_GROUPS) {
            writer.write_var_int(self.allowed_groups.len() as u64);
            for group in &self.allowed_groups {
                writer.write_bytes(&group.encode_compressed());
            }
        }
        if self.scopes.contains(WitnessScopes::WITNESS_RULES) {
            writer.write_serializable_vec(&self.rules);
        }
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let account = Hash160::deserialize(reader)?;
        let scopes = WitnessScopes::from_byte(reader.read_u8()?)?;

        let allowed_contracts = if scopes.contains(WitnessScopes::CUSTOM_CONTRACTS) {
            let contracts = reader.read_serializable_vec::<Hash160>(MAX_SUBITEMS)?;
            if contracts.is_empty() {
                return Err(TypeError::InvalidFormat(
                    "CustomContracts scope with empty list".into(),
                ));
            }
            contracts
        } else {
            Vec::new()
        };

        let allowed_groups = if scopes.contains(WitnessScopes::CUSTOM_GROUPS) {
            let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
            if count == 0 {
                return Err(TypeError::InvalidFormat(
                    "CustomGroups scope with empty list".into(),
                ));
            }
            let mut groups = Vec::with_capacity(count);
            for _ in 0..count {
                let bytes = reader.read_bytes(33)?;
                groups.push(
                    ECPoint::from_bytes(&bytes)
                        .map_err(|e| TypeError::InvalidEncoding(e.to_string()))?,
                );
            }
            groups
        } else {
            Vec::new()
        };

        let rules = if scopes.contains(WitnessScopes::WITNESS_RULES) {
            let rules = reader.read_serializable_vec::<WitnessRule>(MAX_SUBITEMS)?;
            if rules.is_empty() {
                return Err(TypeError::InvalidFormat(
                    "WitnessRules scope with empty list".into(),
                ));
            }
            rules
        } else {
            Vec::new()
        };

        Ok(Self {
            account,
            scopes,
            allowed_contracts,
            allowed_groups,
            rules,
        })
    }

    fn size(&self) -> usize {
        let mut size = 20 + 1;
        if self.scopes.contains(WitnessScopes::CUSTOM_CONTRACTS) {
            size += crate::io::var_int_size(self.allowed_contracts.len() as u64)
                + self.allowed_contracts.len() * 20;
        }
        if self.scopes.contains(WitnessScopes::CUSTOM_GROUPS) {
            size += crate::io::var_int_size(self.allowed_groups.len() as u64)
                + self.allowed_groups.len() * 33;
        }
        if self.scopes.contains(WitnessScopes::WITNESS_RULES) {
            size += crate::io::var_int_size(self.rules.len() as u64)
                + self.rules.iter().map(Serializable::size).sum::<usize>();
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_signer_round_trip() {
        let signer = Signer::with_scope(Hash160([1u8; 20]), WitnessScopes::CALLED_BY_ENTRY);
        let bytes = signer.to_bytes();
        assert_eq!(bytes.len(), signer.size());
        assert_eq!(Signer::from_bytes(&bytes).unwrap(), signer);
    }

    #[test]
    fn test_custom_contracts_round_trip() {
        let mut signer = Signer::with_scope(
            Hash160([2u8; 20]),
            WitnessScopes::CALLED_BY_ENTRY | WitnessScopes::CUSTOM_CONTRACTS,
        );
        signer.allowed_contracts = vec![Hash160([3u8; 20]), Hash160([4u8; 20])];
        let bytes = signer.to_bytes();
        assert_eq!(bytes.len(), signer.size());
        assert_eq!(Signer::from_bytes(&bytes).unwrap(), signer);
    }

    #[test]
    fn test_empty_scope_list_rejected() {
        let signer = Signer::with_scope(Hash160([2u8; 20]), WitnessScopes::CUSTOM_CONTRACTS);
        let bytes = signer.to_bytes();
        assert!(Signer::from_bytes(&bytes).is_err());
    }
}
