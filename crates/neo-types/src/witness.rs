//! Witnesses, witness scopes and witness rules.
//!
//! A witness authorizes one script hash's participation: the verification
//! script hashes to the signer's account and the invocation script pushes
//! whatever that script consumes (usually signatures). Scopes restrict
//! where a signature is valid; rules are a small condition language with
//! nesting capped at two levels.

use crate::error::TypeError;
use crate::hashes::Hash160;
use crate::io::{var_bytes_size, BinaryReader, BinaryWriter, Serializable};
use neo_crypto::ecdsa::ECPoint;

/// Upper bound for invocation scripts (enough for 16 signatures).
pub const MAX_INVOCATION_SCRIPT: usize = 1024;

/// Upper bound for verification scripts.
pub const MAX_VERIFICATION_SCRIPT: usize = 1024;

/// Maximum nesting depth of a witness condition.
pub const MAX_CONDITION_NESTING: u8 = 2;

/// Maximum sub-conditions of an And/Or node.
pub const MAX_SUBITEMS: usize = 16;

// =============================================================================
// WITNESS
// =============================================================================

/// Invocation + verification script pair.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Witness {
    /// Pushes the arguments the verification script consumes.
    pub invocation_script: Vec<u8>,
    /// The authority being exercised; its Hash160 is the witnessed account.
    pub verification_script: Vec<u8>,
}

impl Witness {
    /// Script hash of the verification script.
    #[must_use]
    pub fn script_hash(&self) -> Hash160 {
        Hash160::from_script(&self.verification_script)
    }
}

impl Serializable for Witness {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&self.invocation_script);
        writer.write_var_bytes(&self.verification_script);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        Ok(Self {
            invocation_script: reader.read_var_bytes(MAX_INVOCATION_SCRIPT)?,
            verification_script: reader.read_var_bytes(MAX_VERIFICATION_SCRIPT)?,
        })
    }

    fn size(&self) -> usize {
        var_bytes_size(self.invocation_script.len())
            + var_bytes_size(self.verification_script.len())
    }
}

// =============================================================================
// SCOPES
// =============================================================================

/// Bit mask of signer scopes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct WitnessScopes(u8);

impl WitnessScopes {
    /// Witness only valid for fee payment / the signing transaction itself.
    pub const NONE: u8 = 0x00;
    /// Valid when the called contract is the transaction entry script.
    pub const CALLED_BY_ENTRY: u8 = 0x01;
    /// Valid inside explicitly listed contracts.
    pub const CUSTOM_CONTRACTS: u8 = 0x10;
    /// Valid inside contracts of explicitly listed groups.
    pub const CUSTOM_GROUPS: u8 = 0x20;
    /// Scope determined by witness rules.
    pub const WITNESS_RULES: u8 = 0x40;
    /// Valid everywhere. Exclusive with every other bit.
    pub const GLOBAL: u8 = 0x80;

    const ALL_BITS: u8 = Self::CALLED_BY_ENTRY
        | Self::CUSTOM_CONTRACTS
        | Self::CUSTOM_GROUPS
        | Self::WITNESS_RULES
        | Self::GLOBAL;

    /// Validate and wrap a scope byte.
    pub fn from_byte(byte: u8) -> Result<Self, TypeError> {
        if byte & !Self::ALL_BITS != 0 {
            return Err(TypeError::OutOfRange(format!("scope byte 0x{byte:02x}")));
        }
        if byte & Self::GLOBAL != 0 && byte != Self::GLOBAL {
            return Err(TypeError::InvalidFormat(
                "Global scope is exclusive".into(),
            ));
        }
        Ok(Self(byte))
    }

    /// The raw byte.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// True if `flag` is present.
    #[must_use]
    pub const fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    /// True for the empty (fee-only) scope.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    /// Scope containing exactly `flag`.
    #[must_use]
    pub const fn from_flag(flag: u8) -> Self {
        Self(flag)
    }
}

// =============================================================================
// RULES
// =============================================================================

/// Whether a matched rule admits or rejects the witness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WitnessRuleAction {
    /// Reject when the condition matches.
    Deny = 0,
    /// Admit when the condition matches.
    Allow = 1,
}

/// A single witness rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessRule {
    /// Admit or reject on match.
    pub action: WitnessRuleAction,
    /// The condition tree, nested at most two levels.
    pub condition: WitnessCondition,
}

/// Condition language for witness rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WitnessCondition {
    /// Constant truth value.
    Boolean(bool),
    /// Negation.
    Not(Box<WitnessCondition>),
    /// Conjunction.
    And(Vec<WitnessCondition>),
    /// Disjunction.
    Or(Vec<WitnessCondition>),
    /// The current (executing) script hash equals the given hash.
    ScriptHash(Hash160),
    /// The current contract belongs to the given group.
    Group(ECPoint),
    /// The calling script is the transaction entry script.
    CalledByEntry,
    /// The calling contract has the given hash.
    CalledByContract(Hash160),
    /// The calling contract belongs to the given group.
    CalledByGroup(ECPoint),
}

impl WitnessCondition {
    const TYPE_BOOLEAN: u8 = 0x00;
    const TYPE_NOT: u8 = 0x01;
    const TYPE_AND: u8 = 0x02;
    const TYPE_OR: u8 = 0x03;
    const TYPE_SCRIPT_HASH: u8 = 0x18;
    const TYPE_GROUP: u8 = 0x19;
    const TYPE_CALLED_BY_ENTRY: u8 = 0x20;
    const TYPE_CALLED_BY_CONTRACT: u8 = 0x28;
    const TYPE_CALLED_BY_GROUP: u8 = 0x29;

    fn serialize_inner(&self, writer: &mut BinaryWriter) {
        match self {
            Self::Boolean(value) => {
                writer.write_u8(Self::TYPE_BOOLEAN);
                writer.write_bool(*value);
            }
            Self::Not(inner) => {
                writer.write_u8(Self::TYPE_NOT);
                inner.serialize_inner(writer);
            }
            Self::And(items) => {
                writer.write_u8(Self::TYPE_AND);
                writer.write_var_int(items.len() as u64);
                for item in items {
                    item.serialize_inner(writer);
                }
            }
            Self::Or(items) => {
                writer.write_u8(Self::TYPE_OR);
                writer.write_var_int(items.len() as u64);
                for item in items {
                    item.serialize_inner(writer);
                }
            }
            Self::ScriptHash(hash) => {
                writer.write_u8(Self::TYPE_SCRIPT_HASH);
                hash.serialize(writer);
            }
            Self::Group(point) => {
                writer.write_u8(Self::TYPE_GROUP);
                writer.write_bytes(&point.encode_compressed());
            }
            Self::CalledByEntry => writer.write_u8(Self::TYPE_CALLED_BY_ENTRY),
            Self::CalledByContract(hash) => {
                writer.write_u8(Self::TYPE_CALLED_BY_CONTRACT);
                hash.serialize(writer);
            }
            Self::CalledByGroup(point) => {
                writer.write_u8(Self::TYPE_CALLED_BY_GROUP);
                writer.write_bytes(&point.encode_compressed());
            }
        }
    }

    fn deserialize_inner(reader: &mut BinaryReader, depth: u8) -> Result<Self, TypeError> {
        let kind = reader.read_u8()?;
        let nested = matches!(kind, Self::TYPE_NOT | Self::TYPE_AND | Self::TYPE_OR);
        if nested && depth == 0 {
            return Err(TypeError::InvalidFormat(
                "witness condition nested too deeply".into(),
            ));
        }
        match kind {
            Self::TYPE_BOOLEAN => Ok(Self::Boolean(reader.read_bool()?)),
            Self::TYPE_NOT => Ok(Self::Not(Box::new(Self::deserialize_inner(
                reader,
                depth - 1,
            )?))),
            Self::TYPE_AND | Self::TYPE_OR => {
                let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
                if count == 0 {
                    return Err(TypeError::InvalidFormat(
                        "empty witness condition list".into(),
                    ));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::deserialize_inner(reader, depth - 1)?);
                }
                if kind == Self::TYPE_AND {
                    Ok(Self::And(items))
                } else {
                    Ok(Self::Or(items))
                }
            }
            Self::TYPE_SCRIPT_HASH => Ok(Self::ScriptHash(Hash160::deserialize(reader)?)),
            Self::TYPE_GROUP => {
                let bytes = reader.read_bytes(33)?;
                let point = ECPoint::from_bytes(&bytes)
                    .map_err(|e| TypeError::InvalidEncoding(e.to_string()))?;
                Ok(Self::Group(point))
            }
            Self::TYPE_CALLED_BY_ENTRY => Ok(Self::CalledByEntry),
            Self::TYPE_CALLED_BY_CONTRACT => {
                Ok(Self::CalledByContract(Hash160::deserialize(reader)?))
            }
            Self::TYPE_CALLED_BY_GROUP => {
                let bytes = reader.read_bytes(33)?;
                let point = ECPoint::from_bytes(&bytes)
                    .map_err(|e| TypeError::InvalidEncoding(e.to_string()))?;
                Ok(Self::CalledByGroup(point))
            }
            other => Err(TypeError::OutOfRange(format!(
                "witness condition type 0x{other:02x}"
            ))),
        }
    }

    fn inner_size(&self) -> usize {
        1 + match self {
            Self::Boolean(_) => 1,
            Self::Not(inner) => inner.inner_size(),
            Self::And(items) | Self::Or(items) => {
                1 + items.iter().map(Self::inner_size).sum::<usize>()
            }
            Self::ScriptHash(_) | Self::CalledByContract(_) => 20,
            Self::Group(_) | Self::CalledByGroup(_) => 33,
            Self::CalledByEntry => 0,
        }
    }
}

impl Serializable for WitnessRule {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.action as u8);
        self.condition.serialize_inner(writer);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let action = match reader.read_u8()? {
            0 => WitnessRuleAction::Deny,
            1 => WitnessRuleAction::Allow,
            other => {
                return Err(TypeError::OutOfRange(format!(
                    "witness rule action 0x{other:02x}"
                )))
            }
        };
        let condition = WitnessCondition::deserialize_inner(reader, MAX_CONDITION_NESTING)?;
        Ok(Self { action, condition })
    }

    fn size(&self) -> usize {
        1 + self.condition.inner_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_witness_round_trip() {
        let witness = Witness {
            invocation_script: vec![0x0C, 0x40, 0xAA],
            verification_script: vec![0x0C, 0x21, 0xBB],
        };
        let bytes = witness.to_bytes();
        assert_eq!(bytes.len(), witness.size());
        assert_eq!(Witness::from_bytes(&bytes).unwrap(), witness);
    }

    #[test]
    fn test_scope_global_is_exclusive() {
        assert!(WitnessScopes::from_byte(0x80).is_ok());
        assert!(WitnessScopes::from_byte(0x81).is_err());
    }

    #[test]
    fn test_scope_rejects_unknown_bits() {
        assert!(WitnessScopes::from_byte(0x02).is_err());
        assert!(WitnessScopes::from_byte(0x11).is_ok());
    }

    #[test]
    fn test_rule_round_trip() {
        let rule = WitnessRule {
            action: WitnessRuleAction::Allow,
            condition: WitnessCondition::And(vec![
                WitnessCondition::CalledByEntry,
                WitnessCondition::ScriptHash(Hash160([9u8; 20])),
            ]),
        };
        let bytes = rule.to_bytes();
        assert_eq!(bytes.len(), rule.size());
        assert_eq!(WitnessRule::from_bytes(&bytes).unwrap(), rule);
    }

    #[test]
    fn test_rule_nesting_limit() {
        // Three levels of Not exceeds the cap.
        let rule = WitnessRule {
            action: WitnessRuleAction::Deny,
            condition: WitnessCondition::Not(Box::new(WitnessCondition::Not(Box::new(
                WitnessCondition::Not(Box::new(WitnessCondition::Boolean(true))),
            )))),
        };
        let bytes = rule.to_bytes();
        assert!(WitnessRule::from_bytes(&bytes).is_err());
    }
}
