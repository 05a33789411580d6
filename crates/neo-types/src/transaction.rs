//! Transactions.
//!
//! The transaction hash covers only the unsigned layout (everything up to
//! and excluding the witnesses), so attaching or mutating witnesses never
//! changes identity.

use crate::attribute::TransactionAttribute;
use crate::error::TypeError;
use crate::hashes::Hash256;
use crate::io::{var_bytes_size, var_int_size, BinaryReader, BinaryWriter, Serializable};
use crate::signer::Signer;
use crate::witness::Witness;

/// Current transaction version.
pub const TX_VERSION: u8 = 0;

/// Hard cap on a serialized transaction.
pub const MAX_TRANSACTION_SIZE: usize = 102_400;

/// Maximum combined signers + attributes.
pub const MAX_TRANSACTION_ATTRIBUTES: usize = 16;

/// Maximum entry script length.
pub const MAX_TRANSACTION_SCRIPT: usize = u16::MAX as usize;

/// A Neo N3 transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Format version; only 0 is defined.
    pub version: u8,
    /// Random nonce distinguishing otherwise-identical transactions.
    pub nonce: u32,
    /// GAS (10^-8 units) consumed by execution; burned.
    pub system_fee: i64,
    /// GAS (10^-8 units) paid for size and verification; rewarded.
    pub network_fee: i64,
    /// Last block height at which this transaction may be included.
    pub valid_until_block: u32,
    /// Witness accounts; the first signer pays fees.
    pub signers: Vec<Signer>,
    /// Typed attributes.
    pub attributes: Vec<TransactionAttribute>,
    /// The entry script.
    pub script: Vec<u8>,
    /// One witness per signer, in signer order.
    pub witnesses: Vec<Witness>,
}

impl Transaction {
    /// Transaction hash: double SHA-256 of the unsigned serialization.
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        let mut writer = BinaryWriter::new();
        self.serialize_unsigned(&mut writer);
        Hash256::from_data(writer.as_bytes())
    }

    /// The fee payer.
    #[must_use]
    pub fn sender(&self) -> Option<&Signer> {
        self.signers.first()
    }

    /// Network fee divided by serialized size, the mempool priority key.
    #[must_use]
    pub fn fee_per_byte(&self) -> i64 {
        let size = self.size() as i64;
        if size == 0 {
            return 0;
        }
        self.network_fee / size
    }

    /// All `Conflicts` attribute hashes.
    pub fn conflicts(&self) -> impl Iterator<Item = Hash256> + '_ {
        self.attributes.iter().filter_map(|attr| match attr {
            TransactionAttribute::Conflicts { hash } => Some(*hash),
            _ => None,
        })
    }

    /// Serialize the hash-covered prefix.
    pub fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.version);
        writer.write_u32(self.nonce);
        writer.write_i64(self.system_fee);
        writer.write_i64(self.network_fee);
        writer.write_u32(self.valid_until_block);
        writer.write_serializable_vec(&self.signers);
        writer.write_serializable_vec(&self.attributes);
        writer.write_var_bytes(&self.script);
    }

    fn deserialize_unsigned(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let version = reader.read_u8()?;
        if version != TX_VERSION {
            return Err(TypeError::OutOfRange(format!("tx version {version}")));
        }
        let nonce = reader.read_u32()?;
        let system_fee = reader.read_i64()?;
        let network_fee = reader.read_i64()?;
        if system_fee < 0 || network_fee < 0 {
            return Err(TypeError::InvalidFormat("negative fee".into()));
        }
        system_fee
            .checked_add(network_fee)
            .ok_or_else(|| TypeError::InvalidFormat("fee overflow".into()))?;
        let valid_until_block = reader.read_u32()?;

        let signers = reader.read_serializable_vec::<Signer>(MAX_TRANSACTION_ATTRIBUTES)?;
        if signers.is_empty() {
            return Err(TypeError::InvalidFormat("no signers".into()));
        }
        for (i, signer) in signers.iter().enumerate() {
            if signers[..i].iter().any(|s| s.account == signer.account) {
                return Err(TypeError::InvalidFormat("duplicate signer".into()));
            }
        }

        let max_attributes = MAX_TRANSACTION_ATTRIBUTES - signers.len();
        let attributes =
            reader.read_serializable_vec::<TransactionAttribute>(max_attributes)?;
        for (i, attribute) in attributes.iter().enumerate() {
            if attribute.exclusive()
                && attributes[..i]
                    .iter()
                    .any(|a| a.type_byte() == attribute.type_byte())
            {
                return Err(TypeError::InvalidFormat(
                    "duplicate exclusive attribute".into(),
                ));
            }
        }

        let script = reader.read_var_bytes(MAX_TRANSACTION_SCRIPT)?;
        if script.is_empty() {
            return Err(TypeError::InvalidFormat("empty script".into()));
        }

        Ok(Self {
            version,
            nonce,
            system_fee,
            network_fee,
            valid_until_block,
            signers,
            attributes,
            script,
            witnesses: Vec::new(),
        })
    }
}

impl Serializable for Transaction {
    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        writer.write_serializable_vec(&self.witnesses);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let mut tx = Self::deserialize_unsigned(reader)?;
        tx.witnesses = reader.read_serializable_vec::<Witness>(MAX_TRANSACTION_ATTRIBUTES)?;
        if tx.witnesses.len() != tx.signers.len() {
            return Err(TypeError::InvalidFormat(format!(
                "{} witnesses for {} signers",
                tx.witnesses.len(),
                tx.signers.len()
            )));
        }
        Ok(tx)
    }

    fn size(&self) -> usize {
        let unsigned = 1 + 4 + 8 + 8 + 4
            + var_int_size(self.signers.len() as u64)
            + self.signers.iter().map(Serializable::size).sum::<usize>()
            + var_int_size(self.attributes.len() as u64)
            + self.attributes.iter().map(Serializable::size).sum::<usize>()
            + var_bytes_size(self.script.len());
        unsigned
            + var_int_size(self.witnesses.len() as u64)
            + self.witnesses.iter().map(Serializable::size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::Hash160;
    use crate::witness::WitnessScopes;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 0,
            nonce: 0xDEAD_BEEF,
            system_fee: 100,
            network_fee: 200,
            valid_until_block: 1000,
            signers: vec![Signer::with_scope(
                Hash160([1u8; 20]),
                WitnessScopes::CALLED_BY_ENTRY,
            )],
            attributes: vec![TransactionAttribute::Conflicts {
                hash: Hash256([9u8; 32]),
            }],
            script: vec![0x11, 0x12, 0x9E],
            witnesses: vec![Witness {
                invocation_script: vec![0x01],
                verification_script: vec![0x02],
            }],
        }
    }

    #[test]
    fn test_round_trip() {
        let tx = sample_tx();
        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), tx.size());
        assert_eq!(Transaction::from_bytes(&bytes).unwrap(), tx);
    }

    #[test]
    fn test_hash_ignores_witnesses() {
        let mut tx = sample_tx();
        let original = tx.hash();
        tx.witnesses[0].invocation_script = vec![0xFF; 64];
        assert_eq!(tx.hash(), original);
        tx.nonce += 1;
        assert_ne!(tx.hash(), original);
    }

    #[test]
    fn test_witness_count_must_match_signers() {
        let mut tx = sample_tx();
        tx.witnesses.push(Witness::default());
        let bytes = tx.to_bytes();
        assert!(Transaction::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_negative_fee_rejected() {
        let mut tx = sample_tx();
        tx.system_fee = -1;
        let bytes = tx.to_bytes();
        assert!(Transaction::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_conflicts_iterator() {
        let tx = sample_tx();
        let conflicts: Vec<Hash256> = tx.conflicts().collect();
        assert_eq!(conflicts, vec![Hash256([9u8; 32])]);
    }
}
