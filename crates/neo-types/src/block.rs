//! Block headers and blocks.
//!
//! The block hash is the double SHA-256 of the header without its
//! witness; the full header serialization appends a one-element witness
//! list.

use crate::error::TypeError;
use crate::hashes::{Hash160, Hash256};
use crate::io::{var_int_size, BinaryReader, BinaryWriter, Serializable};
use crate::transaction::Transaction;
use crate::witness::Witness;
use neo_crypto::merkle::MerkleTree;

/// Maximum transactions a block may carry on the wire.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = u16::MAX as usize;

/// A block header.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Header {
    /// Format version; only 0 is defined.
    pub version: u32,
    /// Hash of the previous block.
    pub prev_hash: Hash256,
    /// Merkle root over the block's transaction hashes.
    pub merkle_root: Hash256,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Consensus nonce.
    pub nonce: u64,
    /// Height of this block.
    pub index: u32,
    /// Index of the consensus round's primary speaker.
    pub primary_index: u8,
    /// Script hash of the next round's consensus multi-sig address.
    pub next_consensus: Hash160,
    /// The consensus witness.
    pub witness: Witness,
}

impl Header {
    /// Serialize the hash-covered prefix (everything except the witness).
    pub fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.version);
        self.prev_hash.serialize(writer);
        self.merkle_root.serialize(writer);
        writer.write_u64(self.timestamp_ms);
        writer.write_u64(self.nonce);
        writer.write_u32(self.index);
        writer.write_u8(self.primary_index);
        self.next_consensus.serialize(writer);
    }

    /// Block hash: double SHA-256 of the unsigned header.
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        let mut writer = BinaryWriter::new();
        self.serialize_unsigned(&mut writer);
        Hash256::from_data(writer.as_bytes())
    }
}

impl Serializable for Header {
    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        writer.write_var_int(1);
        self.witness.serialize(writer);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let version = reader.read_u32()?;
        if version != 0 {
            return Err(TypeError::OutOfRange(format!("header version {version}")));
        }
        let prev_hash = Hash256::deserialize(reader)?;
        let merkle_root = Hash256::deserialize(reader)?;
        let timestamp_ms = reader.read_u64()?;
        let nonce = reader.read_u64()?;
        let index = reader.read_u32()?;
        let primary_index = reader.read_u8()?;
        let next_consensus = Hash160::deserialize(reader)?;

        let witness_count = reader.read_var_int(1)?;
        if witness_count != 1 {
            return Err(TypeError::InvalidFormat(format!(
                "header carries {witness_count} witnesses"
            )));
        }
        let witness = Witness::deserialize(reader)?;

        Ok(Self {
            version,
            prev_hash,
            merkle_root,
            timestamp_ms,
            nonce,
            index,
            primary_index,
            next_consensus,
            witness,
        })
    }

    fn size(&self) -> usize {
        4 + 32 + 32 + 8 + 8 + 4 + 1 + 20 + 1 + self.witness.size()
    }
}

/// A full block: header plus ordered transactions.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Block {
    /// The header.
    pub header: Header,
    /// Transactions in execution order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block hash (the header hash).
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Height of this block.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.header.index
    }

    /// Merkle root computed from the actual transaction list.
    #[must_use]
    pub fn compute_merkle_root(&self) -> Hash256 {
        let leaves: Vec<[u8; 32]> = self
            .transactions
            .iter()
            .map(|tx| tx.hash().0)
            .collect();
        Hash256(MerkleTree::compute_root(&leaves))
    }

    /// True when the header's merkle root matches the transactions.
    #[must_use]
    pub fn merkle_root_valid(&self) -> bool {
        self.header.merkle_root == self.compute_merkle_root()
    }
}

impl Serializable for Block {
    fn serialize(&self, writer: &mut BinaryWriter) {
        self.header.serialize(writer);
        writer.write_serializable_vec(&self.transactions);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let header = Header::deserialize(reader)?;
        let transactions =
            reader.read_serializable_vec::<Transaction>(MAX_TRANSACTIONS_PER_BLOCK)?;
        for (i, tx) in transactions.iter().enumerate() {
            let hash = tx.hash();
            if transactions[..i].iter().any(|other| other.hash() == hash) {
                return Err(TypeError::InvalidFormat("duplicate transaction".into()));
            }
        }
        Ok(Self {
            header,
            transactions,
        })
    }

    fn size(&self) -> usize {
        self.header.size()
            + var_int_size(self.transactions.len() as u64)
            + self
                .transactions
                .iter()
                .map(Serializable::size)
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Signer;
    use crate::witness::WitnessScopes;

    fn sample_block() -> Block {
        let tx = Transaction {
            version: 0,
            nonce: 1,
            system_fee: 0,
            network_fee: 0,
            valid_until_block: 10,
            signers: vec![Signer::with_scope(
                Hash160([1u8; 20]),
                WitnessScopes::CALLED_BY_ENTRY,
            )],
            attributes: vec![],
            script: vec![0x40],
            witnesses: vec![Witness::default()],
        };
        let mut block = Block {
            header: Header {
                version: 0,
                prev_hash: Hash256([8u8; 32]),
                merkle_root: Hash256::zero(),
                timestamp_ms: 1_600_000_000_000,
                nonce: 42,
                index: 3,
                primary_index: 1,
                next_consensus: Hash160([7u8; 20]),
                witness: Witness {
                    invocation_script: vec![0x0C],
                    verification_script: vec![0x0D],
                },
            },
            transactions: vec![tx],
        };
        block.header.merkle_root = block.compute_merkle_root();
        block
    }

    #[test]
    fn test_block_round_trip() {
        let block = sample_block();
        let bytes = block.to_bytes();
        assert_eq!(bytes.len(), block.size());
        assert_eq!(Block::from_bytes(&bytes).unwrap(), block);
    }

    #[test]
    fn test_hash_excludes_witness() {
        let mut block = sample_block();
        let original = block.hash();
        block.header.witness.invocation_script = vec![0xFF; 32];
        assert_eq!(block.hash(), original);
        block.header.nonce += 1;
        assert_ne!(block.hash(), original);
    }

    #[test]
    fn test_merkle_root_validation() {
        let mut block = sample_block();
        assert!(block.merkle_root_valid());
        block.header.merkle_root = Hash256([1u8; 32]);
        assert!(!block.merkle_root_valid());
    }

    #[test]
    fn test_empty_block_merkle_root_is_zero() {
        let mut block = sample_block();
        block.transactions.clear();
        assert_eq!(block.compute_merkle_root(), Hash256::zero());
    }
}
