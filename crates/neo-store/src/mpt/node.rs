//! Trie node variants and their content-addressed encoding.
//!
//! Child positions inside a serialized node always hold a reference
//! (`Empty` or `HashRef`), never an inline child, so a node's encoding
//! and therefore its hash depends only on its direct content plus child
//! hashes.

use neo_types::io::{BinaryReader, BinaryWriter};
use neo_types::{Hash256, TypeError};

/// Branch child count: 16 nibble slots plus the end-of-key slot.
pub const BRANCH_CHILDREN: usize = 17;

/// Index of the end-of-key child inside a branch.
pub const BRANCH_VALUE_SLOT: usize = 16;

const TYPE_BRANCH: u8 = 0x00;
const TYPE_EXTENSION: u8 = 0x01;
const TYPE_LEAF: u8 = 0x02;
const TYPE_HASH: u8 = 0x03;
const TYPE_EMPTY: u8 = 0x04;

/// Longest extension path (nibbles of a 64-byte key).
const MAX_PATH_NIBBLES: usize = 128;

/// Largest leaf payload.
const MAX_LEAF_VALUE: usize = u16::MAX as usize;

/// A node in the Merkle Patricia Trie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MptNode {
    /// Absent subtree.
    Empty,
    /// Terminal value; the full path is encoded by the nodes above.
    Leaf {
        /// Stored bytes.
        value: Vec<u8>,
    },
    /// A run of nibbles shared by every key below.
    Extension {
        /// One nibble per byte.
        path: Vec<u8>,
        /// The subtree below the shared run.
        child: Box<MptNode>,
    },
    /// 16-way fan-out plus the end-of-key slot.
    Branch {
        /// Children indexed by next nibble; slot 16 is end-of-key.
        children: Box<[MptNode; BRANCH_CHILDREN]>,
    },
    /// An unresolved reference to a stored node.
    HashRef(Hash256),
}

impl MptNode {
    /// A branch with every slot empty.
    #[must_use]
    pub fn empty_branch() -> Self {
        MptNode::Branch {
            children: Box::new(std::array::from_fn(|_| MptNode::Empty)),
        }
    }

    /// True for `Empty`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, MptNode::Empty)
    }

    /// Serialize a child position: its hash reference, never its body.
    fn write_child(child: &MptNode, writer: &mut BinaryWriter) {
        match child {
            MptNode::Empty => writer.write_u8(TYPE_EMPTY),
            MptNode::HashRef(hash) => {
                writer.write_u8(TYPE_HASH);
                writer.write_bytes(hash.as_bytes());
            }
            resolved => {
                writer.write_u8(TYPE_HASH);
                writer.write_bytes(resolved.hash().as_bytes());
            }
        }
    }

    /// The compact encoding whose hash is this node's identity.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        match self {
            MptNode::Empty => writer.write_u8(TYPE_EMPTY),
            MptNode::Leaf { value } => {
                writer.write_u8(TYPE_LEAF);
                writer.write_var_bytes(value);
            }
            MptNode::Extension { path, child } => {
                writer.write_u8(TYPE_EXTENSION);
                writer.write_var_bytes(path);
                Self::write_child(child, &mut writer);
            }
            MptNode::Branch { children } => {
                writer.write_u8(TYPE_BRANCH);
                for child in children.iter() {
                    Self::write_child(child, &mut writer);
                }
            }
            MptNode::HashRef(hash) => {
                writer.write_u8(TYPE_HASH);
                writer.write_bytes(hash.as_bytes());
            }
        }
        writer.into_bytes()
    }

    /// Decode a node encoding; children come back as `HashRef`s.
    pub fn decode(bytes: &[u8]) -> Result<Self, TypeError> {
        let mut reader = BinaryReader::new(bytes);
        let node = Self::decode_from(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(TypeError::TrailingBytes(reader.remaining()));
        }
        Ok(node)
    }

    fn decode_from(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        match reader.read_u8()? {
            TYPE_EMPTY => Ok(MptNode::Empty),
            TYPE_LEAF => Ok(MptNode::Leaf {
                value: reader.read_var_bytes(MAX_LEAF_VALUE)?,
            }),
            TYPE_EXTENSION => {
                let path = reader.read_var_bytes(MAX_PATH_NIBBLES)?;
                let child = Self::decode_from(reader)?;
                Ok(MptNode::Extension {
                    path,
                    child: Box::new(child),
                })
            }
            TYPE_BRANCH => {
                let mut children: [MptNode; BRANCH_CHILDREN] =
                    std::array::from_fn(|_| MptNode::Empty);
                for slot in children.iter_mut() {
                    *slot = Self::decode_from(reader)?;
                }
                Ok(MptNode::Branch {
                    children: Box::new(children),
                })
            }
            TYPE_HASH => Ok(MptNode::HashRef(Hash256(reader.read_array::<32>()?))),
            other => Err(TypeError::OutOfRange(format!("node type 0x{other:02x}"))),
        }
    }

    /// This node's content address.
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        if let MptNode::HashRef(hash) = self {
            return *hash;
        }
        Hash256::from_data(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_round_trip() {
        let leaf = MptNode::Leaf {
            value: b"puppy".to_vec(),
        };
        let decoded = MptNode::decode(&leaf.encode()).unwrap();
        assert_eq!(decoded, leaf);
        assert_eq!(decoded.hash(), leaf.hash());
    }

    #[test]
    fn test_children_encode_as_references() {
        let leaf = MptNode::Leaf {
            value: b"value".to_vec(),
        };
        let extension = MptNode::Extension {
            path: vec![1, 2, 3],
            child: Box::new(leaf.clone()),
        };
        let decoded = MptNode::decode(&extension.encode()).unwrap();
        match decoded {
            MptNode::Extension { path, child } => {
                assert_eq!(path, vec![1, 2, 3]);
                assert_eq!(*child, MptNode::HashRef(leaf.hash()));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn test_hash_ignores_child_resolution() {
        // An inline child and its hash reference encode identically.
        let leaf = MptNode::Leaf {
            value: b"v".to_vec(),
        };
        let inline = MptNode::Extension {
            path: vec![7],
            child: Box::new(leaf.clone()),
        };
        let referenced = MptNode::Extension {
            path: vec![7],
            child: Box::new(MptNode::HashRef(leaf.hash())),
        };
        assert_eq!(inline.hash(), referenced.hash());
    }

    #[test]
    fn test_branch_round_trip() {
        let mut branch = MptNode::empty_branch();
        if let MptNode::Branch { children } = &mut branch {
            children[3] = MptNode::Leaf {
                value: b"three".to_vec(),
            };
            children[BRANCH_VALUE_SLOT] = MptNode::Leaf {
                value: b"end".to_vec(),
            };
        }
        let decoded = MptNode::decode(&branch.encode()).unwrap();
        assert_eq!(decoded.hash(), branch.hash());
    }
}
