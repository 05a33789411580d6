//! Deployed-contract state and the NEF container.

use neo_crypto::sha256d;
use neo_types::io::{var_bytes_size, BinaryReader, BinaryWriter, Serializable};
use neo_types::{ContractManifest, Hash160, TypeError};

/// Maximum NEF script length.
pub const MAX_NEF_SCRIPT: usize = 512 * 1024;

/// The executable container: script plus integrity checksum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NefFile {
    /// Compiler identification string.
    pub compiler: String,
    /// The contract script.
    pub script: Vec<u8>,
    /// First four bytes of the double SHA-256 of the script.
    pub checksum: u32,
}

impl NefFile {
    /// Build a NEF with a computed checksum.
    #[must_use]
    pub fn new(compiler: impl Into<String>, script: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(&script);
        Self {
            compiler: compiler.into(),
            script,
            checksum,
        }
    }

    /// Script checksum.
    #[must_use]
    pub fn compute_checksum(script: &[u8]) -> u32 {
        let digest = sha256d(script);
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    /// True when the stored checksum matches the script.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        self.checksum == Self::compute_checksum(&self.script)
    }
}

impl Serializable for NefFile {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_string(&self.compiler);
        writer.write_var_bytes(&self.script);
        writer.write_u32(self.checksum);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let compiler = reader.read_var_string(256)?;
        let script = reader.read_var_bytes(MAX_NEF_SCRIPT)?;
        if script.is_empty() {
            return Err(TypeError::InvalidFormat("empty NEF script".into()));
        }
        let checksum = reader.read_u32()?;
        let nef = Self {
            compiler,
            script,
            checksum,
        };
        if !nef.checksum_valid() {
            return Err(TypeError::InvalidFormat("NEF checksum mismatch".into()));
        }
        Ok(nef)
    }

    fn size(&self) -> usize {
        var_bytes_size(self.compiler.len()) + var_bytes_size(self.script.len()) + 4
    }
}

/// A deployed (or native) contract's registry entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractState {
    /// Sequential id; negative for natives.
    pub id: i32,
    /// Incremented on every update.
    pub update_counter: u16,
    /// The contract address.
    pub hash: Hash160,
    /// Executable.
    pub nef: NefFile,
    /// Manifest.
    pub manifest: ContractManifest,
}

impl Serializable for ContractState {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_i32(self.id);
        writer.write_u16(self.update_counter);
        self.hash.serialize(writer);
        self.nef.serialize(writer);
        writer.write_var_string(&self.manifest.to_json());
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let id = reader.read_i32()?;
        let update_counter = reader.read_u16()?;
        let hash = Hash160::deserialize(reader)?;
        let nef = NefFile::deserialize(reader)?;
        let manifest_json = reader.read_var_string(neo_types::manifest::MAX_MANIFEST_SIZE)?;
        let manifest = ContractManifest::from_json(&manifest_json)?;
        Ok(Self {
            id,
            update_counter,
            hash,
            nef,
            manifest,
        })
    }

    fn size(&self) -> usize {
        4 + 2 + 20 + self.nef.size() + var_bytes_size(self.manifest.to_json().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nef_checksum() {
        let nef = NefFile::new("neo-core-test", vec![0x11, 0x40]);
        assert!(nef.checksum_valid());
        let mut corrupted = nef.clone();
        corrupted.script[0] = 0x12;
        assert!(!corrupted.checksum_valid());
    }

    #[test]
    fn test_contract_state_round_trip() {
        let state = ContractState {
            id: 7,
            update_counter: 2,
            hash: Hash160([9u8; 20]),
            nef: NefFile::new("neo-core-test", vec![0x40]),
            manifest: ContractManifest::new("example"),
        };
        let bytes = state.to_bytes();
        assert_eq!(bytes.len(), state.size());
        assert_eq!(ContractState::from_bytes(&bytes).unwrap(), state);
    }

    #[test]
    fn test_nef_rejects_bad_checksum() {
        let mut nef = NefFile::new("c", vec![0x40]);
        nef.checksum ^= 1;
        let bytes = nef.to_bytes();
        assert!(NefFile::from_bytes(&bytes).is_err());
    }
}
