//! Typed payloads for the command set.

use neo_types::io::{var_bytes_size, var_int_size, BinaryReader, BinaryWriter, Serializable};
use neo_types::{Hash256, TypeError};

/// Maximum hashes in one inventory payload.
pub const MAX_INV_HASHES: usize = 500;

/// Maximum addresses in one addr payload.
pub const MAX_ADDRESSES: usize = 200;

/// Maximum locator hashes in getheaders / getblocks.
pub const MAX_LOCATOR_HASHES: usize = 32;

/// Inventory item kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InventoryType {
    /// A transaction.
    Transaction = 0x2B,
    /// A block.
    Block = 0x2C,
    /// A consensus payload.
    Consensus = 0x2D,
    /// An extensible payload.
    Extensible = 0x2E,
}

impl InventoryType {
    /// Decode the wire byte.
    pub fn from_byte(byte: u8) -> Result<Self, TypeError> {
        match byte {
            0x2B => Ok(Self::Transaction),
            0x2C => Ok(Self::Block),
            0x2D => Ok(Self::Consensus),
            0x2E => Ok(Self::Extensible),
            other => Err(TypeError::OutOfRange(format!("inventory type 0x{other:02x}"))),
        }
    }
}

/// `inv` / `getdata` / `notfound` / `getblocks` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryPayload {
    /// What the hashes identify.
    pub inventory_type: InventoryType,
    /// The announced or requested hashes.
    pub hashes: Vec<Hash256>,
}

impl Serializable for InventoryPayload {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.inventory_type as u8);
        writer.write_serializable_vec(&self.hashes);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let inventory_type = InventoryType::from_byte(reader.read_u8()?)?;
        let hashes = reader.read_serializable_vec::<Hash256>(MAX_INV_HASHES)?;
        if hashes.is_empty() {
            return Err(TypeError::InvalidFormat("empty inventory".into()));
        }
        Ok(Self {
            inventory_type,
            hashes,
        })
    }

    fn size(&self) -> usize {
        1 + var_int_size(self.hashes.len() as u64) + self.hashes.len() * 32
    }
}

/// `version` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionPayload {
    /// Advertised protocol magic.
    pub network: u32,
    /// Protocol version.
    pub version: u32,
    /// Unix timestamp, seconds.
    pub timestamp: u32,
    /// Random connection nonce for self-connection detection.
    pub nonce: u32,
    /// Free-form user agent.
    pub user_agent: String,
    /// Sender's current block height.
    pub start_height: u32,
    /// Whether the sender relays inventory.
    pub relay: bool,
}

impl Serializable for VersionPayload {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.network);
        writer.write_u32(self.version);
        writer.write_u32(self.timestamp);
        writer.write_u32(self.nonce);
        writer.write_var_string(&self.user_agent);
        writer.write_u32(self.start_height);
        writer.write_bool(self.relay);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        Ok(Self {
            network: reader.read_u32()?,
            version: reader.read_u32()?,
            timestamp: reader.read_u32()?,
            nonce: reader.read_u32()?,
            user_agent: reader.read_var_string(255)?,
            start_height: reader.read_u32()?,
            relay: reader.read_bool()?,
        })
    }

    fn size(&self) -> usize {
        4 + 4 + 4 + 4 + var_bytes_size(self.user_agent.len()) + 4 + 1
    }
}

/// `ping` / `pong` body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingPayload {
    /// Sender's best block height.
    pub last_block_index: u32,
    /// Unix timestamp, seconds.
    pub timestamp: u32,
    /// Correlates a pong with its ping.
    pub nonce: u32,
}

impl Serializable for PingPayload {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.last_block_index);
        writer.write_u32(self.timestamp);
        writer.write_u32(self.nonce);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        Ok(Self {
            last_block_index: reader.read_u32()?,
            timestamp: reader.read_u32()?,
            nonce: reader.read_u32()?,
        })
    }

    fn size(&self) -> usize {
        12
    }
}

/// One known peer address with the time it was last seen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkAddressWithTime {
    /// Unix timestamp, seconds.
    pub timestamp: u32,
    /// Service bits.
    pub services: u64,
    /// IPv6(-mapped) address bytes.
    pub address: [u8; 16],
    /// TCP port, big-endian on the wire.
    pub port: u16,
}

impl Serializable for NetworkAddressWithTime {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.timestamp);
        writer.write_u64(self.services);
        writer.write_bytes(&self.address);
        writer.write_bytes(&self.port.to_be_bytes());
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        Ok(Self {
            timestamp: reader.read_u32()?,
            services: reader.read_u64()?,
            address: reader.read_array::<16>()?,
            port: u16::from_be_bytes(reader.read_array::<2>()?),
        })
    }

    fn size(&self) -> usize {
        4 + 8 + 16 + 2
    }
}

/// `addr` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrPayload {
    /// The advertised addresses.
    pub addresses: Vec<NetworkAddressWithTime>,
}

impl Serializable for AddrPayload {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_serializable_vec(&self.addresses);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let addresses = reader.read_serializable_vec::<NetworkAddressWithTime>(MAX_ADDRESSES)?;
        if addresses.is_empty() {
            return Err(TypeError::InvalidFormat("empty addr payload".into()));
        }
        Ok(Self { addresses })
    }

    fn size(&self) -> usize {
        var_int_size(self.addresses.len() as u64)
            + self.addresses.iter().map(Serializable::size).sum::<usize>()
    }
}

/// `getheaders` / `getblocks` locator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetBlocksPayload {
    /// Most recent known hashes, newest first.
    pub hash_start: Vec<Hash256>,
    /// Cap on returned entries; -1 for the protocol default.
    pub count: i16,
}

impl Serializable for GetBlocksPayload {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_serializable_vec(&self.hash_start);
        writer.write_i16(self.count);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let hash_start = reader.read_serializable_vec::<Hash256>(MAX_LOCATOR_HASHES)?;
        if hash_start.is_empty() {
            return Err(TypeError::InvalidFormat("empty locator".into()));
        }
        let count = reader.read_i16()?;
        if count < -1 || count == 0 {
            return Err(TypeError::OutOfRange(format!("count {count}")));
        }
        Ok(Self { hash_start, count })
    }

    fn size(&self) -> usize {
        var_int_size(self.hash_start.len() as u64) + self.hash_start.len() * 32 + 2
    }
}

/// `filterload` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterLoadPayload {
    /// The filter bit array.
    pub filter: Vec<u8>,
    /// Hash function count.
    pub k: u8,
    /// Seed tweak.
    pub tweak: u32,
}

impl Serializable for FilterLoadPayload {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&self.filter);
        writer.write_u8(self.k);
        writer.write_u32(self.tweak);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        let filter = reader.read_var_bytes(neo_crypto::bloom::MAX_FILTER_BYTES)?;
        let k = reader.read_u8()?;
        if k > neo_crypto::bloom::MAX_HASH_FUNCTIONS {
            return Err(TypeError::OutOfRange(format!("{k} hash functions")));
        }
        Ok(Self {
            filter,
            k,
            tweak: reader.read_u32()?,
        })
    }

    fn size(&self) -> usize {
        var_bytes_size(self.filter.len()) + 1 + 4
    }
}

/// `filteradd` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterAddPayload {
    /// Element to insert into the peer's filter.
    pub data: Vec<u8>,
}

impl Serializable for FilterAddPayload {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&self.data);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        Ok(Self {
            data: reader.read_var_bytes(520)?,
        })
    }

    fn size(&self) -> usize {
        var_bytes_size(self.data.len())
    }
}

/// `merkleblock` body: a header plus the partial merkle tree of the
/// transactions matching the peer's filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleBlockPayload {
    /// The block header.
    pub header: neo_types::Header,
    /// Total transactions in the block.
    pub tx_count: u32,
    /// Partial merkle tree hashes.
    pub hashes: Vec<Hash256>,
    /// Matched-transaction flag bits.
    pub flags: Vec<u8>,
}

impl Serializable for MerkleBlockPayload {
    fn serialize(&self, writer: &mut BinaryWriter) {
        self.header.serialize(writer);
        writer.write_var_int(u64::from(self.tx_count));
        writer.write_serializable_vec(&self.hashes);
        writer.write_var_bytes(&self.flags);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        Ok(Self {
            header: neo_types::Header::deserialize(reader)?,
            tx_count: reader.read_var_int(u32::MAX as u64)? as u32,
            hashes: reader.read_serializable_vec::<Hash256>(MAX_INV_HASHES)?,
            flags: reader.read_var_bytes(MAX_INV_HASHES / 8 + 1)?,
        })
    }

    fn size(&self) -> usize {
        self.header.size()
            + var_int_size(u64::from(self.tx_count))
            + var_int_size(self.hashes.len() as u64)
            + self.hashes.len() * 32
            + var_bytes_size(self.flags.len())
    }
}

/// `reject` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectPayload {
    /// Command being rejected.
    pub command: String,
    /// Machine-readable reason code.
    pub code: u8,
    /// Human-readable reason.
    pub reason: String,
}

impl Serializable for RejectPayload {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_string(&self.command);
        writer.write_u8(self.code);
        writer.write_var_string(&self.reason);
    }

    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError> {
        Ok(Self {
            command: reader.read_var_string(12)?,
            code: reader.read_u8()?,
            reason: reader.read_var_string(255)?,
        })
    }

    fn size(&self) -> usize {
        var_bytes_size(self.command.len()) + 1 + var_bytes_size(self.reason.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_round_trip() {
        let payload = InventoryPayload {
            inventory_type: InventoryType::Block,
            hashes: vec![Hash256([1u8; 32]), Hash256([2u8; 32])],
        };
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), payload.size());
        assert_eq!(InventoryPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_inventory_count_bound() {
        let payload = InventoryPayload {
            inventory_type: InventoryType::Transaction,
            hashes: vec![Hash256::zero(); MAX_INV_HASHES + 1],
        };
        assert!(InventoryPayload::from_bytes(&payload.to_bytes()).is_err());
    }

    #[test]
    fn test_version_round_trip() {
        let payload = VersionPayload {
            network: 7,
            version: 0,
            timestamp: 1_600_000_000,
            nonce: 99,
            user_agent: "/neo-core:0.1/".into(),
            start_height: 12345,
            relay: true,
        };
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), payload.size());
        assert_eq!(VersionPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_ping_round_trip() {
        let payload = PingPayload {
            last_block_index: 10,
            timestamp: 20,
            nonce: 30,
        };
        assert_eq!(
            PingPayload::from_bytes(&payload.to_bytes()).unwrap(),
            payload
        );
    }

    #[test]
    fn test_get_blocks_rejects_zero_count() {
        let payload = GetBlocksPayload {
            hash_start: vec![Hash256::zero()],
            count: 0,
        };
        assert!(GetBlocksPayload::from_bytes(&payload.to_bytes()).is_err());
    }

    #[test]
    fn test_filter_load_round_trip() {
        let payload = FilterLoadPayload {
            filter: vec![0xFF; 64],
            k: 5,
            tweak: 42,
        };
        assert_eq!(
            FilterLoadPayload::from_bytes(&payload.to_bytes()).unwrap(),
            payload
        );
    }
}
