//! The 24-byte frame and the command set.

use crate::error::NetworkError;
use neo_crypto::sha256;

/// Frame header size: magic + command + payload size + checksum.
pub const MESSAGE_HEADER_SIZE: usize = 24;

/// Global cap on a frame's payload.
pub const MAX_PAYLOAD_SIZE: usize = 0x0200_0000;

/// The command field width.
pub const COMMAND_SIZE: usize = 12;

/// Every command this node understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageCommand {
    /// Handshake hello.
    Version,
    /// Handshake acknowledgment.
    Verack,
    /// Ask for known addresses.
    GetAddr,
    /// A batch of known addresses.
    Addr,
    /// Keep-alive with the sender's height.
    Ping,
    /// Keep-alive reply.
    Pong,
    /// Ask for headers after a locator.
    GetHeaders,
    /// A batch of headers.
    Headers,
    /// Ask for block hashes after a locator.
    GetBlocks,
    /// Inventory announcement.
    Inv,
    /// Ask for announced inventory.
    GetData,
    /// Inventory the peer does not have.
    NotFound,
    /// A full block.
    Block,
    /// A transaction.
    Tx,
    /// A consensus (dBFT) payload.
    Consensus,
    /// An extensible payload.
    Extensible,
    /// Ask for the peer's mempool.
    Mempool,
    /// Install a bloom filter.
    FilterLoad,
    /// Add one element to the filter.
    FilterAdd,
    /// Remove the filter.
    FilterClear,
    /// A filtered block with its partial merkle tree.
    MerkleBlock,
    /// Request block transactions (compact blocks).
    GetBlockTxn,
    /// Deliver block transactions (compact blocks).
    BlockTxn,
    /// Request a compact block.
    GetCmpctBlock,
    /// Deliver a compact block.
    CmpctBlock,
    /// Peer rejected something of ours.
    Reject,
    /// Network-wide alert.
    Alert,
}

impl MessageCommand {
    /// Wire name, lowercase ASCII.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Verack => "verack",
            Self::GetAddr => "getaddr",
            Self::Addr => "addr",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::GetHeaders => "getheaders",
            Self::Headers => "headers",
            Self::GetBlocks => "getblocks",
            Self::Inv => "inv",
            Self::GetData => "getdata",
            Self::NotFound => "notfound",
            Self::Block => "block",
            Self::Tx => "tx",
            Self::Consensus => "consensus",
            Self::Extensible => "extensible",
            Self::Mempool => "mempool",
            Self::FilterLoad => "filterload",
            Self::FilterAdd => "filteradd",
            Self::FilterClear => "filterclear",
            Self::MerkleBlock => "merkleblock",
            Self::GetBlockTxn => "getblocktxn",
            Self::BlockTxn => "blocktxn",
            Self::GetCmpctBlock => "getcmpctblock",
            Self::CmpctBlock => "cmpctblock",
            Self::Reject => "reject",
            Self::Alert => "alert",
        }
    }

    /// Parse a nul-padded command field.
    #[must_use]
    pub fn from_field(field: &[u8; COMMAND_SIZE]) -> Option<Self> {
        let end = field.iter().position(|b| *b == 0).unwrap_or(COMMAND_SIZE);
        // Padding must be all zeroes.
        if field[end..].iter().any(|b| *b != 0) {
            return None;
        }
        let name = std::str::from_utf8(&field[..end]).ok()?;
        Self::all().into_iter().find(|c| c.as_str() == name)
    }

    /// Encode to the nul-padded field.
    #[must_use]
    pub fn to_field(&self) -> [u8; COMMAND_SIZE] {
        let mut field = [0u8; COMMAND_SIZE];
        let name = self.as_str().as_bytes();
        field[..name.len()].copy_from_slice(name);
        field
    }

    /// Per-command payload size cap.
    #[must_use]
    pub fn max_payload_size(&self) -> usize {
        match self {
            Self::Version => 1024,
            Self::Verack | Self::GetAddr | Self::Mempool | Self::FilterClear => 0,
            Self::Addr => 8 * 1024,
            Self::Ping | Self::Pong => 12,
            Self::Inv | Self::GetData | Self::NotFound | Self::GetBlocks => 64 * 1024,
            Self::Tx => 64 * 1024,
            Self::Block | Self::MerkleBlock | Self::CmpctBlock | Self::BlockTxn => 1024 * 1024,
            Self::Headers => 2 * 1024 * 1024,
            Self::GetHeaders | Self::GetBlockTxn | Self::GetCmpctBlock => 4 * 1024,
            Self::Consensus | Self::Extensible => 1024 * 1024,
            Self::FilterLoad => 36_000 + 16,
            Self::FilterAdd => 520 + 8,
            Self::Reject | Self::Alert => 4 * 1024,
        }
    }

    fn all() -> [MessageCommand; 27] {
        use MessageCommand::*;
        [
            Version, Verack, GetAddr, Addr, Ping, Pong, GetHeaders, Headers, GetBlocks, Inv,
            GetData, NotFound, Block, Tx, Consensus, Extensible, Mempool, FilterLoad, FilterAdd,
            FilterClear, MerkleBlock, GetBlockTxn, BlockTxn, GetCmpctBlock, CmpctBlock, Reject,
            Alert,
        ]
    }
}

/// A parsed frame header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    /// Network magic.
    pub magic: u32,
    /// Raw command field.
    pub command_field: [u8; COMMAND_SIZE],
    /// Declared payload size.
    pub payload_size: u32,
    /// Declared payload checksum.
    pub checksum: u32,
}

impl MessageHeader {
    /// Parse the first 24 bytes of a frame.
    pub fn parse(bytes: &[u8]) -> Result<Self, NetworkError> {
        if bytes.len() < MESSAGE_HEADER_SIZE {
            return Err(NetworkError::Decode(format!(
                "{} header bytes, need {MESSAGE_HEADER_SIZE}",
                bytes.len()
            )));
        }
        Ok(Self {
            magic: u32::from_le_bytes(bytes[0..4].try_into().expect("len 4")),
            command_field: bytes[4..16].try_into().expect("len 12"),
            payload_size: u32::from_le_bytes(bytes[16..20].try_into().expect("len 4")),
            checksum: u32::from_le_bytes(bytes[20..24].try_into().expect("len 4")),
        })
    }

    /// The typed command, if known.
    #[must_use]
    pub fn command(&self) -> Option<MessageCommand> {
        MessageCommand::from_field(&self.command_field)
    }
}

/// A complete frame: header plus payload bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The typed command.
    pub command: MessageCommand,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl Message {
    /// Payload checksum: first four LE bytes of SHA-256.
    #[must_use]
    pub fn checksum(payload: &[u8]) -> u32 {
        let digest = sha256(payload);
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    /// Serialize a full frame for `magic`.
    #[must_use]
    pub fn to_frame(&self, magic: u32) -> Vec<u8> {
        let mut frame = Vec::with_capacity(MESSAGE_HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&magic.to_le_bytes());
        frame.extend_from_slice(&self.command.to_field());
        frame.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&Self::checksum(&self.payload).to_le_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_field_round_trip() {
        for command in MessageCommand::all() {
            let field = command.to_field();
            assert_eq!(MessageCommand::from_field(&field), Some(command));
        }
    }

    #[test]
    fn test_command_rejects_garbage_padding() {
        let mut field = MessageCommand::Ping.to_field();
        field[11] = 0x41;
        assert_eq!(MessageCommand::from_field(&field), None);
    }

    #[test]
    fn test_frame_round_trip() {
        let message = Message {
            command: MessageCommand::Ping,
            payload: vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
        };
        let frame = message.to_frame(0x4E454F00);
        let header = MessageHeader::parse(&frame).unwrap();
        assert_eq!(header.magic, 0x4E454F00);
        assert_eq!(header.command(), Some(MessageCommand::Ping));
        assert_eq!(header.payload_size as usize, message.payload.len());
        assert_eq!(header.checksum, Message::checksum(&message.payload));
    }

    #[test]
    fn test_short_header_rejected() {
        assert!(MessageHeader::parse(&[0u8; 10]).is_err());
    }
}
