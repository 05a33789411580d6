//! Protocol-level frame validation.
//!
//! Rejections are counted per category; the peer manager reads the
//! counters to decide when a peer has misbehaved enough to drop.

use crate::message::{Message, MessageCommand, MessageHeader, MESSAGE_HEADER_SIZE};
use crate::payloads::{
    AddrPayload, FilterAddPayload, FilterLoadPayload, GetBlocksPayload, InventoryPayload,
    MerkleBlockPayload, PingPayload, RejectPayload, VersionPayload,
};
use neo_types::io::Serializable;
use neo_types::{Block, Transaction};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Outcome of validating one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    /// Frame is structurally valid.
    Valid(Message),
    /// Wrong network magic.
    InvalidMagic,
    /// Unknown or malformed command field.
    InvalidCommand,
    /// Payload size above the global or per-command cap, or the frame
    /// length disagrees with the declared size.
    InvalidSize,
    /// Payload checksum mismatch.
    InvalidChecksum,
    /// Payload failed its per-command structural check.
    InvalidPayload(String),
}

impl ValidationResult {
    /// True for `Valid`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }
}

/// Validation counters, readable at any time.
#[derive(Debug, Default)]
pub struct ValidationStats {
    /// Frames inspected.
    pub messages_validated: AtomicU64,
    /// Frames accepted.
    pub valid_messages: AtomicU64,
    /// Magic mismatches.
    pub invalid_magic: AtomicU64,
    /// Unknown commands.
    pub invalid_command: AtomicU64,
    /// Size violations.
    pub invalid_size: AtomicU64,
    /// Checksum mismatches.
    pub invalid_checksum: AtomicU64,
    /// Structural payload failures.
    pub invalid_payload: AtomicU64,
}

/// The frame validator for one network.
pub struct MessageValidator {
    magic: u32,
    stats: ValidationStats,
}

impl MessageValidator {
    /// A validator accepting frames tagged with `magic`.
    #[must_use]
    pub fn new(magic: u32) -> Self {
        Self {
            magic,
            stats: ValidationStats::default(),
        }
    }

    /// The counters.
    #[must_use]
    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    /// Validate one complete frame.
    pub fn validate(&self, frame: &[u8]) -> ValidationResult {
        self.stats.messages_validated.fetch_add(1, Ordering::Relaxed);

        let Ok(header) = MessageHeader::parse(frame) else {
            self.stats.invalid_size.fetch_add(1, Ordering::Relaxed);
            return ValidationResult::InvalidSize;
        };
        if header.magic != self.magic {
            self.stats.invalid_magic.fetch_add(1, Ordering::Relaxed);
            return ValidationResult::InvalidMagic;
        }
        let Some(command) = header.command() else {
            self.stats.invalid_command.fetch_add(1, Ordering::Relaxed);
            return ValidationResult::InvalidCommand;
        };

        let declared = header.payload_size as usize;
        if declared > command.max_payload_size()
            || frame.len() != MESSAGE_HEADER_SIZE + declared
        {
            self.stats.invalid_size.fetch_add(1, Ordering::Relaxed);
            return ValidationResult::InvalidSize;
        }

        let payload = &frame[MESSAGE_HEADER_SIZE..];
        if Message::checksum(payload) != header.checksum {
            self.stats.invalid_checksum.fetch_add(1, Ordering::Relaxed);
            return ValidationResult::InvalidChecksum;
        }

        if let Err(reason) = Self::check_payload(command, payload) {
            debug!(command = command.as_str(), %reason, "payload rejected");
            self.stats.invalid_payload.fetch_add(1, Ordering::Relaxed);
            return ValidationResult::InvalidPayload(reason);
        }

        self.stats.valid_messages.fetch_add(1, Ordering::Relaxed);
        ValidationResult::Valid(Message {
            command,
            payload: payload.to_vec(),
        })
    }

    /// Per-command structural checks; empty-payload commands must be
    /// empty, entity commands must decode.
    fn check_payload(command: MessageCommand, payload: &[u8]) -> Result<(), String> {
        let decode_err = |e: neo_types::TypeError| e.to_string();
        match command {
            MessageCommand::Verack
            | MessageCommand::GetAddr
            | MessageCommand::Mempool
            | MessageCommand::FilterClear => {
                if payload.is_empty() {
                    Ok(())
                } else {
                    Err("payload must be empty".into())
                }
            }
            MessageCommand::Version => {
                VersionPayload::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::Ping | MessageCommand::Pong => {
                PingPayload::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::Addr => {
                AddrPayload::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::Inv | MessageCommand::GetData | MessageCommand::NotFound => {
                InventoryPayload::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::GetHeaders | MessageCommand::GetBlocks => {
                GetBlocksPayload::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::Block => {
                Block::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::Tx => {
                Transaction::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::Headers => {
                let mut reader = neo_types::io::BinaryReader::new(payload);
                let headers =
                    reader.read_serializable_vec::<neo_types::Header>(2000).map_err(decode_err)?;
                if headers.is_empty() {
                    return Err("empty header batch".into());
                }
                Ok(())
            }
            MessageCommand::FilterLoad => {
                FilterLoadPayload::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::FilterAdd => {
                FilterAddPayload::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::MerkleBlock => {
                MerkleBlockPayload::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            MessageCommand::Reject => {
                RejectPayload::from_bytes(payload).map(|_| ()).map_err(decode_err)
            }
            // Opaque entity payloads: size caps already applied.
            MessageCommand::Consensus
            | MessageCommand::Extensible
            | MessageCommand::Alert
            | MessageCommand::GetBlockTxn
            | MessageCommand::BlockTxn
            | MessageCommand::GetCmpctBlock
            | MessageCommand::CmpctBlock => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: u32 = 0x4E45_4F00;

    fn ping_frame() -> Vec<u8> {
        let message = Message {
            command: MessageCommand::Ping,
            payload: PingPayload {
                last_block_index: 7,
                timestamp: 8,
                nonce: 9,
            }
            .to_bytes(),
        };
        message.to_frame(MAGIC)
    }

    #[test]
    fn test_valid_frame_passes() {
        let validator = MessageValidator::new(MAGIC);
        let result = validator.validate(&ping_frame());
        assert!(result.is_valid());
        assert_eq!(
            validator.stats().valid_messages.load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_wrong_magic_counted_without_side_effects() {
        let validator = MessageValidator::new(MAGIC);
        let mut frame = ping_frame();
        frame[0] ^= 0xFF;
        assert_eq!(validator.validate(&frame), ValidationResult::InvalidMagic);
        assert_eq!(validator.stats().invalid_magic.load(Ordering::Relaxed), 1);
        assert_eq!(validator.stats().valid_messages.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let validator = MessageValidator::new(MAGIC);
        let mut frame = ping_frame();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert_eq!(validator.validate(&frame), ValidationResult::InvalidChecksum);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let validator = MessageValidator::new(MAGIC);
        let mut frame = ping_frame();
        frame[4..16].copy_from_slice(b"nonsense\0\0\0\0");
        // Fix the declared size/checksum? Not needed: command check runs first.
        assert_eq!(validator.validate(&frame), ValidationResult::InvalidCommand);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let validator = MessageValidator::new(MAGIC);
        let message = Message {
            command: MessageCommand::Ping,
            payload: vec![0u8; 13], // ping caps at 12
        };
        assert_eq!(
            validator.validate(&message.to_frame(MAGIC)),
            ValidationResult::InvalidSize
        );
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let validator = MessageValidator::new(MAGIC);
        let mut frame = ping_frame();
        frame.pop();
        assert_eq!(validator.validate(&frame), ValidationResult::InvalidSize);
    }

    #[test]
    fn test_nonempty_verack_rejected() {
        let validator = MessageValidator::new(MAGIC);
        let message = Message {
            command: MessageCommand::Verack,
            payload: vec![1],
        };
        assert!(matches!(
            validator.validate(&message.to_frame(MAGIC)),
            ValidationResult::InvalidSize
        ));
    }
}
