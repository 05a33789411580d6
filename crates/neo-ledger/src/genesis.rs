//! Genesis block construction.

use crate::error::LedgerError;
use neo_types::witness::Witness;
use neo_types::{Block, Header, Hash256, ProtocolSettings};

/// Consensus nonce baked into the genesis header.
pub const GENESIS_NONCE: u64 = 2_083_236_893;

/// Build the genesis block for `settings`. It carries no transactions;
/// its witness is the trivial always-true script, and `next_consensus`
/// commits to the standby validators.
pub fn genesis_block(settings: &ProtocolSettings) -> Result<Block, LedgerError> {
    let header = Header {
        version: 0,
        prev_hash: Hash256::zero(),
        merkle_root: Hash256::zero(),
        timestamp_ms: settings.genesis_timestamp_ms,
        nonce: GENESIS_NONCE,
        index: 0,
        primary_index: 0,
        next_consensus: settings.next_consensus_address()?,
        witness: Witness {
            invocation_script: Vec::new(),
            verification_script: vec![0x11], // PUSH1
        },
    };
    Ok(Block {
        header,
        transactions: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_crypto::KeyPair;

    fn settings() -> ProtocolSettings {
        ProtocolSettings {
            standby_committee: (0..4)
                .map(|_| KeyPair::generate().public_key().clone())
                .collect(),
            validators_count: 4,
            ..ProtocolSettings::default()
        }
    }

    #[test]
    fn test_genesis_is_deterministic_per_settings() {
        let settings = settings();
        let a = genesis_block(&settings).unwrap();
        let b = genesis_block(&settings).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.index(), 0);
        assert!(a.transactions.is_empty());
        assert!(a.merkle_root_valid());
    }
}
