//! Protocol settings.
//!
//! Everything consensus-relevant that is fixed per network rather than
//! per node: magic, block cadence, committee composition and the genesis
//! parameters derived from them.

use crate::contract_script::multisig_redeem_script;
use crate::error::TypeError;
use crate::hashes::Hash160;
use neo_crypto::ecdsa::ECPoint;

/// Network-wide protocol parameters.
#[derive(Clone, Debug)]
pub struct ProtocolSettings {
    /// Network magic; doubles as the P2P frame tag.
    pub network: u32,
    /// Address version byte for Base58Check rendering.
    pub address_version: u8,
    /// Target inter-block time.
    pub milliseconds_per_block: u64,
    /// Cap on transactions selected into one block.
    pub max_transactions_per_block: u32,
    /// Blocks a transaction may wait before `valid_until_block` expires.
    pub max_valid_until_block_increment: u32,
    /// How far back state queries may reach.
    pub max_traceable_blocks: u32,
    /// Number of consensus validators drawn from the committee.
    pub validators_count: usize,
    /// The standby committee, sorted public keys.
    pub standby_committee: Vec<ECPoint>,
    /// GAS minted to the committee address at genesis (10^-8 units).
    pub initial_gas_distribution: i64,
    /// Timestamp of the genesis block, milliseconds.
    pub genesis_timestamp_ms: u64,
    /// Mempool capacity.
    pub memory_pool_max_transactions: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            network: 0x4E45_4F00,
            address_version: 0x35,
            milliseconds_per_block: 15_000,
            max_transactions_per_block: 512,
            max_valid_until_block_increment: 5_760,
            max_traceable_blocks: 2_102_400,
            validators_count: 7,
            standby_committee: Vec::new(),
            initial_gas_distribution: 52_000_000_00000000,
            genesis_timestamp_ms: 1_468_595_301_000,
            memory_pool_max_transactions: 50_000,
        }
    }
}

impl ProtocolSettings {
    /// The standby validators: the first `validators_count` committee keys.
    #[must_use]
    pub fn standby_validators(&self) -> &[ECPoint] {
        let count = self.validators_count.min(self.standby_committee.len());
        &self.standby_committee[..count]
    }

    /// Multi-sig threshold for a validator set of `n`: `n - (n - 1) / 3`.
    #[must_use]
    pub fn validators_threshold(n: usize) -> usize {
        n - (n - 1) / 3
    }

    /// Multi-sig threshold for a committee of `n`: majority.
    #[must_use]
    pub fn committee_threshold(n: usize) -> usize {
        n / 2 + 1
    }

    /// Script hash of the validators' multi-sig address (the genesis
    /// `next_consensus`).
    pub fn next_consensus_address(&self) -> Result<Hash160, TypeError> {
        let validators = self.standby_validators();
        let script = multisig_redeem_script(
            Self::validators_threshold(validators.len()),
            validators,
        )?;
        Ok(Hash160::from_script(&script))
    }

    /// Script hash of the committee's majority multi-sig address.
    pub fn committee_address(&self) -> Result<Hash160, TypeError> {
        let script = multisig_redeem_script(
            Self::committee_threshold(self.standby_committee.len()),
            &self.standby_committee,
        )?;
        Ok(Hash160::from_script(&script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_crypto::KeyPair;

    fn settings_with_committee(count: usize) -> ProtocolSettings {
        ProtocolSettings {
            standby_committee: (0..count)
                .map(|_| KeyPair::generate().public_key().clone())
                .collect(),
            validators_count: count.min(7),
            ..ProtocolSettings::default()
        }
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(ProtocolSettings::validators_threshold(7), 5);
        assert_eq!(ProtocolSettings::validators_threshold(4), 3);
        assert_eq!(ProtocolSettings::validators_threshold(1), 1);
        assert_eq!(ProtocolSettings::committee_threshold(21), 11);
        assert_eq!(ProtocolSettings::committee_threshold(1), 1);
    }

    #[test]
    fn test_addresses_are_deterministic() {
        let settings = settings_with_committee(4);
        assert_eq!(
            settings.next_consensus_address().unwrap(),
            settings.next_consensus_address().unwrap()
        );
        assert_eq!(
            settings.committee_address().unwrap(),
            settings.committee_address().unwrap()
        );
    }

    #[test]
    fn test_standby_validators_are_prefix() {
        let settings = settings_with_committee(10);
        assert_eq!(settings.standby_validators().len(), 7);
    }
}
