//! Node configuration.

use neo_crypto::ecdsa::ECPoint;
use neo_types::ProtocolSettings;
use serde::Deserialize;
use std::path::Path;

/// TOML-sourced node configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// Network magic.
    pub network: u32,
    /// Address version byte.
    #[serde(default = "default_address_version")]
    pub address_version: u8,
    /// Target block time in milliseconds.
    #[serde(default = "default_ms_per_block")]
    pub milliseconds_per_block: u64,
    /// Standby committee, hex-encoded compressed public keys.
    pub standby_committee: Vec<String>,
    /// Validators drawn from the committee.
    pub validators_count: usize,
    /// Mempool capacity.
    #[serde(default = "default_mempool_capacity")]
    pub mempool_capacity: usize,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where state lives.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct StorageConfig {
    /// `"memory"` or `"rocksdb"`.
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database directory for the rocksdb backend.
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Supported storage backends.
#[derive(Clone, Copy, Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory map; state is lost on exit.
    Memory,
    /// Embedded RocksDB.
    #[default]
    RocksDb,
}

fn default_address_version() -> u8 {
    0x35
}

fn default_ms_per_block() -> u64 {
    15_000
}

fn default_mempool_capacity() -> usize {
    50_000
}

fn default_db_path() -> String {
    "./chain".into()
}

impl NodeConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Convert into protocol settings, parsing the committee keys.
    pub fn to_protocol_settings(&self) -> anyhow::Result<ProtocolSettings> {
        let mut committee = Vec::with_capacity(self.standby_committee.len());
        for key in &self.standby_committee {
            let bytes = hex::decode(key)?;
            committee.push(
                ECPoint::from_bytes(&bytes)
                    .map_err(|e| anyhow::anyhow!("bad committee key {key}: {e}"))?,
            );
        }
        Ok(ProtocolSettings {
            network: self.network,
            address_version: self.address_version,
            milliseconds_per_block: self.milliseconds_per_block,
            validators_count: self.validators_count,
            standby_committee: committee,
            memory_pool_max_transactions: self.mempool_capacity,
            ..ProtocolSettings::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let text = r#"
            network = 0x4E454F00
            validators_count = 1
            standby_committee = []

            [storage]
            backend = "memory"
        "#;
        let config: NodeConfig = toml::from_str(text).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.mempool_capacity, 50_000);
        assert_eq!(config.milliseconds_per_block, 15_000);
    }
}
