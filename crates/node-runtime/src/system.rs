//! The system context: every long-lived component, built once at
//! startup and threaded explicitly into whoever needs it. No globals.

use crate::config::{NodeConfig, StorageBackend};
use neo_contract::NativeRegistry;
use neo_ledger::{Blockchain, LedgerConfig};
use neo_network::MessageValidator;
use neo_store::{MemoryStore, RocksDbStore, Store};
use neo_types::ProtocolSettings;
use std::sync::Arc;
use tracing::info;

/// Everything a running node hangs off.
pub struct SystemContext {
    /// Network parameters.
    pub settings: Arc<ProtocolSettings>,
    /// The backend store.
    pub store: Arc<dyn Store>,
    /// The closed native set.
    pub natives: Arc<NativeRegistry>,
    /// The canonical ledger.
    pub blockchain: Arc<Blockchain>,
    /// The frame validator for this network.
    pub validator: Arc<MessageValidator>,
}

impl SystemContext {
    /// Build from configuration; bootstraps genesis when the store is
    /// empty.
    pub fn build(config: &NodeConfig) -> anyhow::Result<Self> {
        let settings = Arc::new(config.to_protocol_settings()?);
        let store: Arc<dyn Store> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::RocksDb => Arc::new(RocksDbStore::open(&config.storage.path)?),
        };
        let natives = Arc::new(NativeRegistry::new());
        let blockchain = Arc::new(Blockchain::new(
            store.clone(),
            settings.clone(),
            natives.clone(),
            LedgerConfig::default(),
        )?);
        info!(
            network = format!("{:#010x}", settings.network),
            height = blockchain.current_index()?,
            "system context ready"
        );
        Ok(Self {
            validator: Arc::new(MessageValidator::new(settings.network)),
            settings,
            store,
            natives,
            blockchain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[test]
    fn test_build_with_memory_store_bootstraps_genesis() {
        let keypair = neo_crypto::KeyPair::generate();
        let config = NodeConfig {
            network: 0x74_65_73_74,
            address_version: 0x35,
            milliseconds_per_block: 1_000,
            standby_committee: vec![hex::encode(keypair.public_key().encode_compressed())],
            validators_count: 1,
            mempool_capacity: 100,
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                path: String::new(),
            },
        };
        let system = SystemContext::build(&config).unwrap();
        assert_eq!(system.blockchain.current_index().unwrap(), 0);
        assert!(!system.blockchain.current_hash().unwrap().is_zero());
    }
}
