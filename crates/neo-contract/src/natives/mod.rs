//! The closed native-contract set.
//!
//! Each native has a stable negative id, a hash derived the same way as
//! any deployed contract's, a method table with per-method call-flag and
//! price requirements, and optional block-persistence handlers. The
//! registry is assembled once at startup; nothing registers later.

pub mod contract_management;
pub mod crypto_lib;
pub mod gas_token;
pub mod ledger_contract;
pub mod neo_token;
pub mod notary;
pub mod oracle;
pub mod policy;
pub mod role_management;
pub mod std_lib;

use crate::call_flags::CallFlags;
use crate::engine::HostState;
use crate::error::ContractError;
use neo_store::{DataCache, StorageItem, StorageKey};
use neo_types::Hash160;
use neo_vm::{ExecutionEngine, StackItem};
use num_bigint::BigInt;
use std::sync::Arc;

/// A native method implementation.
pub type NativeHandler =
    fn(&mut HostState, &mut ExecutionEngine, Vec<StackItem>) -> Result<StackItem, ContractError>;

/// One entry of a native's method table.
pub struct NativeMethod {
    /// Exported method name.
    pub name: &'static str,
    /// Flags the caller's frame must hold.
    pub required_flags: CallFlags,
    /// Fixed invocation price in 10^-8 gas units.
    pub price: i64,
    /// The implementation.
    pub handler: NativeHandler,
}

/// A native contract.
pub trait NativeContract: Send + Sync {
    /// Stable negative id.
    fn id(&self) -> i32;
    /// Contract name; the hash derives from it.
    fn name(&self) -> &'static str;
    /// Contract address.
    fn hash(&self) -> Hash160;
    /// Exported methods.
    fn methods(&self) -> &[NativeMethod];

    /// Invoked before a block's transactions, under `OnPersist`.
    fn on_persist(
        &self,
        host: &mut HostState,
        engine: &mut ExecutionEngine,
    ) -> Result<(), ContractError> {
        let _ = (host, engine);
        Ok(())
    }

    /// Invoked after a block's transactions, under `PostPersist`.
    fn post_persist(
        &self,
        host: &mut HostState,
        engine: &mut ExecutionEngine,
    ) -> Result<(), ContractError> {
        let _ = (host, engine);
        Ok(())
    }
}

/// The hash every contract gets from its deployment parameters; natives
/// use the zero sender, a zero checksum and their name.
#[must_use]
pub fn contract_hash(sender: &Hash160, nef_checksum: u32, name: &str) -> Hash160 {
    let name_bytes = name.as_bytes();
    let mut script = Vec::with_capacity(1 + 22 + 5 + 2 + name_bytes.len());
    script.push(0x38); // ABORT
    script.push(0x0C); // PUSHDATA1
    script.push(20);
    script.extend_from_slice(sender.as_bytes());
    script.push(0x02); // PUSHINT32
    script.extend_from_slice(&nef_checksum.to_le_bytes());
    script.push(0x0C); // PUSHDATA1
    script.push(name_bytes.len() as u8);
    script.extend_from_slice(name_bytes);
    Hash160::from_script(&script)
}

/// The fixed hash of a native contract.
#[must_use]
pub fn native_contract_hash(name: &str) -> Hash160 {
    contract_hash(&Hash160::zero(), 0, name)
}

// =============================================================================
// REGISTRY
// =============================================================================

/// The ten natives, assembled once.
pub struct NativeRegistry {
    contracts: Vec<Arc<dyn NativeContract>>,
}

impl NativeRegistry {
    /// Build the closed set.
    #[must_use]
    pub fn new() -> Self {
        let contracts: Vec<Arc<dyn NativeContract>> = vec![
            Arc::new(contract_management::ContractManagement::new()),
            Arc::new(std_lib::StdLib::new()),
            Arc::new(crypto_lib::CryptoLib::new()),
            Arc::new(ledger_contract::LedgerContract::new()),
            Arc::new(neo_token::NeoToken::new()),
            Arc::new(gas_token::GasToken::new()),
            Arc::new(policy::PolicyContract::new()),
            Arc::new(role_management::RoleManagement::new()),
            Arc::new(oracle::OracleContract::new()),
            Arc::new(notary::Notary::new()),
        ];
        Self { contracts }
    }

    /// All members, in id order (-1 first).
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn NativeContract>> {
        self.contracts.clone()
    }

    /// Find by contract address.
    #[must_use]
    pub fn by_hash(&self, hash: &Hash160) -> Option<Arc<dyn NativeContract>> {
        self.contracts.iter().find(|c| c.hash() == *hash).cloned()
    }

    /// Find by id.
    #[must_use]
    pub fn by_id(&self, id: i32) -> Option<Arc<dyn NativeContract>> {
        self.contracts.iter().find(|c| c.id() == id).cloned()
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SHARED STORAGE HELPERS
// =============================================================================

pub(crate) fn get_item(
    cache: &mut DataCache,
    id: i32,
    suffix: &[u8],
) -> Result<Option<StorageItem>, ContractError> {
    Ok(cache.get(&StorageKey::new(id, suffix.to_vec()))?)
}

pub(crate) fn put_item(
    cache: &mut DataCache,
    id: i32,
    suffix: &[u8],
    value: Vec<u8>,
) -> Result<(), ContractError> {
    cache.put(StorageKey::new(id, suffix.to_vec()), StorageItem::new(value))?;
    Ok(())
}

pub(crate) fn delete_item(
    cache: &mut DataCache,
    id: i32,
    suffix: &[u8],
) -> Result<(), ContractError> {
    cache.delete(&StorageKey::new(id, suffix.to_vec()))?;
    Ok(())
}

pub(crate) fn get_int(
    cache: &mut DataCache,
    id: i32,
    suffix: &[u8],
) -> Result<Option<BigInt>, ContractError> {
    Ok(get_item(cache, id, suffix)?.map(|item| BigInt::from_signed_bytes_le(&item.value)))
}

pub(crate) fn put_int(
    cache: &mut DataCache,
    id: i32,
    suffix: &[u8],
    value: &BigInt,
) -> Result<(), ContractError> {
    put_item(cache, id, suffix, value.to_signed_bytes_le())
}

/// True when the committee's majority multi-sig address witnessed the
/// current container. Required by every policy-style setter.
pub(crate) fn check_committee(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<bool, ContractError> {
    let committee = neo_token::committee_address(&mut host.snapshot, &host.settings)?;
    crate::syscalls::check_witness_hash(host, engine, &committee)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes_are_stable_and_distinct() {
        let registry = NativeRegistry::new();
        let mut hashes: Vec<Hash160> = registry.all().iter().map(|c| c.hash()).collect();
        assert_eq!(hashes.len(), 10);
        hashes.sort();
        hashes.dedup();
        assert_eq!(hashes.len(), 10, "native hashes must be unique");
        assert_eq!(
            native_contract_hash("GasToken"),
            native_contract_hash("GasToken")
        );
    }

    #[test]
    fn test_ids_are_negative_and_fixed() {
        let registry = NativeRegistry::new();
        let ids: Vec<i32> = registry.all().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![-1, -2, -3, -4, -5, -6, -7, -8, -9, -10]);
    }

    #[test]
    fn test_lookup_by_hash() {
        let registry = NativeRegistry::new();
        let gas_hash = native_contract_hash("GasToken");
        assert_eq!(registry.by_hash(&gas_hash).unwrap().name(), "GasToken");
        assert!(registry.by_hash(&Hash160([1u8; 20])).is_none());
    }
}
