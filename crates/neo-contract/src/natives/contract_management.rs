//! ContractManagement: the deployed-contract registry.
//!
//! Owns the contract-id counter and the `hash -> ContractState` map,
//! charges the minimum deployment fee on deploy and bumps the update
//! counter on update. Contract records live under `0x08`, the id-to-hash
//! index under `0x0C`.

use super::{contract_hash, get_int, get_item, put_int, put_item, delete_item};
use super::{NativeContract, NativeMethod};
use crate::call_flags::CallFlags;
use crate::contract_state::{ContractState, NefFile};
use crate::engine::{HostState, NotifyEvent};
use crate::error::ContractError;
use crate::item_serializer;
use crate::natives::check_committee;
use neo_store::DataCache;
use neo_types::io::Serializable;
use neo_types::{ContractManifest, Hash160};
use neo_vm::{ExecutionEngine, StackItem};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

/// Contract id.
pub const ID: i32 = -1;

const PREFIX_CONTRACT: u8 = 0x08;
const PREFIX_CONTRACT_HASH: u8 = 0x0C;
const PREFIX_NEXT_ID: &[u8] = &[0x0F];
const PREFIX_MIN_DEPLOY_FEE: &[u8] = &[0x14];

/// Default minimum deployment fee (10 GAS).
pub const DEFAULT_MIN_DEPLOY_FEE: i64 = 10 * 100_000_000;

fn contract_suffix(hash: &Hash160) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(21);
    suffix.push(PREFIX_CONTRACT);
    suffix.extend_from_slice(hash.as_bytes());
    suffix
}

fn id_suffix(id: i32) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(5);
    suffix.push(PREFIX_CONTRACT_HASH);
    suffix.extend_from_slice(&id.to_be_bytes());
    suffix
}

/// Look up a deployed contract.
pub fn get_contract(
    cache: &mut DataCache,
    hash: &Hash160,
) -> Result<Option<ContractState>, ContractError> {
    match get_item(cache, ID, &contract_suffix(hash))? {
        Some(item) => Ok(Some(ContractState::from_bytes(&item.value)?)),
        None => Ok(None),
    }
}

/// Look up a deployed contract by id.
pub fn get_contract_by_id(
    cache: &mut DataCache,
    id: i32,
) -> Result<Option<ContractState>, ContractError> {
    match get_item(cache, ID, &id_suffix(id))? {
        Some(item) => {
            let hash = Hash160(item.value.try_into().map_err(|_| {
                ContractError::Other("corrupt id index".into())
            })?);
            get_contract(cache, &hash)
        }
        None => Ok(None),
    }
}

/// Current minimum deployment fee.
pub fn minimum_deployment_fee(cache: &mut DataCache) -> i64 {
    get_int(cache, ID, PREFIX_MIN_DEPLOY_FEE)
        .ok()
        .flatten()
        .and_then(|v| v.to_i64())
        .unwrap_or(DEFAULT_MIN_DEPLOY_FEE)
}

fn next_available_id(cache: &mut DataCache) -> Result<i32, ContractError> {
    let next = get_int(cache, ID, PREFIX_NEXT_ID)?
        .and_then(|v| v.to_i32())
        .unwrap_or(1);
    put_int(cache, ID, PREFIX_NEXT_ID, &BigInt::from(next + 1))?;
    Ok(next)
}

fn put_contract(cache: &mut DataCache, state: &ContractState) -> Result<(), ContractError> {
    put_item(cache, ID, &contract_suffix(&state.hash), state.to_bytes())?;
    put_item(cache, ID, &id_suffix(state.id), state.hash.as_bytes().to_vec())?;
    Ok(())
}

/// The ContractManagement native.
pub struct ContractManagement {
    methods: Vec<NativeMethod>,
}

impl ContractManagement {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            NativeMethod {
                name: "getContract",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: get_contract_method,
            },
            NativeMethod {
                name: "getContractById",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: get_contract_by_id_method,
            },
            NativeMethod {
                name: "getMinimumDeploymentFee",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _e, _a| {
                    Ok(StackItem::integer(minimum_deployment_fee(
                        &mut host.snapshot,
                    )))
                },
            },
            NativeMethod {
                name: "setMinimumDeploymentFee",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_minimum_deployment_fee_method,
            },
            NativeMethod {
                name: "deploy",
                required_flags: CallFlags::ALL,
                price: 0,
                handler: deploy_method,
            },
            NativeMethod {
                name: "update",
                required_flags: CallFlags::ALL,
                price: 0,
                handler: update_method,
            },
            NativeMethod {
                name: "destroy",
                required_flags: CallFlags::ALL,
                price: 1 << 15,
                handler: destroy_method,
            },
            NativeMethod {
                name: "hasMethod",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: has_method_method,
            },
        ];
        Self { methods }
    }
}

impl Default for ContractManagement {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for ContractManagement {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "ContractManagement"
    }

    fn hash(&self) -> Hash160 {
        super::native_contract_hash(self.name())
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }
}

// =============================================================================
// METHOD HANDLERS
// =============================================================================

fn arg_bytes(args: &mut Vec<StackItem>, what: &str) -> Result<Vec<u8>, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument(format!("missing {what}")));
    }
    args.remove(0).to_byte_vec().map_err(ContractError::from)
}

fn arg_hash(args: &mut Vec<StackItem>) -> Result<Hash160, ContractError> {
    let bytes = arg_bytes(args, "contract hash")?;
    Ok(Hash160(bytes.try_into().map_err(|_| {
        ContractError::InvalidArgument("expected a 20-byte hash".into())
    })?))
}

fn contract_to_item(state: &ContractState) -> StackItem {
    StackItem::array(vec![
        StackItem::integer(i64::from(state.id)),
        StackItem::integer(i64::from(state.update_counter)),
        StackItem::byte_string(state.hash.as_bytes().to_vec()),
        StackItem::byte_string(state.nef.to_bytes()),
        StackItem::byte_string(state.manifest.to_json().into_bytes()),
    ])
}

fn get_contract_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let hash = arg_hash(&mut args)?;
    match get_contract(&mut host.snapshot, &hash)? {
        Some(state) => Ok(contract_to_item(&state)),
        None => Ok(StackItem::Null),
    }
}

fn get_contract_by_id_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing id".into()));
    }
    let id = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_i32()
        .ok_or_else(|| ContractError::InvalidArgument("id out of range".into()))?;
    match get_contract_by_id(&mut host.snapshot, id)? {
        Some(state) => Ok(contract_to_item(&state)),
        None => Ok(StackItem::Null),
    }
}

fn set_minimum_deployment_fee_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing fee".into()));
    }
    let fee = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_i64()
        .filter(|f| *f >= 0)
        .ok_or_else(|| ContractError::InvalidAmount("deployment fee".into()))?;
    if !check_committee(host, engine)? {
        return Err(ContractError::CheckWitnessFailed);
    }
    put_int(&mut host.snapshot, ID, PREFIX_MIN_DEPLOY_FEE, &BigInt::from(fee))?;
    Ok(StackItem::Null)
}

fn parse_deploy_args(
    args: &mut Vec<StackItem>,
) -> Result<(NefFile, ContractManifest), ContractError> {
    let nef_bytes = arg_bytes(args, "nef")?;
    let manifest_bytes = arg_bytes(args, "manifest")?;
    let nef = NefFile::from_bytes(&nef_bytes)?;
    let manifest_json = String::from_utf8(manifest_bytes)
        .map_err(|_| ContractError::InvalidArgument("manifest must be UTF-8".into()))?;
    let manifest = ContractManifest::from_json(&manifest_json)?;
    Ok((nef, manifest))
}

fn deploy_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let (nef, manifest) = parse_deploy_args(&mut args)?;
    engine.charge_raw(minimum_deployment_fee(&mut host.snapshot))?;

    let sender = host
        .tx
        .as_ref()
        .and_then(|tx| tx.sender().map(|s| s.account))
        .ok_or_else(|| ContractError::Other("deploy requires a transaction".into()))?;
    let hash = contract_hash(&sender, nef.checksum, &manifest.name);
    if get_contract(&mut host.snapshot, &hash)?.is_some() {
        return Err(ContractError::InvalidArgument(format!(
            "contract {hash} already deployed"
        )));
    }

    let state = ContractState {
        id: next_available_id(&mut host.snapshot)?,
        update_counter: 0,
        hash,
        nef,
        manifest,
    };
    put_contract(&mut host.snapshot, &state)?;
    host.notifications.push(NotifyEvent {
        script_hash: super::native_contract_hash("ContractManagement"),
        name: "Deploy".into(),
        state: vec![item_serializer::serialize_item(&StackItem::byte_string(
            hash.as_bytes().to_vec(),
        ))?],
    });
    Ok(contract_to_item(&state))
}

fn update_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let (nef, manifest) = parse_deploy_args(&mut args)?;
    let executing = host.executing_hash(engine.invocation_depth())?;
    // Only a contract may update itself; the executing hash below the
    // native frame is the caller.
    let caller = host
        .calling_hash(engine.invocation_depth())?
        .unwrap_or(executing);
    let mut state = get_contract(&mut host.snapshot, &caller)?
        .ok_or_else(|| ContractError::ContractNotFound(caller.to_string()))?;

    state.nef = nef;
    state.manifest = manifest;
    state.update_counter = state.update_counter.wrapping_add(1);
    put_contract(&mut host.snapshot, &state)?;
    host.notifications.push(NotifyEvent {
        script_hash: super::native_contract_hash("ContractManagement"),
        name: "Update".into(),
        state: vec![item_serializer::serialize_item(&StackItem::byte_string(
            caller.as_bytes().to_vec(),
        ))?],
    });
    Ok(StackItem::Null)
}

fn destroy_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    _args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let executing = host.executing_hash(engine.invocation_depth())?;
    let caller = host
        .calling_hash(engine.invocation_depth())?
        .unwrap_or(executing);
    let Some(state) = get_contract(&mut host.snapshot, &caller)? else {
        return Ok(StackItem::Null);
    };

    delete_item(&mut host.snapshot, ID, &contract_suffix(&state.hash))?;
    delete_item(&mut host.snapshot, ID, &id_suffix(state.id))?;
    // Drop the contract's whole storage area.
    let prefix = neo_store::StorageKey::prefix_for(state.id);
    for (key, _) in host.snapshot.find(&prefix)? {
        host.snapshot.delete(&key)?;
    }
    host.notifications.push(NotifyEvent {
        script_hash: super::native_contract_hash("ContractManagement"),
        name: "Destroy".into(),
        state: vec![item_serializer::serialize_item(&StackItem::byte_string(
            caller.as_bytes().to_vec(),
        ))?],
    });
    Ok(StackItem::Null)
}

fn has_method_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let hash = arg_hash(&mut args)?;
    let name = String::from_utf8(arg_bytes(&mut args, "method")?)
        .map_err(|_| ContractError::InvalidArgument("method name must be UTF-8".into()))?;
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing parameter count".into()));
    }
    let count = args.remove(0).to_index().map_err(ContractError::from)?;
    let found = get_contract(&mut host.snapshot, &hash)?
        .map(|state| state.manifest.abi.method(&name, count).is_some())
        .unwrap_or(false);
    Ok(StackItem::Boolean(found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_contract_registry_round_trip() {
        let mut cache = DataCache::new(Arc::new(MemoryStore::new()));
        let state = ContractState {
            id: 1,
            update_counter: 0,
            hash: Hash160([7u8; 20]),
            nef: NefFile::new("test", vec![0x40]),
            manifest: ContractManifest::new("demo"),
        };
        put_contract(&mut cache, &state).unwrap();
        assert_eq!(get_contract(&mut cache, &state.hash).unwrap(), Some(state.clone()));
        assert_eq!(get_contract_by_id(&mut cache, 1).unwrap(), Some(state));
        assert!(get_contract(&mut cache, &Hash160([8u8; 20])).unwrap().is_none());
    }

    #[test]
    fn test_id_counter_is_sequential() {
        let mut cache = DataCache::new(Arc::new(MemoryStore::new()));
        assert_eq!(next_available_id(&mut cache).unwrap(), 1);
        assert_eq!(next_available_id(&mut cache).unwrap(), 2);
        assert_eq!(next_available_id(&mut cache).unwrap(), 3);
    }

    #[test]
    fn test_deployment_fee_default() {
        let mut cache = DataCache::new(Arc::new(MemoryStore::new()));
        assert_eq!(minimum_deployment_fee(&mut cache), DEFAULT_MIN_DEPLOY_FEE);
    }
}
