//! The `System.*` syscall table.
//!
//! Syscalls are addressed by the first four little-endian bytes of the
//! SHA-256 of their dotted name. Every entry carries a fixed price and
//! the call flags the current frame must hold; storage writes charge an
//! additional per-byte storage price.

use crate::call_flags::CallFlags;
use crate::engine::{call_contract, HostState, LogEvent, NotifyEvent};
use crate::error::ContractError;
use crate::item_serializer;
use crate::natives::policy;
use crate::trigger::TriggerType;
use neo_crypto::ecdsa::{ECPoint, Secp256r1Signature};
use neo_crypto::sha256;
use neo_store::{StorageItem, StorageKey};
use neo_types::contract_script::{multisig_redeem_script, signature_redeem_script};
use neo_types::io::Serializable;
use neo_types::witness::WitnessScopes;
use neo_types::Hash160;
use neo_vm::{ExecutionEngine, StackItem};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::OnceLock;

/// Longest storage key a contract may use.
pub const MAX_STORAGE_KEY_SIZE: usize = 64;

/// Longest storage value a contract may write.
pub const MAX_STORAGE_VALUE_SIZE: usize = u16::MAX as usize;

/// Prefix-scan option bits for `System.Storage.Find`.
pub mod find_options {
    /// Yield keys only.
    pub const KEYS_ONLY: u8 = 0x01;
    /// Strip the search prefix from yielded keys.
    pub const REMOVE_PREFIX: u8 = 0x02;
    /// Yield values only.
    pub const VALUES_ONLY: u8 = 0x04;
    /// Deserialize values as stack items.
    pub const DESERIALIZE_VALUES: u8 = 0x08;
    /// Iterate descending.
    pub const BACKWARDS: u8 = 0x80;
}

type SyscallFn = fn(&mut HostState, &mut ExecutionEngine) -> Result<(), ContractError>;

struct SyscallEntry {
    name: &'static str,
    price: i64,
    required_flags: CallFlags,
    handler: SyscallFn,
}

/// The interop number of a syscall name.
#[must_use]
pub fn syscall_number(name: &str) -> u32 {
    let digest = sha256(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn table() -> &'static HashMap<u32, SyscallEntry> {
    static TABLE: OnceLock<HashMap<u32, SyscallEntry>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let entries = [
            SyscallEntry {
                name: "System.Runtime.Platform",
                price: 1 << 3,
                required_flags: CallFlags::NONE,
                handler: runtime_platform,
            },
            SyscallEntry {
                name: "System.Runtime.GetNetwork",
                price: 1 << 3,
                required_flags: CallFlags::NONE,
                handler: runtime_get_network,
            },
            SyscallEntry {
                name: "System.Runtime.GetTrigger",
                price: 1 << 3,
                required_flags: CallFlags::NONE,
                handler: runtime_get_trigger,
            },
            SyscallEntry {
                name: "System.Runtime.GetTime",
                price: 1 << 3,
                required_flags: CallFlags::NONE,
                handler: runtime_get_time,
            },
            SyscallEntry {
                name: "System.Runtime.GetScriptContainer",
                price: 1 << 3,
                required_flags: CallFlags::NONE,
                handler: runtime_get_script_container,
            },
            SyscallEntry {
                name: "System.Runtime.GetExecutingScriptHash",
                price: 1 << 4,
                required_flags: CallFlags::NONE,
                handler: runtime_get_executing_hash,
            },
            SyscallEntry {
                name: "System.Runtime.GetCallingScriptHash",
                price: 1 << 4,
                required_flags: CallFlags::NONE,
                handler: runtime_get_calling_hash,
            },
            SyscallEntry {
                name: "System.Runtime.GetEntryScriptHash",
                price: 1 << 4,
                required_flags: CallFlags::NONE,
                handler: runtime_get_entry_hash,
            },
            SyscallEntry {
                name: "System.Runtime.GetInvocationCounter",
                price: 1 << 4,
                required_flags: CallFlags::NONE,
                handler: runtime_get_invocation_counter,
            },
            SyscallEntry {
                name: "System.Runtime.GasLeft",
                price: 1 << 4,
                required_flags: CallFlags::NONE,
                handler: runtime_gas_left,
            },
            SyscallEntry {
                name: "System.Runtime.GetRandom",
                price: 1 << 4,
                required_flags: CallFlags::NONE,
                handler: runtime_get_random,
            },
            SyscallEntry {
                name: "System.Runtime.CheckWitness",
                price: 1 << 10,
                required_flags: CallFlags::NONE,
                handler: runtime_check_witness,
            },
            SyscallEntry {
                name: "System.Runtime.Log",
                price: 1 << 15,
                required_flags: CallFlags::NONE,
                handler: runtime_log,
            },
            SyscallEntry {
                name: "System.Runtime.Notify",
                price: 1 << 15,
                required_flags: CallFlags::ALLOW_NOTIFY,
                handler: runtime_notify,
            },
            SyscallEntry {
                name: "System.Runtime.BurnGas",
                price: 1 << 4,
                required_flags: CallFlags::NONE,
                handler: runtime_burn_gas,
            },
            SyscallEntry {
                name: "System.Storage.GetContext",
                price: 1 << 4,
                required_flags: CallFlags::READ_STATES,
                handler: storage_get_context,
            },
            SyscallEntry {
                name: "System.Storage.GetReadOnlyContext",
                price: 1 << 4,
                required_flags: CallFlags::READ_STATES,
                handler: storage_get_readonly_context,
            },
            SyscallEntry {
                name: "System.Storage.AsReadOnly",
                price: 1 << 4,
                required_flags: CallFlags::READ_STATES,
                handler: storage_as_readonly,
            },
            SyscallEntry {
                name: "System.Storage.Get",
                price: 1 << 15,
                required_flags: CallFlags::READ_STATES,
                handler: storage_get,
            },
            SyscallEntry {
                name: "System.Storage.Put",
                price: 1 << 15,
                required_flags: CallFlags::WRITE_STATES,
                handler: storage_put,
            },
            SyscallEntry {
                name: "System.Storage.Delete",
                price: 1 << 15,
                required_flags: CallFlags::WRITE_STATES,
                handler: storage_delete,
            },
            SyscallEntry {
                name: "System.Storage.Find",
                price: 1 << 15,
                required_flags: CallFlags::READ_STATES,
                handler: storage_find,
            },
            SyscallEntry {
                name: "System.Iterator.Next",
                price: 1 << 15,
                required_flags: CallFlags::NONE,
                handler: iterator_next,
            },
            SyscallEntry {
                name: "System.Iterator.Value",
                price: 1 << 4,
                required_flags: CallFlags::NONE,
                handler: iterator_value,
            },
            SyscallEntry {
                name: "System.Contract.Call",
                price: 1 << 15,
                required_flags: CallFlags::ALLOW_CALL,
                handler: contract_call,
            },
            SyscallEntry {
                name: "System.Contract.GetCallFlags",
                price: 1 << 10,
                required_flags: CallFlags::NONE,
                handler: contract_get_call_flags,
            },
            SyscallEntry {
                name: "System.Contract.CreateStandardAccount",
                price: 1 << 8,
                required_flags: CallFlags::NONE,
                handler: contract_create_standard_account,
            },
            SyscallEntry {
                name: "System.Contract.CreateMultisigAccount",
                price: 1 << 8,
                required_flags: CallFlags::NONE,
                handler: contract_create_multisig_account,
            },
            SyscallEntry {
                name: "System.Contract.NativeOnPersist",
                price: 0,
                required_flags: CallFlags::STATES,
                handler: contract_native_on_persist,
            },
            SyscallEntry {
                name: "System.Contract.NativePostPersist",
                price: 0,
                required_flags: CallFlags::STATES,
                handler: contract_native_post_persist,
            },
            SyscallEntry {
                name: "System.Crypto.CheckSig",
                price: 1 << 15,
                required_flags: CallFlags::NONE,
                handler: crypto_check_sig,
            },
            SyscallEntry {
                name: "System.Crypto.CheckMultisig",
                price: 0,
                required_flags: CallFlags::NONE,
                handler: crypto_check_multisig,
            },
        ];
        entries
            .into_iter()
            .map(|entry| (syscall_number(entry.name), entry))
            .collect()
    })
}

/// Route one syscall.
pub fn dispatch(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    number: u32,
) -> Result<(), ContractError> {
    let entry = table()
        .get(&number)
        .ok_or(neo_vm::VmError::UnknownSyscall(number))
        .map_err(ContractError::Execution)?;
    let frame_flags = host.current_frame(engine.invocation_depth())?.flags;
    frame_flags.require(entry.required_flags)?;
    engine.charge(entry.price)?;
    (entry.handler)(host, engine)
}

// =============================================================================
// RUNTIME
// =============================================================================

fn runtime_platform(_host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    engine.push(StackItem::byte_string(b"NEO".to_vec()))?;
    Ok(())
}

fn runtime_get_network(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    engine.push(StackItem::integer(i64::from(host.settings.network)))?;
    Ok(())
}

fn runtime_get_trigger(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    engine.push(StackItem::integer(host.trigger as u8 as i64))?;
    Ok(())
}

fn runtime_get_time(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let time = host
        .persisting_block
        .as_ref()
        .map(|block| block.header.timestamp_ms)
        .ok_or_else(|| ContractError::Other("no persisting block".into()))?;
    engine.push(StackItem::integer(time as i64))?;
    Ok(())
}

fn runtime_get_script_container(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    let tx = host
        .tx
        .as_ref()
        .ok_or_else(|| ContractError::Other("no script container".into()))?;
    let sender = tx
        .sender()
        .map(|signer| signer.account)
        .unwrap_or_default();
    let item = StackItem::array(vec![
        StackItem::byte_string(tx.hash().as_bytes().to_vec()),
        StackItem::integer(i64::from(tx.version)),
        StackItem::integer(i64::from(tx.nonce)),
        StackItem::byte_string(sender.as_bytes().to_vec()),
        StackItem::integer(tx.system_fee),
        StackItem::integer(tx.network_fee),
        StackItem::integer(i64::from(tx.valid_until_block)),
        StackItem::byte_string(tx.script.clone()),
    ]);
    engine.push(item)?;
    Ok(())
}

fn runtime_get_executing_hash(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    let hash = host.executing_hash(engine.invocation_depth())?;
    engine.push(StackItem::byte_string(hash.as_bytes().to_vec()))?;
    Ok(())
}

fn runtime_get_calling_hash(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    match host.calling_hash(engine.invocation_depth())? {
        Some(hash) => engine.push(StackItem::byte_string(hash.as_bytes().to_vec()))?,
        None => engine.push(StackItem::Null)?,
    }
    Ok(())
}

fn runtime_get_entry_hash(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    let hash = host
        .entry_hash()
        .ok_or_else(|| ContractError::Other("no entry frame".into()))?;
    engine.push(StackItem::byte_string(hash.as_bytes().to_vec()))?;
    Ok(())
}

fn runtime_get_invocation_counter(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    let hash = host.executing_hash(engine.invocation_depth())?;
    let count = host.invocation_counters.get(&hash).copied().unwrap_or(1);
    engine.push(StackItem::integer(i64::from(count)))?;
    Ok(())
}

fn runtime_gas_left(_host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let left = engine.gas_left();
    engine.push(StackItem::integer(left))?;
    Ok(())
}

fn runtime_get_random(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    // Deterministic per (network, container, counter): consensus-safe.
    let mut seed = Vec::with_capacity(44);
    seed.extend_from_slice(&host.settings.network.to_le_bytes());
    if let Some(tx) = &host.tx {
        seed.extend_from_slice(tx.hash().as_bytes());
    }
    seed.extend_from_slice(&host.random_counter.to_le_bytes());
    host.random_counter += 1;
    let digest = sha256(&seed);
    let value = u64::from_le_bytes(digest[..8].try_into().expect("len 8"));
    engine.push(StackItem::integer(value))?;
    Ok(())
}

/// The witness check shared by the syscall and native setters.
pub fn check_witness_hash(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    hash: &Hash160,
) -> Result<bool, ContractError> {
    let Some(tx) = host.tx.clone() else {
        return Ok(false);
    };
    let Some(signer) = tx.signers.iter().find(|s| s.account == *hash) else {
        return Ok(false);
    };

    if host.trigger == TriggerType::Verification {
        return Ok(true);
    }
    let scopes = signer.scopes;
    if scopes.contains(WitnessScopes::GLOBAL) {
        return Ok(true);
    }
    let depth = engine.invocation_depth();
    let executing = host.executing_hash(depth)?;
    if scopes.contains(WitnessScopes::CALLED_BY_ENTRY) {
        let calling = host.calling_hash(depth)?;
        let entry = host.entry_hash();
        if calling.is_none() || calling == entry || Some(executing) == entry {
            return Ok(true);
        }
    }
    if scopes.contains(WitnessScopes::CUSTOM_CONTRACTS)
        && signer.allowed_contracts.contains(&executing)
    {
        return Ok(true);
    }
    if scopes.contains(WitnessScopes::CUSTOM_GROUPS) {
        if let Some(contract) = host.contract_state(&executing)? {
            for group in &contract.manifest.groups {
                let group_key = hex::decode(&group.pubkey).unwrap_or_default();
                if signer
                    .allowed_groups
                    .iter()
                    .any(|allowed| allowed.encode_compressed().as_slice() == group_key.as_slice())
                {
                    return Ok(true);
                }
            }
        }
    }
    if scopes.contains(WitnessScopes::WITNESS_RULES) {
        for rule in &signer.rules {
            if evaluate_condition(host, engine, &rule.condition)? {
                return Ok(rule.action == neo_types::witness::WitnessRuleAction::Allow);
            }
        }
    }
    Ok(false)
}

fn evaluate_condition(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    condition: &neo_types::witness::WitnessCondition,
) -> Result<bool, ContractError> {
    use neo_types::witness::WitnessCondition as Cond;
    let depth = engine.invocation_depth();
    Ok(match condition {
        Cond::Boolean(value) => *value,
        Cond::Not(inner) => !evaluate_condition(host, engine, inner)?,
        Cond::And(items) => {
            for item in items {
                if !evaluate_condition(host, engine, item)? {
                    return Ok(false);
                }
            }
            true
        }
        Cond::Or(items) => {
            for item in items {
                if evaluate_condition(host, engine, item)? {
                    return Ok(true);
                }
            }
            false
        }
        Cond::ScriptHash(hash) => host.executing_hash(depth)? == *hash,
        Cond::CalledByEntry => {
            let calling = host.calling_hash(depth)?;
            calling.is_none() || calling == host.entry_hash()
        }
        Cond::CalledByContract(hash) => host.calling_hash(depth)? == Some(*hash),
        Cond::Group(group) => {
            let executing = host.executing_hash(depth)?;
            contract_in_group(host, &executing, group)?
        }
        Cond::CalledByGroup(group) => match host.calling_hash(depth)? {
            Some(calling) => contract_in_group(host, &calling, group)?,
            None => false,
        },
    })
}

fn contract_in_group(
    host: &mut HostState,
    contract: &Hash160,
    group: &ECPoint,
) -> Result<bool, ContractError> {
    let Some(state) = host.contract_state(contract)? else {
        return Ok(false);
    };
    let encoded = hex::encode(group.encode_compressed());
    Ok(state
        .manifest
        .groups
        .iter()
        .any(|g| g.pubkey.eq_ignore_ascii_case(&encoded)))
}

fn runtime_check_witness(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    let operand = engine.pop_bytes()?;
    let hash = match operand.len() {
        20 => Hash160(operand.try_into().expect("len 20")),
        33 => {
            let point = ECPoint::from_bytes(&operand)
                .map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
            Hash160::from_script(&signature_redeem_script(&point))
        }
        other => {
            return Err(ContractError::InvalidArgument(format!(
                "witness operand of {other} bytes"
            )))
        }
    };
    let result = check_witness_hash(host, engine, &hash)?;
    engine.push(StackItem::Boolean(result))?;
    Ok(())
}

fn runtime_log(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let message = engine.pop_bytes()?;
    let message = String::from_utf8(message)
        .map_err(|_| ContractError::InvalidArgument("log message must be UTF-8".into()))?;
    let script_hash = host.executing_hash(engine.invocation_depth())?;
    tracing::debug!(contract = %script_hash, %message, "runtime log");
    host.logs.push(LogEvent {
        script_hash,
        message,
    });
    Ok(())
}

fn runtime_notify(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let name = engine.pop_bytes()?;
    let name = String::from_utf8(name)
        .map_err(|_| ContractError::InvalidArgument("event name must be UTF-8".into()))?;
    let state = engine.pop()?;
    let StackItem::Array(items) = &state else {
        return Err(ContractError::InvalidArgument(
            "notification state must be an array".into(),
        ));
    };
    let mut serialized = Vec::new();
    for item in items.borrow().iter() {
        serialized.push(item_serializer::serialize_item(item)?);
    }
    let script_hash = host.executing_hash(engine.invocation_depth())?;
    host.notifications.push(NotifyEvent {
        script_hash,
        name,
        state: serialized,
    });
    Ok(())
}

fn runtime_burn_gas(_host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let amount = engine.pop_integer()?;
    let amount: i64 = amount
        .try_into()
        .map_err(|_| ContractError::InvalidAmount("burn amount".into()))?;
    if amount <= 0 {
        return Err(ContractError::InvalidAmount("burn amount".into()));
    }
    engine.charge_raw(amount)?;
    Ok(())
}

// =============================================================================
// STORAGE
// =============================================================================

/// Handle for a contract's storage area.
#[derive(Clone, Copy, Debug)]
pub struct StorageContext {
    /// The owning contract's id.
    pub id: i32,
    /// Write-protected views reject Put / Delete.
    pub read_only: bool,
}

fn current_storage_context(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    read_only: bool,
) -> Result<StorageContext, ContractError> {
    let executing = host.executing_hash(engine.invocation_depth())?;
    let contract = host
        .contract_state(&executing)?
        .ok_or_else(|| ContractError::ContractNotFound(executing.to_string()))?;
    Ok(StorageContext {
        id: contract.id,
        read_only,
    })
}

fn pop_storage_context(engine: &mut ExecutionEngine) -> Result<StorageContext, ContractError> {
    let item = engine.pop()?;
    let StackItem::InteropInterface(handle) = item else {
        return Err(ContractError::InvalidArgument(
            "expected a storage context".into(),
        ));
    };
    handle
        .downcast_ref::<StorageContext>()
        .copied()
        .ok_or_else(|| ContractError::InvalidArgument("expected a storage context".into()))
}

fn storage_get_context(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let context = current_storage_context(host, engine, false)?;
    engine.push(StackItem::InteropInterface(Rc::new(context)))?;
    Ok(())
}

fn storage_get_readonly_context(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    let context = current_storage_context(host, engine, true)?;
    engine.push(StackItem::InteropInterface(Rc::new(context)))?;
    Ok(())
}

fn storage_as_readonly(_host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let mut context = pop_storage_context(engine)?;
    context.read_only = true;
    engine.push(StackItem::InteropInterface(Rc::new(context)))?;
    Ok(())
}

fn storage_get(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let context = pop_storage_context(engine)?;
    let key = engine.pop_bytes()?;
    match host.snapshot.get(&StorageKey::new(context.id, key))? {
        Some(item) => engine.push(StackItem::byte_string(item.value))?,
        None => engine.push(StackItem::Null)?,
    }
    Ok(())
}

fn storage_put(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let context = pop_storage_context(engine)?;
    if context.read_only {
        return Err(ContractError::InvalidArgument(
            "storage context is read-only".into(),
        ));
    }
    let key = engine.pop_bytes()?;
    let value = engine.pop_bytes()?;
    if key.len() > MAX_STORAGE_KEY_SIZE {
        return Err(ContractError::InvalidArgument("storage key too long".into()));
    }
    if value.len() > MAX_STORAGE_VALUE_SIZE {
        return Err(ContractError::InvalidArgument("storage value too long".into()));
    }
    let storage_key = StorageKey::new(context.id, key);
    if let Some(existing) = host.snapshot.get(&storage_key)? {
        if existing.is_constant {
            return Err(ContractError::InvalidArgument("cell is constant".into()));
        }
    }
    let price = i64::from(policy::storage_price(&mut host.snapshot));
    let billable = (storage_key.suffix.len() + value.len()) as i64;
    engine.charge_raw(price.saturating_mul(billable))?;
    host.snapshot.put(storage_key, StorageItem::new(value))?;
    Ok(())
}

fn storage_delete(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let context = pop_storage_context(engine)?;
    if context.read_only {
        return Err(ContractError::InvalidArgument(
            "storage context is read-only".into(),
        ));
    }
    let key = engine.pop_bytes()?;
    host.snapshot.delete(&StorageKey::new(context.id, key))?;
    Ok(())
}

/// Lazily-consumed prefix scan.
pub struct StorageIterator {
    entries: Vec<(StorageKey, StorageItem)>,
    prefix_len: usize,
    options: u8,
    position: RefCell<Option<usize>>,
}

fn storage_find(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let context = pop_storage_context(engine)?;
    let prefix = engine.pop_bytes()?;
    let options = engine
        .pop_integer()?
        .try_into()
        .map_err(|_| ContractError::InvalidArgument("find options".into()))?;

    let mut flat_prefix = StorageKey::prefix_for(context.id);
    flat_prefix.extend_from_slice(&prefix);
    let mut entries = host.snapshot.find(&flat_prefix)?;
    if options & find_options::BACKWARDS != 0 {
        entries.reverse();
    }
    let iterator = StorageIterator {
        entries,
        prefix_len: prefix.len(),
        options,
        position: RefCell::new(None),
    };
    engine.push(StackItem::InteropInterface(Rc::new(iterator)))?;
    Ok(())
}

fn pop_iterator(engine: &mut ExecutionEngine) -> Result<Rc<StorageIterator>, ContractError> {
    let item = engine.pop()?;
    let StackItem::InteropInterface(handle) = item else {
        return Err(ContractError::InvalidArgument("expected an iterator".into()));
    };
    handle
        .downcast::<StorageIterator>()
        .map_err(|_| ContractError::InvalidArgument("expected an iterator".into()))
}

fn iterator_next(_host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let iterator = pop_iterator(engine)?;
    let mut position = iterator.position.borrow_mut();
    let next = position.map_or(0, |p| p + 1);
    let has_next = next < iterator.entries.len();
    if has_next {
        *position = Some(next);
    }
    drop(position);
    engine.push(StackItem::Boolean(has_next))?;
    Ok(())
}

fn iterator_value(_host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let iterator = pop_iterator(engine)?;
    let position = (*iterator.position.borrow())
        .ok_or_else(|| ContractError::Other("iterator before first element".into()))?;
    let (key, item) = iterator
        .entries
        .get(position)
        .cloned()
        .ok_or_else(|| ContractError::Other("iterator exhausted".into()))?;

    let mut key_bytes = key.suffix;
    if iterator.options & find_options::REMOVE_PREFIX != 0 {
        key_bytes = key_bytes.split_off(iterator.prefix_len.min(key_bytes.len()));
    }
    let value_item = if iterator.options & find_options::DESERIALIZE_VALUES != 0 {
        item_serializer::deserialize_item(&item.value)?
    } else {
        StackItem::byte_string(item.value)
    };

    let result = if iterator.options & find_options::KEYS_ONLY != 0 {
        StackItem::byte_string(key_bytes)
    } else if iterator.options & find_options::VALUES_ONLY != 0 {
        value_item
    } else {
        StackItem::structure(vec![StackItem::byte_string(key_bytes), value_item])
    };
    engine.push(result)?;
    Ok(())
}

// =============================================================================
// CONTRACT
// =============================================================================

fn contract_call(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let hash_bytes = engine.pop_bytes()?;
    let hash = Hash160(
        hash_bytes
            .try_into()
            .map_err(|_| ContractError::InvalidArgument("contract hash".into()))?,
    );
    let method = String::from_utf8(engine.pop_bytes()?)
        .map_err(|_| ContractError::InvalidArgument("method name must be UTF-8".into()))?;
    let flags = CallFlags::from_bits(
        engine
            .pop_integer()?
            .try_into()
            .map_err(|_| ContractError::InvalidArgument("call flags".into()))?,
    )?;
    let args_item = engine.pop()?;
    let StackItem::Array(args) = &args_item else {
        return Err(ContractError::InvalidArgument(
            "arguments must be an array".into(),
        ));
    };
    let args = args.borrow().clone();
    call_contract(host, engine, hash, &method, args, flags)
}

fn contract_get_call_flags(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    let flags = host.current_frame(engine.invocation_depth())?.flags;
    engine.push(StackItem::integer(i64::from(flags.bits())))?;
    Ok(())
}

fn contract_create_standard_account(
    _host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    let key_bytes = engine.pop_bytes()?;
    let point = ECPoint::from_bytes(&key_bytes)
        .map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
    let hash = Hash160::from_script(&signature_redeem_script(&point));
    engine.push(StackItem::byte_string(hash.as_bytes().to_vec()))?;
    Ok(())
}

fn contract_create_multisig_account(
    _host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    let m = engine.pop_index()?;
    let keys_item = engine.pop()?;
    let StackItem::Array(keys) = &keys_item else {
        return Err(ContractError::InvalidArgument(
            "public keys must be an array".into(),
        ));
    };
    let mut points = Vec::new();
    for key in keys.borrow().iter() {
        let bytes = key.to_byte_vec()?;
        points.push(
            ECPoint::from_bytes(&bytes)
                .map_err(|e| ContractError::InvalidArgument(e.to_string()))?,
        );
    }
    let script = multisig_redeem_script(m, &points)?;
    engine.push(StackItem::byte_string(
        Hash160::from_script(&script).as_bytes().to_vec(),
    ))?;
    Ok(())
}

fn contract_native_on_persist(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    if host.trigger != TriggerType::OnPersist {
        return Err(ContractError::InvalidTrigger);
    }
    for native in host.natives.clone().all() {
        native.on_persist(host, engine)?;
    }
    Ok(())
}

fn contract_native_post_persist(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    if host.trigger != TriggerType::PostPersist {
        return Err(ContractError::InvalidTrigger);
    }
    for native in host.natives.clone().all() {
        native.post_persist(host, engine)?;
    }
    Ok(())
}

// =============================================================================
// CRYPTO
// =============================================================================

fn signed_payload(host: &HostState) -> Result<Vec<u8>, ContractError> {
    let hash = host
        .container_hash
        .ok_or_else(|| ContractError::Other("no container to verify against".into()))?;
    let mut writer = neo_types::io::BinaryWriter::new();
    writer.write_u32(host.settings.network);
    hash.serialize(&mut writer);
    Ok(writer.into_bytes())
}

fn crypto_check_sig(host: &mut HostState, engine: &mut ExecutionEngine) -> Result<(), ContractError> {
    let key_bytes = engine.pop_bytes()?;
    let signature_bytes = engine.pop_bytes()?;
    let payload = signed_payload(host)?;
    let result = match (
        ECPoint::from_bytes(&key_bytes),
        Secp256r1Signature::from_bytes(&signature_bytes),
    ) {
        (Ok(point), Ok(signature)) => point.verify(&payload, &signature),
        _ => false,
    };
    engine.push(StackItem::Boolean(result))?;
    Ok(())
}

fn crypto_check_multisig(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    // The multi-sig redeem script leaves `sig_1..sig_m, m, key_1..key_n,
    // n` on the stack (signatures pushed by the invocation script).
    let n = engine.pop_index()?;
    if n == 0 || n > 16 {
        return Err(ContractError::InvalidArgument(format!("{n} keys")));
    }
    let mut keys = Vec::with_capacity(n);
    for _ in 0..n {
        let bytes = engine.pop_bytes()?;
        keys.push(
            ECPoint::from_bytes(&bytes)
                .map_err(|e| ContractError::InvalidArgument(e.to_string()))?,
        );
    }
    keys.reverse();
    let m = engine.pop_index()?;
    if m == 0 || m > n {
        return Err(ContractError::InvalidArgument(format!("{m}-of-{n}")));
    }
    let mut signatures = Vec::with_capacity(m);
    for _ in 0..m {
        let bytes = engine.pop_bytes()?;
        signatures.push(
            Secp256r1Signature::from_bytes(&bytes)
                .map_err(|e| ContractError::InvalidArgument(e.to_string()))?,
        );
    }
    signatures.reverse();

    engine.charge((n as i64) * (1 << 15))?;
    let payload = signed_payload(host)?;

    // Signatures must match keys in order; both lists share one pass.
    let mut key_index = 0;
    let mut matched = 0;
    for signature in &signatures {
        while key_index < keys.len() {
            let point = &keys[key_index];
            key_index += 1;
            if point.verify(&payload, signature) {
                matched += 1;
                break;
            }
        }
        if matched + (keys.len() - key_index) < signatures.len() {
            break;
        }
    }
    engine.push(StackItem::Boolean(matched == signatures.len()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syscall_numbers_are_distinct() {
        let table = table();
        assert_eq!(table.len(), 32);
    }

    #[test]
    fn test_known_syscall_hash() {
        // The number is the first four LE bytes of sha256 of the name.
        let digest = sha256(b"System.Runtime.Platform");
        let expected = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        assert_eq!(syscall_number("System.Runtime.Platform"), expected);
    }
}
