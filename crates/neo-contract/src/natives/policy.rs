//! PolicyContract: mutable network policy knobs.
//!
//! Every setter requires a committee witness. Getters have static
//! counterparts the ledger pipeline reads directly during verification.

use super::{
    check_committee, delete_item, get_int, get_item, put_int, put_item, NativeContract,
    NativeMethod,
};
use crate::call_flags::CallFlags;
use crate::engine::HostState;
use crate::error::ContractError;
use neo_store::DataCache;
use neo_types::Hash160;
use neo_vm::{ExecutionEngine, StackItem};
use num_bigint::BigInt;

/// Contract id.
pub const ID: i32 = -7;

const PREFIX_FEE_PER_BYTE: &[u8] = &[0x0A];
const PREFIX_MAX_BLOCK_SIZE: &[u8] = &[0x0C];
const PREFIX_MAX_BLOCK_SYSTEM_FEE: &[u8] = &[0x11];
const PREFIX_EXEC_FEE_FACTOR: &[u8] = &[0x12];
const PREFIX_STORAGE_PRICE: &[u8] = &[0x13];
const PREFIX_ATTRIBUTE_FEE: u8 = 0x14;
const PREFIX_BLOCKED: u8 = 0x0F;
const PREFIX_MAX_TX_PER_BLOCK: &[u8] = &[0x17];

/// Default network fee per transaction byte.
pub const DEFAULT_FEE_PER_BYTE: i64 = 1_000;
/// Default execution fee multiplier.
pub const DEFAULT_EXEC_FEE_FACTOR: u32 = 30;
/// Default storage price per byte.
pub const DEFAULT_STORAGE_PRICE: u32 = 100_000;
/// Default maximum block size in bytes.
pub const DEFAULT_MAX_BLOCK_SIZE: u32 = 262_144;
/// Default maximum total system fee per block.
pub const DEFAULT_MAX_BLOCK_SYSTEM_FEE: i64 = 900_000_000_000;
/// Default maximum transactions per block.
pub const DEFAULT_MAX_TX_PER_BLOCK: u32 = 512;

/// The policy native.
pub struct PolicyContract {
    methods: Vec<NativeMethod>,
}

impl PolicyContract {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            NativeMethod {
                name: "getFeePerByte",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _engine, _args| {
                    Ok(StackItem::integer(fee_per_byte(&mut host.snapshot)))
                },
            },
            NativeMethod {
                name: "setFeePerByte",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_fee_per_byte,
            },
            NativeMethod {
                name: "getExecFeeFactor",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _engine, _args| {
                    Ok(StackItem::integer(i64::from(exec_fee_factor(
                        &mut host.snapshot,
                    ))))
                },
            },
            NativeMethod {
                name: "setExecFeeFactor",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_exec_fee_factor,
            },
            NativeMethod {
                name: "getStoragePrice",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _engine, _args| {
                    Ok(StackItem::integer(i64::from(storage_price(
                        &mut host.snapshot,
                    ))))
                },
            },
            NativeMethod {
                name: "setStoragePrice",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_storage_price,
            },
            NativeMethod {
                name: "getMaxBlockSize",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _engine, _args| {
                    Ok(StackItem::integer(i64::from(max_block_size(
                        &mut host.snapshot,
                    ))))
                },
            },
            NativeMethod {
                name: "setMaxBlockSize",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_max_block_size,
            },
            NativeMethod {
                name: "getMaxBlockSystemFee",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _engine, _args| {
                    Ok(StackItem::integer(max_block_system_fee(
                        &mut host.snapshot,
                    )))
                },
            },
            NativeMethod {
                name: "setMaxBlockSystemFee",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_max_block_system_fee,
            },
            NativeMethod {
                name: "getMaxTransactionsPerBlock",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _engine, _args| {
                    Ok(StackItem::integer(i64::from(max_transactions_per_block(
                        &mut host.snapshot,
                    ))))
                },
            },
            NativeMethod {
                name: "setMaxTransactionsPerBlock",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_max_transactions_per_block,
            },
            NativeMethod {
                name: "getAttributeFee",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: get_attribute_fee_method,
            },
            NativeMethod {
                name: "setAttributeFee",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_attribute_fee,
            },
            NativeMethod {
                name: "isBlocked",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: is_blocked_method,
            },
            NativeMethod {
                name: "blockAccount",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: block_account,
            },
            NativeMethod {
                name: "unblockAccount",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: unblock_account,
            },
        ];
        Self { methods }
    }
}

impl Default for PolicyContract {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for PolicyContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "PolicyContract"
    }

    fn hash(&self) -> Hash160 {
        super::native_contract_hash(self.name())
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }
}

// =============================================================================
// STATIC GETTERS (used by the ledger pipeline)
// =============================================================================

fn int_or(cache: &mut DataCache, suffix: &[u8], fallback: i64) -> i64 {
    get_int(cache, ID, suffix)
        .ok()
        .flatten()
        .and_then(|v| v.try_into().ok())
        .unwrap_or(fallback)
}

/// Network fee per byte a valid transaction must cover.
pub fn fee_per_byte(cache: &mut DataCache) -> i64 {
    int_or(cache, PREFIX_FEE_PER_BYTE, DEFAULT_FEE_PER_BYTE)
}

/// Multiplier applied to every VM instruction price.
pub fn exec_fee_factor(cache: &mut DataCache) -> u32 {
    int_or(cache, PREFIX_EXEC_FEE_FACTOR, i64::from(DEFAULT_EXEC_FEE_FACTOR)) as u32
}

/// Gas per byte written to contract storage.
pub fn storage_price(cache: &mut DataCache) -> u32 {
    int_or(cache, PREFIX_STORAGE_PRICE, i64::from(DEFAULT_STORAGE_PRICE)) as u32
}

/// Largest acceptable serialized block.
pub fn max_block_size(cache: &mut DataCache) -> u32 {
    int_or(cache, PREFIX_MAX_BLOCK_SIZE, i64::from(DEFAULT_MAX_BLOCK_SIZE)) as u32
}

/// Largest acceptable per-block system-fee sum.
pub fn max_block_system_fee(cache: &mut DataCache) -> i64 {
    int_or(cache, PREFIX_MAX_BLOCK_SYSTEM_FEE, DEFAULT_MAX_BLOCK_SYSTEM_FEE)
}

/// Cap on transactions per block.
pub fn max_transactions_per_block(cache: &mut DataCache) -> u32 {
    int_or(cache, PREFIX_MAX_TX_PER_BLOCK, i64::from(DEFAULT_MAX_TX_PER_BLOCK)) as u32
}

/// Extra fee charged for carrying the given attribute type.
pub fn attribute_fee(cache: &mut DataCache, attribute_type: u8) -> i64 {
    int_or(cache, &[PREFIX_ATTRIBUTE_FEE, attribute_type], 0)
}

/// True for accounts on the block list.
pub fn is_blocked(cache: &mut DataCache, account: &Hash160) -> bool {
    let mut suffix = vec![PREFIX_BLOCKED];
    suffix.extend_from_slice(account.as_bytes());
    get_item(cache, ID, &suffix).ok().flatten().is_some()
}

// =============================================================================
// METHOD HANDLERS
// =============================================================================

fn require_committee(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
) -> Result<(), ContractError> {
    if check_committee(host, engine)? {
        Ok(())
    } else {
        Err(ContractError::CheckWitnessFailed)
    }
}

fn pop_i64(args: &mut Vec<StackItem>) -> Result<i64, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing argument".into()));
    }
    let value = args.remove(0);
    value
        .to_integer()
        .map_err(ContractError::from)?
        .try_into()
        .map_err(|_| ContractError::InvalidAmount("argument out of range".into()))
}

fn pop_hash(args: &mut Vec<StackItem>) -> Result<Hash160, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing argument".into()));
    }
    let bytes = args.remove(0).to_byte_vec().map_err(ContractError::from)?;
    Ok(Hash160(bytes.try_into().map_err(|_| {
        ContractError::InvalidArgument("expected a 20-byte account".into())
    })?))
}

fn set_positive(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
    suffix: &[u8],
    max: i64,
) -> Result<StackItem, ContractError> {
    let value = pop_i64(&mut args)?;
    if value <= 0 || value > max {
        return Err(ContractError::InvalidAmount(format!("{value}")));
    }
    require_committee(host, engine)?;
    put_int(&mut host.snapshot, ID, suffix, &BigInt::from(value))?;
    Ok(StackItem::Null)
}

fn set_fee_per_byte(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    set_positive(host, engine, args, PREFIX_FEE_PER_BYTE, 100_000_000)
}

fn set_exec_fee_factor(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    set_positive(host, engine, args, PREFIX_EXEC_FEE_FACTOR, 100)
}

fn set_storage_price(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    set_positive(host, engine, args, PREFIX_STORAGE_PRICE, 10_000_000)
}

fn set_max_block_size(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    set_positive(host, engine, args, PREFIX_MAX_BLOCK_SIZE, 8 * 1024 * 1024)
}

fn set_max_block_system_fee(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    set_positive(host, engine, args, PREFIX_MAX_BLOCK_SYSTEM_FEE, i64::MAX)
}

fn set_max_transactions_per_block(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    set_positive(host, engine, args, PREFIX_MAX_TX_PER_BLOCK, u16::MAX as i64)
}

fn get_attribute_fee_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let attribute_type = pop_i64(&mut args)? as u8;
    Ok(StackItem::integer(attribute_fee(
        &mut host.snapshot,
        attribute_type,
    )))
}

fn set_attribute_fee(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let attribute_type = pop_i64(&mut args)? as u8;
    let fee = pop_i64(&mut args)?;
    if fee < 0 || fee > 10 * 100_000_000 {
        return Err(ContractError::InvalidAmount(format!("{fee}")));
    }
    require_committee(host, engine)?;
    put_int(
        &mut host.snapshot,
        ID,
        &[PREFIX_ATTRIBUTE_FEE, attribute_type],
        &BigInt::from(fee),
    )?;
    Ok(StackItem::Null)
}

fn is_blocked_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let account = pop_hash(&mut args)?;
    Ok(StackItem::Boolean(is_blocked(&mut host.snapshot, &account)))
}

fn block_account(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let account = pop_hash(&mut args)?;
    require_committee(host, engine)?;
    let mut suffix = vec![PREFIX_BLOCKED];
    suffix.extend_from_slice(account.as_bytes());
    let fresh = get_item(&mut host.snapshot, ID, &suffix)?.is_none();
    if fresh {
        put_item(&mut host.snapshot, ID, &suffix, Vec::new())?;
    }
    Ok(StackItem::Boolean(fresh))
}

fn unblock_account(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let account = pop_hash(&mut args)?;
    require_committee(host, engine)?;
    let mut suffix = vec![PREFIX_BLOCKED];
    suffix.extend_from_slice(account.as_bytes());
    let existed = get_item(&mut host.snapshot, ID, &suffix)?.is_some();
    if existed {
        delete_item(&mut host.snapshot, ID, &suffix)?;
    }
    Ok(StackItem::Boolean(existed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_defaults_apply_when_unset() {
        let mut cache = DataCache::new(Arc::new(MemoryStore::new()));
        assert_eq!(fee_per_byte(&mut cache), DEFAULT_FEE_PER_BYTE);
        assert_eq!(exec_fee_factor(&mut cache), DEFAULT_EXEC_FEE_FACTOR);
        assert_eq!(storage_price(&mut cache), DEFAULT_STORAGE_PRICE);
        assert_eq!(max_block_size(&mut cache), DEFAULT_MAX_BLOCK_SIZE);
        assert!(!is_blocked(&mut cache, &Hash160([1u8; 20])));
    }

    #[test]
    fn test_stored_values_override_defaults() {
        let mut cache = DataCache::new(Arc::new(MemoryStore::new()));
        put_int(&mut cache, ID, PREFIX_FEE_PER_BYTE, &BigInt::from(5_000)).unwrap();
        assert_eq!(fee_per_byte(&mut cache), 5_000);
    }
}
