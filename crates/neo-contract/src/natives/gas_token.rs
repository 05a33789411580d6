//! GasToken: the divisible utility token metering execution.
//!
//! Minted as block reward and burned for fees. Balances live under the
//! `0x14` prefix as little-endian signed integers.

use super::{delete_item, get_int, put_int, NativeContract, NativeMethod};
use crate::engine::{HostState, NotifyEvent};
use crate::call_flags::CallFlags;
use crate::error::ContractError;
use crate::item_serializer;
use crate::syscalls::check_witness_hash;
use neo_store::DataCache;
use neo_types::Hash160;
use neo_vm::{ExecutionEngine, StackItem};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

/// Contract id.
pub const ID: i32 = -6;

/// Token decimals.
pub const DECIMALS: u8 = 8;

const PREFIX_BALANCE: u8 = 0x14;
const PREFIX_TOTAL_SUPPLY: &[u8] = &[0x0B];

/// The GAS native.
pub struct GasToken {
    methods: Vec<NativeMethod>,
}

impl GasToken {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            NativeMethod {
                name: "symbol",
                required_flags: CallFlags::NONE,
                price: 0,
                handler: |_host, _engine, _args| Ok(StackItem::byte_string(b"GAS".to_vec())),
            },
            NativeMethod {
                name: "decimals",
                required_flags: CallFlags::NONE,
                price: 0,
                handler: |_host, _engine, _args| Ok(StackItem::integer(i64::from(DECIMALS))),
            },
            NativeMethod {
                name: "totalSupply",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _engine, _args| {
                    Ok(StackItem::Integer(total_supply(&mut host.snapshot)?))
                },
            },
            NativeMethod {
                name: "balanceOf",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: balance_of_method,
            },
            NativeMethod {
                name: "transfer",
                required_flags: CallFlags::STATES,
                price: 1 << 17,
                handler: transfer_method,
            },
        ];
        Self { methods }
    }
}

impl Default for GasToken {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for GasToken {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "GasToken"
    }

    fn hash(&self) -> Hash160 {
        super::native_contract_hash(self.name())
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }

    /// Burn every fee the block's transactions pay, before they execute.
    fn on_persist(
        &self,
        host: &mut HostState,
        _engine: &mut ExecutionEngine,
    ) -> Result<(), ContractError> {
        let Some(block) = host.persisting_block.clone() else {
            return Ok(());
        };
        for tx in &block.transactions {
            let sender = tx
                .sender()
                .ok_or_else(|| ContractError::Other("transaction without signers".into()))?
                .account;
            let fees = BigInt::from(tx.system_fee) + BigInt::from(tx.network_fee);
            burn(&mut host.snapshot, &sender, &fees)?;
        }
        Ok(())
    }

    /// Reward the block's primary with the network fees, after execution.
    fn post_persist(
        &self,
        host: &mut HostState,
        _engine: &mut ExecutionEngine,
    ) -> Result<(), ContractError> {
        let Some(block) = host.persisting_block.clone() else {
            return Ok(());
        };
        let validators = host.settings.standby_validators();
        if validators.is_empty() {
            return Ok(());
        }
        let primary_index = (block.header.primary_index as usize).min(validators.len() - 1);
        let primary = Hash160::from_script(&neo_types::contract_script::signature_redeem_script(
            &validators[primary_index],
        ));
        let reward: BigInt = block
            .transactions
            .iter()
            .map(|tx| BigInt::from(tx.network_fee))
            .sum();
        if !reward.is_zero() {
            mint(&mut host.snapshot, &primary, &reward)?;
        }
        Ok(())
    }
}

// =============================================================================
// ACCOUNTING PRIMITIVES (shared with genesis, NEO rewards and notary)
// =============================================================================

fn balance_suffix(account: &Hash160) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(21);
    suffix.push(PREFIX_BALANCE);
    suffix.extend_from_slice(account.as_bytes());
    suffix
}

/// Current balance of `account`.
pub fn balance_of(cache: &mut DataCache, account: &Hash160) -> Result<BigInt, ContractError> {
    Ok(get_int(cache, ID, &balance_suffix(account))?.unwrap_or_else(BigInt::zero))
}

/// Total minted supply.
pub fn total_supply(cache: &mut DataCache) -> Result<BigInt, ContractError> {
    Ok(get_int(cache, ID, PREFIX_TOTAL_SUPPLY)?.unwrap_or_else(BigInt::zero))
}

/// Create `amount` GAS on `account`.
pub fn mint(
    cache: &mut DataCache,
    account: &Hash160,
    amount: &BigInt,
) -> Result<(), ContractError> {
    if amount.is_negative() {
        return Err(ContractError::InvalidAmount(amount.to_string()));
    }
    let balance = balance_of(cache, account)? + amount;
    put_int(cache, ID, &balance_suffix(account), &balance)?;
    let supply = total_supply(cache)? + amount;
    put_int(cache, ID, PREFIX_TOTAL_SUPPLY, &supply)?;
    Ok(())
}

/// Destroy `amount` GAS held by `account`.
pub fn burn(
    cache: &mut DataCache,
    account: &Hash160,
    amount: &BigInt,
) -> Result<(), ContractError> {
    if amount.is_negative() {
        return Err(ContractError::InvalidAmount(amount.to_string()));
    }
    let balance = balance_of(cache, account)?;
    if balance < *amount {
        return Err(ContractError::InsufficientBalance);
    }
    let remaining = balance - amount;
    if remaining.is_zero() {
        delete_item(cache, ID, &balance_suffix(account))?;
    } else {
        put_int(cache, ID, &balance_suffix(account), &remaining)?;
    }
    let supply = total_supply(cache)? - amount;
    put_int(cache, ID, PREFIX_TOTAL_SUPPLY, &supply)?;
    Ok(())
}

fn emit_transfer(
    host: &mut HostState,
    from: Option<&Hash160>,
    to: Option<&Hash160>,
    amount: &BigInt,
) -> Result<(), ContractError> {
    let hash_item = |hash: Option<&Hash160>| match hash {
        Some(hash) => StackItem::byte_string(hash.as_bytes().to_vec()),
        None => StackItem::Null,
    };
    let state = [
        hash_item(from),
        hash_item(to),
        StackItem::Integer(amount.clone()),
    ];
    let mut serialized = Vec::with_capacity(3);
    for item in &state {
        serialized.push(item_serializer::serialize_item(item)?);
    }
    host.notifications.push(NotifyEvent {
        script_hash: super::native_contract_hash("GasToken"),
        name: "Transfer".into(),
        state: serialized,
    });
    Ok(())
}

// =============================================================================
// METHOD HANDLERS
// =============================================================================

fn arg_hash(args: &mut Vec<StackItem>) -> Result<Hash160, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing account".into()));
    }
    let bytes = args.remove(0).to_byte_vec().map_err(ContractError::from)?;
    Ok(Hash160(bytes.try_into().map_err(|_| {
        ContractError::InvalidArgument("expected a 20-byte account".into())
    })?))
}

fn balance_of_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let account = arg_hash(&mut args)?;
    Ok(StackItem::Integer(balance_of(&mut host.snapshot, &account)?))
}

fn transfer_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let from = arg_hash(&mut args)?;
    let to = arg_hash(&mut args)?;
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing amount".into()));
    }
    let amount = args.remove(0).to_integer().map_err(ContractError::from)?;
    if amount.is_negative() {
        return Err(ContractError::InvalidAmount(amount.to_string()));
    }
    if !check_witness_hash(host, engine, &from)? {
        return Ok(StackItem::Boolean(false));
    }
    let from_balance = balance_of(&mut host.snapshot, &from)?;
    if from_balance < amount {
        return Ok(StackItem::Boolean(false));
    }

    if from != to && !amount.is_zero() {
        let remaining = from_balance - &amount;
        if remaining.is_zero() {
            delete_item(&mut host.snapshot, ID, &balance_suffix(&from))?;
        } else {
            put_int(&mut host.snapshot, ID, &balance_suffix(&from), &remaining)?;
        }
        let to_balance = balance_of(&mut host.snapshot, &to)? + &amount;
        put_int(&mut host.snapshot, ID, &balance_suffix(&to), &to_balance)?;
    }
    emit_transfer(host, Some(&from), Some(&to), &amount)?;
    Ok(StackItem::Boolean(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_store::MemoryStore;
    use std::sync::Arc;

    fn cache() -> DataCache {
        DataCache::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_mint_and_burn_track_supply() {
        let mut cache = cache();
        let account = Hash160([1u8; 20]);
        mint(&mut cache, &account, &BigInt::from(500)).unwrap();
        assert_eq!(balance_of(&mut cache, &account).unwrap(), BigInt::from(500));
        assert_eq!(total_supply(&mut cache).unwrap(), BigInt::from(500));

        burn(&mut cache, &account, &BigInt::from(200)).unwrap();
        assert_eq!(balance_of(&mut cache, &account).unwrap(), BigInt::from(300));
        assert_eq!(total_supply(&mut cache).unwrap(), BigInt::from(300));
    }

    #[test]
    fn test_burn_rejects_overdraft() {
        let mut cache = cache();
        let account = Hash160([1u8; 20]);
        mint(&mut cache, &account, &BigInt::from(10)).unwrap();
        assert!(matches!(
            burn(&mut cache, &account, &BigInt::from(11)),
            Err(ContractError::InsufficientBalance)
        ));
    }

    #[test]
    fn test_zero_balance_cell_is_removed() {
        let mut cache = cache();
        let account = Hash160([2u8; 20]);
        mint(&mut cache, &account, &BigInt::from(5)).unwrap();
        burn(&mut cache, &account, &BigInt::from(5)).unwrap();
        assert!(get_int(&mut cache, ID, &balance_suffix(&account))
            .unwrap()
            .is_none());
    }
}
