//! Notary: deposit-backed multi-signature completion service.
//!
//! Accounts lock GAS deposits that back notary-assisted transactions;
//! after each block the notary nodes collect their share of the fees of
//! every transaction carrying a `NotaryAssisted` attribute.

use super::{delete_item, get_int, get_item, put_item, role_management};
use super::{gas_token, NativeContract, NativeMethod};
use crate::call_flags::CallFlags;
use crate::engine::HostState;
use crate::error::ContractError;
use crate::natives::check_committee;
use crate::syscalls::check_witness_hash;
use neo_store::DataCache;
use neo_types::attribute::TransactionAttribute;
use neo_types::contract_script::signature_redeem_script;
use neo_types::io::{BinaryReader, BinaryWriter};
use neo_types::Hash160;
use neo_vm::{ExecutionEngine, StackItem};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

/// Contract id.
pub const ID: i32 = -10;

const PREFIX_DEPOSIT: u8 = 0x01;
const PREFIX_MAX_NVB_DELTA: &[u8] = &[0x10];

/// Fee per notary-assisted key (0.001 GAS).
pub const FEE_PER_KEY: i64 = 100_000;

/// Default bound on `NotValidBefore` distance.
pub const DEFAULT_MAX_NVB_DELTA: u32 = 140;

/// A locked deposit.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Deposit {
    /// Locked amount.
    pub amount: BigInt,
    /// Height until which the deposit stays locked.
    pub till: u32,
}

impl Deposit {
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(&self.amount.to_signed_bytes_le());
        writer.write_u32(self.till);
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ContractError> {
        let mut reader = BinaryReader::new(bytes);
        let raw = reader.read_var_bytes(32)?;
        Ok(Self {
            amount: BigInt::from_signed_bytes_le(&raw),
            till: reader.read_u32()?,
        })
    }
}

fn deposit_suffix(account: &Hash160) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(21);
    suffix.push(PREFIX_DEPOSIT);
    suffix.extend_from_slice(account.as_bytes());
    suffix
}

/// Read an account's deposit.
pub fn deposit_of(
    cache: &mut DataCache,
    account: &Hash160,
) -> Result<Option<Deposit>, ContractError> {
    match get_item(cache, ID, &deposit_suffix(account))? {
        Some(item) => Ok(Some(Deposit::from_bytes(&item.value)?)),
        None => Ok(None),
    }
}

/// The notary native.
pub struct Notary {
    methods: Vec<NativeMethod>,
}

impl Notary {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            NativeMethod {
                name: "balanceOf",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: balance_of_method,
            },
            NativeMethod {
                name: "expirationOf",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: expiration_of_method,
            },
            NativeMethod {
                name: "lockDepositUntil",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: lock_deposit_until_method,
            },
            NativeMethod {
                name: "withdraw",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: withdraw_method,
            },
            NativeMethod {
                name: "onNEP17Payment",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: on_payment_method,
            },
            NativeMethod {
                name: "getMaxNotValidBeforeDelta",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _e, _a| {
                    Ok(StackItem::integer(i64::from(max_nvb_delta(
                        &mut host.snapshot,
                    ))))
                },
            },
            NativeMethod {
                name: "setMaxNotValidBeforeDelta",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_max_nvb_delta_method,
            },
        ];
        Self { methods }
    }
}

impl Default for Notary {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for Notary {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "Notary"
    }

    fn hash(&self) -> Hash160 {
        super::native_contract_hash(self.name())
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }

    /// Pay the designated notary nodes their per-key share for every
    /// notary-assisted transaction in the block.
    fn post_persist(
        &self,
        host: &mut HostState,
        _engine: &mut ExecutionEngine,
    ) -> Result<(), ContractError> {
        let Some(block) = host.persisting_block.clone() else {
            return Ok(());
        };
        let notaries = role_management::designated_by_role(
            &mut host.snapshot,
            role_management::Role::P2PNotary,
            block.header.index,
        )?;
        if notaries.is_empty() {
            return Ok(());
        }

        let mut total_keys: u64 = 0;
        for tx in &block.transactions {
            for attribute in &tx.attributes {
                if let TransactionAttribute::NotaryAssisted { n_keys } = attribute {
                    total_keys += u64::from(*n_keys) + 1;
                }
            }
        }
        if total_keys == 0 {
            return Ok(());
        }
        let total_reward = BigInt::from(FEE_PER_KEY) * total_keys;
        let share = &total_reward / BigInt::from(notaries.len());
        if share.is_zero() {
            return Ok(());
        }
        for notary in &notaries {
            let account = Hash160::from_script(&signature_redeem_script(notary));
            gas_token::mint(&mut host.snapshot, &account, &share)?;
        }
        Ok(())
    }
}

/// Bound on how far a `NotValidBefore` attribute may reach.
pub fn max_nvb_delta(cache: &mut DataCache) -> u32 {
    get_int(cache, ID, PREFIX_MAX_NVB_DELTA)
        .ok()
        .flatten()
        .and_then(|v| v.to_u32())
        .unwrap_or(DEFAULT_MAX_NVB_DELTA)
}

// =============================================================================
// HANDLERS
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
    let amount = deposit_of(&mut host.snapshot, &account)?
        .map(|d| d.amount)
        .unwrap_or_else(BigInt::zero);
    Ok(StackItem::Integer(amount))
}

fn expiration_of_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let account = arg_hash(&mut args)?;
    let till = deposit_of(&mut host.snapshot, &account)?
        .map(|d| d.till)
        .unwrap_or(0);
    Ok(StackItem::integer(i64::from(till)))
}

fn lock_deposit_until_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let account = arg_hash(&mut args)?;
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing height".into()));
    }
    let till = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_u32()
        .ok_or_else(|| ContractError::InvalidArgument("height out of range".into()))?;
    if !check_witness_hash(host, engine, &account)? {
        return Ok(StackItem::Boolean(false));
    }
    let Some(mut deposit) = deposit_of(&mut host.snapshot, &account)? else {
        return Ok(StackItem::Boolean(false));
    };
    if till < deposit.till {
        return Ok(StackItem::Boolean(false));
    }
    deposit.till = till;
    put_item(&mut host.snapshot, ID, &deposit_suffix(&account), deposit.to_bytes())?;
    Ok(StackItem::Boolean(true))
}

fn withdraw_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let from = arg_hash(&mut args)?;
    let to = arg_hash(&mut args)?;
    if !check_witness_hash(host, engine, &from)? {
        return Ok(StackItem::Boolean(false));
    }
    let Some(deposit) = deposit_of(&mut host.snapshot, &from)? else {
        return Ok(StackItem::Boolean(false));
    };
    let current_height = host
        .persisting_block
        .as_ref()
        .map(|b| b.header.index)
        .unwrap_or(u32::MAX);
    if deposit.till > current_height {
        return Ok(StackItem::Boolean(false));
    }

    // The deposit sits on the notary's own GAS balance; release it.
    let notary_account = super::native_contract_hash("Notary");
    gas_token::burn(&mut host.snapshot, &notary_account, &deposit.amount)?;
    gas_token::mint(&mut host.snapshot, &to, &deposit.amount)?;
    delete_item(&mut host.snapshot, ID, &deposit_suffix(&from))?;
    Ok(StackItem::Boolean(true))
}

fn on_payment_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    // Only GAS transfers create deposits.
    let calling = host
        .calling_hash(engine.invocation_depth())?
        .ok_or_else(|| ContractError::Other("direct deposit call".into()))?;
    if calling != super::native_contract_hash("GasToken") {
        return Err(ContractError::InvalidArgument(
            "deposits must arrive as GAS transfers".into(),
        ));
    }
    let from = arg_hash(&mut args)?;
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing amount".into()));
    }
    let amount = args.remove(0).to_integer().map_err(ContractError::from)?;
    let till = if args.is_empty() {
        DEFAULT_MAX_NVB_DELTA
    } else {
        args.remove(0)
            .to_integer()
            .map_err(ContractError::from)?
            .to_u32()
            .unwrap_or(DEFAULT_MAX_NVB_DELTA)
    };

    let mut deposit = deposit_of(&mut host.snapshot, &from)?.unwrap_or_default();
    deposit.amount += amount;
    deposit.till = deposit.till.max(till);
    put_item(&mut host.snapshot, ID, &deposit_suffix(&from), deposit.to_bytes())?;
    Ok(StackItem::Null)
}

fn set_max_nvb_delta_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing delta".into()));
    }
    let delta = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_u32()
        .filter(|d| *d > 0)
        .ok_or_else(|| ContractError::InvalidArgument("delta out of range".into()))?;
    if !check_committee(host, engine)? {
        return Err(ContractError::CheckWitnessFailed);
    }
    super::put_int(&mut host.snapshot, ID, PREFIX_MAX_NVB_DELTA, &BigInt::from(delta))?;
    Ok(StackItem::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_round_trip() {
        let deposit = Deposit {
            amount: BigInt::from(12_345),
            till: 99,
        };
        assert_eq!(Deposit::from_bytes(&deposit.to_bytes()).unwrap(), deposit);
    }
}
