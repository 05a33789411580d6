//! NeoToken: the indivisible governance token.
//!
//! Tracks balances with vote targets, candidate registration and the
//! committee election, and accrues GAS to holders per block held.
//! Balance cells live under `0x20`, candidates under `0x21` and the
//! elected committee under `0x22`.

use super::{check_committee, delete_item, get_int, get_item, put_int, put_item};
use super::{gas_token, NativeContract, NativeMethod};
use crate::call_flags::CallFlags;
use crate::engine::HostState;
use crate::error::ContractError;
use crate::syscalls::check_witness_hash;
use neo_crypto::ecdsa::ECPoint;
use neo_store::DataCache;
use neo_types::contract_script::multisig_redeem_script;
use neo_types::io::{BinaryReader, BinaryWriter};
use neo_types::{Hash160, ProtocolSettings};
use neo_vm::{ExecutionEngine, StackItem};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

/// Contract id.
pub const ID: i32 = -5;

/// Fixed total supply.
pub const TOTAL_SUPPLY: i64 = 100_000_000;

/// Share of each block's GAS issuance paid to plain holders, percent.
pub const HOLDER_REWARD_RATIO: i64 = 10;

/// Share paid to the rotating committee member, percent.
pub const COMMITTEE_REWARD_RATIO: i64 = 10;

const PREFIX_BALANCE: u8 = 0x20;
const PREFIX_CANDIDATE: u8 = 0x21;
const PREFIX_COMMITTEE: &[u8] = &[0x22];
const PREFIX_GAS_PER_BLOCK: u8 = 0x23;
const PREFIX_REGISTER_PRICE: &[u8] = &[0x25];

/// Default GAS issued per block (5 GAS).
pub const DEFAULT_GAS_PER_BLOCK: i64 = 5 * 100_000_000;

/// Default candidate registration price (1000 GAS).
pub const DEFAULT_REGISTER_PRICE: i64 = 1_000 * 100_000_000;

// =============================================================================
// ACCOUNT STATE
// =============================================================================

/// Per-account record: balance, the height it last changed, and the
/// candidate the balance votes for.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct NeoAccountState {
    /// Whole-token balance.
    pub balance: BigInt,
    /// Height at which the balance last changed (for GAS accrual).
    pub balance_height: u32,
    /// Vote target, if any.
    pub vote_to: Option<ECPoint>,
}

impl NeoAccountState {
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(&self.balance.to_signed_bytes_le());
        writer.write_u32(self.balance_height);
        match &self.vote_to {
            Some(point) => {
                writer.write_bool(true);
                writer.write_bytes(&point.encode_compressed());
            }
            None => writer.write_bool(false),
        }
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ContractError> {
        let mut reader = BinaryReader::new(bytes);
        let balance_bytes = reader.read_var_bytes(32)?;
        let balance = BigInt::from_signed_bytes_le(&balance_bytes);
        let balance_height = reader.read_u32()?;
        let vote_to = if reader.read_bool()? {
            let key = reader.read_bytes(33)?;
            Some(
                ECPoint::from_bytes(&key)
                    .map_err(|e| ContractError::InvalidArgument(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self {
            balance,
            balance_height,
            vote_to,
        })
    }
}

fn balance_suffix(account: &Hash160) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(21);
    suffix.push(PREFIX_BALANCE);
    suffix.extend_from_slice(account.as_bytes());
    suffix
}

fn candidate_suffix(key: &ECPoint) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(34);
    suffix.push(PREFIX_CANDIDATE);
    suffix.extend_from_slice(&key.encode_compressed());
    suffix
}

/// Read an account record.
pub fn account_state(
    cache: &mut DataCache,
    account: &Hash160,
) -> Result<Option<NeoAccountState>, ContractError> {
    match get_item(cache, ID, &balance_suffix(account))? {
        Some(item) => Ok(Some(NeoAccountState::from_bytes(&item.value)?)),
        None => Ok(None),
    }
}

fn put_account_state(
    cache: &mut DataCache,
    account: &Hash160,
    state: &NeoAccountState,
) -> Result<(), ContractError> {
    if state.balance.is_zero() && state.vote_to.is_none() {
        delete_item(cache, ID, &balance_suffix(account))
    } else {
        put_item(cache, ID, &balance_suffix(account), state.to_bytes())
    }
}

// =============================================================================
// COMMITTEE & CANDIDATES
// =============================================================================

fn encode_committee(keys: &[ECPoint]) -> Vec<u8> {
    let mut writer = BinaryWriter::new();
    writer.write_var_int(keys.len() as u64);
    for key in keys {
        writer.write_bytes(&key.encode_compressed());
    }
    writer.into_bytes()
}

fn decode_committee(bytes: &[u8]) -> Result<Vec<ECPoint>, ContractError> {
    let mut reader = BinaryReader::new(bytes);
    let count = reader.read_var_int(1024)? as usize;
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        let raw = reader.read_bytes(33)?;
        keys.push(
            ECPoint::from_bytes(&raw).map_err(|e| ContractError::InvalidArgument(e.to_string()))?,
        );
    }
    Ok(keys)
}

/// The current committee; the standby committee until the first election.
pub fn committee(
    cache: &mut DataCache,
    settings: &ProtocolSettings,
) -> Result<Vec<ECPoint>, ContractError> {
    match get_item(cache, ID, PREFIX_COMMITTEE)? {
        Some(item) => decode_committee(&item.value),
        None => Ok(settings.standby_committee.clone()),
    }
}

/// The committee's majority multi-sig address.
pub fn committee_address(
    cache: &mut DataCache,
    settings: &ProtocolSettings,
) -> Result<Hash160, ContractError> {
    let keys = committee(cache, settings)?;
    let script = multisig_redeem_script(ProtocolSettings::committee_threshold(keys.len()), &keys)?;
    Ok(Hash160::from_script(&script))
}

/// The validator subset for the next block.
pub fn next_block_validators(
    cache: &mut DataCache,
    settings: &ProtocolSettings,
) -> Result<Vec<ECPoint>, ContractError> {
    let mut keys = committee(cache, settings)?;
    keys.truncate(settings.validators_count);
    Ok(keys)
}

fn registered_candidates(
    cache: &mut DataCache,
) -> Result<Vec<(ECPoint, BigInt)>, ContractError> {
    let mut prefix = neo_store::StorageKey::prefix_for(ID);
    prefix.push(PREFIX_CANDIDATE);
    let mut candidates = Vec::new();
    for (key, item) in cache.find(&prefix)? {
        let raw = &key.suffix[1..];
        let point = ECPoint::from_bytes(raw)
            .map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
        candidates.push((point, BigInt::from_signed_bytes_le(&item.value)));
    }
    Ok(candidates)
}

fn compute_committee(
    cache: &mut DataCache,
    settings: &ProtocolSettings,
) -> Result<Vec<ECPoint>, ContractError> {
    let mut candidates = registered_candidates(cache)?;
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let size = settings.standby_committee.len().max(1);
    if candidates.len() < size {
        // Not enough registered candidates; the standby committee stands.
        return Ok(settings.standby_committee.clone());
    }
    Ok(candidates.into_iter().take(size).map(|(k, _)| k).collect())
}

// =============================================================================
// GAS ACCRUAL
// =============================================================================

fn gas_per_block_records(cache: &mut DataCache) -> Result<Vec<(u32, i64)>, ContractError> {
    let mut prefix = neo_store::StorageKey::prefix_for(ID);
    prefix.push(PREFIX_GAS_PER_BLOCK);
    let mut records = Vec::new();
    for (key, item) in cache.find(&prefix)? {
        let raw: [u8; 4] = key.suffix[1..]
            .try_into()
            .map_err(|_| ContractError::Other("bad gas-per-block key".into()))?;
        let index = u32::from_be_bytes(raw);
        let value = BigInt::from_signed_bytes_le(&item.value)
            .to_i64()
            .unwrap_or(DEFAULT_GAS_PER_BLOCK);
        records.push((index, value));
    }
    if records.is_empty() {
        records.push((0, DEFAULT_GAS_PER_BLOCK));
    }
    Ok(records)
}

/// GAS issued at `index`: the most recent record at or before it.
pub fn gas_per_block(cache: &mut DataCache, index: u32) -> Result<i64, ContractError> {
    let records = gas_per_block_records(cache)?;
    Ok(records
        .iter()
        .rev()
        .find(|(start, _)| *start <= index)
        .map(|(_, value)| *value)
        .unwrap_or(DEFAULT_GAS_PER_BLOCK))
}

/// GAS accrued by holding `balance` from `start` (exclusive of `end`).
pub fn calculate_bonus(
    cache: &mut DataCache,
    balance: &BigInt,
    start: u32,
    end: u32,
) -> Result<BigInt, ContractError> {
    if balance.is_zero() || start >= end {
        return Ok(BigInt::zero());
    }
    if balance.is_negative() {
        return Err(ContractError::InvalidAmount(balance.to_string()));
    }
    let records = gas_per_block_records(cache)?;
    let mut total = BigInt::zero();
    for height in start..end {
        let rate = records
            .iter()
            .rev()
            .find(|(at, _)| *at <= height)
            .map(|(_, value)| *value)
            .unwrap_or(DEFAULT_GAS_PER_BLOCK);
        total += BigInt::from(rate);
    }
    Ok(balance * total * HOLDER_REWARD_RATIO / 100 / TOTAL_SUPPLY)
}

fn distribute_gas(
    host: &mut HostState,
    account: &Hash160,
    state: &mut NeoAccountState,
) -> Result<(), ContractError> {
    let end = host
        .persisting_block
        .as_ref()
        .map(|b| b.header.index)
        .unwrap_or(state.balance_height);
    let bonus = calculate_bonus(&mut host.snapshot, &state.balance, state.balance_height, end)?;
    state.balance_height = end;
    if !bonus.is_zero() {
        gas_token::mint(&mut host.snapshot, account, &bonus)?;
    }
    Ok(())
}

// =============================================================================
// THE NATIVE
// =============================================================================

/// The NEO native.
pub struct NeoToken {
    methods: Vec<NativeMethod>,
}

impl NeoToken {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            NativeMethod {
                name: "symbol",
                required_flags: CallFlags::NONE,
                price: 0,
                handler: |_h, _e, _a| Ok(StackItem::byte_string(b"NEO".to_vec())),
            },
            NativeMethod {
                name: "decimals",
                required_flags: CallFlags::NONE,
                price: 0,
                handler: |_h, _e, _a| Ok(StackItem::integer(0)),
            },
            NativeMethod {
                name: "totalSupply",
                required_flags: CallFlags::NONE,
                price: 0,
                handler: |_h, _e, _a| Ok(StackItem::integer(TOTAL_SUPPLY)),
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
            NativeMethod {
                name: "vote",
                required_flags: CallFlags::STATES,
                price: 1 << 16,
                handler: vote_method,
            },
            NativeMethod {
                name: "registerCandidate",
                required_flags: CallFlags::STATES,
                price: 0,
                handler: register_candidate_method,
            },
            NativeMethod {
                name: "unregisterCandidate",
                required_flags: CallFlags::STATES,
                price: 1 << 16,
                handler: unregister_candidate_method,
            },
            NativeMethod {
                name: "getCandidates",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 22,
                handler: get_candidates_method,
            },
            NativeMethod {
                name: "getCommittee",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 16,
                handler: get_committee_method,
            },
            NativeMethod {
                name: "getNextBlockValidators",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 16,
                handler: get_next_block_validators_method,
            },
            NativeMethod {
                name: "getGasPerBlock",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: get_gas_per_block_method,
            },
            NativeMethod {
                name: "setGasPerBlock",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_gas_per_block_method,
            },
            NativeMethod {
                name: "getRegisterPrice",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _e, _a| {
                    Ok(StackItem::integer(register_price(&mut host.snapshot)))
                },
            },
            NativeMethod {
                name: "setRegisterPrice",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_register_price_method,
            },
            NativeMethod {
                name: "unclaimedGas",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 17,
                handler: unclaimed_gas_method,
            },
        ];
        Self { methods }
    }
}

impl Default for NeoToken {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for NeoToken {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "NeoToken"
    }

    fn hash(&self) -> Hash160 {
        super::native_contract_hash(self.name())
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }

    /// Refresh the committee on election boundaries.
    fn on_persist(
        &self,
        host: &mut HostState,
        _engine: &mut ExecutionEngine,
    ) -> Result<(), ContractError> {
        let Some(block) = host.persisting_block.clone() else {
            return Ok(());
        };
        let committee_size = host.settings.standby_committee.len().max(1) as u32;
        if block.header.index % committee_size == 0 {
            let settings = host.settings.clone();
            let elected = compute_committee(&mut host.snapshot, &settings)?;
            put_item(&mut host.snapshot, ID, PREFIX_COMMITTEE, encode_committee(&elected))?;
        }
        Ok(())
    }

    /// Pay the rotating committee member its block share.
    fn post_persist(
        &self,
        host: &mut HostState,
        _engine: &mut ExecutionEngine,
    ) -> Result<(), ContractError> {
        let Some(block) = host.persisting_block.clone() else {
            return Ok(());
        };
        let settings = host.settings.clone();
        let members = committee(&mut host.snapshot, &settings)?;
        if members.is_empty() {
            return Ok(());
        }
        let index = (block.header.index as usize) % members.len();
        let member = Hash160::from_script(&neo_types::contract_script::signature_redeem_script(
            &members[index],
        ));
        let per_block = gas_per_block(&mut host.snapshot, block.header.index)?;
        let reward = BigInt::from(per_block) * COMMITTEE_REWARD_RATIO / 100;
        if !reward.is_zero() {
            gas_token::mint(&mut host.snapshot, &member, &reward)?;
        }
        Ok(())
    }
}

/// Mint the whole supply to the committee address. Called once from
/// genesis persistence.
pub fn initialize(
    cache: &mut DataCache,
    settings: &ProtocolSettings,
) -> Result<(), ContractError> {
    let address = committee_address(cache, settings)?;
    let state = NeoAccountState {
        balance: BigInt::from(TOTAL_SUPPLY),
        balance_height: 0,
        vote_to: None,
    };
    put_account_state(cache, &address, &state)?;
    put_int(
        cache,
        ID,
        &gas_per_block_key(0),
        &BigInt::from(DEFAULT_GAS_PER_BLOCK),
    )?;
    Ok(())
}

fn gas_per_block_key(index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(PREFIX_GAS_PER_BLOCK);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// Candidate registration price.
pub fn register_price(cache: &mut DataCache) -> i64 {
    get_int(cache, ID, PREFIX_REGISTER_PRICE)
        .ok()
        .flatten()
        .and_then(|v| v.to_i64())
        .unwrap_or(DEFAULT_REGISTER_PRICE)
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

fn arg_pubkey(args: &mut Vec<StackItem>) -> Result<ECPoint, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing public key".into()));
    }
    let bytes = args.remove(0).to_byte_vec().map_err(ContractError::from)?;
    ECPoint::from_bytes(&bytes).map_err(|e| ContractError::InvalidArgument(e.to_string()))
}

fn balance_of_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let account = arg_hash(&mut args)?;
    let balance = account_state(&mut host.snapshot, &account)?
        .map(|s| s.balance)
        .unwrap_or_else(BigInt::zero);
    Ok(StackItem::Integer(balance))
}

fn adjust_candidate_votes(
    cache: &mut DataCache,
    candidate: &ECPoint,
    delta: &BigInt,
) -> Result<(), ContractError> {
    let suffix = candidate_suffix(candidate);
    let Some(current) = get_int(cache, ID, &suffix)? else {
        // Unregistered candidates silently lose the vote weight.
        return Ok(());
    };
    put_int(cache, ID, &suffix, &(current + delta))?;
    Ok(())
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

    let mut from_state = account_state(&mut host.snapshot, &from)?.unwrap_or_default();
    if from_state.balance < amount {
        return Ok(StackItem::Boolean(false));
    }

    // Accrued GAS is settled whenever a balance moves.
    distribute_gas(host, &from, &mut from_state)?;
    if from == to || amount.is_zero() {
        put_account_state(&mut host.snapshot, &from, &from_state)?;
        return Ok(StackItem::Boolean(true));
    }

    if let Some(vote_to) = from_state.vote_to.clone() {
        adjust_candidate_votes(&mut host.snapshot, &vote_to, &-amount.clone())?;
    }
    from_state.balance -= &amount;
    if from_state.balance.is_zero() {
        from_state.vote_to = None;
    }
    put_account_state(&mut host.snapshot, &from, &from_state)?;

    let mut to_state = account_state(&mut host.snapshot, &to)?.unwrap_or_default();
    distribute_gas(host, &to, &mut to_state)?;
    if let Some(vote_to) = to_state.vote_to.clone() {
        adjust_candidate_votes(&mut host.snapshot, &vote_to, &amount)?;
    }
    to_state.balance += &amount;
    put_account_state(&mut host.snapshot, &to, &to_state)?;
    Ok(StackItem::Boolean(true))
}

fn vote_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let account = arg_hash(&mut args)?;
    let target = if args.is_empty() || args[0].is_null() {
        None
    } else {
        Some(arg_pubkey(&mut args)?)
    };
    if !check_witness_hash(host, engine, &account)? {
        return Ok(StackItem::Boolean(false));
    }
    let Some(mut state) = account_state(&mut host.snapshot, &account)? else {
        return Ok(StackItem::Boolean(false));
    };
    if let Some(candidate) = &target {
        if get_int(&mut host.snapshot, ID, &candidate_suffix(candidate))?.is_none() {
            return Ok(StackItem::Boolean(false));
        }
    }
    if let Some(previous) = state.vote_to.clone() {
        adjust_candidate_votes(&mut host.snapshot, &previous, &-state.balance.clone())?;
    }
    if let Some(candidate) = &target {
        adjust_candidate_votes(&mut host.snapshot, candidate, &state.balance.clone())?;
    }
    state.vote_to = target;
    put_account_state(&mut host.snapshot, &account, &state)?;
    Ok(StackItem::Boolean(true))
}

fn register_candidate_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let key = arg_pubkey(&mut args)?;
    let account = Hash160::from_script(&neo_types::contract_script::signature_redeem_script(&key));
    if !check_witness_hash(host, engine, &account)? {
        return Ok(StackItem::Boolean(false));
    }
    engine.charge_raw(register_price(&mut host.snapshot))?;
    let suffix = candidate_suffix(&key);
    if get_int(&mut host.snapshot, ID, &suffix)?.is_none() {
        put_int(&mut host.snapshot, ID, &suffix, &BigInt::zero())?;
    }
    Ok(StackItem::Boolean(true))
}

fn unregister_candidate_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let key = arg_pubkey(&mut args)?;
    let account = Hash160::from_script(&neo_types::contract_script::signature_redeem_script(&key));
    if !check_witness_hash(host, engine, &account)? {
        return Ok(StackItem::Boolean(false));
    }
    delete_item(&mut host.snapshot, ID, &candidate_suffix(&key))?;
    Ok(StackItem::Boolean(true))
}

fn get_candidates_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    _args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let candidates = registered_candidates(&mut host.snapshot)?;
    let items = candidates
        .into_iter()
        .map(|(key, votes)| {
            StackItem::structure(vec![
                StackItem::byte_string(key.encode_compressed().to_vec()),
                StackItem::Integer(votes),
            ])
        })
        .collect();
    Ok(StackItem::array(items))
}

fn keys_to_array(keys: Vec<ECPoint>) -> StackItem {
    StackItem::array(
        keys.into_iter()
            .map(|key| StackItem::byte_string(key.encode_compressed().to_vec()))
            .collect(),
    )
}

fn get_committee_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    _args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let settings = host.settings.clone();
    Ok(keys_to_array(committee(&mut host.snapshot, &settings)?))
}

fn get_next_block_validators_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    _args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let settings = host.settings.clone();
    Ok(keys_to_array(next_block_validators(
        &mut host.snapshot,
        &settings,
    )?))
}

fn get_gas_per_block_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    _args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let index = host
        .persisting_block
        .as_ref()
        .map(|b| b.header.index)
        .unwrap_or(u32::MAX);
    Ok(StackItem::integer(gas_per_block(&mut host.snapshot, index)?))
}

fn set_gas_per_block_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing amount".into()));
    }
    let value = args.remove(0).to_integer().map_err(ContractError::from)?;
    let value = value
        .to_i64()
        .filter(|v| (0..=10 * 100_000_000).contains(v))
        .ok_or_else(|| ContractError::InvalidAmount("gas per block".into()))?;
    if !check_committee(host, engine)? {
        return Err(ContractError::CheckWitnessFailed);
    }
    let next = host
        .persisting_block
        .as_ref()
        .map(|b| b.header.index + 1)
        .unwrap_or(0);
    put_int(&mut host.snapshot, ID, &gas_per_block_key(next), &BigInt::from(value))?;
    Ok(StackItem::Null)
}

fn set_register_price_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing amount".into()));
    }
    let value = args.remove(0).to_integer().map_err(ContractError::from)?;
    let value = value
        .to_i64()
        .filter(|v| *v > 0)
        .ok_or_else(|| ContractError::InvalidAmount("register price".into()))?;
    if !check_committee(host, engine)? {
        return Err(ContractError::CheckWitnessFailed);
    }
    put_int(&mut host.snapshot, ID, PREFIX_REGISTER_PRICE, &BigInt::from(value))?;
    Ok(StackItem::Null)
}

fn unclaimed_gas_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let account = arg_hash(&mut args)?;
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing end height".into()));
    }
    let end = args.remove(0).to_integer().map_err(ContractError::from)?;
    let end = end
        .to_u32()
        .ok_or_else(|| ContractError::InvalidArgument("end height".into()))?;
    let bonus = match account_state(&mut host.snapshot, &account)? {
        Some(state) => calculate_bonus(
            &mut host.snapshot,
            &state.balance,
            state.balance_height,
            end,
        )?,
        None => BigInt::zero(),
    };
    Ok(StackItem::Integer(bonus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_crypto::KeyPair;
    use neo_store::MemoryStore;
    use std::sync::Arc;

    fn settings(count: usize) -> ProtocolSettings {
        ProtocolSettings {
            standby_committee: (0..count)
                .map(|_| KeyPair::generate().public_key().clone())
                .collect(),
            validators_count: count,
            ..ProtocolSettings::default()
        }
    }

    #[test]
    fn test_initialize_mints_whole_supply() {
        let mut cache = DataCache::new(Arc::new(MemoryStore::new()));
        let settings = settings(4);
        initialize(&mut cache, &settings).unwrap();
        let address = committee_address(&mut cache, &settings).unwrap();
        let state = account_state(&mut cache, &address).unwrap().unwrap();
        assert_eq!(state.balance, BigInt::from(TOTAL_SUPPLY));
    }

    #[test]
    fn test_account_state_round_trip() {
        let key = KeyPair::generate().public_key().clone();
        let state = NeoAccountState {
            balance: BigInt::from(1234),
            balance_height: 77,
            vote_to: Some(key),
        };
        let restored = NeoAccountState::from_bytes(&state.to_bytes()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_holder_bonus_formula() {
        let mut cache = DataCache::new(Arc::new(MemoryStore::new()));
        // Whole supply held for 100 blocks collects the full holder share.
        let bonus = calculate_bonus(&mut cache, &BigInt::from(TOTAL_SUPPLY), 0, 100).unwrap();
        let expected = BigInt::from(DEFAULT_GAS_PER_BLOCK) * 100 * HOLDER_REWARD_RATIO / 100;
        assert_eq!(bonus, expected);
        // Zero balance accrues nothing.
        assert_eq!(
            calculate_bonus(&mut cache, &BigInt::zero(), 0, 100).unwrap(),
            BigInt::zero()
        );
    }

    #[test]
    fn test_committee_falls_back_to_standby() {
        let mut cache = DataCache::new(Arc::new(MemoryStore::new()));
        let settings = settings(3);
        let committee = committee(&mut cache, &settings).unwrap();
        assert_eq!(committee.len(), 3);
    }
}
