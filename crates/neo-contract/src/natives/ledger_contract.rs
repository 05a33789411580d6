//! LedgerContract: read-only view over the chain indices.
//!
//! The ledger pipeline writes the cells (contract id 0: current index,
//! index-to-hash, transaction metadata, block bytes); this native only
//! exposes them to scripts.

use super::{NativeContract, NativeMethod};
use crate::call_flags::CallFlags;
use crate::error::ContractError;
use neo_store::DataCache;
use neo_types::io::Serializable;
use neo_types::{Block, Hash160, Hash256, Transaction};
use neo_vm::StackItem;
use num_traits::ToPrimitive;

/// Contract id of the ledger native.
pub const ID: i32 = -4;

/// Contract id owning the raw ledger cells.
pub const LEDGER_META_ID: i32 = 0;

/// Sub-key of the current block index.
pub const KEY_CURRENT_INDEX: &[u8] = &[0x00];
/// Sub-key prefix for index -> block hash.
pub const KEY_INDEX_TO_HASH: u8 = 0x01;
/// Sub-key prefix for transaction metadata.
pub const KEY_TRANSACTION: u8 = 0x02;
/// Sub-key prefix for block bytes by hash.
pub const KEY_BLOCK: u8 = 0x05;
/// Sub-key of the state root.
pub const KEY_STATE_ROOT: &[u8] = &[0x0C];

// =============================================================================
// RAW CELL ACCESS (shared with the ledger pipeline)
// =============================================================================

fn meta_key(suffix: Vec<u8>) -> neo_store::StorageKey {
    neo_store::StorageKey::new(LEDGER_META_ID, suffix)
}

/// Current block height, if any block has been persisted.
pub fn current_index(cache: &mut DataCache) -> Result<Option<u32>, ContractError> {
    Ok(cache
        .get(&meta_key(KEY_CURRENT_INDEX.to_vec()))?
        .map(|item| {
            let bytes: [u8; 4] = item.value.as_slice().try_into().unwrap_or([0; 4]);
            u32::from_le_bytes(bytes)
        }))
}

/// Hash of the block at `index`.
pub fn block_hash_at(cache: &mut DataCache, index: u32) -> Result<Option<Hash256>, ContractError> {
    let mut suffix = vec![KEY_INDEX_TO_HASH];
    suffix.extend_from_slice(&index.to_le_bytes());
    Ok(cache.get(&meta_key(suffix))?.and_then(|item| {
        let bytes: [u8; 32] = item.value.as_slice().try_into().ok()?;
        Some(Hash256(bytes))
    }))
}

/// Full block by hash.
pub fn block_by_hash(cache: &mut DataCache, hash: &Hash256) -> Result<Option<Block>, ContractError> {
    let mut suffix = vec![KEY_BLOCK];
    suffix.extend_from_slice(hash.as_bytes());
    match cache.get(&meta_key(suffix))? {
        Some(item) => Ok(Some(Block::from_bytes(&item.value)?)),
        None => Ok(None),
    }
}

/// The height a transaction was included at, if any.
pub fn transaction_height(
    cache: &mut DataCache,
    hash: &Hash256,
) -> Result<Option<u32>, ContractError> {
    let mut suffix = vec![KEY_TRANSACTION];
    suffix.extend_from_slice(hash.as_bytes());
    Ok(cache.get(&meta_key(suffix))?.map(|item| {
        let bytes: [u8; 4] = item.value[..4].try_into().unwrap_or([0; 4]);
        u32::from_le_bytes(bytes)
    }))
}

/// A transaction by hash, reading through the block it landed in.
pub fn transaction_by_hash(
    cache: &mut DataCache,
    hash: &Hash256,
) -> Result<Option<Transaction>, ContractError> {
    let Some(height) = transaction_height(cache, hash)? else {
        return Ok(None);
    };
    let Some(block_hash) = block_hash_at(cache, height)? else {
        return Ok(None);
    };
    let Some(block) = block_by_hash(cache, &block_hash)? else {
        return Ok(None);
    };
    Ok(block.transactions.into_iter().find(|tx| tx.hash() == *hash))
}

// =============================================================================
// THE NATIVE
// =============================================================================

/// The ledger native.
pub struct LedgerContract {
    methods: Vec<NativeMethod>,
}

impl LedgerContract {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            NativeMethod {
                name: "currentIndex",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _e, _a| {
                    let index = current_index(&mut host.snapshot)?
                        .ok_or_else(|| ContractError::Other("no blocks persisted".into()))?;
                    Ok(StackItem::integer(i64::from(index)))
                },
            },
            NativeMethod {
                name: "currentHash",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _e, _a| {
                    let index = current_index(&mut host.snapshot)?
                        .ok_or_else(|| ContractError::Other("no blocks persisted".into()))?;
                    let hash = block_hash_at(&mut host.snapshot, index)?
                        .ok_or_else(|| ContractError::Other("missing tip hash".into()))?;
                    Ok(StackItem::byte_string(hash.as_bytes().to_vec()))
                },
            },
            NativeMethod {
                name: "getBlock",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 16,
                handler: get_block_method,
            },
            NativeMethod {
                name: "getTransaction",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 16,
                handler: get_transaction_method,
            },
            NativeMethod {
                name: "getTransactionHeight",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: get_transaction_height_method,
            },
        ];
        Self { methods }
    }
}

impl Default for LedgerContract {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for LedgerContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "LedgerContract"
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

fn block_to_item(block: &Block) -> StackItem {
    StackItem::array(vec![
        StackItem::byte_string(block.hash().as_bytes().to_vec()),
        StackItem::integer(i64::from(block.header.version)),
        StackItem::byte_string(block.header.prev_hash.as_bytes().to_vec()),
        StackItem::byte_string(block.header.merkle_root.as_bytes().to_vec()),
        StackItem::integer(block.header.timestamp_ms as i64),
        StackItem::integer(block.header.nonce as i64),
        StackItem::integer(i64::from(block.header.index)),
        StackItem::integer(i64::from(block.header.primary_index)),
        StackItem::byte_string(block.header.next_consensus.as_bytes().to_vec()),
        StackItem::integer(block.transactions.len() as i64),
    ])
}

fn tx_to_item(tx: &Transaction) -> StackItem {
    let sender = tx.sender().map(|s| s.account).unwrap_or_default();
    StackItem::array(vec![
        StackItem::byte_string(tx.hash().as_bytes().to_vec()),
        StackItem::integer(i64::from(tx.version)),
        StackItem::integer(i64::from(tx.nonce)),
        StackItem::byte_string(sender.as_bytes().to_vec()),
        StackItem::integer(tx.system_fee),
        StackItem::integer(tx.network_fee),
        StackItem::integer(i64::from(tx.valid_until_block)),
        StackItem::byte_string(tx.script.clone()),
    ])
}

fn resolve_block_argument(
    host: &mut crate::engine::HostState,
    argument: &StackItem,
) -> Result<Option<Block>, ContractError> {
    let bytes = argument.to_byte_vec().map_err(ContractError::from)?;
    let hash = if bytes.len() == 32 {
        Hash256(bytes.try_into().expect("len 32"))
    } else {
        let index = argument
            .to_integer()
            .map_err(ContractError::from)?
            .to_u32()
            .ok_or_else(|| ContractError::InvalidArgument("block index".into()))?;
        match block_hash_at(&mut host.snapshot, index)? {
            Some(hash) => hash,
            None => return Ok(None),
        }
    };
    block_by_hash(&mut host.snapshot, &hash)
}

fn get_block_method(
    host: &mut crate::engine::HostState,
    _engine: &mut neo_vm::ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing block id".into()));
    }
    let argument = args.remove(0);
    match resolve_block_argument(host, &argument)? {
        Some(block) => Ok(block_to_item(&block)),
        None => Ok(StackItem::Null),
    }
}

fn arg_tx_hash(args: &mut Vec<StackItem>) -> Result<Hash256, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing hash".into()));
    }
    let bytes = args.remove(0).to_byte_vec().map_err(ContractError::from)?;
    Ok(Hash256(bytes.try_into().map_err(|_| {
        ContractError::InvalidArgument("expected a 32-byte hash".into())
    })?))
}

fn get_transaction_method(
    host: &mut crate::engine::HostState,
    _engine: &mut neo_vm::ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let hash = arg_tx_hash(&mut args)?;
    match transaction_by_hash(&mut host.snapshot, &hash)? {
        Some(tx) => Ok(tx_to_item(&tx)),
        None => Ok(StackItem::Null),
    }
}

fn get_transaction_height_method(
    host: &mut crate::engine::HostState,
    _engine: &mut neo_vm::ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let hash = arg_tx_hash(&mut args)?;
    match transaction_height(&mut host.snapshot, &hash)? {
        Some(height) => Ok(StackItem::integer(i64::from(height))),
        None => Ok(StackItem::integer(-1)),
    }
}
