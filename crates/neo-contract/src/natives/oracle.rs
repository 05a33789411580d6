//! OracleContract: the oracle-request registry.
//!
//! `request` stores a pending entry and escrows the response gas;
//! `finish` runs inside the oracle response transaction, looks the
//! request up through the `OracleResponse` attribute and dispatches the
//! declared callback.

use super::{delete_item, get_int, get_item, put_int, put_item, NativeContract, NativeMethod};
use crate::call_flags::CallFlags;
use crate::engine::{call_contract, HostState};
use crate::error::ContractError;
use crate::natives::check_committee;
use neo_store::DataCache;
use neo_types::attribute::TransactionAttribute;
use neo_types::io::{BinaryReader, BinaryWriter};
use neo_types::{Hash160, Hash256};
use neo_vm::{ExecutionEngine, StackItem};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

/// Contract id.
pub const ID: i32 = -9;

const PREFIX_PRICE: &[u8] = &[0x05];
const PREFIX_REQUEST_ID: &[u8] = &[0x09];
const PREFIX_REQUEST: u8 = 0x07;

/// Default per-request price (0.5 GAS).
pub const DEFAULT_PRICE: i64 = 50_000_000;

/// Maximum URL length accepted.
pub const MAX_URL_LENGTH: usize = 256;

/// Maximum filter expression length.
pub const MAX_FILTER_LENGTH: usize = 128;

/// Maximum callback method name length.
pub const MAX_CALLBACK_LENGTH: usize = 32;

/// One pending oracle request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleRequest {
    /// The transaction that created the request.
    pub original_tx: Hash256,
    /// Gas escrowed for executing the response callback.
    pub gas_for_response: i64,
    /// Requested URL.
    pub url: String,
    /// JSONPath filter applied to the response.
    pub filter: String,
    /// Contract receiving the callback.
    pub callback_contract: Hash160,
    /// Method receiving the callback.
    pub callback_method: String,
    /// Caller-supplied state echoed into the callback.
    pub user_data: Vec<u8>,
}

impl OracleRequest {
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_bytes(self.original_tx.as_bytes());
        writer.write_i64(self.gas_for_response);
        writer.write_var_string(&self.url);
        writer.write_var_string(&self.filter);
        writer.write_bytes(self.callback_contract.as_bytes());
        writer.write_var_string(&self.callback_method);
        writer.write_var_bytes(&self.user_data);
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ContractError> {
        let mut reader = BinaryReader::new(bytes);
        Ok(Self {
            original_tx: Hash256(reader.read_array::<32>()?),
            gas_for_response: reader.read_i64()?,
            url: reader.read_var_string(MAX_URL_LENGTH)?,
            filter: reader.read_var_string(MAX_FILTER_LENGTH)?,
            callback_contract: Hash160(reader.read_array::<20>()?),
            callback_method: reader.read_var_string(MAX_CALLBACK_LENGTH)?,
            user_data: reader.read_var_bytes(u16::MAX as usize)?,
        })
    }
}

fn request_suffix(id: u64) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(9);
    suffix.push(PREFIX_REQUEST);
    suffix.extend_from_slice(&id.to_be_bytes());
    suffix
}

/// Current oracle request price.
pub fn price(cache: &mut DataCache) -> i64 {
    get_int(cache, ID, PREFIX_PRICE)
        .ok()
        .flatten()
        .and_then(|v| v.to_i64())
        .unwrap_or(DEFAULT_PRICE)
}

/// Read a pending request.
pub fn get_request(
    cache: &mut DataCache,
    id: u64,
) -> Result<Option<OracleRequest>, ContractError> {
    match get_item(cache, ID, &request_suffix(id))? {
        Some(item) => Ok(Some(OracleRequest::from_bytes(&item.value)?)),
        None => Ok(None),
    }
}

/// The oracle native.
pub struct OracleContract {
    methods: Vec<NativeMethod>,
}

impl OracleContract {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            NativeMethod {
                name: "getPrice",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: |host, _e, _a| Ok(StackItem::integer(price(&mut host.snapshot))),
            },
            NativeMethod {
                name: "setPrice",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: set_price_method,
            },
            NativeMethod {
                name: "request",
                required_flags: CallFlags::STATES,
                price: 0,
                handler: request_method,
            },
            NativeMethod {
                name: "finish",
                required_flags: CallFlags::ALL,
                price: 0,
                handler: finish_method,
            },
        ];
        Self { methods }
    }
}

impl Default for OracleContract {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for OracleContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "OracleContract"
    }

    fn hash(&self) -> Hash160 {
        super::native_contract_hash(self.name())
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

fn set_price_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing price".into()));
    }
    let value = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_i64()
        .filter(|v| *v > 0)
        .ok_or_else(|| ContractError::InvalidAmount("oracle price".into()))?;
    if !check_committee(host, engine)? {
        return Err(ContractError::CheckWitnessFailed);
    }
    put_int(&mut host.snapshot, ID, PREFIX_PRICE, &BigInt::from(value))?;
    Ok(StackItem::Null)
}

fn request_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    if args.len() < 5 {
        return Err(ContractError::InvalidArgument(
            "request(url, filter, callback, userData, gasForResponse)".into(),
        ));
    }
    let url = String::from_utf8(args.remove(0).to_byte_vec().map_err(ContractError::from)?)
        .map_err(|_| ContractError::InvalidArgument("url must be UTF-8".into()))?;
    let filter_item = args.remove(0);
    let filter = if filter_item.is_null() {
        String::new()
    } else {
        String::from_utf8(filter_item.to_byte_vec().map_err(ContractError::from)?)
            .map_err(|_| ContractError::InvalidArgument("filter must be UTF-8".into()))?
    };
    let callback_method =
        String::from_utf8(args.remove(0).to_byte_vec().map_err(ContractError::from)?)
            .map_err(|_| ContractError::InvalidArgument("callback must be UTF-8".into()))?;
    let user_data = crate::item_serializer::serialize_item(&args.remove(0))?;
    let gas_for_response = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_i64()
        .filter(|v| *v >= 10_000_000)
        .ok_or_else(|| ContractError::InvalidAmount("gas for response".into()))?;

    if url.len() > MAX_URL_LENGTH
        || filter.len() > MAX_FILTER_LENGTH
        || callback_method.len() > MAX_CALLBACK_LENGTH
        || callback_method.starts_with('_')
    {
        return Err(ContractError::InvalidArgument("request field too long".into()));
    }

    engine.charge_raw(price(&mut host.snapshot).saturating_add(gas_for_response))?;

    let callback_contract = host
        .calling_hash(engine.invocation_depth())?
        .unwrap_or(host.executing_hash(engine.invocation_depth())?);
    let original_tx = host
        .tx
        .as_ref()
        .map(|tx| tx.hash())
        .ok_or_else(|| ContractError::Other("oracle request outside a transaction".into()))?;

    let id = get_int(&mut host.snapshot, ID, PREFIX_REQUEST_ID)?
        .and_then(|v| v.to_u64())
        .unwrap_or(0);
    put_int(&mut host.snapshot, ID, PREFIX_REQUEST_ID, &BigInt::from(id + 1))?;

    let request = OracleRequest {
        original_tx,
        gas_for_response,
        url,
        filter,
        callback_contract,
        callback_method,
        user_data,
    };
    put_item(&mut host.snapshot, ID, &request_suffix(id), request.to_bytes())?;
    Ok(StackItem::integer(id as i64))
}

fn finish_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    _args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let tx = host
        .tx
        .clone()
        .ok_or_else(|| ContractError::Other("finish outside a transaction".into()))?;
    let response = tx
        .attributes
        .iter()
        .find_map(|attr| match attr {
            TransactionAttribute::OracleResponse { id, code, result } => {
                Some((*id, *code, result.clone()))
            }
            _ => None,
        })
        .ok_or_else(|| {
            ContractError::InvalidArgument("transaction carries no oracle response".into())
        })?;
    let (id, code, result) = response;

    let request = get_request(&mut host.snapshot, id)?
        .ok_or_else(|| ContractError::InvalidArgument(format!("unknown oracle request {id}")))?;
    delete_item(&mut host.snapshot, ID, &request_suffix(id))?;

    let user_data = crate::item_serializer::deserialize_item(&request.user_data)?;
    let args = vec![
        StackItem::byte_string(request.url.into_bytes()),
        user_data,
        StackItem::integer(i64::from(code)),
        StackItem::byte_string(result),
    ];
    call_contract(
        host,
        engine,
        request.callback_contract,
        &request.callback_method,
        args,
        CallFlags::ALL,
    )?;
    Ok(StackItem::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let request = OracleRequest {
            original_tx: Hash256([1u8; 32]),
            gas_for_response: 10_000_000,
            url: "https://example.com/price".into(),
            filter: "$.rate".into(),
            callback_contract: Hash160([2u8; 20]),
            callback_method: "onOracle".into(),
            user_data: vec![0x00],
        };
        let restored = OracleRequest::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(restored, request);
    }
}
