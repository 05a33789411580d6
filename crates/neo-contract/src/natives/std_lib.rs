//! StdLib: pure utility methods.
//!
//! Encoding (Base58 / Base64 / hex-free itoa-atoi), stack-item binary and
//! JSON interchange, memory comparison and search, and UTF-8 string
//! length. Nothing here touches state.

use super::{NativeContract, NativeMethod};
use crate::call_flags::CallFlags;
use crate::error::ContractError;
use crate::item_serializer;
use base64::Engine as _;
use neo_types::Hash160;
use neo_vm::{ExecutionEngine, StackItem};
use num_bigint::BigInt;
use num_traits::Num;

/// Contract id.
pub const ID: i32 = -2;

/// Longest input the memory / string methods accept.
pub const MAX_INPUT_LENGTH: usize = 1024 * 1024;

/// The StdLib native.
pub struct StdLib {
    methods: Vec<NativeMethod>,
}

macro_rules! method {
    ($name:literal, $price:expr, $handler:expr) => {
        NativeMethod {
            name: $name,
            required_flags: CallFlags::NONE,
            price: $price,
            handler: $handler,
        }
    };
}

impl StdLib {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            method!("serialize", 1 << 12, serialize_method),
            method!("deserialize", 1 << 14, deserialize_method),
            method!("jsonSerialize", 1 << 12, json_serialize_method),
            method!("jsonDeserialize", 1 << 14, json_deserialize_method),
            method!("itoa", 1 << 12, itoa_method),
            method!("atoi", 1 << 6, atoi_method),
            method!("base64Encode", 1 << 5, base64_encode_method),
            method!("base64Decode", 1 << 5, base64_decode_method),
            method!("base64UrlEncode", 1 << 5, base64_url_encode_method),
            method!("base64UrlDecode", 1 << 5, base64_url_decode_method),
            method!("base58Encode", 1 << 13, base58_encode_method),
            method!("base58Decode", 1 << 10, base58_decode_method),
            method!("base58CheckEncode", 1 << 16, base58_check_encode_method),
            method!("base58CheckDecode", 1 << 16, base58_check_decode_method),
            method!("memoryCompare", 1 << 5, memory_compare_method),
            method!("memorySearch", 1 << 6, memory_search_method),
            method!("stringSplit", 1 << 8, string_split_method),
            method!("strLen", 1 << 8, str_len_method),
        ];
        Self { methods }
    }
}

impl Default for StdLib {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for StdLib {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "StdLib"
    }

    fn hash(&self) -> Hash160 {
        super::native_contract_hash(self.name())
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }
}

// =============================================================================
// ARGUMENT HELPERS
// =============================================================================

type Host<'a> = &'a mut crate::engine::HostState;

fn arg(args: &mut Vec<StackItem>, what: &str) -> Result<StackItem, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument(format!("missing {what}")));
    }
    Ok(args.remove(0))
}

fn arg_bytes(args: &mut Vec<StackItem>, what: &str) -> Result<Vec<u8>, ContractError> {
    let bytes = arg(args, what)?.to_byte_vec().map_err(ContractError::from)?;
    if bytes.len() > MAX_INPUT_LENGTH {
        return Err(ContractError::InvalidArgument(format!("{what} too long")));
    }
    Ok(bytes)
}

fn arg_string(args: &mut Vec<StackItem>, what: &str) -> Result<String, ContractError> {
    String::from_utf8(arg_bytes(args, what)?)
        .map_err(|_| ContractError::InvalidArgument(format!("{what} must be UTF-8")))
}

fn arg_base(args: &mut Vec<StackItem>) -> Result<u32, ContractError> {
    if args.is_empty() {
        return Ok(10);
    }
    let base: i64 = arg(args, "base")?
        .to_integer()
        .map_err(ContractError::from)?
        .try_into()
        .map_err(|_| ContractError::InvalidArgument("base out of range".into()))?;
    match base {
        10 => Ok(10),
        16 => Ok(16),
        _ => Err(ContractError::InvalidArgument("base must be 10 or 16".into())),
    }
}

// =============================================================================
// SERIALIZATION
// =============================================================================

fn serialize_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let item = arg(&mut args, "item")?;
    Ok(StackItem::byte_string(item_serializer::serialize_item(
        &item,
    )?))
}

fn deserialize_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let bytes = arg_bytes(&mut args, "data")?;
    Ok(item_serializer::deserialize_item(&bytes)?)
}

fn item_to_json(item: &StackItem) -> Result<serde_json::Value, ContractError> {
    Ok(match item {
        StackItem::Null => serde_json::Value::Null,
        StackItem::Boolean(value) => serde_json::Value::Bool(*value),
        StackItem::Integer(value) => {
            let number: i64 = value.try_into().map_err(|_| {
                ContractError::InvalidArgument("integer too large for JSON".into())
            })?;
            serde_json::Value::from(number)
        }
        StackItem::ByteString(_) | StackItem::Buffer(_) => {
            let bytes = item.to_byte_vec().map_err(ContractError::from)?;
            let text = String::from_utf8(bytes)
                .map_err(|_| ContractError::InvalidArgument("string must be UTF-8".into()))?;
            serde_json::Value::String(text)
        }
        StackItem::Array(items) | StackItem::Struct(items) => {
            let mut array = Vec::new();
            for element in items.borrow().iter() {
                array.push(item_to_json(element)?);
            }
            serde_json::Value::Array(array)
        }
        StackItem::Map(entries) => {
            let mut object = serde_json::Map::new();
            for (key, value) in entries.borrow().iter() {
                let key_bytes = key.to_byte_vec().map_err(ContractError::from)?;
                let key_text = String::from_utf8(key_bytes)
                    .map_err(|_| ContractError::InvalidArgument("map key must be UTF-8".into()))?;
                object.insert(key_text, item_to_json(value)?);
            }
            serde_json::Value::Object(object)
        }
        other => {
            return Err(ContractError::InvalidArgument(format!(
                "{} has no JSON form",
                other.type_name()
            )))
        }
    })
}

fn json_to_item(value: &serde_json::Value) -> Result<StackItem, ContractError> {
    Ok(match value {
        serde_json::Value::Null => StackItem::Null,
        serde_json::Value::Bool(flag) => StackItem::Boolean(*flag),
        serde_json::Value::Number(number) => {
            let value = number
                .as_i64()
                .ok_or_else(|| ContractError::InvalidArgument("non-integral number".into()))?;
            StackItem::integer(value)
        }
        serde_json::Value::String(text) => StackItem::byte_string(text.clone().into_bytes()),
        serde_json::Value::Array(items) => {
            let mut array = Vec::new();
            for element in items {
                array.push(json_to_item(element)?);
            }
            StackItem::array(array)
        }
        serde_json::Value::Object(object) => {
            let map = StackItem::map();
            if let StackItem::Map(entries) = &map {
                for (key, value) in object {
                    entries.borrow_mut().push((
                        StackItem::byte_string(key.clone().into_bytes()),
                        json_to_item(value)?,
                    ));
                }
            }
            map
        }
    })
}

fn json_serialize_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let item = arg(&mut args, "item")?;
    let json = item_to_json(&item)?;
    Ok(StackItem::byte_string(json.to_string().into_bytes()))
}

fn json_deserialize_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let text = arg_string(&mut args, "json")?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| ContractError::InvalidArgument(format!("bad JSON: {e}")))?;
    json_to_item(&value)
}

// =============================================================================
// NUMBERS & ENCODINGS
// =============================================================================

fn itoa_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let value = arg(&mut args, "value")?
        .to_integer()
        .map_err(ContractError::from)?;
    let base = arg_base(&mut args)?;
    let text = match base {
        10 => value.to_str_radix(10),
        _ => value.to_str_radix(16),
    };
    Ok(StackItem::byte_string(text.into_bytes()))
}

fn atoi_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let text = arg_string(&mut args, "value")?;
    let base = arg_base(&mut args)?;
    let value = BigInt::from_str_radix(&text, base)
        .map_err(|_| ContractError::InvalidArgument(format!("not a base-{base} number")))?;
    Ok(StackItem::Integer(value))
}

fn base64_encode_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let bytes = arg_bytes(&mut args, "data")?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(StackItem::byte_string(encoded.into_bytes()))
}

fn base64_decode_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let text = arg_string(&mut args, "data")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| ContractError::InvalidArgument(format!("bad base64: {e}")))?;
    Ok(StackItem::byte_string(decoded))
}

fn base64_url_encode_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let bytes = arg_bytes(&mut args, "data")?;
    let encoded = base64::engine::general_purpose::URL_SAFE.encode(bytes);
    Ok(StackItem::byte_string(encoded.into_bytes()))
}

fn base64_url_decode_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let text = arg_string(&mut args, "data")?;
    let decoded = base64::engine::general_purpose::URL_SAFE
        .decode(text)
        .map_err(|e| ContractError::InvalidArgument(format!("bad base64url: {e}")))?;
    Ok(StackItem::byte_string(decoded))
}

fn base58_encode_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let bytes = arg_bytes(&mut args, "data")?;
    Ok(StackItem::byte_string(
        neo_crypto::base58::encode(&bytes).into_bytes(),
    ))
}

fn base58_decode_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let text = arg_string(&mut args, "data")?;
    let decoded = neo_crypto::base58::decode(&text)
        .map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
    Ok(StackItem::byte_string(decoded))
}

fn base58_check_encode_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let bytes = arg_bytes(&mut args, "data")?;
    Ok(StackItem::byte_string(
        neo_crypto::base58::encode_check(&bytes).into_bytes(),
    ))
}

fn base58_check_decode_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let text = arg_string(&mut args, "data")?;
    let decoded = neo_crypto::base58::decode_check(&text)
        .map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
    Ok(StackItem::byte_string(decoded))
}

// =============================================================================
// MEMORY & STRINGS
// =============================================================================

fn memory_compare_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let a = arg_bytes(&mut args, "first")?;
    let b = arg_bytes(&mut args, "second")?;
    let ordering = a.cmp(&b) as i64;
    Ok(StackItem::integer(ordering.signum()))
}

fn memory_search_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let haystack = arg_bytes(&mut args, "memory")?;
    let needle = arg_bytes(&mut args, "value")?;
    let start = if args.is_empty() {
        0
    } else {
        arg(&mut args, "start")?
            .to_index()
            .map_err(ContractError::from)?
    };
    let backward = if args.is_empty() {
        false
    } else {
        arg(&mut args, "backward")?.to_boolean()
    };

    if needle.is_empty() || start > haystack.len() {
        return Ok(StackItem::integer(-1));
    }
    let position = if backward {
        haystack[..start.min(haystack.len())]
            .windows(needle.len())
            .rposition(|window| window == needle.as_slice())
    } else {
        haystack[start..]
            .windows(needle.len())
            .position(|window| window == needle.as_slice())
            .map(|p| p + start)
    };
    Ok(StackItem::integer(
        position.map(|p| p as i64).unwrap_or(-1),
    ))
}

fn string_split_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let text = arg_string(&mut args, "string")?;
    let separator = arg_string(&mut args, "separator")?;
    if separator.is_empty() {
        return Err(ContractError::InvalidArgument("empty separator".into()));
    }
    let parts = text
        .split(&separator)
        .map(|part| StackItem::byte_string(part.as_bytes().to_vec()))
        .collect();
    Ok(StackItem::array(parts))
}

fn str_len_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let text = arg_string(&mut args, "string")?;
    Ok(StackItem::integer(text.chars().count() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(
        handler: super::super::NativeHandler,
        args: Vec<StackItem>,
    ) -> Result<StackItem, ContractError> {
        use crate::natives::NativeRegistry;
        use crate::trigger::TriggerType;
        use neo_store::{DataCache, MemoryStore};
        use std::sync::Arc;

        let mut host = crate::engine::HostState {
            trigger: TriggerType::Application,
            snapshot: DataCache::new(Arc::new(MemoryStore::new())),
            settings: Arc::new(neo_types::ProtocolSettings::default()),
            tx: None,
            container_hash: None,
            persisting_block: None,
            notifications: Vec::new(),
            logs: Vec::new(),
            natives: Arc::new(NativeRegistry::new()),
            frames: Vec::new(),
            invocation_counters: Default::default(),
            random_counter: 0,
        };
        let mut engine = neo_vm::ExecutionEngine::new(i64::MAX);
        handler(&mut host, &mut engine, args)
    }

    fn text(item: &StackItem) -> String {
        String::from_utf8(item.to_byte_vec().unwrap()).unwrap()
    }

    #[test]
    fn test_itoa_atoi() {
        let out = call(itoa_method, vec![StackItem::integer(-255)]).unwrap();
        assert_eq!(text(&out), "-255");
        let out = call(
            itoa_method,
            vec![StackItem::integer(255), StackItem::integer(16)],
        )
        .unwrap();
        assert_eq!(text(&out), "ff");

        let back = call(
            atoi_method,
            vec![StackItem::byte_string(b"ff".to_vec()), StackItem::integer(16)],
        )
        .unwrap();
        assert_eq!(back.to_integer().unwrap(), 255.into());
        assert!(call(atoi_method, vec![StackItem::byte_string(b"xyz".to_vec())]).is_err());
    }

    #[test]
    fn test_base64_round_trip() {
        let out = call(
            base64_encode_method,
            vec![StackItem::byte_string(b"hello".to_vec())],
        )
        .unwrap();
        assert_eq!(text(&out), "aGVsbG8=");
        let back = call(base64_decode_method, vec![out]).unwrap();
        assert_eq!(back.to_byte_vec().unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_memory_search() {
        let haystack = StackItem::byte_string(b"abcabc".to_vec());
        let out = call(
            memory_search_method,
            vec![haystack.clone(), StackItem::byte_string(b"c".to_vec())],
        )
        .unwrap();
        assert_eq!(out.to_integer().unwrap(), 2.into());
        let out = call(
            memory_search_method,
            vec![
                haystack,
                StackItem::byte_string(b"c".to_vec()),
                StackItem::integer(3),
            ],
        )
        .unwrap();
        assert_eq!(out.to_integer().unwrap(), 5.into());
    }

    #[test]
    fn test_str_len_counts_code_points() {
        let out = call(
            str_len_method,
            vec![StackItem::byte_string("héllo".as_bytes().to_vec())],
        )
        .unwrap();
        assert_eq!(out.to_integer().unwrap(), 5.into());
    }

    #[test]
    fn test_json_round_trip() {
        let out = call(
            json_deserialize_method,
            vec![StackItem::byte_string(
                br#"{"a":1,"b":[true,null]}"#.to_vec(),
            )],
        )
        .unwrap();
        let back = call(json_serialize_method, vec![out]).unwrap();
        assert_eq!(text(&back), r#"{"a":1,"b":[true,null]}"#);
    }
}
