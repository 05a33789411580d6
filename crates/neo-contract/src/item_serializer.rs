//! Binary (de)serialization of stack items.
//!
//! Shared by StdLib's `serialize` / `deserialize`, storage-iterator
//! value deserialization and notification capture. The format is the
//! item-type byte followed by a type-specific payload; interop handles
//! and pointers do not serialize.

use neo_types::io::{BinaryReader, BinaryWriter};
use neo_vm::stack_item::ItemType;
use neo_vm::{StackItem, VmError};
use num_bigint::BigInt;

/// Bound on serialized output and on nested item count.
pub const MAX_SERIALIZED_SIZE: usize = u16::MAX as usize;

const MAX_DEPTH: usize = 10;

/// Serialize one item.
pub fn serialize_item(item: &StackItem) -> Result<Vec<u8>, VmError> {
    let mut writer = BinaryWriter::new();
    write_item(item, &mut writer, MAX_DEPTH)?;
    let bytes = writer.into_bytes();
    if bytes.len() > MAX_SERIALIZED_SIZE {
        return Err(VmError::ItemTooLarge(bytes.len()));
    }
    Ok(bytes)
}

fn write_item(item: &StackItem, writer: &mut BinaryWriter, depth: usize) -> Result<(), VmError> {
    if depth == 0 {
        return Err(VmError::InvalidContainerOp("serialization too deep".into()));
    }
    match item {
        StackItem::Null => writer.write_u8(ItemType::Any as u8),
        StackItem::Boolean(value) => {
            writer.write_u8(ItemType::Boolean as u8);
            writer.write_bool(*value);
        }
        StackItem::Integer(value) => {
            writer.write_u8(ItemType::Integer as u8);
            writer.write_var_bytes(&value.to_signed_bytes_le());
        }
        StackItem::ByteString(bytes) => {
            writer.write_u8(ItemType::ByteString as u8);
            writer.write_var_bytes(bytes);
        }
        StackItem::Buffer(bytes) => {
            writer.write_u8(ItemType::Buffer as u8);
            writer.write_var_bytes(&bytes.borrow());
        }
        StackItem::Array(items) | StackItem::Struct(items) => {
            writer.write_u8(item.item_type() as u8);
            let items = items.borrow();
            writer.write_var_int(items.len() as u64);
            for element in items.iter() {
                write_item(element, writer, depth - 1)?;
            }
        }
        StackItem::Map(entries) => {
            writer.write_u8(ItemType::Map as u8);
            let entries = entries.borrow();
            writer.write_var_int(entries.len() as u64);
            for (key, value) in entries.iter() {
                write_item(key, writer, depth - 1)?;
                write_item(value, writer, depth - 1)?;
            }
        }
        StackItem::InteropInterface(_) | StackItem::Pointer { .. } => {
            return Err(VmError::InvalidType {
                expected: "serializable item",
                actual: item.type_name(),
            })
        }
    }
    Ok(())
}

/// Deserialize one item.
pub fn deserialize_item(bytes: &[u8]) -> Result<StackItem, VmError> {
    if bytes.len() > MAX_SERIALIZED_SIZE {
        return Err(VmError::ItemTooLarge(bytes.len()));
    }
    let mut reader = BinaryReader::new(bytes);
    let item = read_item(&mut reader, MAX_DEPTH)?;
    if reader.remaining() != 0 {
        return Err(VmError::InvalidContainerOp("trailing bytes".into()));
    }
    Ok(item)
}

fn read_item(reader: &mut BinaryReader, depth: usize) -> Result<StackItem, VmError> {
    if depth == 0 {
        return Err(VmError::InvalidContainerOp("deserialization too deep".into()));
    }
    let fail = |_| VmError::InvalidContainerOp("malformed serialized item".into());
    let tag = reader.read_u8().map_err(fail)?;
    let item_type = ItemType::from_byte(tag)?;
    match item_type {
        ItemType::Any => Ok(StackItem::Null),
        ItemType::Boolean => Ok(StackItem::Boolean(reader.read_bool().map_err(fail)?)),
        ItemType::Integer => {
            let bytes = reader.read_var_bytes(32).map_err(fail)?;
            Ok(StackItem::Integer(BigInt::from_signed_bytes_le(&bytes)))
        }
        ItemType::ByteString => Ok(StackItem::byte_string(
            reader.read_var_bytes(MAX_SERIALIZED_SIZE).map_err(fail)?,
        )),
        ItemType::Buffer => Ok(StackItem::buffer(
            reader.read_var_bytes(MAX_SERIALIZED_SIZE).map_err(fail)?,
        )),
        ItemType::Array | ItemType::Struct => {
            let count = reader
                .read_var_int(MAX_SERIALIZED_SIZE as u64)
                .map_err(fail)? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_item(reader, depth - 1)?);
            }
            Ok(if item_type == ItemType::Array {
                StackItem::array(items)
            } else {
                StackItem::structure(items)
            })
        }
        ItemType::Map => {
            let count = reader
                .read_var_int(MAX_SERIALIZED_SIZE as u64)
                .map_err(fail)? as usize;
            let map = StackItem::map();
            if let StackItem::Map(entries) = &map {
                for _ in 0..count {
                    let key = read_item(reader, depth - 1)?;
                    if !key.is_primitive() {
                        return Err(VmError::InvalidMapKey);
                    }
                    let value = read_item(reader, depth - 1)?;
                    entries.borrow_mut().push((key, value));
                }
            }
            Ok(map)
        }
        ItemType::Pointer | ItemType::InteropInterface => Err(VmError::InvalidType {
            expected: "serializable item",
            actual: "Pointer or InteropInterface",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_nested() {
        let map = StackItem::map();
        if let StackItem::Map(entries) = &map {
            entries.borrow_mut().push((
                StackItem::byte_string(b"balance".to_vec()),
                StackItem::integer(100),
            ));
        }
        let original = StackItem::array(vec![
            StackItem::Null,
            StackItem::Boolean(true),
            StackItem::integer(-42),
            StackItem::byte_string(b"neo".to_vec()),
            map,
        ]);
        let bytes = serialize_item(&original).unwrap();
        let restored = deserialize_item(&bytes).unwrap();
        // Structural comparison via re-serialization.
        assert_eq!(serialize_item(&restored).unwrap(), bytes);
    }

    #[test]
    fn test_interop_rejected() {
        let pointer = StackItem::Pointer {
            script: std::rc::Rc::new(vec![0x40]),
            position: 0,
        };
        assert!(serialize_item(&pointer).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut nested = StackItem::array(vec![]);
        for _ in 0..20 {
            nested = StackItem::array(vec![nested]);
        }
        assert!(serialize_item(&nested).is_err());
    }
}
