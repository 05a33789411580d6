//! Typed stack items.
//!
//! Compound items (`Array`, `Struct`, `Map`) share their interiors via
//! `Rc<RefCell<..>>`: pushing one twice pushes the same container, which
//! is how reference semantics (and the reference counter's cycle guard)
//! work. `Struct` differs from `Array` only in equality (deep) and in
//! being copied on assignment; `Map` preserves insertion order and only
//! accepts primitive keys.

use crate::error::VmError;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// Widest integer the VM accepts: 256 bits two's complement.
pub const MAX_INTEGER_BYTES: usize = 32;

/// Type tags used by `ISTYPE`, `CONVERT` and `NEWARRAY_T`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemType {
    /// Matches anything.
    Any = 0x00,
    /// Instruction pointer value.
    Pointer = 0x10,
    /// True / false.
    Boolean = 0x20,
    /// Bounded big integer.
    Integer = 0x21,
    /// Immutable bytes.
    ByteString = 0x28,
    /// Mutable bytes.
    Buffer = 0x30,
    /// Ordered sequence, reference equality.
    Array = 0x40,
    /// Ordered sequence, deep equality.
    Struct = 0x41,
    /// Insertion-ordered map.
    Map = 0x48,
    /// Opaque host handle.
    InteropInterface = 0x60,
}

impl ItemType {
    /// Decode a type byte.
    pub fn from_byte(byte: u8) -> Result<Self, VmError> {
        match byte {
            0x00 => Ok(Self::Any),
            0x10 => Ok(Self::Pointer),
            0x20 => Ok(Self::Boolean),
            0x21 => Ok(Self::Integer),
            0x28 => Ok(Self::ByteString),
            0x30 => Ok(Self::Buffer),
            0x40 => Ok(Self::Array),
            0x41 => Ok(Self::Struct),
            0x48 => Ok(Self::Map),
            0x60 => Ok(Self::InteropInterface),
            other => Err(VmError::InvalidOpcode(other)),
        }
    }
}

/// Map entries: key-value pairs kept in insertion order.
pub type MapEntries = Vec<(StackItem, StackItem)>;

/// A value on the evaluation stack.
#[derive(Clone)]
pub enum StackItem {
    /// The null item.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Arbitrary-precision integer, bounded to 256 bits.
    Integer(BigInt),
    /// Immutable byte string.
    ByteString(Rc<Vec<u8>>),
    /// Mutable byte buffer.
    Buffer(Rc<RefCell<Vec<u8>>>),
    /// Ordered item sequence with reference identity.
    Array(Rc<RefCell<Vec<StackItem>>>),
    /// Like `Array`, but deep equality and copy-on-assign.
    Struct(Rc<RefCell<Vec<StackItem>>>),
    /// Primitive-keyed, insertion-ordered map.
    Map(Rc<RefCell<MapEntries>>),
    /// Host-provided opaque handle.
    InteropInterface(Rc<dyn Any>),
    /// Code pointer into a specific script.
    Pointer {
        /// The script the pointer is valid in.
        script: Rc<Vec<u8>>,
        /// Byte offset.
        position: usize,
    },
}

impl StackItem {
    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    /// Integer item from anything `BigInt` accepts.
    pub fn integer(value: impl Into<BigInt>) -> Self {
        StackItem::Integer(value.into())
    }

    /// Byte-string item.
    pub fn byte_string(bytes: impl Into<Vec<u8>>) -> Self {
        StackItem::ByteString(Rc::new(bytes.into()))
    }

    /// Buffer item.
    pub fn buffer(bytes: impl Into<Vec<u8>>) -> Self {
        StackItem::Buffer(Rc::new(RefCell::new(bytes.into())))
    }

    /// Fresh array item.
    pub fn array(items: Vec<StackItem>) -> Self {
        StackItem::Array(Rc::new(RefCell::new(items)))
    }

    /// Fresh struct item.
    pub fn structure(items: Vec<StackItem>) -> Self {
        StackItem::Struct(Rc::new(RefCell::new(items)))
    }

    /// Fresh empty map.
    pub fn map() -> Self {
        StackItem::Map(Rc::new(RefCell::new(Vec::new())))
    }

    // =========================================================================
    // CLASSIFICATION
    // =========================================================================

    /// The item's type tag.
    #[must_use]
    pub fn item_type(&self) -> ItemType {
        match self {
            StackItem::Null => ItemType::Any,
            StackItem::Boolean(_) => ItemType::Boolean,
            StackItem::Integer(_) => ItemType::Integer,
            StackItem::ByteString(_) => ItemType::ByteString,
            StackItem::Buffer(_) => ItemType::Buffer,
            StackItem::Array(_) => ItemType::Array,
            StackItem::Struct(_) => ItemType::Struct,
            StackItem::Map(_) => ItemType::Map,
            StackItem::InteropInterface(_) => ItemType::InteropInterface,
            StackItem::Pointer { .. } => ItemType::Pointer,
        }
    }

    /// Display name of the type, for fault messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            StackItem::Null => "Null",
            StackItem::Boolean(_) => "Boolean",
            StackItem::Integer(_) => "Integer",
            StackItem::ByteString(_) => "ByteString",
            StackItem::Buffer(_) => "Buffer",
            StackItem::Array(_) => "Array",
            StackItem::Struct(_) => "Struct",
            StackItem::Map(_) => "Map",
            StackItem::InteropInterface(_) => "InteropInterface",
            StackItem::Pointer { .. } => "Pointer",
        }
    }

    /// True for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    /// Compound items participate in reference counting.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            StackItem::Array(_) | StackItem::Struct(_) | StackItem::Map(_)
        )
    }

    /// Primitive items may serve as map keys.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            StackItem::Boolean(_) | StackItem::Integer(_) | StackItem::ByteString(_)
        )
    }

    // =========================================================================
    // COERCIONS
    // =========================================================================

    /// Truthiness, defined for every type.
    #[must_use]
    pub fn to_boolean(&self) -> bool {
        match self {
            StackItem::Null => false,
            StackItem::Boolean(value) => *value,
            StackItem::Integer(value) => !value.is_zero(),
            StackItem::ByteString(bytes) => bytes.iter().any(|b| *b != 0),
            StackItem::Buffer(bytes) => bytes.borrow().iter().any(|b| *b != 0),
            StackItem::Array(_)
            | StackItem::Struct(_)
            | StackItem::Map(_)
            | StackItem::InteropInterface(_)
            | StackItem::Pointer { .. } => true,
        }
    }

    /// Numeric value; bytes decode as little-endian two's complement.
    pub fn to_integer(&self) -> Result<BigInt, VmError> {
        match self {
            StackItem::Boolean(value) => Ok(BigInt::from(i32::from(*value))),
            StackItem::Integer(value) => Ok(value.clone()),
            StackItem::ByteString(bytes) => {
                if bytes.len() > MAX_INTEGER_BYTES {
                    return Err(VmError::IntegerOverflow);
                }
                Ok(BigInt::from_signed_bytes_le(bytes))
            }
            StackItem::Buffer(bytes) => {
                let bytes = bytes.borrow();
                if bytes.len() > MAX_INTEGER_BYTES {
                    return Err(VmError::IntegerOverflow);
                }
                Ok(BigInt::from_signed_bytes_le(&bytes))
            }
            other => Err(VmError::InvalidType {
                expected: "Integer",
                actual: other.type_name(),
            }),
        }
    }

    /// Integer as `usize` for index operands.
    pub fn to_index(&self) -> Result<usize, VmError> {
        let value = self.to_integer()?;
        value
            .to_usize()
            .ok_or(VmError::InvalidContainerOp("negative or huge index".into()))
    }

    /// Raw bytes; integers encode as little-endian two's complement.
    pub fn to_byte_vec(&self) -> Result<Vec<u8>, VmError> {
        match self {
            StackItem::ByteString(bytes) => Ok(bytes.as_ref().clone()),
            StackItem::Buffer(bytes) => Ok(bytes.borrow().clone()),
            StackItem::Integer(value) => {
                if value.is_zero() {
                    Ok(Vec::new())
                } else {
                    Ok(value.to_signed_bytes_le())
                }
            }
            StackItem::Boolean(value) => Ok(if *value { vec![1] } else { vec![0] }),
            other => Err(VmError::InvalidType {
                expected: "ByteString",
                actual: other.type_name(),
            }),
        }
    }

    /// Shared sequence interior of an `Array` or `Struct`.
    pub fn as_sequence(&self) -> Result<&Rc<RefCell<Vec<StackItem>>>, VmError> {
        match self {
            StackItem::Array(items) | StackItem::Struct(items) => Ok(items),
            other => Err(VmError::InvalidType {
                expected: "Array or Struct",
                actual: other.type_name(),
            }),
        }
    }

    /// Number of elements / bytes for `SIZE`.
    pub fn size_of(&self) -> Result<usize, VmError> {
        match self {
            StackItem::ByteString(bytes) => Ok(bytes.len()),
            StackItem::Buffer(bytes) => Ok(bytes.borrow().len()),
            StackItem::Array(items) | StackItem::Struct(items) => Ok(items.borrow().len()),
            StackItem::Map(entries) => Ok(entries.borrow().len()),
            StackItem::Integer(value) => Ok(if value.is_zero() {
                0
            } else {
                value.to_signed_bytes_le().len()
            }),
            StackItem::Boolean(_) => Ok(1),
            other => Err(VmError::InvalidType {
                expected: "sized item",
                actual: other.type_name(),
            }),
        }
    }

    /// Enforce the 256-bit integer bound: the two's-complement encoding
    /// must fit in 32 bytes.
    pub fn check_integer(value: BigInt) -> Result<BigInt, VmError> {
        if value.to_signed_bytes_le().len() <= MAX_INTEGER_BYTES {
            Ok(value)
        } else {
            Err(VmError::IntegerOverflow)
        }
    }

    // =========================================================================
    // EQUALITY & COPYING
    // =========================================================================

    /// The `EQUAL` relation: value equality for primitives, reference
    /// identity for arrays / maps / buffers, deep equality for structs.
    pub fn equals(&self, other: &StackItem) -> Result<bool, VmError> {
        match (self, other) {
            (StackItem::Null, StackItem::Null) => Ok(true),
            (StackItem::Null, _) | (_, StackItem::Null) => Ok(false),
            (StackItem::Array(a), StackItem::Array(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Map(a), StackItem::Map(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Buffer(a), StackItem::Buffer(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Struct(a), StackItem::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.equals(y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (StackItem::InteropInterface(a), StackItem::InteropInterface(b)) => {
                Ok(Rc::ptr_eq(a, b))
            }
            (
                StackItem::Pointer {
                    script: sa,
                    position: pa,
                },
                StackItem::Pointer {
                    script: sb,
                    position: pb,
                },
            ) => Ok(Rc::ptr_eq(sa, sb) && pa == pb),
            (a, b) if a.is_primitive() && b.is_primitive() => {
                // Primitives compare by their byte rendering; Boolean and
                // Integer coexist with ByteString through it.
                Ok(a.to_byte_vec()? == b.to_byte_vec()?)
            }
            _ => Ok(false),
        }
    }

    /// Key equality for maps: primitive byte comparison.
    pub fn key_equals(&self, other: &StackItem) -> Result<bool, VmError> {
        if !self.is_primitive() || !other.is_primitive() {
            return Err(VmError::InvalidMapKey);
        }
        Ok(self.to_byte_vec()? == other.to_byte_vec()?)
    }

    /// Copy-on-assign semantics for structs: a deep clone with fresh
    /// interiors. Non-struct items return themselves (shared).
    #[must_use]
    pub fn assign_clone(&self) -> StackItem {
        match self {
            StackItem::Struct(items) => {
                let copied = items.borrow().iter().map(StackItem::assign_clone).collect();
                StackItem::structure(copied)
            }
            other => other.clone(),
        }
    }
}

impl std::fmt::Debug for StackItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackItem::Null => write!(f, "Null"),
            StackItem::Boolean(value) => write!(f, "Boolean({value})"),
            StackItem::Integer(value) => write!(f, "Integer({value})"),
            StackItem::ByteString(bytes) => write!(f, "ByteString(0x{})", hex::encode(&***bytes)),
            StackItem::Buffer(bytes) => write!(f, "Buffer(0x{})", hex::encode(&*bytes.borrow())),
            StackItem::Array(items) => write!(f, "Array(len {})", items.borrow().len()),
            StackItem::Struct(items) => write!(f, "Struct(len {})", items.borrow().len()),
            StackItem::Map(entries) => write!(f, "Map(len {})", entries.borrow().len()),
            StackItem::InteropInterface(_) => write!(f, "InteropInterface"),
            StackItem::Pointer { position, .. } => write!(f, "Pointer({position})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!StackItem::Null.to_boolean());
        assert!(!StackItem::integer(0).to_boolean());
        assert!(StackItem::integer(-1).to_boolean());
        assert!(!StackItem::byte_string(vec![0, 0]).to_boolean());
        assert!(StackItem::byte_string(vec![0, 1]).to_boolean());
        assert!(StackItem::array(vec![]).to_boolean());
    }

    #[test]
    fn test_integer_byte_round_trip() {
        for value in [0i64, 1, -1, 127, -128, 255, 65_535, -65_536] {
            let item = StackItem::integer(value);
            let bytes = item.to_byte_vec().unwrap();
            let back = StackItem::byte_string(bytes).to_integer().unwrap();
            assert_eq!(back, BigInt::from(value));
        }
    }

    #[test]
    fn test_array_equality_is_reference() {
        let a = StackItem::array(vec![StackItem::integer(1)]);
        let b = StackItem::array(vec![StackItem::integer(1)]);
        assert!(!a.equals(&b).unwrap());
        assert!(a.equals(&a.clone()).unwrap());
    }

    #[test]
    fn test_struct_equality_is_deep() {
        let a = StackItem::structure(vec![StackItem::integer(1), StackItem::byte_string(b"x".to_vec())]);
        let b = StackItem::structure(vec![StackItem::integer(1), StackItem::byte_string(b"x".to_vec())]);
        assert!(a.equals(&b).unwrap());
        let c = StackItem::structure(vec![StackItem::integer(2)]);
        assert!(!a.equals(&c).unwrap());
    }

    #[test]
    fn test_struct_assign_clone_is_independent() {
        let original = StackItem::structure(vec![StackItem::integer(1)]);
        let copy = original.assign_clone();
        if let StackItem::Struct(items) = &original {
            items.borrow_mut().push(StackItem::integer(2));
        }
        assert_eq!(copy.size_of().unwrap(), 1);
        assert_eq!(original.size_of().unwrap(), 2);
    }

    #[test]
    fn test_integer_bound() {
        let max: BigInt = BigInt::from(1u8) << 255;
        assert!(StackItem::check_integer(max.clone() - 1).is_ok());
        assert!(StackItem::check_integer(max.clone()).is_err());
        assert!(StackItem::check_integer(-max.clone()).is_ok());
        assert!(StackItem::check_integer(-max - 1).is_err());
    }

    #[test]
    fn test_map_keys_must_be_primitive() {
        let array = StackItem::array(vec![]);
        assert!(array.key_equals(&StackItem::integer(1)).is_err());
        assert!(StackItem::integer(1)
            .key_equals(&StackItem::integer(1))
            .unwrap());
    }
}
