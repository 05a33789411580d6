//! Little-endian wire codec.
//!
//! `BinaryWriter` appends to an owned buffer; `BinaryReader` walks a
//! borrowed slice with bounds checking. Variable-length integers follow
//! the `0xFD`/`0xFE`/`0xFF` escape scheme and every length-prefixed read
//! takes an explicit upper bound so malformed input cannot force huge
//! allocations.

use crate::error::TypeError;

// =============================================================================
// SERIALIZABLE
// =============================================================================

/// Implemented by every wire entity.
pub trait Serializable: Sized {
    /// Append the wire form to `writer`.
    fn serialize(&self, writer: &mut BinaryWriter);

    /// Decode one value from `reader`.
    fn deserialize(reader: &mut BinaryReader) -> Result<Self, TypeError>;

    /// Exact serialized size in bytes.
    fn size(&self) -> usize;

    /// Serialize into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.serialize(&mut writer);
        writer.into_bytes()
    }

    /// Decode from a complete buffer, rejecting trailing bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        let mut reader = BinaryReader::new(bytes);
        let value = Self::deserialize(&mut reader)?;
        let left = reader.remaining();
        if left != 0 {
            return Err(TypeError::TrailingBytes(left));
        }
        Ok(value)
    }
}

/// Serialized size of a varint for `value`.
#[must_use]
pub fn var_int_size(value: u64) -> usize {
    match value {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Serialized size of a var-bytes value of `len` bytes.
#[must_use]
pub fn var_bytes_size(len: usize) -> usize {
    var_int_size(len as u64) + len
}

// =============================================================================
// WRITER
// =============================================================================

/// Append-only little-endian encoder.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

impl BinaryWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the writer, returning the buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Borrow the buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Raw bytes, no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Variable-length integer.
    pub fn write_var_int(&mut self, value: u64) {
        match value {
            0..=0xFC => self.write_u8(value as u8),
            0xFD..=0xFFFF => {
                self.write_u8(0xFD);
                self.write_u16(value as u16);
            }
            0x1_0000..=0xFFFF_FFFF => {
                self.write_u8(0xFE);
                self.write_u32(value as u32);
            }
            _ => {
                self.write_u8(0xFF);
                self.write_u64(value);
            }
        }
    }

    /// Varint length prefix followed by the bytes.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_int(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    /// UTF-8 string as var-bytes.
    pub fn write_var_string(&mut self, value: &str) {
        self.write_var_bytes(value.as_bytes());
    }

    /// Varint count followed by each element.
    pub fn write_serializable_vec<T: Serializable>(&mut self, items: &[T]) {
        self.write_var_int(items.len() as u64);
        for item in items {
            item.serialize(self);
        }
    }
}

// =============================================================================
// READER
// =============================================================================

/// Bounds-checked little-endian decoder over a borrowed slice.
#[derive(Debug)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Wrap a slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current read offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], TypeError> {
        if self.remaining() < count {
            return Err(TypeError::UnexpectedEof {
                offset: self.position,
            });
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, TypeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, TypeError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(TypeError::OutOfRange(format!("bool byte 0x{other:02x}"))),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, TypeError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("len 2")))
    }

    pub fn read_u32(&mut self) -> Result<u32, TypeError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("len 4")))
    }

    pub fn read_u64(&mut self) -> Result<u64, TypeError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("len 8")))
    }

    pub fn read_i8(&mut self) -> Result<i8, TypeError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, TypeError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, TypeError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64, TypeError> {
        Ok(self.read_u64()? as i64)
    }

    /// Raw bytes, no length prefix.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, TypeError> {
        Ok(self.take(count)?.to_vec())
    }

    /// Fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TypeError> {
        Ok(self.take(N)?.try_into().expect("length checked"))
    }

    /// Variable-length integer, bounded by `max`.
    pub fn read_var_int(&mut self, max: u64) -> Result<u64, TypeError> {
        let prefix = self.read_u8()?;
        let value = match prefix {
            0xFD => u64::from(self.read_u16()?),
            0xFE => u64::from(self.read_u32()?),
            0xFF => self.read_u64()?,
            direct => u64::from(direct),
        };
        if value > max {
            return Err(TypeError::OutOfRange(format!("varint {value} > max {max}")));
        }
        Ok(value)
    }

    /// Var-bytes with a maximum length.
    pub fn read_var_bytes(&mut self, max: usize) -> Result<Vec<u8>, TypeError> {
        let len = self.read_var_int(max as u64)? as usize;
        self.read_bytes(len)
    }

    /// UTF-8 var-string with a maximum byte length.
    pub fn read_var_string(&mut self, max: usize) -> Result<String, TypeError> {
        let bytes = self.read_var_bytes(max)?;
        String::from_utf8(bytes).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
    }

    /// Varint count (bounded) followed by that many elements.
    pub fn read_serializable_vec<T: Serializable>(
        &mut self,
        max: usize,
    ) -> Result<Vec<T>, TypeError> {
        let count = self.read_var_int(max as u64)? as usize;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(T::deserialize(self)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_round_trip() {
        let mut writer = BinaryWriter::new();
        writer.write_u8(0xAB);
        writer.write_u16(0xBEEF);
        writer.write_u32(0xDEAD_BEEF);
        writer.write_u64(0x0123_4567_89AB_CDEF);
        writer.write_i64(-42);

        let bytes = writer.into_bytes();
        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_u64().unwrap(), 0x0123_4567_89AB_CDEF);
        assert_eq!(reader.read_i64().unwrap(), -42);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_var_int_encodings() {
        for (value, expected_len) in [
            (0u64, 1usize),
            (0xFC, 1),
            (0xFD, 3),
            (0xFFFF, 3),
            (0x1_0000, 5),
            (0xFFFF_FFFF, 5),
            (0x1_0000_0000, 9),
        ] {
            let mut writer = BinaryWriter::new();
            writer.write_var_int(value);
            assert_eq!(writer.len(), expected_len, "value {value}");
            assert_eq!(var_int_size(value), expected_len);

            let bytes = writer.into_bytes();
            let mut reader = BinaryReader::new(&bytes);
            assert_eq!(reader.read_var_int(u64::MAX).unwrap(), value);
        }
    }

    #[test]
    fn test_var_int_respects_max() {
        let mut writer = BinaryWriter::new();
        writer.write_var_int(1000);
        let bytes = writer.into_bytes();
        let mut reader = BinaryReader::new(&bytes);
        assert!(reader.read_var_int(999).is_err());
    }

    #[test]
    fn test_var_bytes_round_trip() {
        let payload = vec![1u8, 2, 3, 4, 5];
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(&payload);
        let bytes = writer.into_bytes();
        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.read_var_bytes(16).unwrap(), payload);
    }

    #[test]
    fn test_eof_detection() {
        let mut reader = BinaryReader::new(&[0x01, 0x02]);
        assert!(reader.read_u32().is_err());
    }

    #[test]
    fn test_var_string_rejects_bad_utf8() {
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(&[0xFF, 0xFE]);
        let bytes = writer.into_bytes();
        let mut reader = BinaryReader::new(&bytes);
        assert!(reader.read_var_string(16).is_err());
    }
}
