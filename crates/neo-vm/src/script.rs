//! Scripts and instruction decoding.

use crate::error::VmError;
use crate::opcode::OpCode;
use std::rc::Rc;

/// An immutable script: shared bytes plus nothing else. Instructions are
/// decoded on demand; an operand running past the end is a fault at the
/// instruction that needs it.
#[derive(Clone, Debug)]
pub struct Script {
    bytes: Rc<Vec<u8>>,
}

impl Script {
    /// Wrap script bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Rc::new(bytes),
        }
    }

    /// Script length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for the empty script.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The shared byte buffer.
    #[must_use]
    pub fn bytes(&self) -> &Rc<Vec<u8>> {
        &self.bytes
    }

    /// True when both scripts share one buffer.
    #[must_use]
    pub fn same_as(&self, other: &Script) -> bool {
        Rc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Decode the instruction at `position`.
    pub fn instruction_at(&self, position: usize) -> Result<Instruction, VmError> {
        Instruction::decode(&self.bytes, position)
    }
}

/// One decoded instruction.
#[derive(Clone, Debug)]
pub struct Instruction {
    /// The operation.
    pub opcode: OpCode,
    /// Inline operand bytes (after any length prefix).
    pub operand: Vec<u8>,
    /// Total encoded length including opcode and prefix.
    pub encoded_len: usize,
}

impl Instruction {
    /// Decode at `position` inside `script`.
    pub fn decode(script: &[u8], position: usize) -> Result<Self, VmError> {
        let byte = *script
            .get(position)
            .ok_or(VmError::InvalidOperand(position))?;
        let opcode = OpCode::from_byte(byte)?;

        let prefix_len = opcode.operand_prefix();
        let (operand_len, header_len) = if prefix_len > 0 {
            let prefix = script
                .get(position + 1..position + 1 + prefix_len)
                .ok_or(VmError::InvalidOperand(position))?;
            let mut value = 0usize;
            for (i, b) in prefix.iter().enumerate() {
                value |= (*b as usize) << (8 * i);
            }
            (value, 1 + prefix_len)
        } else {
            (opcode.operand_size(), 1)
        };

        let operand = script
            .get(position + header_len..position + header_len + operand_len)
            .ok_or(VmError::InvalidOperand(position))?
            .to_vec();

        Ok(Self {
            opcode,
            operand,
            encoded_len: header_len + operand_len,
        })
    }

    /// Operand as `i8`.
    pub fn operand_i8(&self) -> Result<i8, VmError> {
        self.operand
            .first()
            .map(|b| *b as i8)
            .ok_or(VmError::InvalidOperand(0))
    }

    /// Operand as little-endian `i32`.
    pub fn operand_i32(&self) -> Result<i32, VmError> {
        let bytes: [u8; 4] = self
            .operand
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or(VmError::InvalidOperand(0))?;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Little-endian `i32` at byte offset `offset` of the operand.
    pub fn operand_i32_at(&self, offset: usize) -> Result<i32, VmError> {
        let bytes: [u8; 4] = self
            .operand
            .get(offset..offset + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or(VmError::InvalidOperand(offset))?;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Operand as little-endian `u16`.
    pub fn operand_u16(&self) -> Result<u16, VmError> {
        let bytes: [u8; 2] = self
            .operand
            .get(..2)
            .and_then(|s| s.try_into().ok())
            .ok_or(VmError::InvalidOperand(0))?;
        Ok(u16::from_le_bytes(bytes))
    }

    /// Operand as little-endian `u32`.
    pub fn operand_u32(&self) -> Result<u32, VmError> {
        Ok(self.operand_i32()? as u32)
    }

    /// Single operand byte.
    pub fn operand_u8(&self) -> Result<u8, VmError> {
        self.operand.first().copied().ok_or(VmError::InvalidOperand(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_decode() {
        let script = Script::new(vec![0x11, 0x12, 0x9E]);
        let first = script.instruction_at(0).unwrap();
        assert_eq!(first.opcode, OpCode::PUSH1);
        assert_eq!(first.encoded_len, 1);
        let third = script.instruction_at(2).unwrap();
        assert_eq!(third.opcode, OpCode::ADD);
    }

    #[test]
    fn test_pushdata_prefix() {
        let script = Script::new(vec![0x0C, 0x03, 0xAA, 0xBB, 0xCC]);
        let instruction = script.instruction_at(0).unwrap();
        assert_eq!(instruction.opcode, OpCode::PUSHDATA1);
        assert_eq!(instruction.operand, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(instruction.encoded_len, 5);
    }

    #[test]
    fn test_truncated_operand_rejected() {
        let script = Script::new(vec![0x0C, 0x05, 0xAA]);
        assert!(script.instruction_at(0).is_err());
        let script = Script::new(vec![0x01, 0x01]); // PUSHINT16 with one byte
        assert!(script.instruction_at(0).is_err());
    }

    #[test]
    fn test_try_operands() {
        let script = Script::new(vec![0x3B, 0x05, 0x00]);
        let instruction = script.instruction_at(0).unwrap();
        assert_eq!(instruction.opcode, OpCode::TRY);
        assert_eq!(instruction.operand_i8().unwrap(), 5);
        assert_eq!(instruction.operand[1] as i8, 0);
    }

    #[test]
    fn test_unassigned_opcode() {
        let script = Script::new(vec![0x42]);
        assert!(matches!(
            script.instruction_at(0),
            Err(VmError::InvalidOpcode(0x42))
        ));
    }
}
