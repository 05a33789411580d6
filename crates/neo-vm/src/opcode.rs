//! The 256-opcode instruction set.
//!
//! Byte values are consensus-critical; unassigned bytes fault with
//! "Invalid opcode". Operand widths drive instruction decoding and the
//! per-opcode base price feeds the gas meter.

use crate::error::VmError;

macro_rules! opcodes {
    ($(($name:ident, $value:expr)),* $(,)?) => {
        /// One-byte operation codes.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        #[allow(missing_docs)]
        pub enum OpCode {
            $($name = $value,)*
        }

        impl OpCode {
            /// Decode an opcode byte.
            pub fn from_byte(byte: u8) -> Result<Self, VmError> {
                match byte {
                    $($value => Ok(OpCode::$name),)*
                    other => Err(VmError::InvalidOpcode(other)),
                }
            }

            /// The mnemonic.
            #[must_use]
            pub fn name(&self) -> &'static str {
                match self {
                    $(OpCode::$name => stringify!($name),)*
                }
            }
        }
    };
}

opcodes! {
    // Constants
    (PUSHINT8, 0x00), (PUSHINT16, 0x01), (PUSHINT32, 0x02), (PUSHINT64, 0x03),
    (PUSHINT128, 0x04), (PUSHINT256, 0x05),
    (PUSHT, 0x08), (PUSHF, 0x09), (PUSHA, 0x0A), (PUSHNULL, 0x0B),
    (PUSHDATA1, 0x0C), (PUSHDATA2, 0x0D), (PUSHDATA4, 0x0E),
    (PUSHM1, 0x0F), (PUSH0, 0x10), (PUSH1, 0x11), (PUSH2, 0x12), (PUSH3, 0x13),
    (PUSH4, 0x14), (PUSH5, 0x15), (PUSH6, 0x16), (PUSH7, 0x17), (PUSH8, 0x18),
    (PUSH9, 0x19), (PUSH10, 0x1A), (PUSH11, 0x1B), (PUSH12, 0x1C), (PUSH13, 0x1D),
    (PUSH14, 0x1E), (PUSH15, 0x1F), (PUSH16, 0x20),
    // Flow control
    (NOP, 0x21), (JMP, 0x22), (JMP_L, 0x23), (JMPIF, 0x24), (JMPIF_L, 0x25),
    (JMPIFNOT, 0x26), (JMPIFNOT_L, 0x27), (JMPEQ, 0x28), (JMPEQ_L, 0x29),
    (JMPNE, 0x2A), (JMPNE_L, 0x2B), (JMPGT, 0x2C), (JMPGT_L, 0x2D),
    (JMPGE, 0x2E), (JMPGE_L, 0x2F), (JMPLT, 0x30), (JMPLT_L, 0x31),
    (JMPLE, 0x32), (JMPLE_L, 0x33),
    (CALL, 0x34), (CALL_L, 0x35), (CALLA, 0x36), (CALLT, 0x37),
    (ABORT, 0x38), (ASSERT, 0x39), (THROW, 0x3A),
    (TRY, 0x3B), (TRY_L, 0x3C), (ENDTRY, 0x3D), (ENDTRY_L, 0x3E), (ENDFINALLY, 0x3F),
    (RET, 0x40), (SYSCALL, 0x41),
    // Stack
    (DEPTH, 0x43), (DROP, 0x45), (NIP, 0x46), (XDROP, 0x48), (CLEAR, 0x49),
    (DUP, 0x4A), (OVER, 0x4B), (PICK, 0x4D), (TUCK, 0x4E), (SWAP, 0x50),
    (ROT, 0x51), (ROLL, 0x52), (REVERSE3, 0x53), (REVERSE4, 0x54), (REVERSEN, 0x55),
    // Slots
    (INITSSLOT, 0x56), (INITSLOT, 0x57),
    (LDSFLD0, 0x58), (LDSFLD1, 0x59), (LDSFLD2, 0x5A), (LDSFLD3, 0x5B),
    (LDSFLD4, 0x5C), (LDSFLD5, 0x5D), (LDSFLD6, 0x5E), (LDSFLD, 0x5F),
    (STSFLD0, 0x60), (STSFLD1, 0x61), (STSFLD2, 0x62), (STSFLD3, 0x63),
    (STSFLD4, 0x64), (STSFLD5, 0x65), (STSFLD6, 0x66), (STSFLD, 0x67),
    (LDLOC0, 0x68), (LDLOC1, 0x69), (LDLOC2, 0x6A), (LDLOC3, 0x6B),
    (LDLOC4, 0x6C), (LDLOC5, 0x6D), (LDLOC6, 0x6E), (LDLOC, 0x6F),
    (STLOC0, 0x70), (STLOC1, 0x71), (STLOC2, 0x72), (STLOC3, 0x73),
    (STLOC4, 0x74), (STLOC5, 0x75), (STLOC6, 0x76), (STLOC, 0x77),
    (LDARG0, 0x78), (LDARG1, 0x79), (LDARG2, 0x7A), (LDARG3, 0x7B),
    (LDARG4, 0x7C), (LDARG5, 0x7D), (LDARG6, 0x7E), (LDARG, 0x7F),
    (STARG0, 0x80), (STARG1, 0x81), (STARG2, 0x82), (STARG3, 0x83),
    (STARG4, 0x84), (STARG5, 0x85), (STARG6, 0x86), (STARG, 0x87),
    // Splice
    (NEWBUFFER, 0x88), (MEMCPY, 0x89), (CAT, 0x8B), (SUBSTR, 0x8C),
    (LEFT, 0x8D), (RIGHT, 0x8E),
    // Bitwise logic
    (INVERT, 0x90), (AND, 0x91), (OR, 0x92), (XOR, 0x93),
    (EQUAL, 0x97), (NOTEQUAL, 0x98),
    // Arithmetic
    (SIGN, 0x99), (ABS, 0x9A), (NEGATE, 0x9B), (INC, 0x9C), (DEC, 0x9D),
    (ADD, 0x9E), (SUB, 0x9F), (MUL, 0xA0), (DIV, 0xA1), (MOD, 0xA2),
    (POW, 0xA3), (SQRT, 0xA4), (MODMUL, 0xA5), (MODPOW, 0xA6),
    (SHL, 0xA8), (SHR, 0xA9),
    (NOT, 0xAA), (BOOLAND, 0xAB), (BOOLOR, 0xAC),
    (NZ, 0xB1), (NUMEQUAL, 0xB3), (NUMNOTEQUAL, 0xB4),
    (LT, 0xB5), (LE, 0xB6), (GT, 0xB7), (GE, 0xB8),
    (MIN, 0xB9), (MAX, 0xBA), (WITHIN, 0xBB),
    // Compound types
    (PACKMAP, 0xBE), (PACKSTRUCT, 0xBF), (PACK, 0xC0), (UNPACK, 0xC1),
    (NEWARRAY0, 0xC2), (NEWARRAY, 0xC3), (NEWARRAY_T, 0xC4),
    (NEWSTRUCT0, 0xC5), (NEWSTRUCT, 0xC6), (NEWMAP, 0xC8),
    (SIZE, 0xCA), (HASKEY, 0xCB), (KEYS, 0xCC), (VALUES, 0xCD),
    (PICKITEM, 0xCE), (APPEND, 0xCF), (SETITEM, 0xD0), (REVERSEITEMS, 0xD1),
    (REMOVE, 0xD2), (CLEARITEMS, 0xD3), (POPITEM, 0xD4),
    // Types
    (ISNULL, 0xD8), (ISTYPE, 0xD9), (CONVERT, 0xDB),
    // Extensions
    (ABORTMSG, 0xE0), (ASSERTMSG, 0xE1),
}

impl OpCode {
    /// Fixed operand byte count (zero for prefix-sized opcodes).
    #[must_use]
    pub fn operand_size(&self) -> usize {
        use OpCode::*;
        match self {
            PUSHINT8 | JMP | JMPIF | JMPIFNOT | JMPEQ | JMPNE | JMPGT | JMPGE | JMPLT
            | JMPLE | CALL | ENDTRY | INITSSLOT | LDSFLD | STSFLD | LDLOC | STLOC
            | LDARG | STARG | NEWARRAY_T | ISTYPE | CONVERT => 1,
            PUSHINT16 | CALLT | TRY | INITSLOT => 2,
            PUSHINT32 | PUSHA | JMP_L | JMPIF_L | JMPIFNOT_L | JMPEQ_L | JMPNE_L
            | JMPGT_L | JMPGE_L | JMPLT_L | JMPLE_L | CALL_L | ENDTRY_L | SYSCALL => 4,
            PUSHINT64 | TRY_L => 8,
            PUSHINT128 => 16,
            PUSHINT256 => 32,
            _ => 0,
        }
    }

    /// Length-prefix byte count for data-carrying opcodes.
    #[must_use]
    pub fn operand_prefix(&self) -> usize {
        match self {
            OpCode::PUSHDATA1 => 1,
            OpCode::PUSHDATA2 => 2,
            OpCode::PUSHDATA4 => 4,
            _ => 0,
        }
    }

    /// Base execution price in 10^-8 gas units, before the engine's fee
    /// factor.
    #[must_use]
    pub fn price(&self) -> i64 {
        use OpCode::*;
        match self {
            ABORT | ABORTMSG | RET | SYSCALL => 0,
            ASSERT | ASSERTMSG | NOP => 1,
            PUSHINT8 | PUSHINT16 | PUSHINT32 | PUSHINT64 | PUSHNULL | PUSHM1 | PUSH0
            | PUSH1 | PUSH2 | PUSH3 | PUSH4 | PUSH5 | PUSH6 | PUSH7 | PUSH8 | PUSH9
            | PUSH10 | PUSH11 | PUSH12 | PUSH13 | PUSH14 | PUSH15 | PUSH16 | PUSHT
            | PUSHF => 1,
            PUSHINT128 | PUSHINT256 | PUSHA | TRY | TRY_L | ENDTRY | ENDTRY_L
            | ENDFINALLY | INVERT | SIGN | ABS | NEGATE | INC | DEC | NOT | NZ | SIZE
            | ISNULL => 1 << 2,
            JMP | JMP_L | JMPIF | JMPIF_L | JMPIFNOT | JMPIFNOT_L | JMPEQ | JMPEQ_L
            | JMPNE | JMPNE_L | JMPGT | JMPGT_L | JMPGE | JMPGE_L | JMPLT | JMPLT_L
            | JMPLE | JMPLE_L | DEPTH | DROP | NIP | DUP | OVER | PICK | TUCK | SWAP
            | ROT | REVERSE3 | REVERSE4 | LDSFLD0 | LDSFLD1 | LDSFLD2 | LDSFLD3
            | LDSFLD4 | LDSFLD5 | LDSFLD6 | LDSFLD | STSFLD0 | STSFLD1 | STSFLD2
            | STSFLD3 | STSFLD4 | STSFLD5 | STSFLD6 | STSFLD | LDLOC0 | LDLOC1
            | LDLOC2 | LDLOC3 | LDLOC4 | LDLOC5 | LDLOC6 | LDLOC | STLOC0 | STLOC1
            | STLOC2 | STLOC3 | STLOC4 | STLOC5 | STLOC6 | STLOC | LDARG0 | LDARG1
            | LDARG2 | LDARG3 | LDARG4 | LDARG5 | LDARG6 | LDARG | STARG0 | STARG1
            | STARG2 | STARG3 | STARG4 | STARG5 | STARG6 | STARG | ISTYPE => 1 << 1,
            AND | OR | XOR | ADD | SUB | MUL | DIV | MOD | SHL | SHR | BOOLAND
            | BOOLOR | NUMEQUAL | NUMNOTEQUAL | LT | LE | GT | GE | MIN | MAX
            | WITHIN | NEWMAP => 1 << 3,
            XDROP | CLEAR | ROLL | REVERSEN | INITSSLOT | NEWARRAY0 | NEWSTRUCT0
            | KEYS | REMOVE | CLEARITEMS | POPITEM => 1 << 4,
            EQUAL | NOTEQUAL | MODMUL => 1 << 5,
            INITSLOT | POW | SQRT | HASKEY | PICKITEM => 1 << 6,
            NEWBUFFER => 1 << 8,
            PUSHDATA1 | CALL | CALL_L | CALLA | THROW | NEWARRAY | NEWSTRUCT => 1 << 9,
            PUSHDATA2 => 1 << 9,
            MEMCPY | CAT | SUBSTR | LEFT | RIGHT | MODPOW | PACKMAP | PACKSTRUCT
            | PACK | UNPACK => 1 << 11,
            PUSHDATA4 => 1 << 12,
            VALUES | APPEND | SETITEM | REVERSEITEMS | CONVERT => 1 << 13,
            NEWARRAY_T => 1 << 9,
            CALLT => 1 << 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_every_assigned_byte() {
        let mut assigned = 0;
        for byte in 0..=0xFFu8 {
            if let Ok(op) = OpCode::from_byte(byte) {
                assert_eq!(op as u8, byte);
                assigned += 1;
            }
        }
        // 196 opcodes are assigned in the N3 instruction set.
        assert_eq!(assigned, 196);
    }

    #[test]
    fn test_known_values() {
        assert_eq!(OpCode::PUSH1 as u8, 0x11);
        assert_eq!(OpCode::ADD as u8, 0x9E);
        assert_eq!(OpCode::SYSCALL as u8, 0x41);
        assert_eq!(OpCode::RET as u8, 0x40);
        assert!(OpCode::from_byte(0x42).is_err());
        assert!(OpCode::from_byte(0xFF).is_err());
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(OpCode::PUSHINT256.operand_size(), 32);
        assert_eq!(OpCode::TRY.operand_size(), 2);
        assert_eq!(OpCode::TRY_L.operand_size(), 8);
        assert_eq!(OpCode::SYSCALL.operand_size(), 4);
        assert_eq!(OpCode::PUSHDATA1.operand_prefix(), 1);
        assert_eq!(OpCode::ADD.operand_size(), 0);
    }

    #[test]
    fn test_free_opcodes() {
        assert_eq!(OpCode::RET.price(), 0);
        assert_eq!(OpCode::SYSCALL.price(), 0);
        assert!(OpCode::ADD.price() > 0);
    }
}
