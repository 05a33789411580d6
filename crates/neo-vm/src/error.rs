//! VM error types. An error reaching the main loop faults the engine and
//! becomes its human-readable fault reason.

use thiserror::Error;

/// Conditions that fault the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Opcode byte is unassigned
    #[error("Invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Operand ran past the script end or is malformed
    #[error("Invalid operand at position {0}")]
    InvalidOperand(usize),

    /// A pop or peek found too few items
    #[error("Stack underflow")]
    StackUnderflow,

    /// The reference counter passed the stack-size limit
    #[error("Exceeds max stack size")]
    StackOverflow,

    /// Jump or pointer target outside the script
    #[error("Invalid jump target {0}")]
    InvalidJump(i64),

    /// Slot index outside the initialized slot array
    #[error("Slot index {index} out of range (len {len})")]
    SlotOutOfRange {
        /// Requested index
        index: usize,
        /// Slot array length
        len: usize,
    },

    /// Slot array initialized twice or used before INITSLOT
    #[error("Slot misuse: {0}")]
    SlotMisuse(String),

    /// Division or modulo by zero
    #[error("Division by zero")]
    DivideByZero,

    /// Negative exponent or shift
    #[error("Negative exponent or shift")]
    NegativeExponent,

    /// Arithmetic result outside 256 bits
    #[error("Integer out of range")]
    IntegerOverflow,

    /// Operand has the wrong stack-item type
    #[error("Invalid type for operation: expected {expected}, got {actual}")]
    InvalidType {
        /// What the opcode required
        expected: &'static str,
        /// What was on the stack
        actual: &'static str,
    },

    /// Type conversion not in the coercion table
    #[error("Invalid conversion to {0}")]
    InvalidConversion(&'static str),

    /// An item grew past `max_item_size`
    #[error("Item exceeds max size: {0} bytes")]
    ItemTooLarge(usize),

    /// Invocation stack grew past the nesting limit
    #[error("Invocation stack overflow")]
    InvocationOverflow,

    /// Script longer than `max_script_length`
    #[error("Script too long: {0} bytes")]
    ScriptTooLong(usize),

    /// Gas budget exhausted
    #[error("Insufficient gas")]
    OutOfGas,

    /// TRY with neither catch nor finally target
    #[error("TRY without catch or finally")]
    BadTryBlock,

    /// ENDTRY / ENDFINALLY outside an exception frame
    #[error("No active exception frame")]
    NoTryFrame,

    /// Exception-frame nesting limit exceeded
    #[error("TRY nesting too deep")]
    TryNestingOverflow,

    /// ABORT (or ABORTMSG) executed
    #[error("Abort: {0}")]
    Aborted(String),

    /// ASSERT (or ASSERTMSG) failed
    #[error("Assertion failed: {0}")]
    AssertFailed(String),

    /// THROW left an exception no frame caught
    #[error("Uncaught exception: {0}")]
    UncaughtException(String),

    /// SYSCALL number has no handler
    #[error("Unknown syscall 0x{0:08x}")]
    UnknownSyscall(u32),

    /// A syscall handler rejected the call
    #[error("Syscall failed: {0}")]
    SyscallFailed(String),

    /// Key type not permitted in a map
    #[error("Map keys must be primitive")]
    InvalidMapKey,

    /// Compound operation on the wrong container
    #[error("Invalid container operation: {0}")]
    InvalidContainerOp(String),
}
