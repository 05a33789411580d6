//! # Neo VM - Execution Engine
//!
//! A deterministic stack machine. Scripts are flat byte arrays of
//! one-byte opcodes with inline operands; execution walks an invocation
//! stack of contexts, each holding its own instruction pointer, slots
//! and exception-handler frames. Arithmetic is arbitrary-precision but
//! bounded to 256 bits; every instruction is gas-metered; compound
//! items are cycle-safe through a per-engine reference counter.
//!
//! The machine is host-agnostic: `SYSCALL` and `CALLT` route through the
//! [`InteropHost`] trait, which the smart-contract layer implements.

#![warn(clippy::all)]

pub mod context;
pub mod engine;
pub mod error;
pub mod limits;
pub mod opcode;
pub mod reference_counter;
pub mod script;
pub mod stack_item;

pub use context::{ExceptionFrame, ExecutionContext, TryState};
pub use engine::{ExecutionEngine, InteropHost, NullHost, VMState};
pub use error::VmError;
pub use limits::ExecutionEngineLimits;
pub use opcode::OpCode;
pub use script::{Instruction, Script};
pub use stack_item::{ItemType, StackItem};
