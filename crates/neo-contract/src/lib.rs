//! # Neo Contract - Application Engine & Native Contracts
//!
//! The host surface scripts execute against. [`ApplicationEngine`] wraps
//! the VM with a trigger, a call-flags mask per frame, a state snapshot,
//! notifications and the `System.*` syscall table. The native contracts
//! (ledger index, NEO / GAS accounting, policy, role designation,
//! contract registry, oracle, notary) are in-process implementations
//! reached through the same call interface as deployed contracts; the
//! set is closed at compile time.

#![warn(clippy::all)]

pub mod call_flags;
pub mod contract_state;
pub mod engine;
pub mod error;
pub mod item_serializer;
pub mod natives;
pub mod syscalls;
pub mod trigger;

pub use call_flags::CallFlags;
pub use contract_state::{ContractState, NefFile};
pub use engine::{ApplicationEngine, LogEvent, NotifyEvent};
pub use error::ContractError;
pub use natives::{native_contract_hash, NativeContract, NativeRegistry};
pub use trigger::TriggerType;
