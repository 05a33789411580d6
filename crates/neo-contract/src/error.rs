//! Contract-layer errors. Reaching the VM boundary they become fault
//! reasons.

use thiserror::Error;

/// Errors raised by syscalls and native contract methods.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The caller's call-flags mask lacks a required flag
    #[error("Missing call flags: need {needed:#04x}, have {have:#04x}")]
    MissingCallFlags {
        /// Flags the method declares.
        needed: u8,
        /// Flags the current frame holds.
        have: u8,
    },

    /// Target contract does not exist
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    /// Target method does not exist on the contract
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// A method was called with the wrong arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not allowed under the current trigger
    #[error("Invalid trigger for operation")]
    InvalidTrigger,

    /// The required witness was not provided
    #[error("Check witness failed")]
    CheckWitnessFailed,

    /// Token amounts were negative or overflowed
    #[error("Invalid token amount: {0}")]
    InvalidAmount(String),

    /// Balance too low for the requested transfer or burn
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Storage layer failure
    #[error("Storage error: {0}")]
    Storage(#[from] neo_store::StoreError),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] neo_types::TypeError),

    /// VM-level failure inside a nested execution
    #[error("Execution error: {0}")]
    Execution(#[from] neo_vm::VmError),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl From<ContractError> for neo_vm::VmError {
    fn from(error: ContractError) -> Self {
        match error {
            ContractError::Execution(inner) => inner,
            other => neo_vm::VmError::SyscallFailed(other.to_string()),
        }
    }
}
