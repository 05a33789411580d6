//! Ledger errors and the verification-result lattice.

use thiserror::Error;

/// Outcome of offering a block or transaction to the ledger.
///
/// This is a value, not an error: every variant is an expected answer
/// and callers route on it (penalize the peer, park the entity, count a
/// duplicate).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyResult {
    /// Accepted.
    Succeed,
    /// The chain already holds this entity.
    AlreadyExists,
    /// The mempool already holds this transaction.
    AlreadyInPool,
    /// Prerequisite state is missing (a future block); retryable.
    UnableToVerify,
    /// Rejected with a reason; the delivering peer is at fault.
    Invalid(String),
    /// A conflicts attribute clashed with a pooled or chained entity.
    HasConflicts,
    /// `valid_until_block` has passed.
    Expired,
    /// Fees are not covered by the sender's GAS.
    InsufficientFunds,
    /// Rejected by a policy rule.
    PolicyFailed(String),
    /// The mempool is full and the fee does not displace anything.
    OutOfMemory,
}

impl VerifyResult {
    /// True only for `Succeed`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, VerifyResult::Succeed)
    }
}

/// Hard failures inside the pipeline itself.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Store layer failed
    #[error("Storage error: {0}")]
    Storage(#[from] neo_store::StoreError),

    /// Contract layer failed outside a transaction's own execution
    #[error("Execution error: {0}")]
    Contract(#[from] neo_contract::ContractError),

    /// Entity decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] neo_types::TypeError),

    /// A system script (OnPersist / PostPersist) faulted
    #[error("System script faulted: {0}")]
    SystemScriptFault(String),

    /// Batch import aborted
    #[error("Import aborted at block {index}: {reason}")]
    ImportAborted {
        /// Height of the failing block.
        index: u32,
        /// Why it failed.
        reason: String,
    },
}
