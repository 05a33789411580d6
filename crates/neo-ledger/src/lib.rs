//! # Neo Ledger - Block Pipeline
//!
//! Everything between "bytes arrived from a peer" and "state root
//! committed": block and transaction verification, the fee-ordered
//! mempool with conflict resolution, genesis construction, and atomic
//! block persistence driving the application engine's OnPersist /
//! Application / PostPersist runs.

#![warn(clippy::all)]

pub mod blockchain;
pub mod error;
pub mod genesis;
pub mod mempool;
pub mod verification;

pub use blockchain::{ApplicationExecuted, Blockchain, LedgerConfig};
pub use error::{LedgerError, VerifyResult};
pub use mempool::Mempool;
