//! # Neo Network - Message Validation & Task Coordination
//!
//! The protocol layer between the socket transport (out of scope) and
//! the ledger: 24-byte frame parsing with per-command size caps and
//! checksums, typed payloads for the command set, and the per-peer
//! `TaskSession` deciding what to request from a peer next.

#![warn(clippy::all)]

pub mod error;
pub mod message;
pub mod payloads;
pub mod task_session;
pub mod validator;

pub use error::NetworkError;
pub use message::{Message, MessageCommand, MessageHeader, MESSAGE_HEADER_SIZE};
pub use task_session::{TaskEvent, TaskKind, TaskSession, TaskSessionConfig};
pub use validator::{MessageValidator, ValidationResult, ValidationStats};
