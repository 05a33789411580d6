//! Network layer errors.

use thiserror::Error;

/// Hard failures in the protocol layer (validation rejections are
/// values, not errors; see `ValidationResult`).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// Payload decoding failed
    #[error("Payload decode error: {0}")]
    Decode(String),

    /// A task id was not found in the session
    #[error("Unknown task {0}")]
    UnknownTask(u64),

    /// Session is at its concurrent-task bound
    #[error("Task queue full")]
    TaskQueueFull,
}

impl From<neo_types::TypeError> for NetworkError {
    fn from(error: neo_types::TypeError) -> Self {
        NetworkError::Decode(error.to_string())
    }
}
