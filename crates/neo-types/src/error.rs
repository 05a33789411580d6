//! Entity and codec error types.

use thiserror::Error;

/// Errors raised while decoding or validating wire entities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// Reader ran past the end of the input
    #[error("Unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Byte offset where the read started
        offset: usize,
    },

    /// A length prefix or enum discriminant is outside its allowed range
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// An entity violated a structural rule during decode
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Trailing bytes after a complete decode
    #[error("Trailing bytes after deserialization ({0} left)")]
    TrailingBytes(usize),

    /// A hex or address string failed to parse
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Manifest JSON failed to parse or exceeded limits
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}
