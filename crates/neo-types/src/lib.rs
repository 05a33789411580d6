//! # Neo Types - Shared Ledger Entities
//!
//! The single source of truth for the entities every subsystem exchanges:
//! primitive identifiers (`Hash160`, `Hash256`, `Fixed8`), the
//! little-endian wire codec, blocks, transactions, witnesses, contract
//! manifests and protocol settings.
//!
//! ## Wire format
//!
//! All integers are little-endian. Variable-length values use the varint
//! scheme (`< 0xFD` direct, then `0xFD`+u16 / `0xFE`+u32 / `0xFF`+u64).
//! Every entity implements [`Serializable`] against `BinaryReader` /
//! `BinaryWriter`; entity hashes are always computed over the unsigned
//! serialization, so witness mutation can never change an identity.

#![warn(clippy::all)]

pub mod attribute;
pub mod block;
pub mod contract_script;
pub mod error;
pub mod fixed8;
pub mod hashes;
pub mod io;
pub mod manifest;
pub mod settings;
pub mod signer;
pub mod transaction;
pub mod witness;

pub use attribute::TransactionAttribute;
pub use block::{Block, Header};
pub use error::TypeError;
pub use fixed8::Fixed8;
pub use hashes::{Hash160, Hash256};
pub use io::{BinaryReader, BinaryWriter, Serializable};
pub use manifest::ContractManifest;
pub use settings::ProtocolSettings;
pub use signer::Signer;
pub use transaction::Transaction;
pub use witness::{Witness, WitnessRule, WitnessScopes};
