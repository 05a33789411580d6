//! # Neo Store - State Persistence
//!
//! The ordered key-value surface everything above persists through:
//!
//! - [`Store`]: the backend trait (get / put / delete / seek / atomic
//!   batch), implemented by [`MemoryStore`] for tests and
//!   [`RocksDbStore`] for production.
//! - [`DataCache`]: a snapshotable write-back cache layered over a store
//!   (or over another cache); block persistence executes against a cache
//!   and commits one atomic batch.
//! - [`MptTrie`]: the content-addressed Merkle Patricia Trie producing
//!   the per-block state root.

#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod keys;
pub mod memory;
pub mod mpt;
pub mod rocks;
pub mod store;

pub use cache::{DataCache, TrackState};
pub use error::StoreError;
pub use keys::{StorageItem, StorageKey};
pub use memory::MemoryStore;
pub use mpt::{verify_proof, MptNode, MptTrie, MPT_PREFIX};
pub use rocks::RocksDbStore;
pub use store::{BatchOp, SeekDirection, Store, WriteBatch};
