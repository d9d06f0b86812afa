//! zenindex-storage — persistent store backends.
//!
//! The production backend is RocksDB: an ordered byte-keyed engine with
//! atomic write batches, which is exactly the contract
//! [`zenindex_core::Store`] demands. The in-memory backend for tests lives
//! in `zenindex-core` next to the trait.

pub mod rocks;

pub use rocks::RocksStore;
