//! zenindex-core — the chain-indexing engine of the zenindex node daemon.
//!
//! Mirrors and augments the chain maintained by a trusted upstream full
//! node: a versioned persistent store, tip bookkeeping, a service plugin
//! framework through which indexers contribute database mutations per block,
//! a sync driver, and a reorg handler.
//!
//! # Architecture
//!
//! ```text
//! upstream node → SyncDriver → BlockApplier → ServiceRegistry fan-out
//!                     │              │                │
//!                ReorgHandler   TipBookkeeper    handler ops
//!                     │              └───────┬────────┘
//!                     └── disconnects ──► Store batch ──► EventBus
//! ```
//!
//! Blocks commit strictly in chain order; each block is one atomic batch
//! (handler ops plus both tip cursors), so a crash never leaves a block
//! half-applied.

pub mod applier;
pub mod batch;
pub mod bus;
pub mod client;
pub mod error;
pub mod registry;
pub mod reorg;
pub mod retry;
pub mod schema;
pub mod service;
pub mod store;
pub mod sync;
pub mod tip;
pub mod types;

pub use applier::BlockApplier;
pub use batch::BatchOp;
pub use bus::{Event, EventBus, Subscription, Topic};
pub use client::{BlockIndexEntry, BlockRef, UpstreamClient};
pub use error::IndexerError;
pub use registry::ServiceRegistry;
pub use reorg::ReorgSummary;
pub use retry::RetryPolicy;
pub use schema::{ServicePrefix, SCHEMA_VERSION};
pub use service::{BlockContext, Service, TxMeta};
pub use store::{MemoryStore, Store, StoreConfig};
pub use sync::{SyncConfig, SyncDriver, SyncState};
pub use tip::TipBookkeeper;
pub use types::{Block, BlockHash, TipRecord, Transaction, TxInput, TxOutput, Txid};
