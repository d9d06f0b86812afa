//! The indexer plugin contract.
//!
//! A service contributes batch operations per block, keyed under the 2-byte
//! prefix assigned to it by [`crate::schema::assign_prefix`]. Serial handlers
//! run in dependency order on the commit task and may read the per-block
//! [`BlockContext`]; concurrent handlers fan out in parallel and must be
//! independent of each other and of the context.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::batch::BatchOp;
use crate::error::IndexerError;
use crate::types::{Block, Transaction, Txid};

/// An indexer plugin.
///
/// `start` runs before the first block is applied (typically assigning the
/// service prefix); `stop` runs in reverse dependency order on shutdown.
/// Both handlers are optional: the default implementations contribute
/// nothing.
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique service name, also the key of its persisted prefix.
    fn name(&self) -> &str;

    /// Names of services whose serial handlers must run before this one's.
    fn dependencies(&self) -> &[&str] {
        &[]
    }

    async fn start(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    /// Serial per-block handler, invoked in dependency order. May read and
    /// extend the per-block context left by earlier serial handlers.
    async fn block_handler(
        &self,
        _block: &Block,
        _connect: bool,
        _ctx: &mut BlockContext,
    ) -> Result<Option<Vec<BatchOp>>, IndexerError> {
        Ok(None)
    }

    /// Parallel per-block handler, invoked unordered alongside every other
    /// service's concurrent handler. Must not depend on any other handler's
    /// side effects.
    async fn concurrent_block_handler(
        &self,
        _block: &Block,
        _connect: bool,
    ) -> Result<Option<Vec<BatchOp>>, IndexerError> {
        Ok(None)
    }
}

// ─── Per-block context ────────────────────────────────────────────────────────

/// Per-transaction decorations accumulated by serial handlers during one
/// block apply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxMeta {
    pub height: u32,
    pub timestamp: u32,
    /// Satoshi values of the transaction's inputs, in input order. Empty
    /// when no handler resolved them.
    pub input_values: Vec<u64>,
}

/// Scratch state owned by the Block Applier for the duration of one apply.
///
/// Serial handlers run exclusively on the commit task and are the only
/// readers and writers; concurrent handlers never see it. The transaction
/// position map allows intra-block forward references (an input spending an
/// output created earlier in the same block).
pub struct BlockContext {
    height: u32,
    time: u32,
    positions: HashMap<Txid, usize>,
    meta: HashMap<Txid, TxMeta>,
}

impl BlockContext {
    pub fn new(block: &Block) -> Self {
        let positions = block
            .transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| (tx.txid, i))
            .collect();
        Self { height: block.height, time: block.time, positions, meta: HashMap::new() }
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    /// Position of `txid` within the block being applied, if it is part of it.
    pub fn transaction_index(&self, txid: &Txid) -> Option<usize> {
        self.positions.get(txid).copied()
    }

    /// Look up a transaction of the current block by id.
    pub fn transaction<'b>(&self, block: &'b Block, txid: &Txid) -> Option<&'b Transaction> {
        self.transaction_index(txid).map(|i| &block.transactions[i])
    }

    pub fn annotate(&mut self, txid: Txid, meta: TxMeta) {
        self.meta.insert(txid, meta);
    }

    pub fn meta(&self, txid: &Txid) -> Option<&TxMeta> {
        self.meta.get(txid)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
