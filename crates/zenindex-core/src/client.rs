//! The upstream node contract.
//!
//! The trusted full node is the source of truth for blocks and transactions;
//! the engine only ever consumes it through this trait. Production
//! implementations wrap the node's RPC surface; tests drive the engine with
//! programmable mocks.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{Block, BlockHash, Txid};

/// Identifies a block by hash or by height on the upstream main chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Hash(BlockHash),
    Height(u32),
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash(h) => write!(f, "{h}"),
            Self::Height(h) => write!(f, "height {h}"),
        }
    }
}

/// One entry of the upstream node's block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIndexEntry {
    pub prev_hash: BlockHash,
    pub height: u32,
}

/// RPC surface of the upstream node, as consumed by the engine.
///
/// `get_block` by hash must also serve blocks that are no longer on the
/// upstream main chain (the node keeps orphaned blocks in its index); the
/// reorg handler relies on this to fetch the local suffix it disconnects.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Hash and height of the upstream chain tip.
    async fn get_tip(&self) -> Result<(BlockHash, u32), IndexerError>;

    /// Fetch a full block. `NotFound` when the upstream cannot supply it.
    async fn get_block(&self, block: BlockRef) -> Result<Block, IndexerError>;

    /// Look up a block's index entry; `None` when the hash is unknown.
    async fn get_block_index(
        &self,
        hash: BlockHash,
    ) -> Result<Option<BlockIndexEntry>, IndexerError>;

    /// Transaction ids currently in the upstream mempool.
    async fn get_mempool(&self) -> Result<Vec<Txid>, IndexerError>;

    /// Raw bytes of a transaction, optionally searching the mempool.
    async fn get_raw_transaction(
        &self,
        txid: Txid,
        include_mempool: bool,
    ) -> Result<Vec<u8>, IndexerError>;

    /// Broadcast a raw transaction; `Broadcast` on rejection.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Txid, IndexerError>;

    /// Fee estimate in satoshis per kilobyte for confirmation within
    /// `blocks` blocks.
    async fn estimate_fee(&self, blocks: u32) -> Result<u64, IndexerError>;
}
