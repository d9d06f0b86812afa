//! Reorg handling — rewinding the local suffix after a chain reorganization.
//!
//! The sync driver detects divergence (a fetched block that does not extend
//! the local tip) and delegates here. This module only disconnects: it walks
//! backwards from the local tip until the local branch re-intersects the
//! upstream chain, disconnecting each orphaned block as its own atomic
//! batch. The driver then resumes forward application on the winning branch,
//! which also re-detects any divergence that happened meanwhile.

use std::sync::Arc;

use crate::applier::BlockApplier;
use crate::client::{BlockRef, UpstreamClient};
use crate::error::IndexerError;
use crate::retry::{retry, RetryPolicy};
use crate::tip::TipBookkeeper;
use crate::types::{Block, BlockHash, TipRecord};

/// What a completed reorg rewound.
#[derive(Debug, Clone)]
pub struct ReorgSummary {
    /// Number of blocks disconnected.
    pub depth: u32,
    /// The common ancestor the local chain was rewound to.
    pub ancestor: TipRecord,
    /// Hashes of the disconnected blocks, most recent first.
    pub dropped: Vec<BlockHash>,
}

/// Rewind the local chain to its common ancestor with the upstream chain.
///
/// Every failure here is fatal (`ReorgFailed`): a partially disconnected
/// suffix is safe on disk because each disconnect is individually atomic and
/// the tip always names a previously connected block, so a restart resumes
/// from wherever the tip stands.
pub async fn handle_reorg(
    client: &Arc<dyn UpstreamClient>,
    applier: &BlockApplier,
    tip: &TipBookkeeper,
    policy: &RetryPolicy,
) -> Result<ReorgSummary, IndexerError> {
    let start = tip
        .serial_tip()
        .ok_or_else(|| IndexerError::StoreIo("tip record missing; cannot reorg".into()))?;
    tracing::warn!(tip = %start, "chain divergence detected, searching for common ancestor");

    // Collect the orphaned local suffix, most recent first. A local block is
    // orphaned when the upstream chain carries a different block (or none at
    // all) at its height.
    let mut suffix: Vec<Block> = Vec::new();
    let mut cursor = start;
    loop {
        let upstream_at = retry(policy, "fetch upstream block by height", || {
            let client = Arc::clone(client);
            let height = cursor.height;
            async move {
                match client.get_block(BlockRef::Height(height)).await {
                    Ok(block) => Ok(Some(block)),
                    Err(err) if err.is_not_found() => Ok(None),
                    Err(err) => Err(err),
                }
            }
        })
        .await
        .map_err(|err| reorg_failed(&cursor, err))?;

        if matches!(upstream_at, Some(ref block) if block.hash == cursor.hash) {
            break;
        }
        if cursor.height == 0 {
            return Err(IndexerError::ReorgFailed {
                hash: cursor.hash,
                height: 0,
                reason: "no common ancestor with the upstream chain".into(),
            });
        }

        // The upstream node keeps orphaned blocks in its index, so the local
        // block is still fetchable by hash for disconnection.
        let local_block = retry(policy, "fetch orphaned block", || {
            let client = Arc::clone(client);
            let hash = cursor.hash;
            async move { client.get_block(BlockRef::Hash(hash)).await }
        })
        .await
        .map_err(|err| reorg_failed(&cursor, err))?;

        cursor = TipRecord::new(local_block.prev_hash, cursor.height - 1);
        suffix.push(local_block);
    }

    tracing::warn!(
        depth = suffix.len(),
        ancestor = %cursor,
        "disconnecting orphaned local suffix"
    );

    let dropped: Vec<BlockHash> = suffix.iter().map(|b| b.hash).collect();
    for block in &suffix {
        applier.apply(block, false).await.map_err(|err| match err {
            already @ IndexerError::ReorgFailed { .. } => already,
            other => IndexerError::ReorgFailed {
                hash: block.hash,
                height: block.height,
                reason: other.to_string(),
            },
        })?;
    }

    Ok(ReorgSummary { depth: suffix.len() as u32, ancestor: cursor, dropped })
}

fn reorg_failed(cursor: &TipRecord, err: IndexerError) -> IndexerError {
    match err {
        already @ IndexerError::ReorgFailed { .. } => already,
        other => IndexerError::ReorgFailed {
            hash: cursor.hash,
            height: cursor.height,
            reason: other.to_string(),
        },
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
