//! Block applier — turns one block into one atomic store batch.
//!
//! Connect and disconnect are symmetric: every service's concurrent handler
//! fans out first (unordered), serial handlers follow in dependency order,
//! and the resulting ops are unioned with the two tip updates into a single
//! batch. Either the whole block lands or none of it does.

use std::sync::Arc;

use futures::future;

use crate::batch::BatchOp;
use crate::bus::{Event, EventBus, Topic};
use crate::error::IndexerError;
use crate::registry::ServiceRegistry;
use crate::service::BlockContext;
use crate::store::Store;
use crate::tip::TipBookkeeper;
use crate::types::Block;

pub struct BlockApplier {
    store: Arc<dyn Store>,
    registry: Arc<ServiceRegistry>,
    tip: Arc<TipBookkeeper>,
    bus: Arc<EventBus>,
}

impl BlockApplier {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ServiceRegistry>,
        tip: Arc<TipBookkeeper>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { store, registry, tip, bus }
    }

    /// Apply (`connect = true`) or invert (`connect = false`) one block's
    /// worth of index mutations.
    ///
    /// Any handler error aborts with [`IndexerError::HandlerFailure`] and
    /// nothing is committed.
    pub async fn apply(&self, block: &Block, connect: bool) -> Result<(), IndexerError> {
        let mut ops: Vec<BatchOp> = Vec::new();

        // Concurrent handlers are independent of each other by contract, so
        // they fan out unordered and join before anything is committed.
        let concurrent = self.registry.services().iter().map(|svc| {
            let svc = Arc::clone(svc);
            async move {
                svc.concurrent_block_handler(block, connect)
                    .await
                    .map_err(|err| wrap_handler_error(svc.name(), err))
            }
        });
        for handler_ops in future::try_join_all(concurrent).await? {
            if let Some(mut batch) = handler_ops {
                ops.append(&mut batch);
            }
        }

        // Serial handlers may depend on side effects of earlier serial
        // handlers, left in the per-block context.
        let mut ctx = BlockContext::new(block);
        for svc in self.registry.services() {
            let result = svc
                .block_handler(block, connect, &mut ctx)
                .await
                .map_err(|err| wrap_handler_error(svc.name(), err))?;
            if let Some(mut batch) = result {
                ops.append(&mut batch);
            }
        }

        let (record, tip_ops) = self.tip.tip_ops(block, connect)?;
        ops.extend(tip_ops);

        self.store.batch(ops)?;
        self.tip.record_committed(record);

        tracing::debug!(
            hash = %block.hash,
            height = block.height,
            connect,
            txs = block.transactions.len(),
            "block committed"
        );
        self.bus.publish(
            Topic::Block,
            Event::Block { hash: block.hash, height: block.height, connected: connect },
        );
        Ok(())
    }
}

fn wrap_handler_error(service: &str, err: IndexerError) -> IndexerError {
    match err {
        already @ IndexerError::HandlerFailure { .. } => already,
        other => IndexerError::HandlerFailure {
            service: service.to_string(),
            reason: other.to_string(),
        },
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
