//! Sync driver — the state machine that keeps the local chain at the
//! upstream tip.
//!
//! # States
//!
//! - **Idle** — local tip equals upstream tip; waiting for a tick.
//! - **Syncing** — applying the next upstream block, one at a time.
//! - **Reorging** — the fetched block did not extend the local tip; the
//!   reorg handler rewinds the orphaned suffix, then syncing resumes and
//!   replays the winning branch.
//! - **Stopping** — terminal; the in-flight batch settles, then the driver
//!   exits.
//!
//! Only one apply is ever in flight: the driver is the single commit task.
//! Parallelism exists only inside one block's concurrent-handler fan-out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};

use crate::applier::BlockApplier;
use crate::client::{BlockRef, UpstreamClient};
use crate::error::IndexerError;
use crate::reorg;
use crate::retry::{retry, RetryPolicy};
use crate::tip::TipBookkeeper;

/// Driver tuning. The defaults match production behavior; tests compress
/// the intervals.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often to poll the upstream tip absent a new-tip signal.
    pub poll_interval: Duration,
    /// Retry policy for upstream fetches (3 × 60 s, then fatal).
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(10), retry: RetryPolicy::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Reorging,
    Stopping,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Syncing => write!(f, "syncing"),
            Self::Reorging => write!(f, "reorging"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

pub struct SyncDriver {
    client: Arc<dyn UpstreamClient>,
    applier: Arc<BlockApplier>,
    tip: Arc<TipBookkeeper>,
    config: SyncConfig,
    state: SyncState,
    tip_signal: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
}

impl SyncDriver {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        applier: Arc<BlockApplier>,
        tip: Arc<TipBookkeeper>,
        config: SyncConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            applier,
            tip,
            config,
            state: SyncState::Idle,
            tip_signal: Arc::new(Notify::new()),
            shutdown,
        }
    }

    /// Handle the embedding node wires to the upstream's new-tip events.
    pub fn tip_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.tip_signal)
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    fn set_state(&mut self, next: SyncState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "sync state transition");
            self.state = next;
        }
    }

    /// Drive until a stop signal or a fatal error.
    pub async fn run(mut self) -> Result<(), IndexerError> {
        tracing::info!("sync driver running");
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = self.shutdown.changed() => {
                    // A closed channel means the supervisor is gone.
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = self.tip_signal.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            if *self.shutdown.borrow() {
                break;
            }
            if let Err(err) = self.sync_to_tip().await {
                tracing::error!(error = %err, "sync failed, requesting node shutdown");
                self.set_state(SyncState::Stopping);
                return Err(err);
            }
        }
        self.set_state(SyncState::Stopping);
        tracing::info!("sync driver stopped");
        Ok(())
    }

    /// Walk the local chain forward, one block per commit, until it matches
    /// the upstream tip or a stop is requested.
    pub async fn sync_to_tip(&mut self) -> Result<(), IndexerError> {
        loop {
            if *self.shutdown.borrow() {
                self.set_state(SyncState::Stopping);
                return Ok(());
            }
            let local = self.tip.serial_tip().ok_or_else(|| {
                IndexerError::StoreIo("tip record missing; node was not bootstrapped".into())
            })?;

            let client = Arc::clone(&self.client);
            let (up_hash, up_height) = retry(&self.config.retry, "fetch upstream tip", || {
                let client = Arc::clone(&client);
                async move { client.get_tip().await }
            })
            .await
            .map_err(|err| {
                IndexerError::UpstreamLost(format!("cannot reach upstream node: {err}"))
            })?;

            if up_hash == local.hash {
                self.set_state(SyncState::Idle);
                return Ok(());
            }

            if up_height > local.height {
                let next_height = local.height + 1;
                let next = retry(&self.config.retry, "fetch next block", || {
                    let client = Arc::clone(&client);
                    async move { client.get_block(BlockRef::Height(next_height)).await }
                })
                .await
                .map_err(|err| {
                    IndexerError::UpstreamLost(format!(
                        "upstream cannot supply block at height {next_height}: {err}"
                    ))
                })?;

                if next.extends(&local) {
                    self.set_state(SyncState::Syncing);
                    self.applier.apply(&next, true).await?;
                    continue;
                }
            }

            // The local tip is not on the upstream chain: rewind, then let
            // the loop replay the winning branch (and re-detect any further
            // divergence that happened meanwhile).
            self.set_state(SyncState::Reorging);
            let summary =
                reorg::handle_reorg(&self.client, &self.applier, &self.tip, &self.config.retry)
                    .await?;
            tracing::warn!(
                depth = summary.depth,
                ancestor = %summary.ancestor,
                "reorg complete, resuming forward sync"
            );
            self.set_state(SyncState::Syncing);
        }
    }
}
