//! Error types for the indexing engine.

use thiserror::Error;

/// Errors that can occur while indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Underlying store I/O failure. Fatal when it occurs during a commit.
    #[error("store I/O error: {0}")]
    StoreIo(String),

    /// On-disk schema does not match this build. A reindex rewrites every
    /// indexer's key layout, so there is no in-place migration path.
    #[error(
        "schema version mismatch: database has version {on_disk}, this build \
         expects {expected}; delete the database directory and reindex"
    )]
    VersionMismatch { on_disk: u32, expected: u32 },

    /// The 16-bit service prefix space is exhausted.
    #[error("service prefix space exhausted")]
    PrefixExhausted,

    /// A service declaration violates the plugin contract.
    #[error("service contract violation in '{service}': {reason}")]
    ServiceContract { service: String, reason: String },

    /// The declared service dependencies contain a cycle.
    #[error("service dependency cycle involving '{0}'")]
    DependencyCycle(String),

    /// A block handler failed; the block apply is aborted with nothing
    /// committed, and the failure is fatal to the sync driver.
    #[error("handler failure in '{service}': {reason}")]
    HandlerFailure { service: String, reason: String },

    /// Transient upstream RPC failure (retryable).
    #[error("upstream RPC error: {0}")]
    Upstream(String),

    /// The upstream node could not supply required data after retries.
    #[error("upstream node lost: {0}")]
    UpstreamLost(String),

    /// A reorg could not be completed. The tip still names a previously
    /// connected block, so restart resumes from wherever it stands.
    #[error("reorg failed at {hash} (height {height}): {reason}")]
    ReorgFailed {
        hash: crate::types::BlockHash,
        height: u32,
        reason: String,
    },

    /// Local lookup miss, surfaced to API callers.
    #[error("not found")]
    NotFound,

    /// The upstream node rejected a transaction broadcast.
    #[error("broadcast rejected: {0}")]
    Broadcast(String),
}

impl IndexerError {
    /// Returns `true` if the error could leave tip and indexer state
    /// inconsistent and must shut the node down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreIo(_)
                | Self::VersionMismatch { .. }
                | Self::PrefixExhausted
                | Self::ServiceContract { .. }
                | Self::DependencyCycle(_)
                | Self::HandlerFailure { .. }
                | Self::UpstreamLost(_)
                | Self::ReorgFailed { .. }
        )
    }

    /// Returns `true` for transient failures worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::NotFound)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
