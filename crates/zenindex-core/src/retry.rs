//! Fixed-spacing retry for upstream RPCs.

use std::future::Future;
use std::time::Duration;

use crate::error::IndexerError;

/// Retry policy for upstream fetches: a fixed number of attempts with a
/// constant delay between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, counting the first try.
    pub attempts: u32,
    /// Delay between attempts.
    pub spacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, spacing: Duration::from_secs(60) }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, spacing: Duration) -> Self {
        Self { attempts, spacing }
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted,
/// returning the last error. `what` names the operation for log lines.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, IndexerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IndexerError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.attempts => {
                tracing::warn!(
                    attempt,
                    max = policy.attempts,
                    error = %err,
                    "{what} failed, retrying"
                );
                tokio::time::sleep(policy.spacing).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
