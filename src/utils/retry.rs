//! Bounded retry for storage operations
//!
//! Only errors classified as transient (locked or busy database, exhausted
//! pool, I/O) are retried. Anything else, or the last transient error once
//! attempts run out, is returned to the caller.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::SchedulerConfig;
use crate::errors::RepositoryResult;

/// Configuration for storage retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<&SchedulerConfig> for RetryConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.storage_retry_attempts.max(1),
            backoff: config.storage_retry_backoff,
        }
    }
}

/// Execute a storage operation with retry logic
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
    operation_name: &str,
) -> RepositoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RepositoryResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "Storage operation '{}' succeeded on attempt {}/{}",
                        operation_name, attempt, max_attempts
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_transient() => {
                debug!(
                    "Storage operation '{}' failed with non-retryable error: {}",
                    operation_name, err
                );
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(
                    "Storage operation '{}' failed after {} attempts: {}",
                    operation_name, max_attempts, err
                );
                return Err(err);
            }
            Err(err) => {
                warn!(
                    "Storage operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                    operation_name, attempt, max_attempts, config.backoff, err
                );
                sleep(config.backoff).await;
                attempt += 1;
            }
        }
    }
}
