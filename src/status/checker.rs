//! Chunked, concurrency-bounded liveness checker
//!
//! Channels are probed in chunks of `chunk_size`. Inside a chunk at most
//! `concurrency` probes are in flight; between chunks the checker pauses for
//! `chunk_pause` so the engine is not flooded. Each probe writes only the
//! liveness fields of its channel.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{LivenessProbe, ProbeVerdict};
use crate::config::CheckerConfig;
use crate::models::{Channel, CheckResult};
use crate::repositories::ChannelRepository;
use crate::utils::retry::{with_retry, RetryConfig};

/// Aggregate result of one `check_all` run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckSummary {
    pub results: Vec<CheckResult>,
    /// Channels that were probed
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    /// Probes that ended without a classification
    pub errors: usize,
    /// Channels never probed because the run was cancelled
    pub skipped: usize,
}

impl CheckSummary {
    fn record(&mut self, result: CheckResult, classified: bool) {
        self.total += 1;
        match (classified, result.is_online) {
            (false, _) => self.errors += 1,
            (true, true) => self.online += 1,
            (true, false) => self.offline += 1,
        }
        self.results.push(result);
    }
}

pub struct StatusChecker {
    probe: Arc<dyn LivenessProbe>,
    channels: Arc<dyn ChannelRepository>,
    config: CheckerConfig,
    retry: RetryConfig,
}

impl StatusChecker {
    pub fn new(
        probe: Arc<dyn LivenessProbe>,
        channels: Arc<dyn ChannelRepository>,
        config: CheckerConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            probe,
            channels,
            config,
            retry,
        }
    }

    /// Probe every channel and record its liveness.
    ///
    /// Cancelling `cancel` stops new probes from being launched. Probes that
    /// already started run to completion and are part of the summary.
    pub async fn check_all(&self, channels: &[Channel], cancel: &CancellationToken) -> CheckSummary {
        let chunk_size = self.config.chunk_size.max(1);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut summary = CheckSummary::default();
        let chunk_count = channels.len().div_ceil(chunk_size);

        info!(
            "Checking {} channels in {} chunks (concurrency {})",
            channels.len(),
            chunk_count,
            self.config.concurrency
        );

        for (index, chunk) in channels.chunks(chunk_size).enumerate() {
            let mut launched: Vec<(String, JoinHandle<CheckResult>)> = Vec::with_capacity(chunk.len());

            for channel in chunk {
                if cancel.is_cancelled() {
                    break;
                }
                let permit = tokio::select! {
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                    _ = cancel.cancelled() => break,
                };

                let probe = self.probe.clone();
                let repository = self.channels.clone();
                let retry = self.retry;
                let channel_id = channel.id.clone();
                let handle = tokio::spawn(async move {
                    let verdict = probe.probe(&channel_id).await;
                    drop(permit);
                    let result = CheckResult {
                        channel_id,
                        is_online: verdict.is_online,
                        checked_at: Utc::now(),
                        error: verdict.error,
                    };
                    store_result(repository.as_ref(), &retry, &result).await;
                    result
                });
                launched.push((channel.id.clone(), handle));
            }

            let launched_count = launched.len();
            for (channel_id, handle) in launched {
                match handle.await {
                    Ok(result) => summary.record(result, true),
                    Err(e) => {
                        warn!("Probe task for channel {} failed: {}", channel_id, e);
                        let verdict = ProbeVerdict::offline(format!("probe task failed: {e}"));
                        let result = CheckResult {
                            channel_id,
                            is_online: verdict.is_online,
                            checked_at: Utc::now(),
                            error: verdict.error,
                        };
                        store_result(self.channels.as_ref(), &self.retry, &result).await;
                        summary.record(result, false);
                    }
                }
            }

            if launched_count < chunk.len() || cancel.is_cancelled() {
                summary.skipped = channels.len() - summary.total;
                info!(
                    "Status check cancelled after {} of {} channels",
                    summary.total,
                    channels.len()
                );
                return summary;
            }

            if index + 1 < chunk_count && !self.config.chunk_pause.is_zero() {
                debug!(
                    "Chunk {}/{} done, pausing {:?}",
                    index + 1,
                    chunk_count,
                    self.config.chunk_pause
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.config.chunk_pause) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        info!(
            "Status check complete: {} online, {} offline, {} errors out of {}",
            summary.online, summary.offline, summary.errors, summary.total
        );
        summary
    }

    /// Probe a single channel and record the outcome
    pub async fn check_channel(&self, channel_id: &str) -> CheckResult {
        let verdict = self.probe.probe(channel_id).await;
        let result = CheckResult {
            channel_id: channel_id.to_string(),
            is_online: verdict.is_online,
            checked_at: Utc::now(),
            error: verdict.error,
        };
        store_result(self.channels.as_ref(), &self.retry, &result).await;
        result
    }
}

async fn store_result(repository: &dyn ChannelRepository, retry: &RetryConfig, result: &CheckResult) {
    if let Err(e) = with_retry(retry, || repository.update_liveness(result), "update_liveness").await {
        warn!(
            "Could not record liveness of channel {}: {}",
            result.channel_id, e
        );
    }
}
