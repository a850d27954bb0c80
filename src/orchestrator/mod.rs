//! The perpetual scheduling loop
//!
//! Every `poll_interval` the loop:
//!
//! 1. starts an EPG refresh when the refresh interval has elapsed,
//! 2. starts a liveness check of all active channels when one is scheduled,
//! 3. deletes channels past the retention window when retention is enabled,
//! 4. dispatches a scrape for every due source that is not already in flight.
//!
//! Scrapes, refreshes and checks run as tasks; the loop itself only decides.
//! Cancelling the token ends the loop, gives running tasks `shutdown_grace`
//! to finish, aborts the rest and clears the in-flight set.

pub mod in_flight;
pub mod worker;

use chrono::Utc;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub use in_flight::{InFlightGuard, InFlightSet};
pub use worker::ScrapeWorker;

use crate::config::SchedulerConfig;
use crate::epg::EpgService;
use crate::errors::AppResult;
use crate::models::{AttemptOutcome, Source};
use crate::repositories::Repositories;
use crate::sources::Scraper;
use crate::status::StatusChecker;
use crate::utils::retry::{with_retry, RetryConfig};

/// Stale channel cleanup runs at most this often
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

struct EpgSchedule {
    service: Arc<EpgService>,
    interval: Duration,
}

struct StatusSchedule {
    checker: Arc<StatusChecker>,
    interval: Duration,
    running: Arc<Mutex<()>>,
}

/// When each periodic job last started
#[derive(Default)]
struct LastRuns {
    epg_refresh: Option<Instant>,
    status_check: Option<Instant>,
    cleanup: Option<Instant>,
}

fn elapsed(last: Option<Instant>, every: Duration) -> bool {
    last.map_or(true, |at| at.elapsed() >= every)
}

pub struct Orchestrator {
    repositories: Repositories,
    worker: ScrapeWorker,
    config: SchedulerConfig,
    retry: RetryConfig,
    in_flight: InFlightSet,
    scrape_permits: Arc<Semaphore>,
    epg: Option<EpgSchedule>,
    status: Option<StatusSchedule>,
}

impl Orchestrator {
    pub fn new(repositories: Repositories, scraper: Arc<dyn Scraper>, config: SchedulerConfig) -> Self {
        let retry = RetryConfig::from(&config);
        Self {
            worker: ScrapeWorker::new(repositories.clone(), scraper, retry, config.max_retries),
            repositories,
            retry,
            in_flight: InFlightSet::new(),
            scrape_permits: Arc::new(Semaphore::new(config.max_concurrent_scrapes.max(1))),
            config,
            epg: None,
            status: None,
        }
    }

    /// Refresh EPG data every `interval`
    pub fn with_epg_refresh(mut self, service: Arc<EpgService>, interval: Duration) -> Self {
        self.epg = Some(EpgSchedule { service, interval });
        self
    }

    /// Check all active channels every `interval`
    pub fn with_status_checks(mut self, checker: Arc<StatusChecker>, interval: Duration) -> Self {
        self.status = Some(StatusSchedule {
            checker,
            interval,
            running: Arc::new(Mutex::new(())),
        });
        self
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Loop until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> AppResult<()> {
        info!(
            "Starting orchestrator (poll every {:?}, rescrape after {:?}, max {} retries)",
            self.config.poll_interval, self.config.rescrape_interval, self.config.max_retries
        );

        // tokio panics on a zero period
        let mut ticker = interval(self.config.poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();
        let mut last_runs = LastRuns::default();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    trace!("Orchestrator tick");
                    reap_finished(&mut tasks);
                    self.start_periodic_jobs(&mut last_runs, &mut tasks, &cancel);
                    self.cleanup_if_due(&mut last_runs).await;
                    if let Err(e) = self.dispatch_due(&mut tasks).await {
                        error!("Scheduler cycle failed, retrying next tick: {}", e);
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Orchestrator received cancellation signal");
                    break;
                }
            }
        }

        self.shutdown(tasks).await;
        info!("Orchestrator stopped");
        Ok(())
    }

    /// Dispatch every due source and wait for all of them to finish
    pub async fn run_once(&self) -> AppResult<Vec<(String, AttemptOutcome)>> {
        let mut tasks = JoinSet::new();
        self.spawn_due(&mut tasks, |url, outcome| (url, outcome)).await?;

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Scrape task failed: {}", e),
            }
        }
        Ok(outcomes)
    }

    /// Spawn a scrape for every due source not already in flight
    pub async fn dispatch_due(&self, tasks: &mut JoinSet<()>) -> AppResult<usize> {
        self.spawn_due(tasks, |_, _| ()).await
    }

    /// Each spawned task holds the source's in-flight guard until `finish`
    /// has turned the attempt outcome into the task output.
    async fn spawn_due<T, F>(&self, tasks: &mut JoinSet<T>, finish: F) -> AppResult<usize>
    where
        T: Send + 'static,
        F: Fn(String, AttemptOutcome) -> T + Clone + Send + 'static,
    {
        let due = self.list_due().await?;
        let mut dispatched = 0;

        for source in due {
            let Some(guard) = self.in_flight.try_acquire(&source.url) else {
                debug!("Source {} already in flight, skipping", source.url);
                continue;
            };
            let worker = self.worker.clone();
            let permits = self.scrape_permits.clone();
            let finish = finish.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let outcome = worker.process(source).await;
                let output = finish(guard.url().to_string(), outcome);
                drop(guard);
                output
            });
            dispatched += 1;
        }

        if dispatched > 0 {
            debug!(
                "Dispatched {} scrapes ({} in flight)",
                dispatched,
                self.in_flight.len()
            );
        }
        Ok(dispatched)
    }

    async fn list_due(&self) -> AppResult<Vec<Source>> {
        let now = Utc::now();
        let due = with_retry(
            &self.retry,
            || {
                self.repositories.sources.list_due(
                    now,
                    self.config.rescrape_interval,
                    self.config.max_retries,
                )
            },
            "list_due",
        )
        .await?;
        Ok(due)
    }

    fn start_periodic_jobs(
        &self,
        last_runs: &mut LastRuns,
        tasks: &mut JoinSet<()>,
        cancel: &CancellationToken,
    ) {
        if let Some(epg) = &self.epg {
            if elapsed(last_runs.epg_refresh, epg.interval) && !epg.service.is_running() {
                last_runs.epg_refresh = Some(Instant::now());
                let service = epg.service.clone();
                tasks.spawn(async move {
                    match service.refresh().await {
                        Ok(Some(report)) => debug!(
                            "Scheduled EPG refresh finished: {} feeds ok, {} failed",
                            report.feeds_ok, report.feeds_failed
                        ),
                        Ok(None) => debug!("EPG refresh already running"),
                        Err(e) => error!("Scheduled EPG refresh failed: {}", e),
                    }
                });
            }
        }

        if let Some(status) = &self.status {
            if !elapsed(last_runs.status_check, status.interval) {
                return;
            }
            let Ok(running) = status.running.clone().try_lock_owned() else {
                debug!("Status check still running, not starting another");
                return;
            };
            last_runs.status_check = Some(Instant::now());

            let checker = status.checker.clone();
            let repositories = self.repositories.clone();
            let retry = self.retry;
            let cancel = cancel.child_token();
            tasks.spawn(async move {
                let _running = running;
                let channels = match with_retry(
                    &retry,
                    || repositories.channels.list_active_channels(),
                    "list_active_channels",
                )
                .await
                {
                    Ok(channels) => channels,
                    Err(e) => {
                        error!("Could not load channels for status check: {}", e);
                        return;
                    }
                };
                checker.check_all(&channels, &cancel).await;
            });
        }
    }

    async fn cleanup_if_due(&self, last_runs: &mut LastRuns) {
        let Some(retention) = self.config.channel_retention else {
            return;
        };
        if !elapsed(last_runs.cleanup, CLEANUP_INTERVAL) {
            return;
        }
        last_runs.cleanup = Some(Instant::now());

        let retention = match chrono::Duration::from_std(retention) {
            Ok(retention) => retention,
            Err(e) => {
                warn!("Channel retention {:?} out of range: {}", retention, e);
                return;
            }
        };
        let cutoff = Utc::now() - retention;
        match with_retry(
            &self.retry,
            || self.repositories.channels.delete_stale(cutoff),
            "delete_stale",
        )
        .await
        {
            Ok(0) => trace!("No stale channels"),
            Ok(removed) => info!("Removed {} channels not seen since {}", removed, cutoff),
            Err(e) => error!("Stale channel cleanup failed: {}", e),
        }
    }

    async fn shutdown(&self, mut tasks: JoinSet<()>) {
        if !tasks.is_empty() {
            info!(
                "Waiting up to {:?} for {} running tasks",
                self.config.shutdown_grace,
                tasks.len()
            );
            let drained = tokio::time::timeout(self.config.shutdown_grace, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!("Abandoning {} tasks still running after grace period", tasks.len());
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
            }
        }
        self.in_flight.clear();
    }
}

/// Collect finished tasks so panics are logged and memory released
fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(Some(joined)) = tasks.join_next().now_or_never() {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Background task panicked: {}", e);
            }
        }
    }
}
