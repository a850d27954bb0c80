//! EPG refresh service
//!
//! Pulls channel identities from every enabled XMLTV feed, records per-feed
//! bookkeeping, runs the matcher over all channels and commits the resulting
//! EPG field changes as one transaction. Only one refresh runs at a time.

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::matcher::{EpgMatcher, MatchOptions, ReconcileStats, Suggestion};
use super::xmltv;
use crate::config::EpgConfig;
use crate::errors::{AppError, AppResult, SourceError};
use crate::models::{EpgEntry, EpgSource};
use crate::repositories::Repositories;
use crate::utils::retry::{with_retry, RetryConfig};

/// Result of one refresh run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    pub entries: usize,
    /// `None` when no feed produced entries and matching was skipped
    pub stats: Option<ReconcileStats>,
}

pub struct EpgService {
    repositories: Repositories,
    config: EpgConfig,
    retry: RetryConfig,
    client: Client,
    running: Arc<Mutex<()>>,
}

impl EpgService {
    pub fn new(repositories: Repositories, config: EpgConfig, retry: RetryConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(concat!("acestream-scraper/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            repositories,
            config,
            retry,
            client,
            running: Arc::new(Mutex::new(())),
        })
    }

    /// Whether a refresh is currently in progress
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Fetch feeds and reconcile all channels.
    ///
    /// Returns `Ok(None)` without doing anything when another refresh is
    /// already running. A failed commit propagates after the batch has been
    /// rolled back; per-feed and per-channel problems never do.
    pub async fn refresh(&self) -> AppResult<Option<RefreshReport>> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("EPG refresh already running, not starting another");
                return Ok(None);
            }
        };

        info!("Starting EPG refresh");
        let mut report = RefreshReport::default();
        let fetches = self.fetch_feeds().await?;
        self.record_feed_state(&fetches, &mut report).await;
        let entries = merge_entries(fetches);
        report.entries = entries.len();

        if entries.is_empty() {
            warn!(
                "EPG refresh produced no channel entries ({} feeds failed), skipping reconcile",
                report.feeds_failed
            );
            return Ok(Some(report));
        }

        let stats = self.reconcile(entries.into_values()).await?;
        info!(
            "EPG refresh complete: {} entries from {} feeds, {} channels updated, {} unchanged, {} locked, {} excluded, {} cleaned, {} skipped, {} errors",
            report.entries,
            report.feeds_ok,
            stats.updated,
            stats.unchanged,
            stats.locked,
            stats.excluded,
            stats.cleaned,
            stats.skipped,
            stats.errors
        );
        report.stats = Some(stats);
        Ok(Some(report))
    }

    /// Run the matcher against `entries` and commit the changes atomically
    pub async fn reconcile<I>(&self, entries: I) -> AppResult<ReconcileStats>
    where
        I: IntoIterator<Item = EpgEntry>,
    {
        let channels = with_retry(
            &self.retry,
            || self.repositories.channels.list_channels(),
            "list_channels",
        )
        .await?;
        let mappings = with_retry(
            &self.retry,
            || self.repositories.pattern_mappings.list_pattern_mappings(),
            "list_pattern_mappings",
        )
        .await?;

        let matcher = EpgMatcher::new(entries, MatchOptions::from(&self.config));
        let outcome = matcher.reconcile(&channels, &mappings);

        if !outcome.updates.is_empty() {
            let written = with_retry(
                &self.retry,
                || self.repositories.channels.apply_epg_updates(&outcome.updates),
                "apply_epg_updates",
            )
            .await
            .map_err(|e| {
                error!("EPG commit failed, batch rolled back: {}", e);
                e
            })?;
            debug!("Committed EPG fields for {} channels", written);
        }

        Ok(outcome.stats)
    }

    /// Fuzzy candidates for every unlocked channel, without applying them.
    ///
    /// Feeds are read but their records are left to `refresh`.
    pub async fn suggest(&self, limit: usize) -> AppResult<Vec<Suggestion>> {
        let entries = merge_entries(self.fetch_feeds().await?);
        let channels = self.repositories.channels.list_unlocked_channels().await?;

        let matcher = EpgMatcher::new(entries.into_values(), MatchOptions::from(&self.config));
        Ok(matcher.suggest(&channels, limit))
    }

    /// Lock or unlock a channel's EPG fields
    pub async fn set_protection(&self, channel_id: &str, protected: bool) -> AppResult<()> {
        self.repositories
            .channels
            .set_epg_protection(channel_id, protected)
            .await?;
        info!(
            "EPG fields of channel {} {}",
            channel_id,
            if protected { "locked" } else { "unlocked" }
        );
        Ok(())
    }

    /// Download and parse every enabled feed without touching its record
    async fn fetch_feeds(&self) -> AppResult<Vec<FeedFetch>> {
        let sources = with_retry(
            &self.retry,
            || self.repositories.epg_sources.list_enabled_epg_sources(),
            "list_enabled_epg_sources",
        )
        .await?;

        let mut fetches = Vec::with_capacity(sources.len());
        for source in sources {
            let result = self.fetch_source(&source).await;
            match &result {
                Ok(fetched) => info!(
                    "Fetched {} EPG channels from {}",
                    fetched.len(),
                    source.display_name()
                ),
                Err(e) => warn!(
                    "EPG source {} failed: {}",
                    source.display_name(),
                    feed_error_message(e)
                ),
            }
            fetches.push(FeedFetch { source, result });
        }
        Ok(fetches)
    }

    /// Store the outcome of each fetch on its EPG source
    async fn record_feed_state(&self, fetches: &[FeedFetch], report: &mut RefreshReport) {
        for fetch in fetches {
            let mut source = fetch.source.clone();
            match &fetch.result {
                Ok(_) => {
                    source.record_success(Utc::now());
                    report.feeds_ok += 1;
                }
                Err(e) => {
                    source.record_failure(feed_error_message(e));
                    report.feeds_failed += 1;
                }
            }

            if let Err(e) = with_retry(
                &self.retry,
                || self.repositories.epg_sources.save_epg_source(&source),
                "save_epg_source",
            )
            .await
            {
                warn!(
                    "Could not record refresh state of EPG source {}: {}",
                    source.display_name(),
                    e
                );
            }
        }
    }

    async fn fetch_source(&self, source: &EpgSource) -> AppResult<Vec<EpgEntry>> {
        let response = self.client.get(&source.url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::from(SourceError::timeout(&source.url))
            } else {
                AppError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: source.url.clone(),
            }
            .into());
        }

        let body = response.text().await?;
        Ok(xmltv::parse_channels(&body, source.id)?)
    }
}

struct FeedFetch {
    source: EpgSource,
    result: AppResult<Vec<EpgEntry>>,
}

/// Entries of all successful feeds keyed by id, later feeds win on conflicts
fn merge_entries(fetches: Vec<FeedFetch>) -> BTreeMap<String, EpgEntry> {
    fetches
        .into_iter()
        .filter_map(|fetch| fetch.result.ok())
        .flatten()
        .map(|entry| (entry.epg_id.clone(), entry))
        .collect()
}

/// Text stored in `EpgSource::last_error`
fn feed_error_message(error: &AppError) -> String {
    match error {
        AppError::Source(SourceError::Http { status, .. }) => format!("HTTP error {status}"),
        AppError::Source(e) => e.to_string(),
        AppError::Http(e) => e.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_error_message() {
        let err = AppError::from(SourceError::Http {
            status: 404,
            url: "http://epg".to_string(),
        });
        assert_eq!(feed_error_message(&err), "HTTP error 404");

        let err = AppError::from(SourceError::parse_error("xmltv", "bad tag"));
        assert_eq!(feed_error_message(&err), "Parse error: xmltv - bad tag");
    }
}
