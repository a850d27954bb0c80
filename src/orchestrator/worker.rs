//! One scrape attempt for one source
//!
//! Runs the scraper, merges its channels and records the attempt on the
//! source. Every failure, including a panicking scraper, ends up in the
//! failure branch of the retry policy; nothing escapes to the loop.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::errors::{AppError, AppResult, SourceError};
use crate::models::{AttemptOutcome, ScrapedChannel, Source};
use crate::repositories::Repositories;
use crate::sources::Scraper;
use crate::utils::retry::{with_retry, RetryConfig};

#[derive(Clone)]
pub struct ScrapeWorker {
    repositories: Repositories,
    scraper: Arc<dyn Scraper>,
    retry: RetryConfig,
    max_retries: u32,
}

impl ScrapeWorker {
    pub fn new(
        repositories: Repositories,
        scraper: Arc<dyn Scraper>,
        retry: RetryConfig,
        max_retries: u32,
    ) -> Self {
        Self {
            repositories,
            scraper,
            retry,
            max_retries,
        }
    }

    /// Scrape `snapshot.url` and record the outcome on the source
    pub async fn process(&self, snapshot: Source) -> AttemptOutcome {
        let url = snapshot.url.clone();
        debug!("Scraping source {}", url);

        let attempt = match self.scrape(&url).await {
            Ok(channels) => self
                .merge(&url, &channels)
                .await
                .map(|merged| (channels.len(), merged)),
            Err(e) => Err(e),
        };

        // The stored record may have been disabled while the scrape ran
        let mut source = match with_retry(
            &self.retry,
            || self.repositories.sources.get_source(&url),
            "get_source",
        )
        .await
        {
            Ok(Some(current)) => current,
            Ok(None) => snapshot,
            Err(e) => {
                warn!("Could not reload source {}, using snapshot: {}", url, e);
                snapshot
            }
        };

        let now = Utc::now();
        let outcome = match &attempt {
            Ok(_) => source.record_success(now),
            Err(e) => source.record_failure(now, e.to_string(), self.max_retries),
        };

        match (&attempt, outcome) {
            (Ok((found, merged)), _) => {
                info!("Scraped {}: {} channels found, {} merged", url, found, merged)
            }
            (Err(e), AttemptOutcome::Exhausted) => warn!(
                "Source {} failed after {} attempts, marked as failed: {}",
                url, source.error_count, e
            ),
            (Err(e), AttemptOutcome::Disabled) => {
                info!("Scrape of disabled source {} failed: {}", url, e)
            }
            (Err(e), _) => info!(
                "Scrape of {} failed (attempt {}/{}), will retry: {}",
                url, source.error_count, self.max_retries, e
            ),
        }

        if let Err(e) = with_retry(
            &self.retry,
            || self.repositories.sources.save(&source),
            "save_source",
        )
        .await
        {
            error!("Could not record scrape attempt for {}: {}", url, e);
        }

        outcome
    }

    /// Run the scraper, turning panics and empty results into errors
    async fn scrape(&self, url: &str) -> AppResult<Vec<ScrapedChannel>> {
        let channels = AssertUnwindSafe(self.scraper.scrape(url))
            .catch_unwind()
            .await
            .map_err(|panic| {
                AppError::internal(format!("scraper panicked: {}", panic_message(panic.as_ref())))
            })??;

        if channels.is_empty() {
            return Err(SourceError::Empty { url: url.to_string() }.into());
        }
        Ok(channels)
    }

    async fn merge(&self, url: &str, channels: &[ScrapedChannel]) -> AppResult<usize> {
        let seen_at = Utc::now();
        let merged = with_retry(
            &self.retry,
            || self.repositories.channels.upsert_scraped(url, channels, seen_at),
            "upsert_scraped",
        )
        .await?;
        Ok(merged)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
