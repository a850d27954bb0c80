//! Repository trait definitions
//!
//! The core never issues queries itself. Every read returns a fully loaded
//! snapshot, and every channel write is scoped to the field group owned by
//! the caller (scrape merge, liveness, EPG).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::errors::RepositoryResult;
use crate::models::{
    Channel, CheckResult, EpgFieldUpdate, EpgSource, PatternMapping, ScrapedChannel, Source,
};

#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Sources the scheduler should scrape now, see [`Source::is_due`]
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        rescrape_interval: Duration,
        max_retries: u32,
    ) -> RepositoryResult<Vec<Source>>;

    async fn list_sources(&self) -> RepositoryResult<Vec<Source>>;

    async fn get_source(&self, url: &str) -> RepositoryResult<Option<Source>>;

    /// Persist every field of the source, inserting it when unknown
    async fn save(&self, source: &Source) -> RepositoryResult<()>;

    /// Create a pending source. Registering a known URL returns the stored record.
    async fn register(&self, url: &str) -> RepositoryResult<Source>;

    /// Toggle between `disabled` and `pending`
    async fn set_enabled(&self, url: &str, enabled: bool) -> RepositoryResult<Source>;
}

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get_channel(&self, id: &str) -> RepositoryResult<Option<Channel>>;

    async fn list_channels(&self) -> RepositoryResult<Vec<Channel>>;

    async fn list_active_channels(&self) -> RepositoryResult<Vec<Channel>>;

    async fn list_unlocked_channels(&self) -> RepositoryResult<Vec<Channel>>;

    /// Create-or-update scraped tuples. Writes identity, name, group and
    /// source fields; EPG fields are only filled where empty on unlocked rows.
    async fn upsert_scraped(
        &self,
        source_url: &str,
        channels: &[ScrapedChannel],
        seen_at: DateTime<Utc>,
    ) -> RepositoryResult<usize>;

    /// Write the liveness fields of one channel and nothing else
    async fn update_liveness(&self, result: &CheckResult) -> RepositoryResult<()>;

    /// Write EPG fields for a batch in one transaction. Protected rows are
    /// skipped. Returns the number of rows written.
    async fn apply_epg_updates(&self, updates: &[EpgFieldUpdate]) -> RepositoryResult<usize>;

    /// The only operation allowed to lock or unlock a channel's EPG fields
    async fn set_epg_protection(&self, id: &str, protected: bool) -> RepositoryResult<()>;

    /// Delete channels no scrape has reported since `cutoff`
    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64>;
}

#[async_trait]
pub trait EpgSourceRepository: Send + Sync {
    async fn list_enabled_epg_sources(&self) -> RepositoryResult<Vec<EpgSource>>;

    async fn add_epg_source(&self, url: &str, name: Option<&str>) -> RepositoryResult<EpgSource>;

    /// Persist refresh bookkeeping (last_updated, error_count, last_error)
    async fn save_epg_source(&self, source: &EpgSource) -> RepositoryResult<()>;
}

#[async_trait]
pub trait PatternMappingRepository: Send + Sync {
    /// All mappings in insertion order
    async fn list_pattern_mappings(&self) -> RepositoryResult<Vec<PatternMapping>>;

    async fn add_pattern_mapping(
        &self,
        search_pattern: &str,
        target_epg_id: Option<&str>,
    ) -> RepositoryResult<PatternMapping>;
}
