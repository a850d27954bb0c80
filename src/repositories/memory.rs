//! In-memory repository implementation
//!
//! Behaves like the SQLite store, including field-scoped writes and the
//! all-or-nothing EPG batch, and can be told to fail upcoming writes with a
//! transient error or upcoming due-source listings outright.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::traits::*;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::*;

#[derive(Default)]
struct State {
    sources: BTreeMap<String, Source>,
    channels: BTreeMap<String, Channel>,
    epg_sources: Vec<EpgSource>,
    pattern_mappings: Vec<PatternMapping>,
    next_id: i64,
    failing_writes: usize,
    failing_due_listings: usize,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_write(&mut self) -> RepositoryResult<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(RepositoryError::transient("database is locked"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` write operations fail with a transient error
    pub async fn fail_next_writes(&self, count: usize) {
        self.state.lock().await.failing_writes = count;
    }

    /// Make the next `count` due-source listings fail with a non-transient error
    pub async fn fail_next_due_listings(&self, count: usize) {
        self.state.lock().await.failing_due_listings = count;
    }

    pub async fn insert_channel(&self, channel: Channel) {
        self.state
            .lock()
            .await
            .channels
            .insert(channel.id.clone(), channel);
    }

    pub async fn insert_source(&self, source: Source) {
        self.state
            .lock()
            .await
            .sources
            .insert(source.url.clone(), source);
    }
}

#[async_trait]
impl SourceRepository for MemoryStore {
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        rescrape_interval: Duration,
        max_retries: u32,
    ) -> RepositoryResult<Vec<Source>> {
        let mut state = self.state.lock().await;
        if state.failing_due_listings > 0 {
            state.failing_due_listings -= 1;
            return Err(RepositoryError::Database(sqlx::Error::PoolClosed));
        }
        Ok(state
            .sources
            .values()
            .filter(|s| s.is_due(now, rescrape_interval, max_retries))
            .cloned()
            .collect())
    }

    async fn list_sources(&self) -> RepositoryResult<Vec<Source>> {
        Ok(self.state.lock().await.sources.values().cloned().collect())
    }

    async fn get_source(&self, url: &str) -> RepositoryResult<Option<Source>> {
        Ok(self.state.lock().await.sources.get(url).cloned())
    }

    async fn save(&self, source: &Source) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        state.sources.insert(source.url.clone(), source.clone());
        Ok(())
    }

    async fn register(&self, url: &str) -> RepositoryResult<Source> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        Ok(state
            .sources
            .entry(url.to_string())
            .or_insert_with(|| Source::new(url))
            .clone())
    }

    async fn set_enabled(&self, url: &str, enabled: bool) -> RepositoryResult<Source> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        let source = state
            .sources
            .get_mut(url)
            .ok_or_else(|| RepositoryError::record_not_found("sources", "url", url))?;
        source.set_enabled(enabled);
        Ok(source.clone())
    }
}

#[async_trait]
impl ChannelRepository for MemoryStore {
    async fn get_channel(&self, id: &str) -> RepositoryResult<Option<Channel>> {
        Ok(self.state.lock().await.channels.get(id).cloned())
    }

    async fn list_channels(&self) -> RepositoryResult<Vec<Channel>> {
        Ok(self.state.lock().await.channels.values().cloned().collect())
    }

    async fn list_active_channels(&self) -> RepositoryResult<Vec<Channel>> {
        let state = self.state.lock().await;
        Ok(state
            .channels
            .values()
            .filter(|c| c.status == ChannelStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_unlocked_channels(&self) -> RepositoryResult<Vec<Channel>> {
        let state = self.state.lock().await;
        Ok(state
            .channels
            .values()
            .filter(|c| !c.epg_update_protected)
            .cloned()
            .collect())
    }

    async fn upsert_scraped(
        &self,
        source_url: &str,
        channels: &[ScrapedChannel],
        seen_at: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        for scraped in channels {
            match state.channels.get_mut(&scraped.id) {
                Some(existing) => existing.merge_scraped(scraped, source_url, seen_at),
                None => {
                    let channel = Channel::from_scraped(scraped, source_url, seen_at);
                    state.channels.insert(channel.id.clone(), channel);
                }
            }
        }
        Ok(channels.len())
    }

    async fn update_liveness(&self, result: &CheckResult) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        let channel = state
            .channels
            .get_mut(&result.channel_id)
            .ok_or_else(|| RepositoryError::record_not_found("channels", "id", &result.channel_id))?;
        channel.is_online = Some(result.is_online);
        channel.last_checked = Some(result.checked_at);
        channel.check_error = result.error.clone();
        Ok(())
    }

    async fn apply_epg_updates(&self, updates: &[EpgFieldUpdate]) -> RepositoryResult<usize> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        let mut written = 0;
        for update in updates {
            if let Some(channel) = state.channels.get_mut(&update.channel_id) {
                if channel.epg_update_protected {
                    continue;
                }
                channel.tvg_id = update.fields.tvg_id.clone();
                channel.tvg_name = update.fields.tvg_name.clone();
                channel.logo = update.fields.logo.clone();
                written += 1;
            }
        }
        Ok(written)
    }

    async fn set_epg_protection(&self, id: &str, protected: bool) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        let channel = state
            .channels
            .get_mut(id)
            .ok_or_else(|| RepositoryError::record_not_found("channels", "id", id))?;
        channel.epg_update_protected = protected;
        Ok(())
    }

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        let before = state.channels.len();
        state
            .channels
            .retain(|_, c| c.last_seen.map_or(true, |seen| seen >= cutoff));
        Ok((before - state.channels.len()) as u64)
    }
}

#[async_trait]
impl EpgSourceRepository for MemoryStore {
    async fn list_enabled_epg_sources(&self) -> RepositoryResult<Vec<EpgSource>> {
        let state = self.state.lock().await;
        Ok(state.epg_sources.iter().filter(|s| s.enabled).cloned().collect())
    }

    async fn add_epg_source(&self, url: &str, name: Option<&str>) -> RepositoryResult<EpgSource> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        let source = EpgSource {
            id: state.next_id(),
            url: url.to_string(),
            name: name.map(str::to_string),
            enabled: true,
            last_updated: None,
            error_count: 0,
            last_error: None,
        };
        state.epg_sources.push(source.clone());
        Ok(source)
    }

    async fn save_epg_source(&self, source: &EpgSource) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        let existing = state
            .epg_sources
            .iter_mut()
            .find(|s| s.id == source.id)
            .ok_or_else(|| {
                RepositoryError::record_not_found("epg_sources", "id", source.id.to_string())
            })?;
        *existing = source.clone();
        Ok(())
    }
}

#[async_trait]
impl PatternMappingRepository for MemoryStore {
    async fn list_pattern_mappings(&self) -> RepositoryResult<Vec<PatternMapping>> {
        Ok(self.state.lock().await.pattern_mappings.clone())
    }

    async fn add_pattern_mapping(
        &self,
        search_pattern: &str,
        target_epg_id: Option<&str>,
    ) -> RepositoryResult<PatternMapping> {
        let mut state = self.state.lock().await;
        state.check_write()?;
        let mapping = PatternMapping {
            id: state.next_id(),
            search_pattern: search_pattern.to_string(),
            target_epg_id: target_epg_id.map(str::to_string),
        };
        state.pattern_mappings.push(mapping.clone());
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.register("http://a").await.unwrap();
        let mut changed = first.clone();
        changed.record_failure(Utc::now(), "boom", 3);
        store.save(&changed).await.unwrap();

        let again = store.register("http://a").await.unwrap();
        assert_eq!(again.error_count, 1);
        assert_eq!(store.list_sources().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_epg_batch_skips_protected_rows() {
        let store = MemoryStore::new();
        let mut locked = Channel::new("locked", "Locked");
        locked.epg_update_protected = true;
        store.insert_channel(locked).await;
        store.insert_channel(Channel::new("open", "Open")).await;

        let fields = EpgFields {
            tvg_id: Some("x".to_string()),
            tvg_name: Some("X".to_string()),
            logo: None,
        };
        let written = store
            .apply_epg_updates(&[
                EpgFieldUpdate {
                    channel_id: "locked".to_string(),
                    fields: fields.clone(),
                },
                EpgFieldUpdate {
                    channel_id: "open".to_string(),
                    fields,
                },
            ])
            .await
            .unwrap();

        assert_eq!(written, 1);
        let locked = store.get_channel("locked").await.unwrap().unwrap();
        assert_eq!(locked.tvg_id, None);
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let store = MemoryStore::new();
        store.fail_next_writes(1).await;
        let err = store.register("http://a").await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.register("http://a").await.is_ok());
    }
}
