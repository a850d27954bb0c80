use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::{format_datetime, parse_optional_datetime, Database};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{Channel, ChannelStatus, CheckResult, EpgFieldUpdate, ScrapedChannel};
use crate::repositories::ChannelRepository;

const CHANNEL_COLUMNS: &str = "id, name, status, source_url, group_title, original_url, last_seen,
     tvg_id, tvg_name, logo, epg_update_protected, is_online, last_checked, check_error";

fn channel_from_row(row: &SqliteRow) -> RepositoryResult<Channel> {
    let status: String = row.try_get("status")?;
    Ok(Channel {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: status
            .parse::<ChannelStatus>()
            .map_err(|e| RepositoryError::invalid_value("channels.status", e))?,
        source_url: row.try_get("source_url")?,
        group: row.try_get("group_title")?,
        original_url: row.try_get("original_url")?,
        last_seen: parse_optional_datetime("channels.last_seen", row.try_get("last_seen")?)?,
        tvg_id: row.try_get("tvg_id")?,
        tvg_name: row.try_get("tvg_name")?,
        logo: row.try_get("logo")?,
        epg_update_protected: row.try_get("epg_update_protected")?,
        is_online: row.try_get("is_online")?,
        last_checked: parse_optional_datetime(
            "channels.last_checked",
            row.try_get("last_checked")?,
        )?,
        check_error: row.try_get("check_error")?,
    })
}

/// Blank scraper values count as not supplied
fn supplied(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Database {
    async fn list_channels_where(&self, filter: &str) -> RepositoryResult<Vec<Channel>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels {filter} ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(channel_from_row).collect()
    }
}

#[async_trait]
impl ChannelRepository for Database {
    async fn get_channel(&self, id: &str) -> RepositoryResult<Option<Channel>> {
        let row = sqlx::query(&format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(channel_from_row).transpose()
    }

    async fn list_channels(&self) -> RepositoryResult<Vec<Channel>> {
        self.list_channels_where("").await
    }

    async fn list_active_channels(&self) -> RepositoryResult<Vec<Channel>> {
        self.list_channels_where("WHERE status = 'active'").await
    }

    async fn list_unlocked_channels(&self) -> RepositoryResult<Vec<Channel>> {
        self.list_channels_where("WHERE epg_update_protected = 0").await
    }

    async fn upsert_scraped(
        &self,
        source_url: &str,
        channels: &[ScrapedChannel],
        seen_at: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let seen_at = format_datetime(seen_at);
        let mut tx = self.pool.begin().await?;

        for scraped in channels {
            let meta = &scraped.metadata;
            sqlx::query(
                "INSERT INTO channels (id, name, status, source_url, group_title, original_url,
                                       last_seen, tvg_id, tvg_name, logo)
                 VALUES (?, ?, 'active', ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    name = CASE WHEN excluded.name <> '' THEN excluded.name ELSE channels.name END,
                    status = 'active',
                    source_url = excluded.source_url,
                    group_title = COALESCE(excluded.group_title, channels.group_title),
                    original_url = COALESCE(excluded.original_url, channels.original_url),
                    last_seen = excluded.last_seen,
                    tvg_id = CASE
                        WHEN channels.epg_update_protected = 0 AND COALESCE(channels.tvg_id, '') = ''
                        THEN COALESCE(excluded.tvg_id, channels.tvg_id)
                        ELSE channels.tvg_id END,
                    tvg_name = CASE
                        WHEN channels.epg_update_protected = 0 AND COALESCE(channels.tvg_name, '') = ''
                        THEN COALESCE(excluded.tvg_name, channels.tvg_name)
                        ELSE channels.tvg_name END,
                    logo = CASE
                        WHEN channels.epg_update_protected = 0 AND COALESCE(channels.logo, '') = ''
                        THEN COALESCE(excluded.logo, channels.logo)
                        ELSE channels.logo END",
            )
            .bind(&scraped.id)
            .bind(&scraped.name)
            .bind(source_url)
            .bind(supplied(&meta.group))
            .bind(supplied(&meta.original_url))
            .bind(&seen_at)
            .bind(supplied(&meta.tvg_id))
            .bind(supplied(&meta.tvg_name))
            .bind(supplied(&meta.logo))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Merged {} channels from {}", channels.len(), source_url);
        Ok(channels.len())
    }

    async fn update_liveness(&self, result: &CheckResult) -> RepositoryResult<()> {
        let updated = sqlx::query(
            "UPDATE channels SET is_online = ?, last_checked = ?, check_error = ? WHERE id = ?",
        )
        .bind(result.is_online)
        .bind(format_datetime(result.checked_at))
        .bind(&result.error)
        .bind(&result.channel_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::record_not_found(
                "channels",
                "id",
                &result.channel_id,
            ));
        }
        Ok(())
    }

    async fn apply_epg_updates(&self, updates: &[EpgFieldUpdate]) -> RepositoryResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for update in updates {
            let result = sqlx::query(
                "UPDATE channels SET tvg_id = ?, tvg_name = ?, logo = ?
                 WHERE id = ? AND epg_update_protected = 0",
            )
            .bind(&update.fields.tvg_id)
            .bind(&update.fields.tvg_name)
            .bind(&update.fields.logo)
            .bind(&update.channel_id)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected() as usize;
        }

        // Dropping the transaction on an earlier error rolls everything back
        tx.commit().await?;
        Ok(written)
    }

    async fn set_epg_protection(&self, id: &str, protected: bool) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE channels SET epg_update_protected = ? WHERE id = ?")
            .bind(protected)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::record_not_found("channels", "id", id));
        }
        Ok(())
    }

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let result =
            sqlx::query("DELETE FROM channels WHERE last_seen IS NOT NULL AND last_seen < ?")
                .bind(format_datetime(cutoff))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
