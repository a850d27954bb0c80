use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::time::Duration;

use super::{count_from_row, format_datetime, parse_optional_datetime, Database};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{Source, SourceStatus};
use crate::repositories::SourceRepository;

const SOURCE_COLUMNS: &str = "url, status, error_count, last_processed, last_error";

fn source_from_row(row: &SqliteRow) -> RepositoryResult<Source> {
    let status: String = row.try_get("status")?;
    Ok(Source {
        url: row.try_get("url")?,
        status: status
            .parse::<SourceStatus>()
            .map_err(|e| RepositoryError::invalid_value("sources.status", e))?,
        error_count: count_from_row("sources.error_count", row.try_get("error_count")?)?,
        last_processed: parse_optional_datetime(
            "sources.last_processed",
            row.try_get("last_processed")?,
        )?,
        last_error: row.try_get("last_error")?,
    })
}

#[async_trait]
impl SourceRepository for Database {
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        rescrape_interval: Duration,
        max_retries: u32,
    ) -> RepositoryResult<Vec<Source>> {
        let interval = chrono::Duration::from_std(rescrape_interval).map_err(|e| {
            RepositoryError::invalid_value("rescrape_interval", e.to_string())
        })?;
        let stale_before = format_datetime(now - interval);

        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources
             WHERE status != 'disabled'
               AND (status = 'pending'
                    OR (status = 'failed' AND error_count < ?)
                    OR last_processed IS NULL
                    OR last_processed < ?)
             ORDER BY url"
        ))
        .bind(i64::from(max_retries))
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(source_from_row).collect()
    }

    async fn list_sources(&self) -> RepositoryResult<Vec<Source>> {
        let rows = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY url"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn get_source(&self, url: &str) -> RepositoryResult<Option<Source>> {
        let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn save(&self, source: &Source) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO sources (url, status, error_count, last_processed, last_error, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(url) DO UPDATE SET
                status = excluded.status,
                error_count = excluded.error_count,
                last_processed = excluded.last_processed,
                last_error = excluded.last_error",
        )
        .bind(&source.url)
        .bind(source.status.as_str())
        .bind(i64::from(source.error_count))
        .bind(source.last_processed.map(format_datetime))
        .bind(&source.last_error)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn register(&self, url: &str) -> RepositoryResult<Source> {
        sqlx::query(
            "INSERT INTO sources (url, status, error_count, created_at)
             VALUES (?, 'pending', 0, ?)
             ON CONFLICT(url) DO NOTHING",
        )
        .bind(url)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await?;

        self.get_source(url)
            .await?
            .ok_or_else(|| RepositoryError::record_not_found("sources", "url", url))
    }

    async fn set_enabled(&self, url: &str, enabled: bool) -> RepositoryResult<Source> {
        let mut source = self
            .get_source(url)
            .await?
            .ok_or_else(|| RepositoryError::record_not_found("sources", "url", url))?;
        source.set_enabled(enabled);
        self.save(&source).await?;
        Ok(source)
    }
}
