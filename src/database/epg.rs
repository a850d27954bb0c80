use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{count_from_row, format_datetime, parse_optional_datetime, Database};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{EpgSource, PatternMapping};
use crate::repositories::{EpgSourceRepository, PatternMappingRepository};

const EPG_SOURCE_COLUMNS: &str = "id, url, name, enabled, last_updated, error_count, last_error";

fn epg_source_from_row(row: &SqliteRow) -> RepositoryResult<EpgSource> {
    Ok(EpgSource {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        name: row.try_get("name")?,
        enabled: row.try_get("enabled")?,
        last_updated: parse_optional_datetime(
            "epg_sources.last_updated",
            row.try_get("last_updated")?,
        )?,
        error_count: count_from_row("epg_sources.error_count", row.try_get("error_count")?)?,
        last_error: row.try_get("last_error")?,
    })
}

#[async_trait]
impl EpgSourceRepository for Database {
    async fn list_enabled_epg_sources(&self) -> RepositoryResult<Vec<EpgSource>> {
        let rows = sqlx::query(&format!(
            "SELECT {EPG_SOURCE_COLUMNS} FROM epg_sources WHERE enabled = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(epg_source_from_row).collect()
    }

    async fn add_epg_source(&self, url: &str, name: Option<&str>) -> RepositoryResult<EpgSource> {
        sqlx::query(
            "INSERT INTO epg_sources (url, name, enabled) VALUES (?, ?, 1)
             ON CONFLICT(url) DO UPDATE SET name = COALESCE(excluded.name, epg_sources.name)",
        )
        .bind(url)
        .bind(name)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {EPG_SOURCE_COLUMNS} FROM epg_sources WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::record_not_found("epg_sources", "url", url))?;
        epg_source_from_row(&row)
    }

    async fn save_epg_source(&self, source: &EpgSource) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE epg_sources
             SET name = ?, enabled = ?, last_updated = ?, error_count = ?, last_error = ?
             WHERE id = ?",
        )
        .bind(&source.name)
        .bind(source.enabled)
        .bind(source.last_updated.map(format_datetime))
        .bind(i64::from(source.error_count))
        .bind(&source.last_error)
        .bind(source.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::record_not_found(
                "epg_sources",
                "id",
                source.id.to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PatternMappingRepository for Database {
    async fn list_pattern_mappings(&self) -> RepositoryResult<Vec<PatternMapping>> {
        let rows = sqlx::query(
            "SELECT id, search_pattern, target_epg_id FROM pattern_mappings ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> RepositoryResult<PatternMapping> {
                Ok(PatternMapping {
                    id: row.try_get("id")?,
                    search_pattern: row.try_get("search_pattern")?,
                    target_epg_id: row.try_get("target_epg_id")?,
                })
            })
            .collect()
    }

    async fn add_pattern_mapping(
        &self,
        search_pattern: &str,
        target_epg_id: Option<&str>,
    ) -> RepositoryResult<PatternMapping> {
        let result =
            sqlx::query("INSERT INTO pattern_mappings (search_pattern, target_epg_id) VALUES (?, ?)")
                .bind(search_pattern)
                .bind(target_epg_id)
                .execute(&self.pool)
                .await?;

        Ok(PatternMapping {
            id: result.last_insert_rowid(),
            search_pattern: search_pattern.to_string(),
            target_epg_id: target_epg_id.map(str::to_string),
        })
    }
}
