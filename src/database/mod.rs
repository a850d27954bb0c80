use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::errors::{RepositoryError, RepositoryResult};

pub mod channels;
pub mod epg;
pub mod sources;

/// Embedded migrations, applied in order
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "initial_schema",
    include_str!("../../migrations/001_initial_schema.sql"),
)];

/// SQLite backed store implementing every repository trait
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub async fn connect(config: &DatabaseConfig) -> RepositoryResult<Self> {
        let in_memory = config.url.contains(":memory:") || config.url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to ":memory:" opens its own database
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .connect_with(options)
                .await?
        };

        debug!("Connected to database {}", config.url);
        Ok(Self { pool })
    }

    /// Connect and bring the schema up to date
    pub async fn open(config: &DatabaseConfig) -> RepositoryResult<Self> {
        let database = Self::connect(config).await?;
        database.migrate().await?;
        Ok(database)
    }

    pub async fn migrate(&self) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for &(version, description, content) in MIGRATIONS {
            let applied: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM _migrations WHERE version = ?")
                    .bind(version)
                    .fetch_one(&self.pool)
                    .await?;
            if applied > 0 {
                continue;
            }

            let start = std::time::Instant::now();
            let mut transaction = self.pool.begin().await?;
            for statement in content.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(statement).execute(&mut *transaction).await?;
            }
            sqlx::query("INSERT INTO _migrations (version, description, installed_on) VALUES (?, ?, ?)")
                .bind(version)
                .bind(description)
                .bind(format_datetime(Utc::now()))
                .execute(&mut *transaction)
                .await?;
            transaction.commit().await?;

            info!(
                "Applied migration {:03}_{} ({}ms)",
                version,
                description,
                start.elapsed().as_millis()
            );
        }

        Ok(())
    }
}

/// Timestamps are stored as fixed-width RFC3339 so they compare as text
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse datetime from either RFC3339 or SQLite format
pub(crate) fn parse_datetime(field: &str, s: &str) -> RepositoryResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    Err(RepositoryError::invalid_value(
        field,
        format!("failed to parse datetime '{s}'"),
    ))
}

pub(crate) fn parse_optional_datetime(
    field: &str,
    value: Option<String>,
) -> RepositoryResult<Option<DateTime<Utc>>> {
    value.map(|s| parse_datetime(field, &s)).transpose()
}

pub(crate) fn count_from_row(field: &str, value: i64) -> RepositoryResult<u32> {
    u32::try_from(value).map_err(|_| RepositoryError::invalid_value(field, value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_formats() {
        let sqlite = parse_datetime("t", "2024-05-01 12:00:00").unwrap();
        let rfc = parse_datetime("t", "2024-05-01T12:00:00Z").unwrap();
        assert_eq!(sqlite, rfc);
        assert!(parse_datetime("t", "yesterday").is_err());
    }

    #[test]
    fn test_stored_timestamps_sort_chronologically() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(1500);
        assert!(format_datetime(earlier) < format_datetime(later));
        assert!(parse_datetime("t", &format_datetime(later)).is_ok());
    }

    #[tokio::test]
    async fn test_migrate_is_repeatable() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
        };
        let database = Database::open(&config).await.unwrap();
        database.migrate().await.unwrap();

        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&database.pool())
            .await
            .unwrap();
        assert_eq!(applied, 1);
    }
}
