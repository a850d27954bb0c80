use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::{duration, option_duration};

/// Immutable application configuration.
///
/// Loaded once at startup; every component receives the section it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub checker: CheckerConfig,
    #[serde(default)]
    pub epg: EpgConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Liveness engine connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub url: String,
    #[serde(default = "default_probe_timeout", with = "duration")]
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay between two iterations of the control loop
    #[serde(default = "default_poll_interval", with = "duration")]
    pub poll_interval: Duration,
    /// Successful sources are scraped again once this old
    #[serde(default = "default_rescrape_interval", with = "duration")]
    pub rescrape_interval: Duration,
    /// Consecutive failures before a source is marked failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_concurrent_scrapes")]
    pub max_concurrent_scrapes: usize,
    #[serde(default = "default_storage_retry_attempts")]
    pub storage_retry_attempts: u32,
    #[serde(default = "default_storage_retry_backoff", with = "duration")]
    pub storage_retry_backoff: Duration,
    /// How long shutdown waits for in-flight scrapes before abandoning them
    #[serde(default = "default_shutdown_grace", with = "duration")]
    pub shutdown_grace: Duration,
    /// Channels not seen by any scrape for this long are deleted. Disabled when unset.
    #[serde(
        default,
        with = "option_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel_retention: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Maximum probes in flight at once
    #[serde(default = "default_check_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_check_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_check_chunk_pause", with = "duration")]
    pub chunk_pause: Duration,
    /// Run a full liveness check on this cadence. On-demand only when unset.
    #[serde(
        default,
        with = "option_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgConfig {
    #[serde(default = "default_epg_refresh_interval", with = "duration")]
    pub refresh_interval: Duration,
    #[serde(default = "default_epg_fetch_timeout", with = "duration")]
    pub fetch_timeout: Duration,
    /// Minimum fuzzy similarity for an automatic match (0.0-1.0)
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    /// Added to the similarity when one normalized name prefixes the other
    #[serde(default = "default_prefix_bonus")]
    pub prefix_bonus: f64,
    /// Skip channels that already carry EPG metadata
    #[serde(default)]
    pub respect_existing: bool,
    /// Clear EPG metadata of channels nothing matches
    #[serde(default)]
    pub clean_unmatched: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            rescrape_interval: default_rescrape_interval(),
            max_retries: default_max_retries(),
            max_concurrent_scrapes: default_max_concurrent_scrapes(),
            storage_retry_attempts: default_storage_retry_attempts(),
            storage_retry_backoff: default_storage_retry_backoff(),
            shutdown_grace: default_shutdown_grace(),
            channel_retention: None,
        }
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_check_concurrency(),
            chunk_size: default_check_chunk_size(),
            chunk_pause: default_check_chunk_pause(),
            interval: None,
        }
    }
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_epg_refresh_interval(),
            fetch_timeout: default_epg_fetch_timeout(),
            match_threshold: default_match_threshold(),
            prefix_bonus: default_prefix_bonus(),
            respect_existing: false,
            clean_unmatched: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
            scheduler: SchedulerConfig::default(),
            checker: CheckerConfig::default(),
            epg: EpgConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Base URL of the engine with scheme and without trailing slash.
    ///
    /// A bare value such as `6878` is taken as a port on localhost.
    pub fn base_url(&self) -> String {
        let trimmed = self.url.trim();
        let with_scheme = if trimmed.starts_with("http") {
            trimmed.to_string()
        } else {
            format!("http://localhost:{}", trimmed.trim_start_matches(':'))
        };
        with_scheme.trim_end_matches('/').to_string()
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> AppResult<Self> {
        let config = if Path::new(config_file).exists() {
            let contents = std::fs::read_to_string(config_file).map_err(|e| {
                AppError::configuration(format!("Cannot read {config_file}: {e}"))
            })?;
            Self::from_toml(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)
                .map_err(|e| AppError::configuration(e.to_string()))?;
            std::fs::write(config_file, contents).map_err(|e| {
                AppError::configuration(format!("Cannot write {config_file}: {e}"))
            })?;
            info!("Created default config file: {}", config_file);
            default_config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> AppResult<Self> {
        toml::from_str(contents).map_err(|e| AppError::configuration(e.to_string()))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.engine.url.trim().is_empty() {
            return Err(AppError::configuration("engine.url is required"));
        }
        if self.database.url.trim().is_empty() {
            return Err(AppError::configuration("database.url is required"));
        }
        if self.scheduler.max_retries == 0 {
            return Err(AppError::configuration(
                "scheduler.max_retries must be at least 1",
            ));
        }
        if self.scheduler.max_concurrent_scrapes == 0 {
            return Err(AppError::configuration(
                "scheduler.max_concurrent_scrapes must be at least 1",
            ));
        }
        if self.scheduler.storage_retry_attempts == 0 {
            return Err(AppError::configuration(
                "scheduler.storage_retry_attempts must be at least 1",
            ));
        }
        if self.checker.concurrency == 0 || self.checker.chunk_size == 0 {
            return Err(AppError::configuration(
                "checker.concurrency and checker.chunk_size must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.epg.match_threshold) {
            return Err(AppError::configuration(format!(
                "epg.match_threshold must be within 0.0-1.0, got {}",
                self.epg.match_threshold
            )));
        }
        let periods = [
            ("scheduler.poll_interval", Some(self.scheduler.poll_interval)),
            ("engine.probe_timeout", Some(self.engine.probe_timeout)),
            ("epg.fetch_timeout", Some(self.epg.fetch_timeout)),
            ("epg.refresh_interval", Some(self.epg.refresh_interval)),
            ("checker.interval", self.checker.interval),
        ];
        if let Some((name, _)) = periods
            .iter()
            .find(|(_, period)| matches!(period, Some(d) if d.is_zero()))
        {
            return Err(AppError::configuration(format!("{name} must be greater than zero")));
        }
        if self.epg.prefix_bonus < 0.0 {
            return Err(AppError::configuration("epg.prefix_bonus cannot be negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.scheduler.poll_interval, Duration::from_secs(60));
        assert_eq!(config.checker.concurrency, 20);
        assert_eq!(config.checker.chunk_size, 20);
        assert_eq!(config.engine.probe_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [engine]
            url = "http://engine:6878/"

            [scheduler]
            poll_interval = "30s"
            rescrape_interval = 7200
            channel_retention = "7days"

            [checker]
            chunk_pause = "1s"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.base_url(), "http://engine:6878");
        assert_eq!(config.scheduler.poll_interval, Duration::from_secs(30));
        assert_eq!(config.scheduler.rescrape_interval, Duration::from_secs(7200));
        assert_eq!(
            config.scheduler.channel_retention,
            Some(Duration::from_secs(7 * 24 * 60 * 60))
        );
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.checker.chunk_pause, Duration::from_secs(1));
        assert_eq!(config.checker.interval, None);
        assert_eq!(config.epg.match_threshold, 0.75);
    }

    #[test]
    fn test_engine_url_normalization() {
        let mut engine = EngineConfig::default();
        engine.url = "6878".to_string();
        assert_eq!(engine.base_url(), "http://localhost:6878");

        engine.url = "https://ace.example.org/".to_string();
        assert_eq!(engine.base_url(), "https://ace.example.org");
    }

    #[test]
    fn test_missing_engine_url_is_fatal() {
        let mut config = Config::default();
        config.engine.url = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));
    }

    #[rstest]
    #[case("[scheduler]\npoll_interval = 0", "scheduler.poll_interval")]
    #[case("[engine]\nprobe_timeout = \"0s\"", "engine.probe_timeout")]
    #[case("[epg]\nfetch_timeout = 0", "epg.fetch_timeout")]
    #[case("[epg]\nrefresh_interval = 0", "epg.refresh_interval")]
    #[case("[checker]\ninterval = 0", "checker.interval")]
    fn test_zero_periods_are_rejected(#[case] toml: &str, #[case] field: &str) {
        let config = Config::from_toml(toml).unwrap();
        match config.validate() {
            Err(AppError::Configuration { message }) => assert!(message.contains(field)),
            other => panic!("expected a configuration error for {field}, got {other:?}"),
        }
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut config = Config::default();
        config.epg.match_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed = Config::from_toml(&rendered).unwrap();
        assert_eq!(parsed.scheduler.rescrape_interval, DEFAULT_RESCRAPE_INTERVAL);
        assert_eq!(parsed.checker.chunk_pause, DEFAULT_CHECK_CHUNK_PAUSE);
    }
}
