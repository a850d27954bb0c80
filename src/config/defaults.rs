/// Configuration default values
///
/// All default values for configuration options live here so they can be
/// changed in one place.
use std::time::Duration;

// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./acestream.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// Liveness engine defaults
pub const DEFAULT_ENGINE_URL: &str = "http://localhost:6878";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// Scheduler defaults
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RESCRAPE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MAX_CONCURRENT_SCRAPES: usize = 3;
pub const DEFAULT_STORAGE_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_STORAGE_RETRY_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

// Status checker defaults
pub const DEFAULT_CHECK_CONCURRENCY: usize = 20;
pub const DEFAULT_CHECK_CHUNK_SIZE: usize = 20;
pub const DEFAULT_CHECK_CHUNK_PAUSE: Duration = Duration::from_millis(500);

// EPG defaults
pub const DEFAULT_EPG_REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_EPG_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.75;
pub const DEFAULT_PREFIX_BONUS: f64 = 0.1;

pub fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

pub fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

pub fn default_engine_url() -> String {
    DEFAULT_ENGINE_URL.to_string()
}

pub fn default_probe_timeout() -> Duration {
    DEFAULT_PROBE_TIMEOUT
}

pub fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

pub fn default_rescrape_interval() -> Duration {
    DEFAULT_RESCRAPE_INTERVAL
}

pub fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

pub fn default_max_concurrent_scrapes() -> usize {
    DEFAULT_MAX_CONCURRENT_SCRAPES
}

pub fn default_storage_retry_attempts() -> u32 {
    DEFAULT_STORAGE_RETRY_ATTEMPTS
}

pub fn default_storage_retry_backoff() -> Duration {
    DEFAULT_STORAGE_RETRY_BACKOFF
}

pub fn default_shutdown_grace() -> Duration {
    DEFAULT_SHUTDOWN_GRACE
}

pub fn default_check_concurrency() -> usize {
    DEFAULT_CHECK_CONCURRENCY
}

pub fn default_check_chunk_size() -> usize {
    DEFAULT_CHECK_CHUNK_SIZE
}

pub fn default_check_chunk_pause() -> Duration {
    DEFAULT_CHECK_CHUNK_PAUSE
}

pub fn default_epg_refresh_interval() -> Duration {
    DEFAULT_EPG_REFRESH_INTERVAL
}

pub fn default_epg_fetch_timeout() -> Duration {
    DEFAULT_EPG_FETCH_TIMEOUT
}

pub fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

pub fn default_prefix_bonus() -> f64 {
    DEFAULT_PREFIX_BONUS
}
