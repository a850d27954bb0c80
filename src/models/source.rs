use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lifecycle of a scrape source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Pending,
    Success,
    Failed,
    Disabled,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Success => "success",
            SourceStatus::Failed => "failed",
            SourceStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SourceStatus::Pending),
            "success" | "active" => Ok(SourceStatus::Success),
            "failed" | "error" => Ok(SourceStatus::Failed),
            "disabled" => Ok(SourceStatus::Disabled),
            other => Err(format!("unknown source status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub status: SourceStatus,
    pub error_count: u32,
    pub last_processed: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// What happened to a source after a scrape attempt was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    /// Failed, will be retried on the next cycle
    Retrying,
    /// Failed and reached the retry limit
    Exhausted,
    /// The source was disabled while the attempt ran; only counters changed
    Disabled,
}

impl Source {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            status: SourceStatus::Pending,
            error_count: 0,
            last_processed: None,
            last_error: None,
        }
    }

    /// Selection predicate used by the scheduler.
    ///
    /// Disabled sources are never due. Pending sources, failed sources that
    /// still have attempts left, and anything not processed within the
    /// rescrape interval are.
    pub fn is_due(&self, now: DateTime<Utc>, rescrape_interval: Duration, max_retries: u32) -> bool {
        match self.status {
            SourceStatus::Disabled => false,
            SourceStatus::Pending => true,
            SourceStatus::Failed if self.error_count < max_retries => true,
            SourceStatus::Success | SourceStatus::Failed => match self.last_processed {
                None => true,
                // A timestamp in the future is never due
                Some(last) => now
                    .signed_duration_since(last)
                    .to_std()
                    .map(|elapsed| elapsed > rescrape_interval)
                    .unwrap_or(false),
            },
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) -> AttemptOutcome {
        self.error_count = 0;
        self.last_error = None;
        self.last_processed = Some(now);
        if self.status == SourceStatus::Disabled {
            return AttemptOutcome::Disabled;
        }
        self.status = SourceStatus::Success;
        AttemptOutcome::Succeeded
    }

    pub fn record_failure<E: Into<String>>(
        &mut self,
        now: DateTime<Utc>,
        error: E,
        max_retries: u32,
    ) -> AttemptOutcome {
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.last_processed = Some(now);
        if self.status == SourceStatus::Disabled {
            return AttemptOutcome::Disabled;
        }
        if self.error_count >= max_retries {
            self.status = SourceStatus::Failed;
            AttemptOutcome::Exhausted
        } else {
            self.status = SourceStatus::Pending;
            AttemptOutcome::Retrying
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            if self.status == SourceStatus::Disabled {
                self.status = SourceStatus::Pending;
                self.error_count = 0;
            }
        } else {
            self.status = SourceStatus::Disabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_failure_path_reaches_failed_at_max_retries() {
        let mut source = Source::new("http://example.org/list");

        assert_eq!(source.record_failure(now(), "timeout", 3), AttemptOutcome::Retrying);
        assert_eq!(source.status, SourceStatus::Pending);
        assert_eq!(source.record_failure(now(), "timeout", 3), AttemptOutcome::Retrying);
        assert_eq!(source.record_failure(now(), "timeout", 3), AttemptOutcome::Exhausted);
        assert_eq!(source.status, SourceStatus::Failed);
        assert_eq!(source.error_count, 3);
        assert_eq!(source.last_processed, Some(now()));
    }

    #[test]
    fn test_success_resets_error_count() {
        let mut source = Source::new("http://example.org/list");
        source.record_failure(now(), "boom", 3);
        source.record_failure(now(), "boom", 3);

        assert_eq!(source.record_success(now()), AttemptOutcome::Succeeded);
        assert_eq!(source.status, SourceStatus::Success);
        assert_eq!(source.error_count, 0);
        assert_eq!(source.last_error, None);
    }

    #[test]
    fn test_disabled_is_never_due_and_survives_attempts() {
        let mut source = Source::new("http://example.org/list");
        source.set_enabled(false);
        assert!(!source.is_due(now(), DAY, 3));

        assert_eq!(source.record_failure(now(), "boom", 1), AttemptOutcome::Disabled);
        assert_eq!(source.status, SourceStatus::Disabled);
        assert!(!source.is_due(now() + chrono::Duration::days(30), DAY, 3));

        source.set_enabled(true);
        assert_eq!(source.status, SourceStatus::Pending);
        assert_eq!(source.error_count, 0);
    }

    #[test]
    fn test_due_selection() {
        let mut source = Source::new("http://example.org/list");
        assert!(source.is_due(now(), DAY, 3));

        source.record_success(now());
        assert!(!source.is_due(now() + chrono::Duration::hours(1), DAY, 3));
        assert!(source.is_due(now() + chrono::Duration::hours(25), DAY, 3));

        source.status = SourceStatus::Failed;
        source.error_count = 1;
        assert!(source.is_due(now(), DAY, 3));

        source.error_count = 3;
        assert!(!source.is_due(now() + chrono::Duration::hours(1), DAY, 3));
        assert!(source.is_due(now() + chrono::Duration::hours(25), DAY, 3));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("SUCCESS".parse::<SourceStatus>(), Ok(SourceStatus::Success));
        assert_eq!("error".parse::<SourceStatus>(), Ok(SourceStatus::Failed));
        assert!("unknown".parse::<SourceStatus>().is_err());
    }
}
