use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An XMLTV feed the EPG refresh pulls channel identities from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpgSource {
    pub id: i64,
    pub url: String,
    pub name: Option<String>,
    pub enabled: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub last_error: Option<String>,
}

impl EpgSource {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(now);
        self.error_count = 0;
        self.last_error = None;
    }

    pub fn record_failure<E: Into<String>>(&mut self, error: E) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(error.into());
    }
}

/// Channel identity extracted from an XMLTV `<channel>` element.
///
/// Rebuilt on every refresh and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgEntry {
    pub epg_id: String,
    pub name: String,
    pub logo: Option<String>,
    pub source_id: i64,
}

/// Rule mapping a channel-name substring to an EPG id.
///
/// A pattern starting with `!` is an exclusion rule and ignores its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMapping {
    pub id: i64,
    pub search_pattern: String,
    pub target_epg_id: Option<String>,
}

impl PatternMapping {
    pub fn is_exclusion(&self) -> bool {
        self.search_pattern.starts_with('!')
    }

    /// Pattern text without the exclusion marker, trimmed
    pub fn needle(&self) -> &str {
        self.search_pattern.trim_start_matches('!').trim()
    }
}
