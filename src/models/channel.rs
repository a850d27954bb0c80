use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Active,
    Inactive,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Active => "active",
            ChannelStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ChannelStatus::Active),
            "inactive" => Ok(ChannelStatus::Inactive),
            other => Err(format!("unknown channel status '{other}'")),
        }
    }
}

/// A catalog entry identified by its acestream content id.
///
/// Three field groups have three different writers: the scrape merge owns
/// identity, name, group and source fields; the status checker owns
/// `is_online`, `last_checked` and `check_error`; the EPG matcher owns
/// `tvg_id`, `tvg_name` and `logo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub status: ChannelStatus,
    pub source_url: Option<String>,
    pub group: Option<String>,
    pub original_url: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,

    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub logo: Option<String>,
    /// EPG fields are frozen while set; only an explicit unlock clears it
    pub epg_update_protected: bool,

    pub is_online: Option<bool>,
    pub last_checked: Option<DateTime<Utc>>,
    pub check_error: Option<String>,
}

impl Channel {
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ChannelStatus::Active,
            source_url: None,
            group: None,
            original_url: None,
            last_seen: None,
            tvg_id: None,
            tvg_name: None,
            logo: None,
            epg_update_protected: false,
            is_online: None,
            last_checked: None,
            check_error: None,
        }
    }

    /// Whether any of the EPG fields carries a non-empty value
    pub fn has_epg_data(&self) -> bool {
        [&self.tvg_id, &self.tvg_name, &self.logo]
            .iter()
            .any(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }

    pub fn epg_fields(&self) -> EpgFields {
        EpgFields {
            tvg_id: self.tvg_id.clone(),
            tvg_name: self.tvg_name.clone(),
            logo: self.logo.clone(),
        }
    }

    /// Apply a scraper tuple using merge semantics: only supplied values
    /// overwrite, and EPG fields are filled only where empty and unlocked.
    pub fn merge_scraped(&mut self, scraped: &ScrapedChannel, source_url: &str, seen_at: DateTime<Utc>) {
        if !scraped.name.is_empty() {
            self.name = scraped.name.clone();
        }
        self.status = ChannelStatus::Active;
        self.source_url = Some(source_url.to_string());
        self.last_seen = Some(seen_at);

        let meta = &scraped.metadata;
        if let Some(group) = non_empty(&meta.group) {
            self.group = Some(group);
        }
        if let Some(original_url) = non_empty(&meta.original_url) {
            self.original_url = Some(original_url);
        }

        if self.epg_update_protected {
            return;
        }
        fill_if_empty(&mut self.tvg_id, &meta.tvg_id);
        fill_if_empty(&mut self.tvg_name, &meta.tvg_name);
        fill_if_empty(&mut self.logo, &meta.logo);
    }

    /// Build a brand new record from a scraper tuple
    pub fn from_scraped(scraped: &ScrapedChannel, source_url: &str, seen_at: DateTime<Utc>) -> Self {
        let mut channel = Channel::new(scraped.id.clone(), scraped.name.clone());
        channel.merge_scraped(scraped, source_url, seen_at);
        channel
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn fill_if_empty(target: &mut Option<String>, supplied: &Option<String>) {
    if target.as_deref().map_or(true, str::is_empty) {
        if let Some(value) = non_empty(supplied) {
            *target = Some(value);
        }
    }
}

/// Optional attributes a scraper may know about a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub group: Option<String>,
    pub logo: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub original_url: Option<String>,
}

/// One channel tuple produced by a scraper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedChannel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: ChannelMetadata,
}

impl ScrapedChannel {
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metadata: ChannelMetadata::default(),
        }
    }
}

/// The three fields owned by the EPG matcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgFields {
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub logo: Option<String>,
}

impl EpgFields {
    pub fn cleared() -> Self {
        Self::default()
    }
}

/// Replacement EPG fields for one channel, written as a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpgFieldUpdate {
    pub channel_id: String,
    pub fields: EpgFields,
}

/// Outcome of a single liveness probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub channel_id: String,
    pub is_online: bool,
    pub checked_at: DateTime<Utc>,
    pub error: Option<String>,
}
