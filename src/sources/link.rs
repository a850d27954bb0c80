//! Acestream link scraper
//!
//! Fetches a page and collects `acestream://` content ids. Pages that embed
//! a `const linksData = {...};` script block also provide channel names.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::traits::{Scraper, ScraperKind};
use crate::errors::{AppError, AppResult, SourceError};
use crate::models::ScrapedChannel;

const ACESTREAM_SCHEME: &str = "acestream://";

static LINK_REGEX: OnceLock<Regex> = OnceLock::new();
static LINKS_DATA_REGEX: OnceLock<Regex> = OnceLock::new();

fn link_regex() -> &'static Regex {
    LINK_REGEX.get_or_init(|| {
        Regex::new(r"acestream://([0-9A-Za-z_]+)").expect("Invalid acestream link regex")
    })
}

fn links_data_regex() -> &'static Regex {
    LINKS_DATA_REGEX.get_or_init(|| {
        Regex::new(r"(?s)const\s+linksData\s*=\s*(\{.*?\});").expect("Invalid linksData regex")
    })
}

#[derive(Debug, Deserialize)]
struct LinksData {
    #[serde(default)]
    links: Vec<LinkEntry>,
}

#[derive(Debug, Deserialize)]
struct LinkEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: String,
}

pub struct LinkScraper {
    client: Client,
    kind: ScraperKind,
}

impl LinkScraper {
    pub fn new(kind: ScraperKind) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(kind.default_timeout())
            .user_agent(concat!("acestream-scraper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, kind })
    }

    pub fn kind(&self) -> ScraperKind {
        self.kind
    }
}

#[async_trait]
impl Scraper for LinkScraper {
    async fn scrape(&self, url: &str) -> AppResult<Vec<ScrapedChannel>> {
        let target = self.kind.fetch_url(url);
        debug!("Fetching {} source {}", self.kind, target);

        let response = self.client.get(&target).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::from(SourceError::timeout(url))
            } else {
                AppError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let body = response.text().await?;
        let channels = extract_channels(&body);
        info!("Extracted {} channels from {}", channels.len(), url);
        Ok(channels)
    }
}

/// Collect unique acestream ids from a page, script data first
pub fn extract_channels(content: &str) -> Vec<ScrapedChannel> {
    let mut seen = HashSet::new();
    let mut channels = Vec::new();

    if let Some(captures) = links_data_regex().captures(content) {
        match serde_json::from_str::<LinksData>(&captures[1]) {
            Ok(data) => {
                for link in data.links {
                    let Some((_, id)) = link.url.split_once(ACESTREAM_SCHEME) else {
                        continue;
                    };
                    let id = id.trim();
                    if id.is_empty() || !seen.insert(id.to_string()) {
                        continue;
                    }
                    let name = link
                        .name
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| format!("Channel {id}"));
                    channels.push(scraped(id, name));
                }
            }
            Err(e) => warn!("Could not parse linksData script block: {}", e),
        }
    }

    for captures in link_regex().captures_iter(content) {
        let id = &captures[1];
        if seen.insert(id.to_string()) {
            channels.push(scraped(id, format!("Channel {id}")));
        }
    }

    channels
}

fn scraped(id: &str, name: String) -> ScrapedChannel {
    let mut channel = ScrapedChannel::new(id, name);
    channel.metadata.original_url = Some(format!("{ACESTREAM_SCHEME}{id}"));
    channel
}
