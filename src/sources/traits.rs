//! Scraper collaborator interface
//!
//! A scraper turns a source URL into channel tuples. How it gets them (plain
//! HTTP, a ZeroNet proxy, a headless browser) is its own business; the
//! orchestrator only sees the tuples or an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::AppResult;
use crate::models::ScrapedChannel;

/// Port of the local ZeroNet proxy
const ZERONET_PORT_MARKER: &str = ":43110/";
const ZERONET_LOCAL_PREFIX: &str = "http://127.0.0.1:43110/";
const ZERONET_SCHEME: &str = "zero://";

#[async_trait]
pub trait Scraper: Send + Sync {
    /// Fetch `url` and extract its channels. An empty list is a valid
    /// return value; the caller decides whether that counts as a failure.
    async fn scrape(&self, url: &str) -> AppResult<Vec<ScrapedChannel>>;
}

/// Families of source URLs with different fetch characteristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScraperKind {
    Http,
    ZeroNet,
}

impl ScraperKind {
    /// Classify a source URL
    pub fn detect(url: &str) -> Self {
        let url = url.trim();
        if url.starts_with(ZERONET_SCHEME)
            || url.starts_with(ZERONET_LOCAL_PREFIX)
            || url.contains(ZERONET_PORT_MARKER)
        {
            ScraperKind::ZeroNet
        } else {
            ScraperKind::Http
        }
    }

    /// ZeroNet pages are served through a slow local proxy
    pub fn default_timeout(&self) -> Duration {
        match self {
            ScraperKind::Http => Duration::from_secs(10),
            ScraperKind::ZeroNet => Duration::from_secs(20),
        }
    }

    /// The URL actually requested for a source of this kind
    pub fn fetch_url(&self, url: &str) -> String {
        match self {
            ScraperKind::ZeroNet => match url.strip_prefix(ZERONET_SCHEME) {
                Some(rest) => format!("{ZERONET_LOCAL_PREFIX}{rest}"),
                None => url.to_string(),
            },
            ScraperKind::Http => url.to_string(),
        }
    }
}

impl fmt::Display for ScraperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScraperKind::Http => write!(f, "http"),
            ScraperKind::ZeroNet => write!(f, "zeronet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://example.com/channels", ScraperKind::Http)]
    #[case("zero://1Abc/page.html", ScraperKind::ZeroNet)]
    #[case("http://127.0.0.1:43110/1Abc/", ScraperKind::ZeroNet)]
    #[case("http://zeronet.lan:43110/1Abc/", ScraperKind::ZeroNet)]
    #[case("http://example.com:4311/", ScraperKind::Http)]
    fn test_detect(#[case] url: &str, #[case] expected: ScraperKind) {
        assert_eq!(ScraperKind::detect(url), expected);
    }

    #[test]
    fn test_fetch_url() {
        assert_eq!(
            ScraperKind::ZeroNet.fetch_url("zero://1Abc/list"),
            "http://127.0.0.1:43110/1Abc/list"
        );
        assert_eq!(
            ScraperKind::ZeroNet.fetch_url("http://host:43110/x"),
            "http://host:43110/x"
        );
        assert_eq!(ScraperKind::Http.fetch_url("http://a/b"), "http://a/b");
    }

    #[test]
    fn test_default_timeouts() {
        assert_eq!(ScraperKind::Http.default_timeout(), Duration::from_secs(10));
        assert_eq!(ScraperKind::ZeroNet.default_timeout(), Duration::from_secs(20));
    }
}
