//! Scraper registry
//!
//! Maps each [`ScraperKind`] to the scraper that handles it. The registry is
//! itself a [`Scraper`], so callers hand it any source URL and it dispatches
//! on the detected kind.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::link::LinkScraper;
use super::traits::{Scraper, ScraperKind};
use crate::errors::{AppResult, SourceError};
use crate::models::ScrapedChannel;

#[derive(Clone, Default)]
pub struct ScraperRegistry {
    scrapers: HashMap<ScraperKind, Arc<dyn Scraper>>,
}

impl ScraperRegistry {
    /// An empty registry; every URL is unsupported until something is registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Link scrapers for both kinds, each with its kind's timeout
    pub fn with_defaults() -> AppResult<Self> {
        let mut registry = Self::new();
        registry.register(ScraperKind::Http, Arc::new(LinkScraper::new(ScraperKind::Http)?));
        registry.register(
            ScraperKind::ZeroNet,
            Arc::new(LinkScraper::new(ScraperKind::ZeroNet)?),
        );
        Ok(registry)
    }

    /// Replace the scraper for `kind`
    pub fn register(&mut self, kind: ScraperKind, scraper: Arc<dyn Scraper>) {
        self.scrapers.insert(kind, scraper);
    }

    pub fn supports(&self, url: &str) -> bool {
        self.scrapers.contains_key(&ScraperKind::detect(url))
    }

    pub fn scraper_for(&self, url: &str) -> Result<Arc<dyn Scraper>, SourceError> {
        let kind = ScraperKind::detect(url);
        self.scrapers
            .get(&kind)
            .cloned()
            .ok_or_else(|| SourceError::Unsupported {
                url: url.to_string(),
            })
    }
}

#[async_trait]
impl Scraper for ScraperRegistry {
    async fn scrape(&self, url: &str) -> AppResult<Vec<ScrapedChannel>> {
        let scraper = self.scraper_for(url)?;
        debug!("Dispatching {} to {} scraper", url, ScraperKind::detect(url));
        scraper.scrape(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    struct Fixed(&'static str);

    #[async_trait]
    impl Scraper for Fixed {
        async fn scrape(&self, _url: &str) -> AppResult<Vec<ScrapedChannel>> {
            Ok(vec![ScrapedChannel::new(self.0, self.0)])
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let mut registry = ScraperRegistry::new();
        registry.register(ScraperKind::Http, Arc::new(Fixed("http")));
        registry.register(ScraperKind::ZeroNet, Arc::new(Fixed("zero")));

        let channels = registry.scrape("https://example.com").await.unwrap();
        assert_eq!(channels[0].id, "http");
        let channels = registry.scrape("zero://1Site/").await.unwrap();
        assert_eq!(channels[0].id, "zero");
    }

    #[tokio::test]
    async fn test_unsupported_kind() {
        let mut registry = ScraperRegistry::new();
        registry.register(ScraperKind::Http, Arc::new(Fixed("http")));

        assert!(!registry.supports("zero://1Site/"));
        let err = registry.scrape("zero://1Site/").await.unwrap_err();
        assert!(matches!(err, AppError::Source(SourceError::Unsupported { .. })));
    }

    #[test]
    fn test_defaults_cover_every_kind() {
        let registry = ScraperRegistry::with_defaults().unwrap();
        assert!(registry.supports("https://example.com"));
        assert!(registry.supports("zero://1Site/"));
    }
}
