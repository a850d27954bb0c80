//! Source scraping collaborators
//!
//! The orchestrator depends only on the [`Scraper`] trait. [`ScraperRegistry`]
//! picks an implementation per URL kind, and [`LinkScraper`] is the built-in
//! implementation for both kinds.

pub mod link;
pub mod registry;
pub mod traits;

pub use link::{extract_channels, LinkScraper};
pub use registry::ScraperRegistry;
pub use traits::{Scraper, ScraperKind};
