//! Centralized error handling for the acestream scraper
//!
//! Every per-item failure (one source, one channel, one probe) is converted
//! into recorded state by the component that owns it. These types describe
//! what can go wrong underneath that conversion.
//!
//! # Error Categories
//!
//! - **Repository Errors**: storage access, split into transient and permanent
//! - **Source Errors**: scraping, EPG feeds and the liveness engine
//! - **Configuration Errors**: fatal, raised only while starting up

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;
