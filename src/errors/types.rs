//! Error type definitions for the acestream scraper

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Scraping, feed and engine errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration errors, fatal at startup only
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Errors raised by the SQLite driver
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Storage was temporarily unavailable (locked, busy, pool exhausted)
    #[error("Transient storage error: {message}")]
    Transient { message: String },

    /// Record not found
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound {
        table: String,
        field: String,
        value: String,
    },

    /// A stored value could not be decoded into its domain type
    #[error("Invalid stored value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors from the outside world: scrape targets, EPG feeds, the liveness engine
#[derive(Error, Debug)]
pub enum SourceError {
    /// Network connection timeouts
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Non-success HTTP status
    #[error("HTTP error {status} from {url}")]
    Http { status: u16, url: String },

    /// Parsing errors for source data
    #[error("Parse error: {source_type} - {message}")]
    ParseError {
        source_type: String,
        message: String,
    },

    /// No scraper accepts this URL
    #[error("Unsupported source: {url}")]
    Unsupported { url: String },

    /// The scraper ran but produced nothing usable
    #[error("Scrape of {url} returned no channels")]
    Empty { url: String },
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Repository(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl RepositoryError {
    /// Create a transient error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a record not found error
    pub fn record_not_found<T: Into<String>, F: Into<String>, V: Into<String>>(
        table: T,
        field: F,
        value: V,
    ) -> Self {
        Self::RecordNotFound {
            table: table.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Locked/busy databases, exhausted pools and I/O hiccups are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            RepositoryError::Transient { .. } => true,
            RepositoryError::Database(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db_err) => {
                    let message = db_err.message().to_lowercase();
                    message.contains("locked") || message.contains("busy")
                }
                _ => false,
            },
            RepositoryError::RecordNotFound { .. } | RepositoryError::InvalidValue { .. } => false,
        }
    }
}

impl SourceError {
    /// Create a timeout error
    pub fn timeout<U: Into<String>>(url: U) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Create a parse error
    pub fn parse_error<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::ParseError {
            source_type: source_type.into(),
            message: message.into(),
        }
    }
}
