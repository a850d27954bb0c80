//! Repository pattern implementation for data access
//!
//! Business logic talks to storage only through the traits in [`traits`].
//! Two implementations exist: the SQLite one in [`crate::database`] and the
//! in-memory [`MemoryStore`] used by tests and throwaway runs.

pub mod memory;
pub mod traits;

use std::sync::Arc;

pub use memory::MemoryStore;
pub use traits::*;

/// Handles to every repository, cheap to clone into spawned tasks
#[derive(Clone)]
pub struct Repositories {
    pub sources: Arc<dyn SourceRepository>,
    pub channels: Arc<dyn ChannelRepository>,
    pub epg_sources: Arc<dyn EpgSourceRepository>,
    pub pattern_mappings: Arc<dyn PatternMappingRepository>,
}

impl Repositories {
    /// Use one store for every repository
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: SourceRepository
            + ChannelRepository
            + EpgSourceRepository
            + PatternMappingRepository
            + 'static,
    {
        Self {
            sources: store.clone(),
            channels: store.clone(),
            epg_sources: store.clone(),
            pattern_mappings: store,
        }
    }
}
