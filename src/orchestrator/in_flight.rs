//! Per-URL single-flight bookkeeping
//!
//! A URL enters the set through [`InFlightSet::try_acquire`] and leaves it
//! when the returned guard drops, whether the job finished, failed, panicked
//! or was aborted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    urls: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `url`. Returns `None` when a job for it is already running.
    pub fn try_acquire(&self, url: &str) -> Option<InFlightGuard> {
        if self.lock().insert(url.to_string()) {
            Some(InFlightGuard {
                set: self.clone(),
                url: url.to_string(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget every claim, used once all jobs are gone at shutdown
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn release(&self, url: &str) {
        self.lock().remove(url);
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.urls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its URL from the set on drop
#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlightSet,
    url: String,
}

impl InFlightGuard {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.release(&self.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_claim_per_url() {
        let set = InFlightSet::new();
        let guard = set.try_acquire("http://a").unwrap();
        assert_eq!(guard.url(), "http://a");
        assert!(set.try_acquire("http://a").is_none());
        assert!(set.try_acquire("http://b").is_some());
        assert!(set.contains("http://a"));
        assert_eq!(set.len(), 1);

        drop(guard);
        assert!(set.is_empty());
        assert!(set.try_acquire("http://a").is_some());
    }

    #[tokio::test]
    async fn test_guard_released_when_task_aborted() {
        let set = InFlightSet::new();
        let guard = set.try_acquire("http://slow").unwrap();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });

        assert!(set.contains("http://slow"));
        handle.abort();
        let _ = handle.await;
        assert!(!set.contains("http://slow"));
    }

    #[test]
    fn test_clear() {
        let set = InFlightSet::new();
        let guard = set.try_acquire("http://a").unwrap();
        set.clear();
        assert!(set.is_empty());
        drop(guard);
        assert!(set.is_empty());
    }
}
