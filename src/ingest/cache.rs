//! Time-keyed payload cache for feed URLs.
//!
//! Entries expire purely by elapsed time against the TTL the caller passes on
//! each read. Nothing is evicted; the set of feed URLs is small and long-lived.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: String,
    pub fetched_at: Instant,
}

#[derive(Debug, Default)]
pub struct RssCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl RssCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body for `url` if it was fetched less than `ttl` before `now`. Reads never touch `fetched_at`.
    pub fn get_fresh(&self, url: &str, ttl: Duration, now: Instant) -> Option<String> {
        let entries = self.entries.lock();
        entries
            .get(url)
            .filter(|e| now.saturating_duration_since(e.fetched_at) < ttl)
            .map(|e| e.body.clone())
    }

    pub fn insert(&self, url: &str, body: String, now: Instant) {
        self.entries.lock().insert(
            url.to_string(),
            CacheEntry {
                body,
                fetched_at: now,
            },
        );
    }

    pub fn fetched_at(&self, url: &str) -> Option<Instant> {
        self.entries.lock().get(url).map(|e| e.fetched_at)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
