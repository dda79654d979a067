//! Process-wide classification cache.
//!
//! Keyed by a normalized form of the raw name. Entries expire after a TTL
//! measured against an injected [`Clock`]; moka's own TTL is set to the same
//! value so expired entries are also evicted from memory.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use stockroom_core::{Classification, Clock};

const DEFAULT_MAX_CAPACITY: u64 = 50_000;

/// Case-folded, punctuation-stripped, whitespace-collapsed form of a name.
#[must_use]
pub fn cache_key(raw_name: &str) -> String {
    let stripped: String = raw_name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone)]
struct Entry {
    value: Classification,
    stored_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ClassificationCache {
    inner: Cache<String, Entry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ClassificationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationCache")
            .field("entries", &self.inner.entry_count())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ClassificationCache {
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let moka_ttl = ttl.to_std().unwrap_or(StdDuration::from_secs(1));
        Self {
            inner: Cache::builder()
                .max_capacity(DEFAULT_MAX_CAPACITY)
                .time_to_live(moka_ttl)
                .build(),
            ttl,
            clock,
        }
    }

    /// Cache with a TTL expressed in days.
    #[must_use]
    pub fn with_ttl_days(days: u64, clock: Arc<dyn Clock>) -> Self {
        let days = i64::try_from(days).unwrap_or(i64::MAX / 86_400);
        Self::new(Duration::days(days), clock)
    }

    pub async fn get(&self, raw_name: &str) -> Option<Classification> {
        let key = cache_key(raw_name);
        let entry = self.inner.get(&key).await?;
        if self.clock.now() - entry.stored_at >= self.ttl {
            self.inner.invalidate(&key).await;
            return None;
        }
        Some(entry.value)
    }

    pub async fn insert(&self, raw_name: &str, value: Classification) {
        let entry = Entry {
            value,
            stored_at: self.clock.now(),
        };
        self.inner.insert(cache_key(raw_name), entry).await;
    }
}
