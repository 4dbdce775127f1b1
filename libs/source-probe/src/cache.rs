use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Keyed store whose entries expire independently, each `ttl` after it was
/// written. Expired entries simply behave as a miss; readers re-probe.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() < self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Overwrites unconditionally, stamping the current instant
    pub fn set(&self, key: &str, value: V) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn contains_fresh(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.stored_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }
}
