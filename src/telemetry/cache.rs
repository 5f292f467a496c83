use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a fetched dataset stays fresh.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Value,
    pub fetched_at: Instant,
}

/// Keyed memoization of endpoint payloads.
///
/// Stale entries are not evicted on read; the next `put` for the key
/// overwrites them.
#[derive(Debug)]
pub struct Cache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl Cache {
    pub fn new(ttl: Duration) -> Self {
        Cache {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<&Value> {
        let entry = match self.entries.get(key) {
            Some(entry) => entry,
            None => {
                debug!("Cache miss for {}", key);
                return None;
            }
        };

        if now.saturating_duration_since(entry.fetched_at) >= self.ttl {
            debug!("Cache entry for {} is stale", key);
            return None;
        }

        debug!("Cache hit for {}", key);
        Some(&entry.payload)
    }

    pub fn put(&mut self, key: &str, payload: Value) {
        self.put_at(key, payload, Instant::now());
    }

    pub fn put_at(&mut self, key: &str, payload: Value, now: Instant) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                fetched_at: now,
            },
        );
    }

    /// Entries held, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
