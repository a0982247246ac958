//! Short-lived cache for computed experiment results

use super::clock::Clock;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cache key for an experiment's results
pub fn results_cache_key(experiment_id: Uuid) -> String {
    format!("ab_test_results:{}", experiment_id)
}

/// Key/value cache with per-entry TTL
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn put(&self, key: &str, value: Value, ttl: Duration);

    fn invalidate(&self, key: &str);

    /// Token that changes whenever `key` is invalidated
    fn generation(&self, key: &str) -> u64;

    /// Store `value` unless `key` was invalidated after `generation` was read
    ///
    /// Returns whether the entry was stored.
    fn put_if_current(&self, key: &str, value: Value, ttl: Duration, generation: u64) -> bool;
}

/// Cache that never stores anything
pub struct NoOpCache;

impl Cache for NoOpCache {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn put(&self, _key: &str, _value: Value, _ttl: Duration) {}

    fn invalidate(&self, _key: &str) {}

    fn generation(&self, _key: &str) -> u64 {
        0
    }

    fn put_if_current(&self, _key: &str, _value: Value, _ttl: Duration, _generation: u64) -> bool {
        false
    }
}

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    /// Bumped by every invalidation, whatever the key
    generation: u64,
}

impl CacheState {
    fn insert(&mut self, key: &str, value: Value, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
    }
}

/// Process-local cache; entries expire according to the injected clock
///
/// Expired entries are dropped on read of the same key and swept on every
/// insert. One generation counter covers all keys, so an invalidation also
/// cancels in-flight `put_if_current` calls for unrelated keys.
pub struct InMemoryCache {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(&self, key: &str, ttl: Duration) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            warn!(key = %key, "Cache TTL out of range, entry not stored");
            return None;
        };
        let now = self.clock.now();
        let Some(expires_at) = now.checked_add_signed(ttl) else {
            warn!(key = %key, "Cache expiry overflows, entry not stored");
            return None;
        };
        Some((now, expires_at))
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut state = self.state.lock().ok()?;
        match state.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, value: Value, ttl: Duration) {
        let Some((now, expires_at)) = self.expiry(key, ttl) else {
            return;
        };
        if let Ok(mut state) = self.state.lock() {
            state.insert(key, value, expires_at, now);
        }
    }

    fn invalidate(&self, key: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.remove(key);
            state.generation = state.generation.wrapping_add(1);
        }
    }

    fn generation(&self, _key: &str) -> u64 {
        self.state.lock().map(|s| s.generation).unwrap_or(0)
    }

    fn put_if_current(&self, key: &str, value: Value, ttl: Duration, generation: u64) -> bool {
        let Some((now, expires_at)) = self.expiry(key, ttl) else {
            return false;
        };
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.generation != generation {
            debug!(key = %key, "Cache entry invalidated while computing, not stored");
            return false;
        }
        state.insert(key, value, expires_at, now);
        true
    }
}
