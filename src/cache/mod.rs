//! Time-bounded key/value cache
//!
//! One `TtlCache` is built at startup and shared (`Arc`) by the source
//! service and the model router. Entries are reclaimed lazily: an expired
//! entry is deleted by the lookup that finds it, or by `clear`.

pub mod store;

pub use store::{CacheBackend, FileBackend, MemoryBackend};

use crate::error::OrchestrationError;
use crate::events::{tracing_sink, EventKind, EventSink};
use crate::models::CacheEntry;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += to_chrono(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

pub struct TtlCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl TtlCache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            events: tracing_sink(),
        }
    }

    /// Memory-backed cache on the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), Arc::new(SystemClock))
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Live value for `key`. An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entry = match self.backend.load(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.events.on_event(EventKind::CacheMiss, json!({ "key": key }));
                return None;
            }
            Err(e) => {
                self.io_failed("load", key, &e);
                return None;
            }
        };

        let now = self.clock.now();
        if entry.is_expired(now) {
            if let Err(e) = self.backend.remove(key) {
                self.io_failed("remove", key, &e);
            }
            self.events.on_event(
                EventKind::CacheExpired,
                json!({ "key": key, "expired_at": entry.expires_at.to_rfc3339() }),
            );
            return None;
        }

        self.events.on_event(EventKind::CacheHit, json!({ "key": key }));
        Some(entry.value)
    }

    /// Overwrites any previous entry. A zero TTL is raised to 1 ms so the
    /// entry always expires strictly after it was cached.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let ttl = ttl.max(Duration::from_millis(1));
        let cached_at = self.clock.now();
        let entry = CacheEntry {
            value,
            cached_at,
            expires_at: cached_at + to_chrono(ttl),
        };

        if let Err(e) = self.backend.store(key, entry) {
            self.io_failed("store", key, &e);
        }
    }

    /// Removes every entry, or only those whose key starts with `prefix`.
    /// Returns the number of entries removed.
    pub fn clear(&self, prefix: Option<&str>) -> usize {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                self.io_failed("keys", prefix.unwrap_or(""), &e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys
            .iter()
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
        {
            match self.backend.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => self.io_failed("remove", key, &e),
            }
        }

        self.events.on_event(
            EventKind::CacheCleared,
            json!({ "prefix": prefix, "removed": removed }),
        );
        removed
    }

    /// Number of unexpired entries. Does not reclaim expired ones.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.backend
            .keys()
            .unwrap_or_default()
            .iter()
            .filter_map(|k| self.backend.load(k).ok().flatten())
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn io_failed(&self, operation: &str, key: &str, error: &OrchestrationError) {
        self.events.on_event(
            EventKind::CacheIoFailed,
            json!({ "operation": operation, "key": key, "error": error.to_string() }),
        );
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;

    fn manual_cache() -> (TtlCache, Arc<ManualClock>, Arc<RecordingEventSink>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let events = Arc::new(RecordingEventSink::new());
        let cache = TtlCache::new(Arc::new(MemoryBackend::new()), clock.clone())
            .with_events(events.clone());
        (cache, clock, events)
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _, _) = manual_cache();
        cache.set("k", json!({"v": 1}), Duration::from_secs(1));
        assert_eq!(cache.get("k"), Some(json!({"v": 1})));
    }

    #[test]
    fn test_expired_entry_is_deleted_on_read() {
        let (cache, clock, events) = manual_cache();
        cache.set("crypto:ids=bitcoin", json!("V"), Duration::from_millis(60_000));

        clock.advance(Duration::from_millis(30_000));
        assert_eq!(cache.get("crypto:ids=bitcoin"), Some(json!("V")));

        clock.advance(Duration::from_millis(40_000));
        assert_eq!(cache.get("crypto:ids=bitcoin"), None);
        assert_eq!(events.count(EventKind::CacheExpired), 1);

        // Gone from the backend, so the next lookup is a plain miss
        assert_eq!(cache.get("crypto:ids=bitcoin"), None);
        assert_eq!(events.count(EventKind::CacheMiss), 1);
    }

    #[test]
    fn test_set_overwrites_wholesale() {
        let (cache, clock, _) = manual_cache();
        cache.set("k", json!({"a": 1}), Duration::from_millis(10));
        clock.advance(Duration::from_millis(5));
        cache.set("k", json!({"b": 2}), Duration::from_millis(100));
        clock.advance(Duration::from_millis(50));

        assert_eq!(cache.get("k"), Some(json!({"b": 2})));
    }

    #[test]
    fn test_zero_ttl_still_expires_after_caching() {
        let (cache, clock, _) = manual_cache();
        cache.set("k", json!(1), Duration::ZERO);
        assert_eq!(cache.get("k"), Some(json!(1)));
        clock.advance(Duration::from_millis(2));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_clear_by_prefix() {
        let (cache, _, _) = manual_cache();
        let ttl = Duration::from_secs(60);
        cache.set("news:q=ai", json!(1), ttl);
        cache.set("news:q=fed", json!(2), ttl);
        cache.set("crypto:ids=bitcoin", json!(3), ttl);

        assert_eq!(cache.clear(Some("news:")), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("crypto:ids=bitcoin").is_some());

        assert_eq!(cache.clear(None), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_file_backed_cache_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let first = TtlCache::new(Arc::new(FileBackend::new(dir.path()).unwrap()), clock.clone());
        first.set("model:outlook:abc", json!({"content": "x"}), Duration::from_secs(3600));

        let second = TtlCache::new(Arc::new(FileBackend::new(dir.path()).unwrap()), clock.clone());
        assert_eq!(second.get("model:outlook:abc"), Some(json!({"content": "x"})));

        clock.advance(Duration::from_secs(3601));
        assert_eq!(second.get("model:outlook:abc"), None);
    }
}
