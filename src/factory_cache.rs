//! Expiring cache of loaded remote module factories.
//!
//! Eviction is lazy: nothing sweeps the map in the background, an entry is
//! only found to be stale (and dropped) when somebody asks for it.
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use module_sdk::ModuleExports;
use tracing::{debug, trace};

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        })
    }

    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        let _ = self
            .millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |ms| {
                Some(ms.saturating_add(by))
            });
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// A loaded module together with the instant it stops being usable.
#[derive(Debug, Clone)]
pub struct CachedFactory {
    pub namespace: String,
    pub exports: Arc<ModuleExports>,
    pub expires_at: DateTime<Utc>,
}

impl CachedFactory {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct ModuleFactoryCache {
    entries: DashMap<String, CachedFactory>,
    clock: Arc<dyn Clock>,
}

impl Default for ModuleFactoryCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ModuleFactoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Returns the factory for `namespace` unless it was never loaded or has
    /// expired. An expired entry is removed on the way out.
    pub fn get(&self, namespace: &str) -> Option<CachedFactory> {
        let now = self.clock.now();
        let entry = self.entries.get(namespace)?.clone();
        if !entry.is_expired(now) {
            trace!(%namespace, expires_at = %entry.expires_at, "factory cache hit");
            return Some(entry);
        }

        // Only drop what we saw; a fresher put may have landed meanwhile.
        self.entries
            .remove_if(namespace, |_, current| current.is_expired(now));
        debug!(%namespace, expired_at = %entry.expires_at, "evicted stale module factory");
        None
    }

    /// Stores (or overwrites) the exports of `namespace`, valid for `ttl`.
    /// Overlong ttls saturate at the largest representable timestamp.
    pub fn put(&self, namespace: &str, exports: ModuleExports, ttl: Duration) -> CachedFactory {
        let now = self.clock.now();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let factory = CachedFactory {
            namespace: namespace.to_string(),
            exports: Arc::new(exports),
            expires_at,
        };
        self.entries.insert(namespace.to_string(), factory.clone());
        debug!(%namespace, %expires_at, "stored module factory");
        factory
    }

    pub fn remove(&self, namespace: &str) -> Option<CachedFactory> {
        self.entries.remove(namespace).map(|(_, f)| f)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use module_sdk::{Component, ComponentRef, HelpDocument};

    fn exports(title: &str) -> ModuleExports {
        let doc: ComponentRef = Arc::new(HelpDocument::new(title, title, ""));
        ModuleExports::new().with("default", Arc::new(move || doc.clone()))
    }

    fn cache() -> (ModuleFactoryCache, Arc<ManualClock>) {
        let clock = ManualClock::new(Utc::now());
        (ModuleFactoryCache::new(clock.clone()), clock)
    }

    #[test]
    fn get_returns_entry_until_expiry() {
        let (cache, clock) = cache();
        cache.put("App1", exports("one"), Duration::from_secs(120));

        clock.advance(Duration::from_secs(119));
        let hit = cache.get("App1").expect("still fresh");
        let loader = hit.exports.get("default").unwrap();
        assert_eq!(loader().title(), "one");

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("App1").is_none());
        assert!(cache.is_empty(), "stale entry is dropped on lookup");
    }

    #[test]
    fn zero_ttl_is_immediately_stale() {
        let (cache, _clock) = cache();
        cache.put("App1", exports("one"), Duration::ZERO);
        assert!(cache.get("App1").is_none());
    }

    #[test]
    fn never_loaded_is_absent() {
        let (cache, _clock) = cache();
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn far_future_ttl_saturates() {
        let (cache, clock) = cache();
        let stored = cache.put("App1", exports("one"), Duration::MAX);
        assert_eq!(stored.expires_at, DateTime::<Utc>::MAX_UTC);

        clock.advance(Duration::from_secs(60 * 60 * 24 * 365 * 500));
        assert!(cache.get("App1").is_some());
    }

    #[test]
    fn last_put_wins() {
        let (cache, _clock) = cache();
        cache.put("App1", exports("first"), Duration::from_secs(10));
        cache.put("App1", exports("second"), Duration::from_secs(10));

        let hit = cache.get("App1").unwrap();
        assert_eq!(hit.exports.get("default").unwrap()().title(), "second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_and_clear_drop_entries() {
        let (cache, _clock) = cache();
        cache.put("App1", exports("one"), Duration::from_secs(10));
        cache.put("App2", exports("two"), Duration::from_secs(10));

        let removed = cache.remove("App1").unwrap();
        assert_eq!(removed.namespace, "App1");
        assert!(cache.get("App1").is_none());
        assert!(cache.remove("App1").is_none());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn clock_can_be_set_backwards() {
        let (cache, clock) = cache();
        let start = clock.now();
        cache.put("App1", exports("one"), Duration::from_secs(10));

        clock.advance(Duration::from_secs(30));
        clock.set(start);
        assert_eq!(clock.now(), start);
        assert!(cache.get("App1").is_some());
    }

    #[test]
    fn expiry_is_not_swept_eagerly() {
        let (cache, clock) = cache();
        cache.put("App1", exports("one"), Duration::from_secs(1));
        cache.put("App2", exports("two"), Duration::from_secs(1));
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("App1").is_none());
        assert_eq!(cache.len(), 1);
    }
}
