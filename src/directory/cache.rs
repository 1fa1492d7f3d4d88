//! # Directory Cache
//!
//! Remembers what the directory answered: adapter id → endpoints and
//! identity → reference, each stamped with the time it was stored.
//!
//! Freshness is decided per lookup by the caller's [`CacheTtl`], not when the
//! entry is stored, because every reference carries its own cache timeout.

use crate::reference::{Endpoint, Identity, Reference};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::trace;

/// How old a cache entry may be and still be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    /// Every entry counts as stale.
    Disabled,
    /// Entries never expire.
    Unlimited,
    /// Entries expire after this many seconds.
    Seconds(u32),
}

impl CacheTtl {
    pub fn is_fresh(self, stored_at: Instant) -> bool {
        match self {
            CacheTtl::Disabled => false,
            CacheTtl::Unlimited => true,
            CacheTtl::Seconds(seconds) => {
                stored_at.elapsed() <= Duration::from_secs(u64::from(seconds))
            }
        }
    }
}

impl From<i32> for CacheTtl {
    /// Reference-style timeout: negative caches forever, zero disables caching.
    fn from(seconds: i32) -> Self {
        match u32::try_from(seconds) {
            Err(_) => CacheTtl::Unlimited,
            Ok(0) => CacheTtl::Disabled,
            Ok(seconds) => CacheTtl::Seconds(seconds),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

impl<V> Entry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    adapters: HashMap<String, Entry<Vec<Endpoint>>>,
    objects: HashMap<Identity, Entry<Arc<Reference>>>,
}

/// Thread-safe cache of directory answers.
///
/// One mutex guards both tables; every operation holds it only for a map access.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    tables: Mutex<Tables>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the adapter's endpoints if an entry exists and is fresh for `ttl`.
    pub fn lookup_adapter(&self, adapter_id: &str, ttl: CacheTtl) -> Option<Vec<Endpoint>> {
        let tables = self.tables.lock();
        tables
            .adapters
            .get(adapter_id)
            .filter(|entry| ttl.is_fresh(entry.stored_at))
            .map(|entry| entry.value.clone())
    }

    /// Returns the adapter's endpoints regardless of age.
    pub fn stale_adapter(&self, adapter_id: &str) -> Option<Vec<Endpoint>> {
        self.tables
            .lock()
            .adapters
            .get(adapter_id)
            .map(|entry| entry.value.clone())
    }

    pub fn store_adapter(&self, adapter_id: &str, endpoints: Vec<Endpoint>) {
        trace!(adapter_id, count = endpoints.len(), "Cached adapter endpoints");
        self.tables
            .lock()
            .adapters
            .insert(adapter_id.to_owned(), Entry::new(endpoints));
    }

    /// Removes the adapter's entry and returns what it held.
    pub fn evict_adapter(&self, adapter_id: &str) -> Option<Vec<Endpoint>> {
        let removed = self.tables.lock().adapters.remove(adapter_id);
        removed.map(|entry| entry.value)
    }

    /// Returns the object's reference if an entry exists and is fresh for `ttl`.
    pub fn lookup_object(&self, identity: &Identity, ttl: CacheTtl) -> Option<Arc<Reference>> {
        let tables = self.tables.lock();
        tables
            .objects
            .get(identity)
            .filter(|entry| ttl.is_fresh(entry.stored_at))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Returns the object's reference regardless of age.
    pub fn stale_object(&self, identity: &Identity) -> Option<Arc<Reference>> {
        self.tables
            .lock()
            .objects
            .get(identity)
            .map(|entry| Arc::clone(&entry.value))
    }

    pub fn store_object(&self, identity: &Identity, reference: Arc<Reference>) {
        trace!(%identity, "Cached object reference");
        self.tables
            .lock()
            .objects
            .insert(identity.clone(), Entry::new(reference));
    }

    /// Removes the object's entry and returns what it held.
    pub fn evict_object(&self, identity: &Identity) -> Option<Arc<Reference>> {
        let removed = self.tables.lock().objects.remove(identity);
        removed.map(|entry| entry.value)
    }

    pub fn clear(&self) {
        let mut tables = self.tables.lock();
        tables.adapters.clear();
        tables.objects.clear();
    }

    pub fn is_empty(&self) -> bool {
        let tables = self.tables.lock();
        tables.adapters.is_empty() && tables.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_from_reference_timeout() {
        assert_eq!(CacheTtl::from(-1), CacheTtl::Unlimited);
        assert_eq!(CacheTtl::from(0), CacheTtl::Disabled);
        assert_eq!(CacheTtl::from(30), CacheTtl::Seconds(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_entry_expires() {
        let cache = DirectoryCache::new();
        let endpoints = vec![Endpoint::tcp("h", 4061)];
        cache.store_adapter("A", endpoints.clone());

        assert_eq!(cache.lookup_adapter("A", CacheTtl::Seconds(5)), Some(endpoints.clone()));
        assert_eq!(cache.lookup_adapter("A", CacheTtl::Disabled), None);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.lookup_adapter("A", CacheTtl::Seconds(5)), None);
        assert_eq!(cache.lookup_adapter("A", CacheTtl::Unlimited), Some(endpoints.clone()));
        assert_eq!(cache.stale_adapter("A"), Some(endpoints));
    }

    #[tokio::test]
    async fn test_evict_returns_previous() {
        let cache = DirectoryCache::new();
        let identity = Identity::named("hello");
        let reference = Arc::new(Reference::indirect(identity.clone(), "A").unwrap());
        cache.store_object(&identity, Arc::clone(&reference));

        assert_eq!(cache.evict_object(&identity), Some(reference));
        assert_eq!(cache.evict_object(&identity), None);
        assert_eq!(cache.lookup_object(&identity, CacheTtl::Unlimited), None);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = DirectoryCache::new();
        cache.store_adapter("A", vec![Endpoint::tcp("h", 1)]);
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
