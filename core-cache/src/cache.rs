//! Keyed cache of derived values with staleness tracking.
//!
//! Values are expensive to compute (cover resolution, aggregate counts) and
//! derived entirely from store state, so they can always be recomputed.
//! Entries are either fresh or stale: stale entries are still readable but
//! [`DerivedCache::find_or_create`] recomputes them. Concurrent computations
//! of the same key collapse into one; an entry expired while its computation
//! is in flight is returned to the caller but never cached.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// A cached value together with its freshness.
#[derive(Debug, Clone)]
pub struct CachedValue<V> {
    pub value: V,
    pub freshness: Freshness,
}

struct Entry<V> {
    value: V,
    freshness: Freshness,
}

struct State<V> {
    entries: HashMap<String, Entry<V>>,
    /// Per-key invalidation counters. A computation records the counter
    /// before running and only caches its result if the counter is
    /// unchanged when it finishes.
    versions: HashMap<String, u64>,
}

/// Cache of derived values keyed by string, with `{library_id}/...` key
/// convention so invalidation can target a whole library by prefix.
pub struct DerivedCache<V> {
    state: Mutex<State<V>>,
    flights: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<V: Clone> DerivedCache<V> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                entries: HashMap::new(),
                versions: HashMap::new(),
            }),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Look up an entry without computing. Stale entries are returned with
    /// their freshness flag so callers can display them while refreshing.
    pub fn find(&self, key: &str) -> Option<CachedValue<V>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.get(key).map(|entry| CachedValue {
            value: entry.value.clone(),
            freshness: entry.freshness,
        })
    }

    fn find_fresh(&self, key: &str) -> Option<V> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .entries
            .get(key)
            .filter(|entry| entry.freshness == Freshness::Fresh)
            .map(|entry| entry.value.clone())
    }

    fn flight_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        flights.entry(key.to_string()).or_default().clone()
    }

    fn version(&self, key: &str) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state.versions.entry(key.to_string()).or_insert(0)
    }

    fn store_if_current(&self, key: &str, value: V, version: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.versions.get(key).copied().unwrap_or(0) == version {
            state.entries.insert(
                key.to_string(),
                Entry {
                    value,
                    freshness: Freshness::Fresh,
                },
            );
        } else {
            trace!(key, "computed value superseded by expiry; not cached");
        }
    }

    /// Return the fresh value for `key`, computing it if absent or stale.
    ///
    /// At most one computation per key runs at a time; waiters reuse its
    /// result through the cache. Errors are propagated and never cached.
    pub async fn find_or_create<F, Fut, E>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.find_fresh(key) {
            return Ok(value);
        }

        let lock = self.flight_lock(key);
        let _guard = lock.lock().await;

        // Another caller may have computed it while we waited.
        if let Some(value) = self.find_fresh(key) {
            return Ok(value);
        }

        let version = self.version(key);
        let value = compute().await?;
        self.store_if_current(key, value.clone(), version);
        Ok(value)
    }

    /// Remove an entry. An in-flight computation for the key will not cache
    /// its result.
    pub fn expire(&self, key: &str) {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.remove(key);
        expire_key(&mut state.versions, &mut flights, key);
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn expire_prefix(&self, prefix: &str) {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *state;
        state.entries.retain(|key, _| !key.starts_with(prefix));
        let keys: HashSet<String> = state
            .versions
            .keys()
            .chain(flights.keys())
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in keys {
            expire_key(&mut state.versions, &mut flights, &key);
        }
    }

    pub fn expire_all(&self) {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *state;
        state.entries.clear();
        let keys: HashSet<String> = state.versions.keys().chain(flights.keys()).cloned().collect();
        for key in keys {
            expire_key(&mut state.versions, &mut flights, &key);
        }
    }

    /// Flag an entry as stale in place; readers still see the old value
    /// until someone recomputes it.
    pub fn mark_stale(&self, key: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = state.entries.get_mut(key) {
            entry.freshness = Freshness::Stale;
        }
    }

    pub fn mark_stale_prefix(&self, prefix: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for (key, entry) in state.entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.freshness = Freshness::Stale;
            }
        }
    }

    pub fn mark_stale_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for entry in state.entries.values_mut() {
            entry.freshness = Freshness::Stale;
        }
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn bookkeeping_counts(&self) -> (usize, usize) {
        let flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (state.versions.len(), flights.len())
    }
}

/// Drop the bookkeeping for an expired key. A computation in flight keeps
/// its version counter and gets it bumped so its result is not cached; idle
/// keys lose both the counter and the flight lock.
fn expire_key(
    versions: &mut HashMap<String, u64>,
    flights: &mut HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    key: &str,
) {
    let in_flight = flights.get(key).is_some_and(|lock| lock.try_lock().is_err());
    if in_flight {
        *versions.entry(key.to_string()).or_insert(0) += 1;
    } else {
        versions.remove(key);
        flights.remove(key);
    }
}

impl<V: Clone> Default for DerivedCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn get(cache: &DerivedCache<String>, key: &str, calls: &AtomicUsize) -> String {
        cache
            .find_or_create(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(format!("value-{key}"))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_lookup_is_cached() {
        let cache = DerivedCache::new();
        let calls = AtomicUsize::new(0);

        assert_eq!(get(&cache, "lib/f1", &calls).await, "value-lib/f1");
        assert_eq!(get(&cache, "lib/f1", &calls).await, "value-lib/f1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_readable_but_recomputed() {
        let cache = DerivedCache::new();
        let calls = AtomicUsize::new(0);

        get(&cache, "lib/f1", &calls).await;
        cache.mark_stale("lib/f1");

        let found = cache.find("lib/f1").unwrap();
        assert_eq!(found.freshness, Freshness::Stale);
        assert_eq!(found.value, "value-lib/f1");

        get(&cache, "lib/f1", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.find("lib/f1").unwrap().freshness, Freshness::Fresh);
    }

    #[tokio::test]
    async fn test_expire_removes_entry() {
        let cache = DerivedCache::new();
        let calls = AtomicUsize::new(0);

        get(&cache, "lib/f1", &calls).await;
        cache.expire("lib/f1");
        assert!(cache.find("lib/f1").is_none());
    }

    #[tokio::test]
    async fn test_prefix_operations_scope_by_library() {
        let cache = DerivedCache::new();
        let calls = AtomicUsize::new(0);

        get(&cache, "lib-a/f1", &calls).await;
        get(&cache, "lib-a/f2", &calls).await;
        get(&cache, "lib-b/f1", &calls).await;

        cache.mark_stale_prefix("lib-a/");
        assert_eq!(cache.find("lib-a/f1").unwrap().freshness, Freshness::Stale);
        assert_eq!(cache.find("lib-b/f1").unwrap().freshness, Freshness::Fresh);

        cache.expire_prefix("lib-a/");
        assert!(cache.find("lib-a/f1").is_none());
        assert!(cache.find("lib-a/f2").is_none());
        assert!(cache.find("lib-b/f1").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_lookups_compute_once() {
        let cache = Arc::new(DerivedCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .find_or_create("lib/f1", || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, Infallible>(42u32)
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expire_during_computation_blocks_caching() {
        let cache = Arc::new(DerivedCache::new());

        let computing = Arc::new(tokio::sync::Notify::new());
        let proceed = Arc::new(tokio::sync::Notify::new());

        let task = {
            let cache = cache.clone();
            let computing = computing.clone();
            let proceed = proceed.clone();
            tokio::spawn(async move {
                cache
                    .find_or_create("lib/f1", || async {
                        computing.notify_one();
                        proceed.notified().await;
                        Ok::<_, Infallible>("computed".to_string())
                    })
                    .await
                    .unwrap()
            })
        };

        computing.notified().await;
        cache.expire("lib/f1");
        proceed.notify_one();

        // The caller still gets the value, but it must not be cached.
        assert_eq!(task.await.unwrap(), "computed");
        assert!(cache.find("lib/f1").is_none());
    }

    #[tokio::test]
    async fn test_expiry_prunes_bookkeeping_for_idle_keys() {
        let cache = DerivedCache::new();
        let calls = AtomicUsize::new(0);

        get(&cache, "lib-a/f1", &calls).await;
        get(&cache, "lib-a/f2", &calls).await;
        get(&cache, "lib-b/f1", &calls).await;
        assert_eq!(cache.bookkeeping_counts(), (3, 3));

        cache.expire("lib-a/f1");
        assert_eq!(cache.bookkeeping_counts(), (2, 2));

        cache.expire_prefix("lib-a/");
        assert_eq!(cache.bookkeeping_counts(), (1, 1));

        cache.expire_all();
        assert_eq!(cache.bookkeeping_counts(), (0, 0));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_expiry_keeps_bookkeeping_while_flight_runs() {
        let cache = Arc::new(DerivedCache::new());

        let computing = Arc::new(tokio::sync::Notify::new());
        let proceed = Arc::new(tokio::sync::Notify::new());

        let task = {
            let cache = cache.clone();
            let computing = computing.clone();
            let proceed = proceed.clone();
            tokio::spawn(async move {
                cache
                    .find_or_create("lib/f1", || async {
                        computing.notify_one();
                        proceed.notified().await;
                        Ok::<_, Infallible>("computed".to_string())
                    })
                    .await
                    .unwrap()
            })
        };

        computing.notified().await;
        // The running flight keeps its counter so the result is discarded.
        cache.expire("lib/f1");
        assert_eq!(cache.bookkeeping_counts(), (1, 1));

        proceed.notify_one();
        task.await.unwrap();
        assert!(cache.find("lib/f1").is_none());

        // Once the flight is over, expiring again clears the leftovers.
        cache.expire("lib/f1");
        assert_eq!(cache.bookkeeping_counts(), (0, 0));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: DerivedCache<String> = DerivedCache::new();
        let calls = AtomicUsize::new(0);

        let result: Result<String, &str> = cache
            .find_or_create("lib/f1", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("db unavailable")
            })
            .await;
        assert!(result.is_err());
        assert!(cache.find("lib/f1").is_none());

        let value = get(&cache, "lib/f1", &calls).await;
        assert_eq!(value, "value-lib/f1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
