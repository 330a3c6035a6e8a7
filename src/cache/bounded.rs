use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::CacheSpec;
use crate::Result;

struct Entry<V> {
    value: V,
    written_at: Instant,
    accessed_at: Instant,
    /// Logical access time used for least-recently-used eviction.
    last_use: u64,
}

struct State<V> {
    entries: HashMap<String, Entry<V>>,
    clock: u64,
}

impl<V> State<V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// A thread-safe, size- and time-bounded cache keyed by toggle key.
///
/// Loads for the same key are serialized through a per-key lock, so concurrent misses result in
/// a single load. Failed loads are never cached.
///
/// Eviction scans for the least recently used entry, which is linear in the number of cached
/// keys. Toggle key sets are small enough for that to be negligible next to a load.
pub struct BoundedCache<V> {
    spec: CacheSpec,
    state: Mutex<State<V>>,
    loads: DashMap<String, Arc<Mutex<()>>>,
}

impl<V: Clone> BoundedCache<V> {
    /// Create an empty cache configured by `spec`.
    pub fn new(spec: CacheSpec) -> BoundedCache<V> {
        BoundedCache {
            state: Mutex::new(State {
                entries: HashMap::with_capacity(spec.initial_capacity().unwrap_or(0)),
                clock: 0,
            }),
            loads: DashMap::new(),
            spec,
        }
    }

    /// Configuration of this cache.
    pub fn spec(&self) -> &CacheSpec {
        &self.spec
    }

    /// Returns the cached value for `key` if present and not expired.
    pub fn get_if_present(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        if state
            .entries
            .get(key)
            .is_some_and(|entry| self.is_expired(entry, now))
        {
            state.entries.remove(key);
            return None;
        }

        let tick = state.tick();
        let entry = state.entries.get_mut(key)?;
        entry.accessed_at = now;
        entry.last_use = tick;
        Some(entry.value.clone())
    }

    /// Returns the cached value for `key`, calling `load` on a miss.
    ///
    /// A successful load is stored; an error is returned as is and nothing is stored.
    pub fn get_or_load<F>(&self, key: &str, load: F) -> Result<V>
    where
        F: FnOnce(&str) -> Result<V>,
    {
        if let Some(value) = self.get_if_present(key) {
            return Ok(value);
        }

        self.with_load_lock(key, || {
            // Another caller may have finished loading while we were waiting for the lock.
            if let Some(value) = self.get_if_present(key) {
                return Ok(value);
            }

            let value = load(key)?;
            self.insert(key, value.clone());
            Ok(value)
        })
    }

    /// Reload `key` unconditionally. On failure the current entry, if any, is kept.
    pub fn refresh<F>(&self, key: &str, load: F) -> Result<V>
    where
        F: FnOnce(&str) -> Result<V>,
    {
        self.with_load_lock(key, || {
            let value = load(key)?;
            self.insert(key, value.clone());
            Ok(value)
        })
    }

    /// Store `value` under `key`, evicting expired and least recently used entries as needed.
    pub fn insert(&self, key: &str, value: V) {
        if self.spec.maximum_size() == Some(0) {
            return;
        }

        let now = Instant::now();
        let mut state = self.state.lock();
        state.entries.retain(|_, entry| !self.is_expired(entry, now));

        let last_use = state.tick();
        state.entries.insert(
            key.to_owned(),
            Entry {
                value,
                written_at: now,
                accessed_at: now,
                last_use,
            },
        );

        if let Some(maximum_size) = self.spec.maximum_size() {
            while state.entries.len() as u64 > maximum_size {
                let Some(lru) = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_use)
                    .map(|(key, _)| key.clone())
                else {
                    break;
                };
                state.entries.remove(&lru);
                log::trace!(target: "toggle", key:display = lru; "evicted toggle from cache");
            }
        }
    }

    /// Drop the entry for `key`.
    pub fn invalidate(&self, key: &str) {
        self.state.lock().entries.remove(key);
    }

    /// Number of stored entries, including ones that expired but were not purged yet.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        let elapsed = |since: Instant| now.saturating_duration_since(since);
        let outlived = |ttl: Option<Duration>, since: Instant| ttl.is_some_and(|ttl| elapsed(since) >= ttl);

        outlived(self.spec.expire_after_write(), entry.written_at)
            || outlived(self.spec.expire_after_access(), entry.accessed_at)
    }

    fn with_load_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = self.loads.entry(key.to_owned()).or_default().clone();

        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);

        // Clones are only taken under the shard lock, so a count of one means no other caller
        // is waiting on this key.
        self.loads
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);

        result
    }
}
