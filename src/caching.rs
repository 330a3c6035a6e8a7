//! A [`ToggleMap`] decorator that caches toggles and falls back to the last known good toggle
//! when the underlying map fails.
use std::{
    collections::HashSet,
    marker::PhantomData,
    mem,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;

use crate::{
    cache::{BoundedCache, CacheSpec},
    Result, Toggle, ToggleMap,
};

/// A [`ToggleMap`] which caches toggles retrieved from an underlying `ToggleMap`.
///
/// # Failure handling
///
/// Lookup failures of the underlying map (see
/// [`Error::is_lookup_failure`](crate::Error::is_lookup_failure)) are never returned from
/// [`ToggleMap::resolve`]. Instead the last toggle successfully loaded for the key is returned,
/// or [`Toggle::always_false`] if the key was never loaded. Other errors indicate a programming
/// or configuration error and are propagated.
///
/// An entry that was evicted or expired is loaded again on the next lookup; the fallback is only
/// used when that load fails.
///
/// # Refresh
///
/// [`ToggleMap::keys`] returns the underlying key set and refreshes every returned key. By
/// default the refresh runs on a background thread and `keys()` does not wait for it. Each map
/// runs at most one refresh thread: keys requested while it is busy are queued once and picked
/// up by the same thread. A key that is already being refreshed is skipped.
///
/// # Examples
///
/// ```
/// # use serde_json::json;
/// # use toggle::{CachingToggleMap, DocumentToggleMap, ToggleMap};
/// let document = DocumentToggleMap::<u64>::from_nodes(vec![
///     json!({"key": "/feature/beta", "value": 0, "filters": [
///         {"type": "cohort", "target": "beta", "value": 10000}
///     ]}),
/// ]);
/// let toggles = CachingToggleMap::new(document, "maximumSize=1000,expireAfterWrite=5m")?;
///
/// let toggle = toggles.resolve("/feature/beta")?;
/// assert!(toggle.with_cohort("beta").evaluate(&7));
///
/// // Unknown keys are off.
/// assert!(!toggles.resolve("/feature/unknown")?.evaluate(&7));
/// # Ok::<(), toggle::Error>(())
/// ```
pub struct CachingToggleMap<M, T> {
    inner: Arc<Inner<M, T>>,
    background_refresh: bool,
}

struct Inner<M, T> {
    underlying: M,
    cache: BoundedCache<Toggle<T>>,
    // We keep explicit references to the last loaded toggles in order to fall back to them when
    // lookups to the underlying map fail. Entries are only ever overwritten.
    fallback: DashMap<String, Toggle<T>>,
    refresh_queue: Mutex<RefreshQueue>,
    // Keys with a refresh in flight.
    refreshing: DashSet<String>,
    _input: PhantomData<fn(&T)>,
}

#[derive(Default)]
struct RefreshQueue {
    keys: HashSet<String>,
    worker_running: bool,
}

impl<M, T> CachingToggleMap<M, T>
where
    M: ToggleMap<T> + Send + Sync + 'static,
    T: 'static,
{
    /// Create a caching map over `underlying` configured by a [`CacheSpec`] string, e.g.
    /// `"maximumSize=1000,expireAfterWrite=5m"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCacheSpec`](crate::Error::InvalidCacheSpec) if `cache_spec` is
    /// malformed.
    pub fn new(underlying: M, cache_spec: &str) -> Result<CachingToggleMap<M, T>> {
        Ok(CachingToggleMap::from_spec(underlying, cache_spec.parse()?))
    }

    /// Create a caching map over `underlying` configured by `cache_spec`.
    pub fn from_spec(underlying: M, cache_spec: CacheSpec) -> CachingToggleMap<M, T> {
        CachingToggleMap {
            inner: Arc::new(Inner {
                underlying,
                cache: BoundedCache::new(cache_spec),
                fallback: DashMap::new(),
                refresh_queue: Mutex::new(RefreshQueue::default()),
                refreshing: DashSet::new(),
                _input: PhantomData,
            }),
            background_refresh: true,
        }
    }

    /// Choose whether [`ToggleMap::keys`] refreshes on a background thread (the default) or
    /// inline before returning.
    pub fn with_background_refresh(mut self, enabled: bool) -> CachingToggleMap<M, T> {
        self.background_refresh = enabled;
        self
    }

    /// The decorated map.
    pub fn underlying(&self) -> &M {
        &self.inner.underlying
    }

    /// Configuration of the cache.
    pub fn cache_spec(&self) -> &CacheSpec {
        self.inner.cache.spec()
    }

    /// Returns a toggle that looks `key` up through this map every time it is evaluated, so it
    /// follows updates of the underlying map.
    ///
    /// An explicit or bound cohort is passed on to the looked-up toggle. Without one, the
    /// looked-up toggle is evaluated with its own binding.
    pub fn live(&self, key: impl Into<String>) -> Toggle<T> {
        let inner = Arc::clone(&self.inner);
        let key = key.into();

        Toggle::from_fn(move |input, cohort| {
            let Ok(toggle) = inner.resolve(&key) else {
                // Already logged by `resolve`.
                return false;
            };
            match cohort {
                Some(_) => toggle.evaluate_with_cohort(input, cohort),
                None => toggle.evaluate(input),
            }
        })
    }

    fn schedule_refresh(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }

        if !self.background_refresh {
            self.inner.refresh_all(&keys);
            return;
        }

        let start_worker = {
            let mut queue = self.inner.refresh_queue.lock();
            queue.keys.extend(keys);
            !mem::replace(&mut queue.worker_running, true)
        };
        if !start_worker {
            log::trace!(target: "toggle", "refresh thread busy, keys queued");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let spawned = std::thread::Builder::new()
            .name("toggle-refresh".to_owned())
            .spawn(move || inner.drain_refresh_queue());

        if let Err(err) = spawned {
            log::warn!(target: "toggle", "unable to start toggle refresh thread: {:?}", err);
            // Queued keys stay pending for the next `keys()` call.
            self.inner.refresh_queue.lock().worker_running = false;
        }
    }
}

impl<M: ToggleMap<T>, T> Inner<M, T> {
    fn load(&self, key: &str) -> Result<Toggle<T>> {
        let toggle = self.underlying.resolve(key)?;
        self.fallback.insert(key.to_owned(), toggle.clone());
        Ok(toggle)
    }

    fn resolve(&self, key: &str) -> Result<Toggle<T>> {
        match self.cache.get_or_load(key, |key| self.load(key)) {
            Ok(toggle) => Ok(toggle),
            Err(err) if err.is_lookup_failure() => {
                let fallback = self.fallback.get(key).map(|toggle| toggle.clone());
                log::debug!(target: "toggle",
                            key,
                            has_fallback = fallback.is_some();
                            "toggle lookup failed, falling back: {}", err);
                Ok(fallback.unwrap_or_else(Toggle::always_false))
            }
            Err(err) => {
                log::error!(target: "toggle", key; "unexpected error while loading toggle: {:?}", err);
                Err(err)
            }
        }
    }

    fn refresh(&self, key: &str) {
        match self.cache.refresh(key, |key| self.load(key)) {
            Ok(_) => {}
            Err(err) if err.is_lookup_failure() => {
                log::debug!(target: "toggle", key; "unable to refresh toggle, keeping previous value: {}", err);
            }
            Err(err) => {
                log::error!(target: "toggle", key; "unexpected error while refreshing toggle: {:?}", err);
            }
        }
    }

    fn refresh_all<'a>(&self, keys: impl IntoIterator<Item = &'a String>) {
        for key in keys {
            if !self.refreshing.insert(key.clone()) {
                log::trace!(target: "toggle", key = key.as_str(); "refresh already in flight, skipping");
                continue;
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| self.refresh(key)));
            self.refreshing.remove(key);

            if outcome.is_err() {
                log::warn!(target: "toggle", key = key.as_str(); "refreshing toggle panicked");
            }
        }
    }

    /// Refresh queued keys until the queue is empty, then mark the worker as stopped.
    fn drain_refresh_queue(&self) {
        loop {
            let keys = {
                let mut queue = self.refresh_queue.lock();
                if queue.keys.is_empty() {
                    queue.worker_running = false;
                    return;
                }
                mem::take(&mut queue.keys)
            };
            log::trace!(target: "toggle", keys = keys.len(); "refreshing toggles");
            self.refresh_all(&keys);
        }
    }
}

impl<M, T> ToggleMap<T> for CachingToggleMap<M, T>
where
    M: ToggleMap<T> + Send + Sync + 'static,
    T: 'static,
{
    fn resolve(&self, key: &str) -> Result<Toggle<T>> {
        self.inner.resolve(key)
    }

    fn keys(&self) -> Result<HashSet<String>> {
        let keys = self.inner.underlying.keys()?;
        self.schedule_refresh(keys.iter().cloned().collect());
        Ok(keys)
    }
}
