//! Query cache.
//!
//! A request-deduplicating cache keyed by semantic query keys such as
//! `["accrual-requests", {status=pending}]`. It is an explicit instance with
//! a defined lifecycle (create at start-up, [`QueryCache::shutdown`] at exit),
//! shared by cloning.
//!
//! Fetches run as spawned tasks. Each fetch carries a generation number and
//! a cancellation token; a cancelled or superseded fetch never writes its
//! result. This is what lets the optimistic mutation protocol suspend
//! background refetches before patching cached data.
//!
//! The first read or write starts a background collector that drops entries
//! idle for longer than `gc_time`; [`QueryCache::shutdown`] stops it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use mileage_core::config::CacheSettings;

use crate::error::ApiError;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Registered fetch function. Receives the currently cached value so that
/// paginated queries can refetch every page they have loaded.
pub type Fetcher<V> = Arc<dyn Fn(Option<V>) -> BoxFuture<Result<V, ApiError>> + Send + Sync>;

/// One-off fetch operation (e.g. "load the next page").
pub type FetchOnce<V> = Box<dyn FnOnce(Option<V>) -> BoxFuture<Result<V, ApiError>> + Send>;

type Outcome<V> = Option<Result<V, ApiError>>;

/// Shortest interval between two garbage collection sweeps.
const MIN_GC_PERIOD: Duration = Duration::from_secs(1);

/// Semantic cache key: a scope plus a sorted parameter map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    scope: String,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn params<K: Into<String>>(mut self, pairs: impl IntoIterator<Item = (K, String)>) -> Self {
        for (k, v) in pairs {
            self.params.insert(k.into(), v);
        }
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}, {{", self.scope)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}]")
    }
}

/// Selects cache entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    /// Every key in a scope (a cache partition).
    Scope(String),
    /// One exact key.
    Exact(QueryKey),
    All,
}

impl KeyFilter {
    pub fn scope(scope: impl Into<String>) -> Self {
        Self::Scope(scope.into())
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::Scope(scope) => key.scope == *scope,
            Self::Exact(exact) => key == exact,
            Self::All => true,
        }
    }
}

/// Cache tuning.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Data younger than this is served without a request.
    pub stale_time: Duration,
    /// Entries idle for longer than this are dropped by the background
    /// collector (also the sweep period).
    pub gc_time: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            gc_time: Duration::from_secs(5 * 60),
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(s: &CacheSettings) -> Self {
        Self {
            stale_time: Duration::from_secs(s.stale_time_secs),
            gc_time: Duration::from_secs(s.gc_time_secs),
        }
    }
}

/// Exact copy of the data held by a set of keys, for rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<V> {
    entries: Vec<(QueryKey, Option<V>)>,
}

impl<V> Snapshot<V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_ref())
    }

    /// Keys that held data, with that data.
    pub fn iter(&self) -> impl Iterator<Item = (&QueryKey, &V)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
    }
}

struct InFlight<V> {
    generation: u64,
    token: CancellationToken,
    rx: watch::Receiver<Outcome<V>>,
}

struct Entry<V> {
    data: Option<V>,
    updated_at: Option<Instant>,
    invalidated: bool,
    generation: u64,
    in_flight: Option<InFlight<V>>,
    fetcher: Option<Fetcher<V>>,
    last_used: Instant,
}

impl<V: Clone> Entry<V> {
    fn new() -> Self {
        Self {
            data: None,
            updated_at: None,
            invalidated: false,
            generation: 0,
            in_flight: None,
            fetcher: None,
            last_used: Instant::now(),
        }
    }

    fn fresh_data(&self, stale_time: Duration) -> Option<V> {
        if self.invalidated {
            return None;
        }
        let updated = self.updated_at?;
        if updated.elapsed() >= stale_time {
            return None;
        }
        self.data.clone()
    }

    /// Abort the in-flight fetch, if any, so it cannot write.
    fn cancel(&mut self) -> bool {
        match self.in_flight.take() {
            Some(flight) => {
                flight.token.cancel();
                self.generation += 1;
                true
            }
            None => false,
        }
    }
}

type Entries<V> = HashMap<QueryKey, Entry<V>>;

/// Shared query cache for values of type `V`.
pub struct QueryCache<V> {
    entries: Arc<RwLock<Entries<V>>>,
    config: CacheConfig,
    gc: Arc<OnceLock<CancellationToken>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            config: self.config,
            gc: Arc::clone(&self.gc),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> QueryCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            config,
            gc: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub const fn config(&self) -> CacheConfig {
        self.config
    }

    /// Read through the cache.
    ///
    /// Fresh data is returned without a request. Otherwise a fetch is started,
    /// or joined if one is already in flight for the key, so concurrent callers
    /// share one request. The fetcher is remembered for invalidation refetches.
    pub async fn fetch(&self, key: QueryKey, fetcher: Fetcher<V>) -> Result<V, ApiError> {
        self.ensure_collector();
        let rx = {
            let mut entries = self.entries.write().await;
            let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
            entry.fetcher = Some(Arc::clone(&fetcher));
            entry.last_used = Instant::now();
            if let Some(data) = entry.fresh_data(self.config.stale_time) {
                trace!(%key, "Cache hit");
                return Ok(data);
            }
            match &entry.in_flight {
                Some(flight) => {
                    trace!(%key, "Joining in-flight fetch");
                    flight.rx.clone()
                }
                None => self.start(&key, entry, Box::new(move |prev| fetcher(prev))),
            }
        };
        wait(rx).await
    }

    /// Run a one-off operation against the key's current value and store its
    /// result, regardless of freshness. Any fetch already in flight for the
    /// key is superseded.
    pub async fn run(&self, key: QueryKey, op: FetchOnce<V>) -> Result<V, ApiError> {
        self.ensure_collector();
        let rx = {
            let mut entries = self.entries.write().await;
            let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
            entry.last_used = Instant::now();
            entry.cancel();
            self.start(&key, entry, op)
        };
        wait(rx).await
    }

    fn start(&self, key: &QueryKey, entry: &mut Entry<V>, op: FetchOnce<V>) -> watch::Receiver<Outcome<V>> {
        entry.generation += 1;
        let generation = entry.generation;
        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        entry.in_flight = Some(InFlight {
            generation,
            token: token.clone(),
            rx: rx.clone(),
        });

        let previous = entry.data.clone();
        let entries = Arc::clone(&self.entries);
        let key = key.clone();
        debug!(%key, generation, "Fetch started");

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(ApiError::cancelled()),
                res = op(previous) => res,
            };

            {
                let mut entries = entries.write().await;
                if let Some(entry) = entries.get_mut(&key) {
                    let current = entry
                        .in_flight
                        .as_ref()
                        .is_some_and(|f| f.generation == generation);
                    if current {
                        entry.in_flight = None;
                        if let Ok(data) = &result {
                            entry.data = Some(data.clone());
                            entry.updated_at = Some(Instant::now());
                            entry.invalidated = false;
                        }
                        debug!(%key, generation, ok = result.is_ok(), "Fetch settled");
                    } else {
                        debug!(%key, generation, "Discarding result of cancelled fetch");
                    }
                }
            }
            let _ = tx.send(Some(result));
        });
        rx
    }

    /// Cached data for a key, fresh or not.
    pub async fn get(&self, key: &QueryKey) -> Option<V> {
        self.entries
            .read()
            .await
            .get(key)
            .and_then(|e| e.data.clone())
    }

    /// Replace a key's data as if it had just been fetched.
    pub async fn set(&self, key: QueryKey, value: V) {
        self.ensure_collector();
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key).or_insert_with(Entry::new);
        entry.data = Some(value);
        entry.updated_at = Some(Instant::now());
        entry.invalidated = false;
        entry.last_used = Instant::now();
    }

    pub async fn is_fetching(&self, key: &QueryKey) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|e| e.in_flight.is_some())
    }

    /// Whether the next [`fetch`](Self::fetch) would issue a request.
    pub async fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_none_or(|e| e.fresh_data(self.config.stale_time).is_none())
    }

    pub async fn keys(&self, filter: &KeyFilter) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| filter.matches(k))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Abort every in-flight fetch matching the filter. Returns how many were
    /// cancelled.
    pub async fn cancel(&self, filter: &KeyFilter) -> usize {
        let mut entries = self.entries.write().await;
        let cancelled = entries
            .iter_mut()
            .filter(|(k, _)| filter.matches(k))
            .filter(|(_, e)| e.in_flight.is_some())
            .map(|(_, e)| e.cancel())
            .filter(|c| *c)
            .count();
        if cancelled > 0 {
            debug!(?filter, cancelled, "Cancelled in-flight fetches");
        }
        cancelled
    }

    /// Copy the data of every key matching the filter.
    pub async fn snapshot(&self, filter: &KeyFilter) -> Snapshot<V> {
        let entries = self.entries.read().await;
        let mut snapshot: Vec<(QueryKey, Option<V>)> = entries
            .iter()
            .filter(|(k, _)| filter.matches(k))
            .map(|(k, e)| (k.clone(), e.data.clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        Snapshot { entries: snapshot }
    }

    /// Put back the data captured by [`snapshot`](Self::snapshot).
    pub async fn restore(&self, snapshot: Snapshot<V>) {
        let mut entries = self.entries.write().await;
        for (key, data) in snapshot.entries {
            let entry = entries.entry(key).or_insert_with(Entry::new);
            entry.data = data;
        }
    }

    /// Patch cached data in place. Returns the number of entries visited.
    pub async fn update<F>(&self, filter: &KeyFilter, mut patch: F) -> usize
    where
        F: FnMut(&mut V),
    {
        let mut entries = self.entries.write().await;
        let mut touched = 0;
        for (_, entry) in entries.iter_mut().filter(|(k, _)| filter.matches(k)) {
            if let Some(data) = entry.data.as_mut() {
                patch(data);
                touched += 1;
            }
        }
        touched
    }

    /// Mark matching entries stale and refetch, in the background, every one
    /// that has a registered fetcher. Returns the number of refetches started.
    pub async fn invalidate(&self, filter: &KeyFilter) -> usize {
        let mut entries = self.entries.write().await;
        let mut started = 0;
        let keys: Vec<QueryKey> = entries
            .keys()
            .filter(|k| filter.matches(k))
            .cloned()
            .collect();
        for key in keys {
            let Some(entry) = entries.get_mut(&key) else {
                continue;
            };
            entry.invalidated = true;
            if let Some(fetcher) = entry.fetcher.clone() {
                entry.cancel();
                self.start(&key, entry, Box::new(move |prev| fetcher(prev)));
                started += 1;
            }
        }
        debug!(?filter, started, "Invalidated queries");
        started
    }

    /// Wait until no fetch matching the filter is in flight.
    pub async fn settled(&self, filter: &KeyFilter) {
        loop {
            let pending: Vec<watch::Receiver<Outcome<V>>> = {
                let entries = self.entries.read().await;
                entries
                    .iter()
                    .filter(|(k, _)| filter.matches(k))
                    .filter_map(|(_, e)| e.in_flight.as_ref().map(|f| f.rx.clone()))
                    .collect()
            };
            if pending.is_empty() {
                return;
            }
            for rx in pending {
                let _ = wait(rx).await;
            }
        }
    }

    /// Drop entries matching the filter, cancelling their fetches.
    pub async fn remove(&self, filter: &KeyFilter) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, e| {
            if filter.matches(k) {
                e.cancel();
                false
            } else {
                true
            }
        });
        before - entries.len()
    }

    /// Drop idle entries not used within `gc_time`.
    pub async fn collect_garbage(&self) -> usize {
        collect_idle(&mut *self.entries.write().await, self.config.gc_time)
    }

    /// Whether the background collector is running.
    pub fn is_collecting(&self) -> bool {
        self.gc.get().is_some_and(|token| !token.is_cancelled())
    }

    fn ensure_collector(&self) {
        self.gc.get_or_init(|| {
            let token = CancellationToken::new();
            spawn_collector(Arc::downgrade(&self.entries), self.config.gc_time, token.clone());
            token
        });
    }

    /// Stop the collector, cancel everything and empty the cache.
    pub async fn shutdown(&self) {
        if let Some(token) = self.gc.get() {
            token.cancel();
        }
        let removed = self.remove(&KeyFilter::All).await;
        debug!(removed, "Query cache shut down");
    }
}

fn collect_idle<V>(entries: &mut Entries<V>, gc_time: Duration) -> usize {
    let before = entries.len();
    entries.retain(|_, e| e.in_flight.is_some() || e.last_used.elapsed() < gc_time);
    let removed = before - entries.len();
    if removed > 0 {
        debug!(removed, "Collected idle cache entries");
    }
    removed
}

/// Sweep idle entries every `gc_time` until cancelled or the cache is dropped.
fn spawn_collector<V: Send + Sync + 'static>(
    entries: Weak<RwLock<Entries<V>>>,
    gc_time: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(gc_time.max(MIN_GC_PERIOD));
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let Some(entries) = entries.upgrade() else {
                        trace!("Query cache dropped, collector exiting");
                        return;
                    };
                    collect_idle(&mut *entries.write().await, gc_time);
                }
                () = shutdown.cancelled() => {
                    trace!("Cache collector shutting down");
                    return;
                }
            }
        }
    });
}

async fn wait<V: Clone>(mut rx: watch::Receiver<Outcome<V>>) -> Result<V, ApiError> {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(slot) => slot.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| Err(ApiError::cancelled()))
}

/// Wrap an async closure as a [`Fetcher`].
pub fn fetcher<V, F, Fut>(f: F) -> Fetcher<V>
where
    F: Fn(Option<V>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
{
    Arc::new(move |prev: Option<V>| -> BoxFuture<Result<V, ApiError>> { Box::pin(f(prev)) })
}
