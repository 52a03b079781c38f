//! Atomically swappable snapshot with TTL freshness and single-flight refresh.
//!
//! ## Concurrency
//!
//! - Reads are a single `ArcSwapOption::load_full`; they never block on a
//!   refresh unless the held value is stale or missing.
//! - At most one refresh is in flight per cell (`refresh_lock`). Callers that
//!   arrive while it runs wait for it and receive its result.
//! - The refresh itself runs in a spawned task that owns the refresh lock, so a
//!   caller whose request is cancelled does not abort it.
//! - Every replacement (refresh install, patch, invalidation) happens under
//!   the `writes` lock. While a refresh is fetching, patches are also recorded
//!   in a journal and replayed onto the fetched value before it is installed,
//!   so a refresh never overwrites a concurrent write and never discards its
//!   own fetch because of one.
//! - An invalidation during the fetch means the fetched value may predate a
//!   store write; the refresh fetches again, up to `MAX_REFRESH_ATTEMPTS`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use mentors_storage::StorageError;

use super::CacheError;
use super::metric_names;

/// A refresh whose fetch keeps racing invalidations installs its last fetch
/// as stale after this many attempts.
const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// A write to the held value, replayable onto a value fetched concurrently.
type Patch<T> = Box<dyn Fn(&T) -> Result<Option<T>, CacheError> + Send + Sync>;

/// Writes that happened while a refresh was fetching.
struct Journal<T> {
    patches: Vec<Patch<T>>,
    invalidated: bool,
}

impl<T> Default for Journal<T> {
    fn default() -> Self {
        Self {
            patches: Vec::new(),
            invalidated: false,
        }
    }
}

/// Loads a complete value for a cell.
#[async_trait]
pub trait SnapshotSource<T>: Send + Sync + 'static {
    async fn load(&self) -> Result<T, StorageError>;
}

/// A published value with its freshness bookkeeping.
#[derive(Debug)]
pub(crate) struct Loaded<T> {
    pub value: Arc<T>,
    pub loaded_at: Instant,
    /// Fetched across an invalidation; the next lazy read reloads.
    pub stale: bool,
}

/// Observable state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Populated,
    Stale,
    Refreshing,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Populated => "populated",
            Self::Stale => "stale",
            Self::Refreshing => "refreshing",
        };
        f.write_str(s)
    }
}

/// Point-in-time statistics of a cell.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellStats {
    pub state: CacheState,
    pub age_ms: Option<u64>,
    pub ttl_secs: u64,
    pub epoch: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub hits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    /// TTL expiry or empty cache; failures fall back to the held value.
    Lazy,
    /// Operator request; always fetches and propagates failures.
    Forced,
}

#[derive(Debug, Default)]
struct Counters {
    refreshes: AtomicU64,
    failures: AtomicU64,
    hits: AtomicU64,
    /// Completed refresh attempts, successful or not.
    completed: AtomicU64,
}

struct Inner<T> {
    name: &'static str,
    ttl: Duration,
    source: Arc<dyn SnapshotSource<T>>,
    current: ArcSwapOption<Loaded<T>>,
    epoch: AtomicU64,
    refreshing: AtomicBool,
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
    /// Serializes writes; holds the journal while a refresh is fetching.
    writes: Mutex<Option<Journal<T>>>,
    counters: Counters,
}

/// Generic snapshot holder shared by the directory and tag caches.
pub struct SnapshotCell<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SnapshotCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("name", &self.inner.name)
            .field("ttl", &self.inner.ttl)
            .field("epoch", &self.inner.epoch.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> SnapshotCell<T> {
    pub fn new(name: &'static str, ttl: Duration, source: Arc<dyn SnapshotSource<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                ttl,
                source,
                current: ArcSwapOption::const_empty(),
                epoch: AtomicU64::new(0),
                refreshing: AtomicBool::new(false),
                refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
                writes: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Returns the held value regardless of age, without any backend call.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.inner.current.load_full().map(|l| l.value.clone())
    }

    /// Returns a fresh value, refreshing first if the cell is empty or stale.
    ///
    /// A failed refresh serves the held value if there is one.
    pub async fn get(&self) -> Result<Arc<T>, CacheError> {
        if let Some(value) = self.inner.fresh_value() {
            self.inner.record_hit();
            return Ok(value);
        }
        self.refresh(RefreshMode::Lazy).await
    }

    /// Fetches and installs a new value regardless of age.
    ///
    /// Returns the value that was installed; failures propagate.
    pub async fn force_refresh(&self) -> Result<Arc<T>, CacheError> {
        self.refresh(RefreshMode::Forced).await
    }

    /// Drops the held value. The next `get` performs a full load.
    pub fn invalidate(&self) {
        let mut writes = self.inner.writes.lock();
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.inner.current.store(None);
        if let Some(journal) = writes.as_mut() {
            journal.invalidated = true;
        }
    }

    /// Replaces the held value with one derived from it.
    ///
    /// `patch` runs under the write lock; returning `Ok(None)` keeps the held
    /// value. If a refresh is fetching, `patch` is also replayed onto the
    /// fetched value before that is installed, even when the cell is empty
    /// now: the caller has just written to the backing store and the fetch
    /// may predate that write. Returns the value held afterwards, or `None`
    /// if the cell was empty.
    pub fn replace<F>(&self, patch: F) -> Result<Option<Arc<T>>, CacheError>
    where
        F: Fn(&T) -> Result<Option<T>, CacheError> + Send + Sync + 'static,
    {
        let mut writes = self.inner.writes.lock();
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        let held = match self.inner.current.load_full() {
            None => None,
            Some(loaded) => match patch(&loaded.value)? {
                None => Some(loaded.value.clone()),
                Some(next) => {
                    let next = Arc::new(next);
                    self.inner.current.store(Some(Arc::new(Loaded {
                        value: next.clone(),
                        loaded_at: loaded.loaded_at,
                        stale: loaded.stale,
                    })));
                    Some(next)
                }
            },
        };
        if let Some(journal) = writes.as_mut() {
            journal.patches.push(Box::new(patch));
        }
        Ok(held)
    }

    pub fn state(&self) -> CacheState {
        if self.inner.refreshing.load(Ordering::Acquire) {
            return CacheState::Refreshing;
        }
        match self.inner.current.load_full() {
            None => CacheState::Empty,
            Some(loaded) if self.inner.is_fresh(&loaded) => CacheState::Populated,
            Some(_) => CacheState::Stale,
        }
    }

    pub fn stats(&self) -> CellStats {
        let counters = &self.inner.counters;
        CellStats {
            state: self.state(),
            age_ms: self
                .inner
                .current
                .load_full()
                .map(|l| l.loaded_at.elapsed().as_millis() as u64),
            ttl_secs: self.inner.ttl.as_secs(),
            epoch: self.inner.epoch.load(Ordering::Acquire),
            refreshes: counters.refreshes.load(Ordering::Relaxed),
            refresh_failures: counters.failures.load(Ordering::Relaxed),
            hits: counters.hits.load(Ordering::Relaxed),
        }
    }

    async fn refresh(&self, mode: RefreshMode) -> Result<Arc<T>, CacheError> {
        let seen = self.inner.counters.completed.load(Ordering::Acquire);
        let guard = self.inner.refresh_lock.clone().lock_owned().await;

        if mode == RefreshMode::Lazy {
            if let Some(value) = self.inner.fresh_value() {
                self.inner.record_hit();
                return Ok(value);
            }
            // A refresh finished while we waited and still left no fresh value:
            // it failed. Serve what is held rather than queueing another fetch.
            if self.inner.counters.completed.load(Ordering::Acquire) != seen {
                if let Some(value) = self.peek() {
                    return Ok(value);
                }
            }
        }

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let _refresh = guard;
            let _flag = RefreshingFlag::set(&inner.refreshing);
            let result = inner.fetch_and_install(mode).await;
            inner.counters.completed.fetch_add(1, Ordering::AcqRel);
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(CacheError::BackendUnavailable(StorageError::internal(
                format!("{} refresh task failed: {e}", self.inner.name),
            ))),
        }
    }
}

impl<T: Send + Sync + 'static> Inner<T> {
    fn is_fresh(&self, loaded: &Loaded<T>) -> bool {
        !loaded.stale && loaded.loaded_at.elapsed() <= self.ttl
    }

    fn fresh_value(&self) -> Option<Arc<T>> {
        self.current
            .load_full()
            .filter(|loaded| self.is_fresh(loaded))
            .map(|loaded| loaded.value.clone())
    }

    fn record_hit(&self) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(metric_names::HITS_TOTAL, "cache" => self.name).increment(1);
    }

    async fn fetch_and_install(&self, mode: RefreshMode) -> Result<Arc<T>, CacheError> {
        let started = Instant::now();
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(metric_names::REFRESH_TOTAL, "cache" => self.name).increment(1);
        debug!(cache = self.name, ?mode, "refresh started");

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut recording = Recording::start(&self.writes);
            let fetched = match self.source.load().await {
                Ok(value) => value,
                Err(e) => return self.refresh_failed(mode, e),
            };

            let installed = {
                let mut writes = self.writes.lock();
                recording.finish();
                let journal = writes.take().unwrap_or_default();
                if journal.invalidated && attempt < MAX_REFRESH_ATTEMPTS {
                    None
                } else {
                    let mut value = fetched;
                    for patch in &journal.patches {
                        if let Some(next) = patch(&value)? {
                            value = next;
                        }
                    }
                    let value = Arc::new(value);
                    self.current.store(Some(Arc::new(Loaded {
                        value: value.clone(),
                        loaded_at: Instant::now(),
                        stale: journal.invalidated,
                    })));
                    Some((value, journal.patches.len(), journal.invalidated))
                }
            };

            match installed {
                Some((value, replayed, stale)) => {
                    if stale {
                        warn!(
                            cache = self.name,
                            attempts = attempt,
                            "refresh kept racing invalidations; installed as stale"
                        );
                    }
                    debug!(
                        cache = self.name,
                        attempt,
                        replayed,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "refresh installed"
                    );
                    return Ok(value);
                }
                None => debug!(cache = self.name, attempt, "invalidated during refresh, fetching again"),
            }
        }
    }

    fn refresh_failed(&self, mode: RefreshMode, err: StorageError) -> Result<Arc<T>, CacheError> {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(metric_names::REFRESH_FAILURES_TOTAL, "cache" => self.name).increment(1);

        match (mode, self.current.load_full()) {
            (RefreshMode::Lazy, Some(held)) => {
                warn!(cache = self.name, error = %err, "refresh failed; serving stale snapshot");
                Ok(held.value.clone())
            }
            (RefreshMode::Lazy, None) => {
                error!(cache = self.name, error = %err, "refresh failed and cache is empty");
                Err(CacheError::BackendUnavailable(err))
            }
            (RefreshMode::Forced, _) => {
                warn!(cache = self.name, error = %err, "forced refresh failed");
                Err(CacheError::BackendUnavailable(err))
            }
        }
    }
}

/// Keeps the write journal open for one fetch; closes it on any exit.
struct Recording<'a, T> {
    writes: &'a Mutex<Option<Journal<T>>>,
    open: bool,
}

impl<'a, T> Recording<'a, T> {
    fn start(writes: &'a Mutex<Option<Journal<T>>>) -> Self {
        *writes.lock() = Some(Journal::default());
        Self { writes, open: true }
    }

    /// Marks the journal as taken by the caller, who holds the write lock.
    fn finish(&mut self) {
        self.open = false;
    }
}

impl<T> Drop for Recording<'_, T> {
    fn drop(&mut self) {
        if self.open {
            self.writes.lock().take();
        }
    }
}

/// Clears the refreshing flag when the refresh task ends, panics included.
struct RefreshingFlag<'a>(&'a AtomicBool);

impl<'a> RefreshingFlag<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RefreshingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Counts loads and returns the load number.
    #[derive(Default)]
    struct Counting {
        loads: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl SnapshotSource<usize> for Counting {
        async fn load(&self) -> Result<usize, StorageError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::connection("down"));
            }
            Ok(self.loads.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    fn cell(ttl_secs: u64) -> (SnapshotCell<usize>, Arc<Counting>) {
        let source = Arc::new(Counting::default());
        let cell = SnapshotCell::new("test", Duration::from_secs(ttl_secs), source.clone());
        (cell, source)
    }

    #[tokio::test(start_paused = true)]
    async fn get_loads_once_until_ttl_expires() {
        let (cell, source) = cell(5);
        assert_eq!(cell.state(), CacheState::Empty);

        let first = cell.get().await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        let second = cell.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cell.state(), CacheState::Stale);
        let third = cell.get().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert_eq!(cell.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_gets_share_one_refresh() {
        let (cell, source) = cell(60);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cell = cell.clone();
                tokio::spawn(async move { cell.get().await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert_eq!(*handle.await.unwrap(), 1);
        }
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_failure_serves_held_value_but_forced_failure_propagates() {
        let (cell, source) = cell(1);
        assert_eq!(*cell.get().await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(2)).await;

        source.fail.store(true, Ordering::SeqCst);
        assert_eq!(*cell.get().await.unwrap(), 1);
        assert!(matches!(
            cell.force_refresh().await,
            Err(CacheError::BackendUnavailable(_))
        ));
        assert_eq!(cell.stats().refresh_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_cell_failure_is_backend_unavailable() {
        let (cell, source) = cell(1);
        source.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            cell.get().await,
            Err(CacheError::BackendUnavailable(_))
        ));
        assert_eq!(cell.state(), CacheState::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn patch_during_refresh_is_replayed_onto_the_fetch() {
        let (cell, source) = cell(60);
        cell.get().await.unwrap();

        let refreshing = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.force_refresh().await })
        };
        // Let the refresh start its fetch, then patch underneath it.
        tokio::time::sleep(Duration::from_millis(1)).await;
        cell.replace(|v| Ok(Some(v + 100))).unwrap();
        assert_eq!(cell.peek().map(|v| *v), Some(101));

        // The fetch (2) is kept and the patch applied on top of it.
        let installed = refreshing.await.unwrap().unwrap();
        assert_eq!(*installed, 102);
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert_eq!(cell.peek().map(|v| *v), Some(102));
    }

    #[tokio::test(start_paused = true)]
    async fn patches_after_install_are_not_replayed_again() {
        let (cell, _) = cell(60);
        cell.get().await.unwrap();
        cell.force_refresh().await.unwrap();
        cell.replace(|v| Ok(Some(v * 10))).unwrap();
        cell.force_refresh().await.unwrap();
        assert_eq!(cell.peek().map(|v| *v), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_during_refresh_fetches_again() {
        let (cell, source) = cell(60);
        let refreshing = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.get().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        cell.invalidate();

        assert_eq!(*refreshing.await.unwrap().unwrap(), 2);
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert_eq!(cell.state(), CacheState::Populated);
    }

    #[tokio::test(start_paused = true)]
    async fn endless_invalidations_install_the_last_fetch_as_stale() {
        let (cell, source) = cell(60);
        let refreshing = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.force_refresh().await })
        };
        // One invalidation lands inside each 10ms fetch.
        tokio::time::sleep(Duration::from_millis(5)).await;
        for _ in 0..MAX_REFRESH_ATTEMPTS {
            cell.invalidate();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let installed = refreshing.await.unwrap().unwrap();
        assert_eq!(*installed, MAX_REFRESH_ATTEMPTS as usize);
        assert_eq!(source.loads.load(Ordering::SeqCst), MAX_REFRESH_ATTEMPTS as usize);
        assert_eq!(cell.state(), CacheState::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn patch_on_empty_cell_reaches_the_loading_fetch() {
        let (cell, _) = cell(60);
        let loading = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.get().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(cell.replace(|v| Ok(Some(v + 40))).unwrap().is_none());
        assert_eq!(*loading.await.unwrap().unwrap(), 41);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_caller_does_not_abort_refresh() {
        let (cell, source) = cell(60);
        let caller = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.get().await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(cell.peek().map(|v| *v), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn replace_on_empty_cell_is_a_no_op() {
        let (cell, _) = cell(60);
        assert!(cell.replace(|_| Ok(Some(7))).unwrap().is_none());
        assert_eq!(cell.stats().epoch, 1);
        assert!(cell.peek().is_none());
    }
}
