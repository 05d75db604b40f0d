//! Page access synchronizer: serializes access to each page of a session
//! while unrelated pages proceed in parallel.
//!
//! A request calls [`PageAccessSynchronizer::lock_page`] before touching a
//! stored page and [`PageAccessSynchronizer::unlock_all_pages`] once it is
//! done. Locks are reentrant, waits are bounded by the configured maximum,
//! and release-all drops every page regardless of how often it was locked.
//!
//! ```
//! use std::time::Duration;
//! use pagesync::sync::PageAccessSynchronizer;
//! use pagesync::types::PageId;
//!
//! let sync = PageAccessSynchronizer::<PageId>::new(Duration::from_secs(5));
//! {
//!     let scope = sync.scope();
//!     scope.lock_page(&PageId(1))?;
//!     scope.lock_page(&PageId(1))?;
//!     // ... work on page 1 ...
//! }
//! assert!(sync.held_pages().is_empty());
//! # Ok::<(), pagesync::types::SyncError>(())
//! ```

pub mod asynchronous;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Condvar;
use tracing::{debug, warn};

use crate::config::{SyncOptions, DEFAULT_MAX_WAIT};
use crate::metrics::{LockMetrics, NoopLockMetrics};
use crate::page::{PageManager, SynchronizedPageManager};
use crate::primitives::concurrency::{
    Acquired, LockRegistry, OwnershipTracker, Release, TimedOut, Wakeup,
};
use crate::types::{ContextId, PageId, PageKey, Result, SyncError};

pub use asynchronous::{AsyncPageAccessScope, AsyncPageAccessSynchronizer};

/// State shared by the blocking and async facades.
pub(crate) struct PageLocks<K, W> {
    registry: LockRegistry<K, W>,
    owners: OwnershipTracker<K>,
    max_wait: Duration,
    metrics: Arc<dyn LockMetrics>,
}

impl<K: PageKey, W: Wakeup> PageLocks<K, W> {
    pub(crate) fn new(opts: &SyncOptions) -> Self {
        Self {
            registry: LockRegistry::new(opts.shards),
            owners: OwnershipTracker::new(),
            max_wait: opts.max_wait,
            metrics: Arc::new(NoopLockMetrics),
        }
    }

    pub(crate) fn registry(&self) -> &LockRegistry<K, W> {
        &self.registry
    }

    pub(crate) fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub(crate) fn set_metrics(&mut self, metrics: Arc<dyn LockMetrics>) {
        self.metrics = metrics;
    }

    /// Records ownership and emits telemetry for a finished acquisition.
    pub(crate) fn settle(
        &self,
        ctx: ContextId,
        key: &K,
        outcome: std::result::Result<Acquired, TimedOut>,
    ) -> Result<()> {
        match outcome {
            Ok(Acquired::Fresh) => {
                self.owners.record_acquired(ctx, key.clone());
                self.metrics.acquired();
                debug!(page = ?key, context = %ctx, "page_sync.lock.acquired");
                Ok(())
            }
            Ok(Acquired::Reentered(depth)) => {
                self.metrics.reentered();
                debug!(page = ?key, context = %ctx, depth, "page_sync.lock.reentered");
                Ok(())
            }
            Ok(Acquired::AfterWait(waited)) => {
                self.owners.record_acquired(ctx, key.clone());
                self.metrics.contended(waited);
                debug!(
                    page = ?key,
                    context = %ctx,
                    waited_ms = waited.as_millis() as u64,
                    "page_sync.lock.acquired_after_wait"
                );
                Ok(())
            }
            Err(TimedOut { holder, waited }) => {
                self.metrics.timed_out();
                warn!(
                    page = ?key,
                    context = %ctx,
                    holder = ?holder,
                    waited_ms = waited.as_millis() as u64,
                    "page_sync.lock.timeout"
                );
                Err(SyncError::could_not_lock(key, ctx, self.max_wait))
            }
        }
    }

    pub(crate) fn unlock_all(&self, ctx: ContextId) {
        let keys = self.owners.take_all(ctx);
        if keys.is_empty() {
            return;
        }
        for key in &keys {
            let outcome = self.registry.release(key, ctx);
            if let Release::HandedOff(next) = outcome {
                debug!(page = ?key, context = %ctx, next = %next, "page_sync.unlock.handed_off");
            }
        }
        self.metrics.released(keys.len());
        debug!(context = %ctx, pages = keys.len(), "page_sync.unlock_all");
    }

    pub(crate) fn unlock_one(&self, ctx: ContextId, key: &K) -> bool {
        if !self.owners.forget(ctx, key) {
            return false;
        }
        self.registry.release(key, ctx);
        self.metrics.released(1);
        debug!(page = ?key, context = %ctx, "page_sync.unlock");
        true
    }

    pub(crate) fn held_by(&self, ctx: ContextId) -> Vec<K> {
        self.owners.held_by(ctx)
    }
}

/// Keyed, reentrant, timeout-bounded lock over the pages of one session.
///
/// The calling context defaults to the current thread; the `*_as` variants
/// take an explicit [`ContextId`] for callers whose requests are not
/// bound to one thread.
pub struct PageAccessSynchronizer<K = PageId> {
    locks: PageLocks<K, Condvar>,
}

impl<K: PageKey> fmt::Debug for PageAccessSynchronizer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageAccessSynchronizer")
            .field("max_wait", &self.locks.max_wait)
            .field("records", &self.locks.registry.len())
            .finish_non_exhaustive()
    }
}

impl<K: PageKey> PageAccessSynchronizer<K> {
    /// Creates a synchronizer whose `lock_page` calls wait at most `max_wait`.
    pub fn new(max_wait: Duration) -> Self {
        Self {
            locks: PageLocks::new(&SyncOptions::new(max_wait)),
        }
    }

    /// Creates a synchronizer from validated options.
    pub fn with_options(opts: SyncOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self {
            locks: PageLocks::new(&opts),
        })
    }

    /// Uses the request timeout when one is configured, otherwise falls back
    /// to [`DEFAULT_MAX_WAIT`] and logs a warning.
    pub fn from_request_timeout(timeout: Option<Duration>) -> Self {
        let max_wait = timeout.unwrap_or_else(|| {
            warn!(
                timeout_ms = DEFAULT_MAX_WAIT.as_millis() as u64,
                "page_sync.default_timeout"
            );
            DEFAULT_MAX_WAIT
        });
        Self::new(max_wait)
    }

    /// Installs a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn LockMetrics>) -> Self {
        self.locks.set_metrics(metrics);
        self
    }

    /// Wait ceiling applied to every `lock_page` call.
    pub fn max_wait(&self) -> Duration {
        self.locks.max_wait()
    }

    /// Locks `key` for the current thread.
    ///
    /// Returns immediately when the page is free or already held by this
    /// thread. Otherwise blocks until the holder releases it, failing with
    /// [`SyncError::CouldNotLockPage`] once the configured wait elapses.
    pub fn lock_page(&self, key: &K) -> Result<()> {
        self.lock_page_as(ContextId::current(), key)
    }

    /// Locks `key` for an explicit context.
    pub fn lock_page_as(&self, ctx: ContextId, key: &K) -> Result<()> {
        let outcome = self.locks.registry().acquire(key, ctx, self.max_wait());
        self.locks.settle(ctx, key, outcome)
    }

    /// Releases every page held by the current thread, whatever the depth.
    ///
    /// Never blocks. A thread that holds nothing is a no-op.
    pub fn unlock_all_pages(&self) {
        self.unlock_all_pages_as(ContextId::current());
    }

    /// Releases every page held by `ctx`.
    pub fn unlock_all_pages_as(&self, ctx: ContextId) {
        self.locks.unlock_all(ctx);
    }

    /// Fully releases a single page held by the current thread.
    ///
    /// Returns `false` when the thread did not hold it.
    pub fn unlock_page(&self, key: &K) -> bool {
        self.unlock_page_as(ContextId::current(), key)
    }

    /// Fully releases a single page held by `ctx`.
    pub fn unlock_page_as(&self, ctx: ContextId, key: &K) -> bool {
        self.locks.unlock_one(ctx, key)
    }

    /// Pages held by the current thread, in acquisition order.
    pub fn held_pages(&self) -> Vec<K> {
        self.held_pages_as(ContextId::current())
    }

    /// Pages held by `ctx`, in acquisition order.
    pub fn held_pages_as(&self, ctx: ContextId) -> Vec<K> {
        self.locks.held_by(ctx)
    }

    /// Context currently holding `key`.
    pub fn holder_of(&self, key: &K) -> Option<ContextId> {
        self.locks.registry().holder_of(key)
    }

    /// Reentrancy depth of `key`, zero when unheld.
    pub fn depth_of(&self, key: &K) -> u32 {
        self.locks.registry().depth_of(key)
    }

    /// Number of lock records currently retained.
    pub fn registry_len(&self) -> usize {
        self.locks.registry().len()
    }

    /// Number of registry shards.
    pub fn shard_count(&self) -> usize {
        self.locks.registry().shard_count()
    }

    /// Opens a scope bound to the current thread that releases all of the
    /// thread's pages when dropped.
    pub fn scope(&self) -> PageAccessScope<'_, K> {
        self.scope_as(ContextId::current())
    }

    /// Opens a scope bound to `ctx`.
    pub fn scope_as(&self, ctx: ContextId) -> PageAccessScope<'_, K> {
        PageAccessScope { sync: self, ctx }
    }

    /// Locks `keys` in order for the current thread, runs `f`, then releases
    /// the keys this call acquired.
    ///
    /// Pages the thread already held before the call stay held, as do pages
    /// `f` locks itself; those go with the next [`unlock_all_pages`].
    ///
    /// [`unlock_all_pages`]: Self::unlock_all_pages
    pub fn with_pages<R>(&self, keys: &[K], f: impl FnOnce() -> R) -> Result<R> {
        let ctx = ContextId::current();
        let held_before = self.held_pages_as(ctx);
        let mut release = PageRelease {
            sync: self,
            ctx,
            keys: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            self.lock_page_as(ctx, key)?;
            if !held_before.contains(key) && !release.keys.contains(key) {
                release.keys.push(key.clone());
            }
        }
        Ok(f())
    }

    /// Wraps `manager` so every page it hands out is locked first.
    pub fn adapt<M: PageManager<K>>(&self, manager: M) -> SynchronizedPageManager<'_, K, M> {
        SynchronizedPageManager::new(self, manager)
    }
}

/// Scoped acquisition: every page locked through the scope's context is
/// released when the scope is dropped, including on early return and unwind.
#[must_use = "dropping the scope releases its pages immediately"]
pub struct PageAccessScope<'a, K: PageKey = PageId> {
    sync: &'a PageAccessSynchronizer<K>,
    ctx: ContextId,
}

impl<K: PageKey> PageAccessScope<'_, K> {
    /// Locks `key` for the scope's context.
    pub fn lock_page(&self, key: &K) -> Result<()> {
        self.sync.lock_page_as(self.ctx, key)
    }

    /// Context the scope releases on drop.
    pub fn context(&self) -> ContextId {
        self.ctx
    }

    /// Pages currently held by the scope's context.
    pub fn held_pages(&self) -> Vec<K> {
        self.sync.held_pages_as(self.ctx)
    }
}

impl<K: PageKey> Drop for PageAccessScope<'_, K> {
    fn drop(&mut self) {
        self.sync.unlock_all_pages_as(self.ctx);
    }
}

/// Releases the pages a `with_pages` call acquired, on every exit path.
struct PageRelease<'a, K: PageKey> {
    sync: &'a PageAccessSynchronizer<K>,
    ctx: ContextId,
    keys: Vec<K>,
}

impl<K: PageKey> Drop for PageRelease<'_, K> {
    fn drop(&mut self) {
        for key in &self.keys {
            self.sync.unlock_page_as(self.ctx, key);
        }
    }
}
