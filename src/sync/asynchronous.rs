//! Task-based variant of the page access synchronizer.
//!
//! Async requests are not bound to a thread, so the context is passed
//! explicitly: allocate one [`ContextId`] per request (see
//! [`AsyncPageAccessSynchronizer::begin`]) and use it for every call the
//! request makes. Waiting yields to the tokio scheduler instead of parking
//! the worker thread.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use super::PageLocks;
use crate::config::SyncOptions;
use crate::metrics::LockMetrics;
use crate::types::{ContextId, PageId, PageKey, Result};

/// Async counterpart of [`super::PageAccessSynchronizer`].
pub struct AsyncPageAccessSynchronizer<K = PageId> {
    locks: PageLocks<K, Notify>,
}

impl<K: PageKey> fmt::Debug for AsyncPageAccessSynchronizer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncPageAccessSynchronizer")
            .field("max_wait", &self.locks.max_wait())
            .field("records", &self.locks.registry().len())
            .finish_non_exhaustive()
    }
}

impl<K: PageKey> AsyncPageAccessSynchronizer<K> {
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

    /// Installs a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn LockMetrics>) -> Self {
        self.locks.set_metrics(metrics);
        self
    }

    /// Wait ceiling applied to every `lock_page` call.
    pub fn max_wait(&self) -> Duration {
        self.locks.max_wait()
    }

    /// Starts a request: allocates its context and returns a scope that
    /// releases the request's pages when dropped.
    pub fn begin(&self) -> AsyncPageAccessScope<'_, K> {
        AsyncPageAccessScope {
            sync: self,
            ctx: ContextId::fresh(),
        }
    }

    /// Locks `key` for `ctx`, yielding while another context holds it.
    pub async fn lock_page(&self, ctx: ContextId, key: &K) -> Result<()> {
        let outcome = self
            .locks
            .registry()
            .acquire_async(key, ctx, self.max_wait())
            .await;
        self.locks.settle(ctx, key, outcome)
    }

    /// Releases every page held by `ctx`. Never waits.
    pub fn unlock_all_pages(&self, ctx: ContextId) {
        self.locks.unlock_all(ctx);
    }

    /// Fully releases one page held by `ctx`.
    pub fn unlock_page(&self, ctx: ContextId, key: &K) -> bool {
        self.locks.unlock_one(ctx, key)
    }

    /// Pages held by `ctx`, in acquisition order.
    pub fn held_pages(&self, ctx: ContextId) -> Vec<K> {
        self.locks.held_by(ctx)
    }

    /// Context currently holding `key`.
    pub fn holder_of(&self, key: &K) -> Option<ContextId> {
        self.locks.registry().holder_of(key)
    }

    /// Number of lock records currently retained.
    pub fn registry_len(&self) -> usize {
        self.locks.registry().len()
    }
}

/// One request's view of an [`AsyncPageAccessSynchronizer`]; releases the
/// request's pages when dropped, including when the future is cancelled.
#[must_use = "dropping the scope releases its pages immediately"]
pub struct AsyncPageAccessScope<'a, K: PageKey = PageId> {
    sync: &'a AsyncPageAccessSynchronizer<K>,
    ctx: ContextId,
}

impl<K: PageKey> AsyncPageAccessScope<'_, K> {
    /// Locks `key` for this request.
    pub async fn lock_page(&self, key: &K) -> Result<()> {
        self.sync.lock_page(self.ctx, key).await
    }

    /// Context allocated for this request.
    pub fn context(&self) -> ContextId {
        self.ctx
    }

    /// Pages currently held by this request.
    pub fn held_pages(&self) -> Vec<K> {
        self.sync.held_pages(self.ctx)
    }
}

impl<K: PageKey> Drop for AsyncPageAccessScope<'_, K> {
    fn drop(&mut self) {
        self.sync.unlock_all_pages(self.ctx);
    }
}
