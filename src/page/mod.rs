//! Page manager adaptation.
//!
//! A session hands out its page manager wrapped in a
//! [`SynchronizedPageManager`], so every page read or touched during a
//! request is locked first and all of them are released when the request
//! commits.

mod memory;

pub use memory::MemoryPageManager;

use crate::sync::PageAccessSynchronizer;
use crate::types::{PageKey, SyncError};

/// Store of session pages used by request processing.
pub trait PageManager<K> {
    /// Stored page type.
    type Page;
    /// Error type; must be able to carry a lock timeout.
    type Error: From<SyncError>;

    /// Looks up a page.
    fn get_page(&self, id: &K) -> Option<Self::Page>;

    /// Marks a page as modified by the current request.
    fn touch_page(&self, id: K, page: Self::Page);

    /// Persists the pages touched by the current request.
    fn commit_request(&self) -> Result<(), Self::Error>;

    /// Discards pages touched by the current request without persisting them.
    fn clear(&self);
}

impl<K, M: PageManager<K> + ?Sized> PageManager<K> for &M {
    type Page = M::Page;
    type Error = M::Error;

    fn get_page(&self, id: &K) -> Option<Self::Page> {
        (**self).get_page(id)
    }

    fn touch_page(&self, id: K, page: Self::Page) {
        (**self).touch_page(id, page)
    }

    fn commit_request(&self) -> Result<(), Self::Error> {
        (**self).commit_request()
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// Page manager whose page accesses lock the page for the current thread.
pub struct SynchronizedPageManager<'a, K: PageKey, M> {
    sync: &'a PageAccessSynchronizer<K>,
    inner: M,
}

impl<'a, K: PageKey, M: PageManager<K>> SynchronizedPageManager<'a, K, M> {
    pub(crate) fn new(sync: &'a PageAccessSynchronizer<K>, inner: M) -> Self {
        Self { sync, inner }
    }

    /// Locks `id`, then reads it.
    pub fn get_page(&self, id: &K) -> Result<Option<M::Page>, M::Error> {
        self.sync.lock_page(id)?;
        Ok(self.inner.get_page(id))
    }

    /// Locks `id`, then marks it touched.
    pub fn touch_page(&self, id: K, page: M::Page) -> Result<(), M::Error> {
        self.sync.lock_page(&id)?;
        self.inner.touch_page(id, page);
        Ok(())
    }

    /// Commits the request and releases every page the thread holds, even
    /// if the commit fails or panics.
    pub fn commit_request(&self) -> Result<(), M::Error> {
        let _release = self.sync.scope();
        self.inner.commit_request()
    }

    /// Discards touched pages. Locks stay held until commit.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Wrapped manager.
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Unwraps the manager.
    pub fn into_inner(self) -> M {
        self.inner
    }
}
