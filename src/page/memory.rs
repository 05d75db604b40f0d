use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use super::PageManager;
use crate::types::{ContextId, PageKey, SyncError};

/// In-memory page manager: committed pages live in a map, touched pages are
/// staged per calling thread until the request commits.
pub struct MemoryPageManager<K, P> {
    stored: Mutex<HashMap<K, P>>,
    staged: Mutex<HashMap<ContextId, Vec<(K, P)>>>,
}

impl<K: PageKey, P: Clone> Default for MemoryPageManager<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PageKey, P: Clone> MemoryPageManager<K, P> {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self {
            stored: Mutex::new(HashMap::new()),
            staged: Mutex::new(HashMap::new()),
        }
    }

    /// Number of committed pages.
    pub fn len(&self) -> usize {
        self.stored.lock().len()
    }

    /// True when nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.stored.lock().is_empty()
    }
}

impl<K: PageKey, P: Clone> PageManager<K> for MemoryPageManager<K, P> {
    type Page = P;
    type Error = SyncError;

    fn get_page(&self, id: &K) -> Option<P> {
        let ctx = ContextId::current();
        let staged = self.staged.lock().get(&ctx).and_then(|pages| {
            pages
                .iter()
                .rev()
                .find(|(key, _)| key == id)
                .map(|(_, page)| page.clone())
        });
        staged.or_else(|| self.stored.lock().get(id).cloned())
    }

    fn touch_page(&self, id: K, page: P) {
        let ctx = ContextId::current();
        let mut staged = self.staged.lock();
        let pages = staged.entry(ctx).or_default();
        pages.retain(|(key, _)| *key != id);
        pages.push((id, page));
    }

    fn commit_request(&self) -> Result<(), SyncError> {
        let ctx = ContextId::current();
        let Some(pages) = self.staged.lock().remove(&ctx) else {
            return Ok(());
        };
        let count = pages.len();
        self.stored.lock().extend(pages);
        debug!(context = %ctx, pages = count, "page_manager.commit");
        Ok(())
    }

    fn clear(&self) {
        self.staged.lock().remove(&ContextId::current());
    }
}
