//! Identifiers and error types shared across the synchronizer.

use std::cell::Cell;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

/// Identifier of a stored page within one session.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PageId {
    fn from(value: u32) -> Self {
        PageId(value)
    }
}

impl From<PageId> for u32 {
    fn from(value: PageId) -> Self {
        value.0
    }
}

/// Bound for anything usable as a page key.
pub trait PageKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> PageKey for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// Identity of the logical unit of execution (one request) that holds page locks.
///
/// Ids are allocated from a process-wide counter and never reused, so two
/// concurrently active contexts can never compare equal.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ContextId(pub u64);

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CONTEXT: Cell<Option<ContextId>> = const { Cell::new(None) };
}

impl ContextId {
    /// Allocates a context id that no other context has used.
    pub fn fresh() -> Self {
        ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the id bound to the calling thread, allocating it on first use.
    ///
    /// The id is stable for the lifetime of the thread.
    pub fn current() -> Self {
        THREAD_CONTEXT.with(|slot| match slot.get() {
            Some(id) => id,
            None => {
                let id = ContextId::fresh();
                slot.set(Some(id));
                id
            }
        })
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Errors surfaced by the page access synchronizer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The page stayed locked by another context for longer than the configured wait.
    ///
    /// This is an expected condition under load; callers usually answer the
    /// request with a "page busy, try again" response.
    #[error("could not lock page {page} for {context} ({thread}) within {timeout:?}")]
    CouldNotLockPage {
        /// Debug rendering of the page key.
        page: String,
        /// Context that gave up waiting.
        context: ContextId,
        /// Name of the thread the context ran on.
        thread: String,
        /// Wait ceiling that elapsed.
        timeout: Duration,
    },
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// I/O error while reading a configuration file.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed TOML configuration.
    #[error("config parse: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SyncError {
    /// Returns true when the error is the recoverable lock timeout.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, SyncError::CouldNotLockPage { .. })
    }

    pub(crate) fn could_not_lock(
        page: &dyn fmt::Debug,
        context: ContextId,
        timeout: Duration,
    ) -> Self {
        let thread = std::thread::current()
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{:?}", std::thread::current().id()));
        SyncError::CouldNotLockPage {
            page: format!("{page:?}"),
            context,
            thread,
            timeout,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
