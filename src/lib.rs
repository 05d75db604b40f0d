//! Page access synchronization for session-scoped page state.
//!
//! Concurrent requests that address the same page (several browser tabs,
//! parallel AJAX calls, frames) are serialized per page, while requests for
//! different pages run fully in parallel. See [`sync::PageAccessSynchronizer`].

pub mod config;
/// `tracing` subscriber setup.
pub mod logging;
/// Lock activity metrics.
pub mod metrics;
pub mod page;
pub mod primitives;
pub mod stress;
pub mod sync;
pub mod types;

pub use config::SyncOptions;
pub use sync::{PageAccessScope, PageAccessSynchronizer};
pub use types::{ContextId, PageId, Result, SyncError};
