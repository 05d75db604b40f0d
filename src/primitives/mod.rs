//! Low-level primitives the page access synchronizer is built from.

/// Lock records, the sharded lock registry and per-context ownership tracking.
pub mod concurrency;
