//! Keyed, reentrant lock bookkeeping.
//!
//! [`LockRecord`] holds per-key state, [`LockRegistry`] maps keys to records
//! and implements the timed wait, and [`OwnershipTracker`] remembers which
//! keys a context holds so they can be released together.

mod ownership;
mod record;
mod registry;

pub use ownership::{HeldKeys, OwnershipTracker};
pub use record::{Acquire, LockRecord, Release};
pub use registry::{Acquired, LockRegistry, TimedOut, Wakeup};
