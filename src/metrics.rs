use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Trait for tracking page lock activity.
///
/// Implementations receive one callback per lock event and must be cheap,
/// since every page access goes through them.
pub trait LockMetrics: Send + Sync {
    /// A context took a free page.
    fn acquired(&self);

    /// A context re-locked a page it already held.
    fn reentered(&self);

    /// A context obtained a page after waiting `waited` for another holder.
    fn contended(&self, waited: Duration);

    /// A context gave up after the configured wait elapsed.
    fn timed_out(&self);

    /// A context released `pages` pages at once.
    fn released(&self, pages: usize);
}

/// A no-op implementation of [`LockMetrics`].
#[derive(Default)]
pub struct NoopLockMetrics;

impl LockMetrics for NoopLockMetrics {
    fn acquired(&self) {}
    fn reentered(&self) {}
    fn contended(&self, _waited: Duration) {}
    fn timed_out(&self) {}
    fn released(&self, _pages: usize) {}
}

/// Atomic counter implementation of [`LockMetrics`].
#[derive(Default)]
pub struct CounterLockMetrics {
    /// Uncontended acquisitions.
    pub acquisitions: AtomicU64,
    /// Reentrant acquisitions.
    pub reentries: AtomicU64,
    /// Acquisitions that had to wait.
    pub contended: AtomicU64,
    /// Total time spent waiting, in microseconds.
    pub wait_micros: AtomicU64,
    /// Waits that ended in a timeout.
    pub timeouts: AtomicU64,
    /// Pages released.
    pub released: AtomicU64,
}

/// Point-in-time copy of [`CounterLockMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LockMetricsSnapshot {
    /// Uncontended acquisitions.
    pub acquisitions: u64,
    /// Reentrant acquisitions.
    pub reentries: u64,
    /// Acquisitions that had to wait.
    pub contended: u64,
    /// Total time spent waiting, in microseconds.
    pub wait_micros: u64,
    /// Waits that ended in a timeout.
    pub timeouts: u64,
    /// Pages released.
    pub released: u64,
}

impl CounterLockMetrics {
    /// Reads all counters.
    pub fn snapshot(&self) -> LockMetricsSnapshot {
        LockMetricsSnapshot {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            reentries: self.reentries.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            wait_micros: self.wait_micros.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }
}

impl LockMetrics for CounterLockMetrics {
    fn acquired(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    fn reentered(&self) {
        self.reentries.fetch_add(1, Ordering::Relaxed);
    }

    fn contended(&self, waited: Duration) {
        self.contended.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(waited.as_micros()).unwrap_or(u64::MAX);
        self.wait_micros.fetch_add(micros, Ordering::Relaxed);
    }

    fn timed_out(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn released(&self, pages: usize) {
        self.released.fetch_add(pages as u64, Ordering::Relaxed);
    }
}
