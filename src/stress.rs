//! Contention harness for the page access synchronizer.
//!
//! Workers repeatedly lock two random distinct pages, hold them briefly and
//! release everything, while a monitor thread watches how many workers are
//! inside each page at once. Any reading above one is a mutual exclusion
//! violation and stops the run.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tracing::{error, info};

use crate::config::{SyncOptions, DEFAULT_SHARDS};
use crate::metrics::{CounterLockMetrics, LockMetricsSnapshot};
use crate::sync::PageAccessSynchronizer;
use crate::types::{PageId, Result, SyncError};

/// Parameters of one stress run.
#[derive(Clone, Debug, Serialize)]
pub struct StressConfig {
    /// Number of distinct pages.
    pub keys: usize,
    /// Number of concurrent worker threads.
    pub workers: usize,
    /// How long workers keep going.
    pub duration: Duration,
    /// Upper bound of the random time a worker holds its pages.
    pub hold: Duration,
    /// Wait ceiling for each `lock_page` call.
    pub max_wait: Duration,
    /// Registry shard count; must be a power of two.
    pub shards: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            keys: 20,
            workers: 10,
            duration: Duration::from_secs(10),
            hold: Duration::from_millis(2),
            max_wait: Duration::from_secs(1),
            shards: DEFAULT_SHARDS,
        }
    }
}

impl StressConfig {
    /// Synchronizer options the run is built with.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::new(self.max_wait).shards(self.shards)
    }

    fn validate(&self) -> Result<()> {
        if self.keys < 2 {
            return Err(SyncError::Config(format!(
                "stress run needs at least two keys, got {}",
                self.keys
            )));
        }
        if self.workers == 0 {
            return Err(SyncError::Config("stress run needs at least one worker".into()));
        }
        self.sync_options().validate()
    }
}

/// Outcome of a stress run.
#[derive(Clone, Debug, Serialize)]
pub struct StressReport {
    /// Configuration the run used.
    pub config: StressConfig,
    /// Shards of the synchronizer that was exercised.
    pub shards: usize,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
    /// Iterations in which a worker held both of its pages.
    pub dual_acquisitions: u64,
    /// `lock_page` calls that gave up.
    pub timeouts: u64,
    /// Observations of more than one worker inside a page.
    pub violations: u64,
    /// Highest per-page occupancy the monitor saw.
    pub max_occupancy: usize,
    /// Counters collected by the synchronizer.
    pub metrics: LockMetricsSnapshot,
}

impl StressReport {
    /// True when no violation was observed.
    pub fn is_clean(&self) -> bool {
        self.violations == 0 && self.max_occupancy <= 1
    }
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "keys={} workers={} shards={} elapsed={}ms",
            self.config.keys, self.config.workers, self.shards, self.elapsed_ms
        )?;
        writeln!(
            f,
            "dual acquisitions: {}  timeouts: {}  violations: {}  max occupancy: {}",
            self.dual_acquisitions, self.timeouts, self.violations, self.max_occupancy
        )?;
        write!(
            f,
            "acquired: {}  contended: {}  reentered: {}  released: {}",
            self.metrics.acquisitions,
            self.metrics.contended,
            self.metrics.reentries,
            self.metrics.released
        )
    }
}

struct Shared {
    sync: PageAccessSynchronizer<PageId>,
    occupancy: Vec<AtomicUsize>,
    stop: AtomicBool,
    dual: AtomicU64,
    timeouts: AtomicU64,
    violations: AtomicU64,
}

impl Shared {
    fn enter(&self, page: PageId) {
        let before = self.occupancy[page.0 as usize].fetch_add(1, Ordering::SeqCst);
        if before != 0 {
            self.flag_violation(page, before + 1);
        }
    }

    fn leave(&self, page: PageId) {
        self.occupancy[page.0 as usize].fetch_sub(1, Ordering::SeqCst);
    }

    fn flag_violation(&self, page: PageId, occupancy: usize) {
        error!(page = %page, occupancy, "stress.violation");
        self.violations.fetch_add(1, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Runs the harness and returns what it observed.
pub fn run(config: &StressConfig) -> Result<StressReport> {
    config.validate()?;
    let metrics = Arc::new(CounterLockMetrics::default());
    let shared = Arc::new(Shared {
        sync: PageAccessSynchronizer::with_options(config.sync_options())?
            .with_metrics(metrics.clone()),
        occupancy: (0..config.keys).map(|_| AtomicUsize::new(0)).collect(),
        stop: AtomicBool::new(false),
        dual: AtomicU64::new(0),
        timeouts: AtomicU64::new(0),
        violations: AtomicU64::new(0),
    });
    info!(
        keys = config.keys,
        workers = config.workers,
        shards = shared.sync.shard_count(),
        duration_ms = config.duration.as_millis() as u64,
        "stress.start"
    );
    let started = Instant::now();
    let monitor = {
        let shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("stress-monitor".into())
            .spawn(move || monitor_loop(&shared))?
    };
    let mut workers = Vec::with_capacity(config.workers);
    for idx in 0..config.workers {
        let shared = Arc::clone(&shared);
        let config = config.clone();
        workers.push(
            thread::Builder::new()
                .name(format!("stress-worker-{idx}"))
                .spawn(move || worker_loop(&shared, &config))?,
        );
    }
    let deadline = started + config.duration;
    while Instant::now() < deadline && !shared.stop.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(10).min(config.duration));
    }
    shared.stop.store(true, Ordering::SeqCst);
    for worker in workers {
        worker
            .join()
            .map_err(|_| SyncError::Config("stress worker panicked".into()))??;
    }
    let max_occupancy = monitor
        .join()
        .map_err(|_| SyncError::Config("stress monitor panicked".into()))?;
    let report = StressReport {
        config: config.clone(),
        shards: shared.sync.shard_count(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        dual_acquisitions: shared.dual.load(Ordering::SeqCst),
        timeouts: shared.timeouts.load(Ordering::SeqCst),
        violations: shared.violations.load(Ordering::SeqCst),
        max_occupancy,
        metrics: metrics.snapshot(),
    };
    info!(
        dual_acquisitions = report.dual_acquisitions,
        timeouts = report.timeouts,
        violations = report.violations,
        "stress.finish"
    );
    Ok(report)
}

fn worker_loop(shared: &Shared, config: &StressConfig) -> Result<()> {
    let mut rng = rand::thread_rng();
    let mut inside: Vec<PageId> = Vec::with_capacity(2);
    while !shared.stop.load(Ordering::SeqCst) {
        let first = rng.gen_range(0..config.keys);
        let mut second = rng.gen_range(0..config.keys - 1);
        if second >= first {
            second += 1;
        }
        let mut outcome = Ok(());
        for page in [PageId(first as u32), PageId(second as u32)] {
            outcome = shared.sync.lock_page(&page);
            if outcome.is_err() {
                break;
            }
            shared.enter(page);
            inside.push(page);
        }
        match outcome {
            Ok(()) => {
                shared.dual.fetch_add(1, Ordering::Relaxed);
                let hold = config.hold.mul_f64(rng.gen::<f64>());
                if !hold.is_zero() {
                    thread::sleep(hold);
                }
            }
            Err(err) if err.is_lock_timeout() => {
                shared.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                release(shared, &mut inside);
                return Err(err);
            }
        }
        release(shared, &mut inside);
    }
    Ok(())
}

fn release(shared: &Shared, inside: &mut Vec<PageId>) {
    for page in inside.drain(..) {
        shared.leave(page);
    }
    shared.sync.unlock_all_pages();
}

fn monitor_loop(shared: &Shared) -> usize {
    let mut max_seen = 0;
    while !shared.stop.load(Ordering::SeqCst) {
        for (idx, slot) in shared.occupancy.iter().enumerate() {
            let occupancy = slot.load(Ordering::SeqCst);
            max_seen = max_seen.max(occupancy);
            if occupancy > 1 {
                shared.flag_violation(PageId(idx as u32), occupancy);
            }
        }
        thread::sleep(Duration::from_micros(200));
    }
    max_seen
}
