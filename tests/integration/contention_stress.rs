//! Mutual exclusion under sustained contention.
//!
//! Workers lock two random distinct pages, hold them briefly and release
//! everything, while a monitor checks that no page ever has more than one
//! worker inside it.

#![allow(missing_docs)]

use std::time::Duration;

use pagesync::stress::{self, StressConfig};
use pagesync::Result;

fn run_scenario(keys: usize, workers: usize) -> Result<()> {
    let report = stress::run(&StressConfig {
        keys,
        workers,
        duration: Duration::from_secs(10),
        hold: Duration::from_millis(2),
        max_wait: Duration::from_secs(1),
        ..StressConfig::default()
    })?;
    assert_eq!(report.violations, 0, "{report}");
    assert!(report.max_occupancy <= 1, "{report}");
    assert!(
        report.dual_acquisitions >= keys as u64,
        "only {} dual acquisitions: {report}",
        report.dual_acquisitions
    );
    assert_eq!(
        report.metrics.released,
        report.metrics.acquisitions + report.metrics.contended,
        "every granted page must be released: {report}"
    );
    Ok(())
}

#[test]
fn twenty_keys_ten_workers() -> Result<()> {
    run_scenario(20, 10)
}

#[test]
fn ten_keys_twenty_workers() -> Result<()> {
    run_scenario(10, 20)
}
