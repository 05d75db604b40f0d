//! Loading synchronizer options from a TOML file.

#![allow(missing_docs)]

use std::fs;
use std::time::Duration;

use pagesync::stress::{self, StressConfig};
use pagesync::{PageAccessSynchronizer, PageId, Result, SyncError, SyncOptions};
use tempfile::tempdir;

#[test]
fn options_file_configures_synchronizer() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("pagesync.toml");
    fs::write(&path, "max_wait_ms = 750\nshards = 32\n")?;

    let opts = SyncOptions::load(&path)?;
    assert_eq!(opts.max_wait, Duration::from_millis(750));
    assert_eq!(opts.shards, 32);

    let sync = PageAccessSynchronizer::<PageId>::with_options(opts)?;
    assert_eq!(sync.max_wait(), Duration::from_millis(750));
    assert_eq!(sync.shard_count(), 32);
    Ok(())
}

#[test]
fn options_file_shapes_stress_run() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("stress.toml");
    fs::write(&path, "max_wait_ms = 200\nshards = 4\n")?;
    let opts = SyncOptions::load(&path)?;

    let report = stress::run(&StressConfig {
        keys: 4,
        workers: 2,
        duration: Duration::from_millis(100),
        max_wait: opts.max_wait,
        shards: opts.shards,
        ..StressConfig::default()
    })?;
    assert_eq!(report.shards, 4);
    assert_eq!(report.config.max_wait, Duration::from_millis(200));
    assert!(report.is_clean(), "{report}");
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = SyncOptions::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SyncError::Io(_)));
}

#[test]
fn malformed_file_is_a_parse_error() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("broken.toml");
    fs::write(&path, "max_wait_ms = \"soon\"")?;
    let err = SyncOptions::load(&path).unwrap_err();
    assert!(matches!(err, SyncError::Toml(_)));
    Ok(())
}
