//! Task-based synchronizer: waits yield to the runtime, time out at the
//! ceiling, and cancelled waits leave nothing behind.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use pagesync::sync::AsyncPageAccessSynchronizer;
use pagesync::{PageId, Result};
use tokio::sync::oneshot;
use tokio::time::Instant;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiter_resumes_after_holder_releases() -> Result<()> {
    let sync = Arc::new(AsyncPageAccessSynchronizer::<PageId>::new(Duration::from_secs(5)));
    let hold = Duration::from_millis(200);
    let (locked_tx, locked_rx) = oneshot::channel();

    let holder = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move {
            let scope = sync.begin();
            scope.lock_page(&PageId(1)).await.unwrap();
            let locked_at = Instant::now();
            locked_tx.send(locked_at).unwrap();
            tokio::time::sleep(hold).await;
            drop(scope);
        })
    };

    let locked_at = locked_rx.await.unwrap();
    let scope = sync.begin();
    scope.lock_page(&PageId(1)).await?;
    assert!(Instant::now() >= locked_at + hold);
    assert_eq!(sync.holder_of(&PageId(1)), Some(scope.context()));
    drop(scope);
    holder.await.unwrap();
    assert_eq!(sync.registry_len(), 0);
    Ok(())
}

#[tokio::test]
async fn waiting_does_not_block_the_runtime() {
    let sync = Arc::new(AsyncPageAccessSynchronizer::<PageId>::new(Duration::from_millis(300)));
    let holder = sync.begin();
    holder.lock_page(&PageId(2)).await.unwrap();

    let waiter = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move {
            let scope = sync.begin();
            let started = Instant::now();
            let result = scope.lock_page(&PageId(2)).await;
            (result.is_err(), started.elapsed())
        })
    };
    // Single-threaded runtime: a waiter parking the thread would stall this
    // sleep until its own timeout fired.
    let slept_from = Instant::now();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(slept_from.elapsed() < Duration::from_millis(250));

    let (timed_out, elapsed) = waiter.await.unwrap();
    assert!(timed_out);
    assert!(elapsed >= Duration::from_millis(300));
    drop(holder);
    assert_eq!(sync.registry_len(), 0);
}

#[tokio::test]
async fn cancelled_wait_is_dequeued() {
    let sync = AsyncPageAccessSynchronizer::<PageId>::new(Duration::from_secs(5));
    let holder = sync.begin();
    holder.lock_page(&PageId(3)).await.unwrap();

    let waiter = sync.begin();
    let attempt = tokio::time::timeout(Duration::from_millis(20), waiter.lock_page(&PageId(3))).await;
    assert!(attempt.is_err(), "wait should have been cancelled");
    assert!(waiter.held_pages().is_empty());

    drop(holder);
    assert_eq!(sync.holder_of(&PageId(3)), None);
    assert_eq!(sync.registry_len(), 0);
}

#[tokio::test]
async fn abandoned_wait_keeps_sibling_wait_of_same_context_queued() -> Result<()> {
    let sync = AsyncPageAccessSynchronizer::<PageId>::new(Duration::from_secs(2));
    let holder = sync.begin();
    holder.lock_page(&PageId(4)).await?;
    let request = sync.begin();

    let impatient = tokio::time::timeout(Duration::from_millis(20), request.lock_page(&PageId(4)));
    let patient = async {
        let started = Instant::now();
        let result = request.lock_page(&PageId(4)).await;
        (result, started.elapsed())
    };
    let release = async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(holder);
    };
    let (cancelled, (result, waited), ()) = tokio::join!(impatient, patient, release);

    assert!(cancelled.is_err(), "first wait should have been cancelled");
    result?;
    assert!(
        waited < Duration::from_secs(1),
        "sibling wait slept {waited:?} on a free page"
    );
    assert_eq!(sync.holder_of(&PageId(4)), Some(request.context()));
    drop(request);
    assert_eq!(sync.registry_len(), 0);
    Ok(())
}
