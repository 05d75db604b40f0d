//! Page manager adaptation: page reads and touches lock the page, commit
//! releases every lock the request took.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pagesync::page::{MemoryPageManager, PageManager};
use pagesync::{PageAccessSynchronizer, PageId, Result, SyncError};

struct FailingCommit;

impl PageManager<PageId> for FailingCommit {
    type Page = ();
    type Error = SyncError;

    fn get_page(&self, _id: &PageId) -> Option<()> {
        Some(())
    }

    fn touch_page(&self, _id: PageId, _page: ()) {}

    fn commit_request(&self) -> std::result::Result<(), SyncError> {
        Err(SyncError::Config("store offline".into()))
    }

    fn clear(&self) {}
}

#[test]
fn page_access_locks_until_commit() -> Result<()> {
    let sync = PageAccessSynchronizer::<PageId>::new(Duration::from_secs(1));
    let manager = sync.adapt(MemoryPageManager::<PageId, String>::new());

    manager.touch_page(PageId(1), "home".into())?;
    assert_eq!(manager.get_page(&PageId(1))?.as_deref(), Some("home"));
    assert!(manager.get_page(&PageId(2))?.is_none());
    assert_eq!(sync.held_pages(), vec![PageId(1), PageId(2)]);

    manager.commit_request()?;
    assert!(sync.held_pages().is_empty());
    assert_eq!(sync.registry_len(), 0);
    assert_eq!(manager.inner().len(), 1);
    Ok(())
}

#[test]
fn failed_commit_still_releases_pages() {
    let sync = PageAccessSynchronizer::<PageId>::new(Duration::from_secs(1));
    let manager = sync.adapt(FailingCommit);
    manager.get_page(&PageId(5)).unwrap();
    assert!(manager.commit_request().is_err());
    assert!(sync.held_pages().is_empty());
    assert_eq!(sync.holder_of(&PageId(5)), None);
}

#[test]
fn concurrent_request_waits_for_commit() {
    let sync = Arc::new(PageAccessSynchronizer::<PageId>::new(Duration::from_secs(5)));
    let pages = Arc::new(MemoryPageManager::<PageId, u32>::new());
    let hold = Duration::from_millis(200);

    let first = {
        let sync = Arc::clone(&sync);
        let pages = Arc::clone(&pages);
        thread::spawn(move || {
            let manager = sync.adapt(pages.as_ref());
            manager.touch_page(PageId(7), 1).unwrap();
            let locked_at = Instant::now();
            thread::sleep(hold);
            manager.commit_request().unwrap();
            locked_at
        })
    };
    thread::sleep(Duration::from_millis(50));
    let manager = sync.adapt(pages.as_ref());
    let page = manager.get_page(&PageId(7)).unwrap();
    let read_at = Instant::now();
    manager.commit_request().unwrap();

    let locked_at = first.join().unwrap();
    assert!(read_at >= locked_at + hold);
    assert_eq!(page, Some(1));
}

#[test]
fn busy_page_surfaces_as_lock_timeout() {
    let sync = Arc::new(PageAccessSynchronizer::<PageId>::new(Duration::from_millis(50)));
    let holder = pagesync::ContextId::fresh();
    sync.lock_page_as(holder, &PageId(3)).unwrap();
    let err = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || {
            let manager = sync.adapt(MemoryPageManager::<PageId, ()>::new());
            manager.get_page(&PageId(3)).unwrap_err()
        })
        .join()
        .unwrap()
    };
    assert!(err.is_lock_timeout());
    sync.unlock_all_pages_as(holder);
}
