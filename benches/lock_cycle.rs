#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pagesync::{ContextId, PageAccessSynchronizer, PageId};

const PAGES_PER_CYCLE: u32 = 8;

fn uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_cycle/uncontended");
    let sync = PageAccessSynchronizer::<PageId>::new(Duration::from_secs(1));
    group.throughput(Throughput::Elements(1));
    group.bench_function("lock_unlock_one", |b| {
        b.iter(|| {
            sync.lock_page(&PageId(1)).expect("lock");
            sync.unlock_all_pages();
        });
    });
    group.bench_function("reentrant_x4", |b| {
        b.iter(|| {
            for _ in 0..4 {
                sync.lock_page(&PageId(1)).expect("lock");
            }
            sync.unlock_all_pages();
        });
    });
    group.throughput(Throughput::Elements(PAGES_PER_CYCLE as u64));
    group.bench_function("lock_many_unlock_all", |b| {
        b.iter(|| {
            for page in 0..PAGES_PER_CYCLE {
                sync.lock_page(&PageId(page)).expect("lock");
            }
            sync.unlock_all_pages();
        });
    });
    group.finish();
}

fn contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_cycle/contended");
    group.sample_size(20);
    for background in [1usize, 4] {
        let sync = Arc::new(PageAccessSynchronizer::<PageId>::new(Duration::from_secs(5)));
        let stop = Arc::new(AtomicBool::new(false));
        let workers: Vec<_> = (0..background)
            .map(|_| {
                let sync = Arc::clone(&sync);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let ctx = ContextId::fresh();
                    while !stop.load(Ordering::Relaxed) {
                        if sync.lock_page_as(ctx, &PageId(0)).is_ok() {
                            sync.unlock_all_pages_as(ctx);
                        }
                    }
                })
            })
            .collect();
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("shared_page", background),
            &background,
            |b, _| {
                b.iter(|| {
                    sync.lock_page(&PageId(0)).expect("lock");
                    sync.unlock_all_pages();
                });
            },
        );
        stop.store(true, Ordering::Relaxed);
        for worker in workers {
            worker.join().expect("worker");
        }
    }
    group.finish();
}

criterion_group!(benches, uncontended, contended);
criterion_main!(benches);
