use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tracing::trace;

use super::record::{Acquire, LockRecord, Release};
use crate::types::ContextId;

/// Wake-up primitive parked on by contexts waiting for a key.
pub trait Wakeup: Default + Send + Sync + 'static {
    /// Wakes every context currently waiting on this key.
    fn wake_waiters(&self);
}

impl Wakeup for Condvar {
    fn wake_waiters(&self) {
        self.notify_all();
    }
}

impl Wakeup for Notify {
    fn wake_waiters(&self) {
        self.notify_waiters();
    }
}

/// How a successful acquisition came about.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Acquired {
    /// The key was free.
    Fresh,
    /// The caller already held the key; carries the new depth.
    Reentered(u32),
    /// The key was handed over after waiting for another context.
    AfterWait(Duration),
}

/// Returned when a waiter gives up at its deadline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimedOut {
    /// Context holding the key when the waiter gave up.
    pub holder: Option<ContextId>,
    /// How long the waiter waited.
    pub waited: Duration,
}

struct Slot<W> {
    record: LockRecord,
    wakeup: Arc<W>,
}

impl<W: Wakeup> Slot<W> {
    fn held_by(ctx: ContextId) -> Self {
        Self {
            record: LockRecord::held_by(ctx),
            wakeup: Arc::new(W::default()),
        }
    }
}

type Shard<K, W> = Mutex<HashMap<K, Slot<W>, RandomState>>;

/// Sharded map from page key to lock record.
///
/// A record exists only while its key is held or waited for; the releasing
/// context drops it when nobody is queued. Each key has its own wake-up
/// primitive, so a handoff on one key never wakes waiters of another.
pub struct LockRegistry<K, W = Condvar> {
    shards: Box<[Shard<K, W>]>,
    mask: usize,
    hasher: RandomState,
}

impl<K, W> LockRegistry<K, W>
where
    K: Eq + Hash + Clone + Debug,
    W: Wakeup,
{
    /// Creates a registry with `shards` shards, rounded up to a power of two.
    pub fn new(shards: usize) -> Self {
        let count = shards.max(1).next_power_of_two();
        let shards = (0..count)
            .map(|_| Mutex::new(HashMap::with_hasher(RandomState::new())))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            mask: count - 1,
            hasher: RandomState::new(),
        }
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &K) -> &Shard<K, W> {
        let idx = (self.hasher.hash_one(key) as usize) & self.mask;
        &self.shards[idx]
    }

    /// Grants or re-enters without waiting, otherwise queues `ctx` and
    /// returns the key's wake-up primitive.
    fn try_fast_path(
        map: &mut HashMap<K, Slot<W>, RandomState>,
        key: &K,
        ctx: ContextId,
    ) -> std::result::Result<Acquired, Arc<W>> {
        match map.get_mut(key) {
            None => {
                map.insert(key.clone(), Slot::held_by(ctx));
                Ok(Acquired::Fresh)
            }
            Some(slot) => match slot.record.acquire(ctx) {
                Acquire::Granted => Ok(Acquired::Fresh),
                Acquire::Reentered(depth) => Ok(Acquired::Reentered(depth)),
                Acquire::Queued(holder) => {
                    trace!(
                        page = ?key,
                        context = %ctx,
                        holder = %holder,
                        waiters = slot.record.waiters(),
                        "page_sync.lock.waiting"
                    );
                    Err(Arc::clone(&slot.wakeup))
                }
            },
        }
    }

    /// Re-checks a queued context after it woke up.
    ///
    /// Returns `Some(Ok)` when the key was handed to `ctx`, `Some(Err)` when the
    /// deadline passed (the context is dequeued), `None` to keep waiting.
    fn settle_waiter(
        map: &mut HashMap<K, Slot<W>, RandomState>,
        key: &K,
        ctx: ContextId,
        started: Instant,
        expired: bool,
    ) -> Option<std::result::Result<Acquired, TimedOut>> {
        let Some(slot) = map.get_mut(key) else {
            // Record vanished while queued; the key is free.
            map.insert(key.clone(), Slot::held_by(ctx));
            return Some(Ok(Acquired::AfterWait(started.elapsed())));
        };
        if slot.record.is_held_by(ctx) {
            return Some(Ok(Acquired::AfterWait(started.elapsed())));
        }
        if expired {
            slot.record.abandon(ctx);
            let holder = slot.record.holder();
            if slot.record.is_idle() {
                map.remove(key);
            }
            return Some(Err(TimedOut {
                holder,
                waited: started.elapsed(),
            }));
        }
        None
    }

    /// Fully releases `key` held by `ctx`, handing it to the next waiter or
    /// dropping the record.
    ///
    /// # Panics
    ///
    /// Panics if `ctx` does not hold `key`.
    pub fn release(&self, key: &K, ctx: ContextId) -> Release {
        let mut map = self.shard(key).lock();
        let Some(slot) = map.get_mut(key) else {
            panic!("page lock {key:?} released by {ctx} but it is not held");
        };
        let outcome = slot.record.release(ctx);
        match outcome {
            Release::Idle => {
                map.remove(key);
            }
            Release::HandedOff(_) => slot.wakeup.wake_waiters(),
        }
        outcome
    }

    /// Context currently holding `key`.
    pub fn holder_of(&self, key: &K) -> Option<ContextId> {
        self.shard(key)
            .lock()
            .get(key)
            .and_then(|slot| slot.record.holder())
    }

    /// Reentrancy depth of `key`, zero when unheld.
    pub fn depth_of(&self, key: &K) -> u32 {
        self.shard(key)
            .lock()
            .get(key)
            .map_or(0, |slot| slot.record.depth())
    }

    /// Number of contexts queued for `key`.
    pub fn waiters_of(&self, key: &K) -> usize {
        self.shard(key)
            .lock()
            .get(key)
            .map_or(0, |slot| slot.record.waiters())
    }

    /// Number of records currently retained.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// True when no key is held or waited for.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().is_empty())
    }
}

impl<K> LockRegistry<K, Condvar>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Acquires `key` for `ctx`, blocking the thread for at most `max_wait`.
    pub fn acquire(
        &self,
        key: &K,
        ctx: ContextId,
        max_wait: Duration,
    ) -> std::result::Result<Acquired, TimedOut> {
        let mut map = self.shard(key).lock();
        let wakeup = match Self::try_fast_path(&mut map, key, ctx) {
            Ok(acquired) => return Ok(acquired),
            Err(wakeup) => wakeup,
        };
        let started = Instant::now();
        let deadline = started.checked_add(max_wait);
        loop {
            let expired = match deadline {
                Some(deadline) => {
                    wakeup.wait_until(&mut map, deadline).timed_out() || Instant::now() >= deadline
                }
                None => {
                    wakeup.wait(&mut map);
                    false
                }
            };
            if let Some(outcome) = Self::settle_waiter(&mut map, key, ctx, started, expired) {
                return outcome;
            }
        }
    }
}

impl<K> LockRegistry<K, Notify>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Acquires `key` for `ctx`, yielding to the scheduler for at most `max_wait`.
    pub async fn acquire_async(
        &self,
        key: &K,
        ctx: ContextId,
        max_wait: Duration,
    ) -> std::result::Result<Acquired, TimedOut> {
        let wakeup = {
            let mut map = self.shard(key).lock();
            match Self::try_fast_path(&mut map, key, ctx) {
                Ok(acquired) => return Ok(acquired),
                Err(wakeup) => wakeup,
            }
        };
        let started = Instant::now();
        let deadline = tokio::time::Instant::from_std(started)
            .checked_add(max_wait)
            .unwrap_or_else(far_future);
        let mut pending = PendingWait {
            registry: self,
            key,
            ctx,
            armed: true,
        };
        loop {
            let notified = wakeup.notified();
            tokio::pin!(notified);
            // Register before inspecting the record so a handoff between the
            // check and the await is not lost.
            notified.as_mut().enable();
            {
                let mut map = self.shard(key).lock();
                let expired = tokio::time::Instant::now() >= deadline;
                if let Some(outcome) = Self::settle_waiter(&mut map, key, ctx, started, expired) {
                    pending.armed = false;
                    return outcome;
                }
            }
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
    }
}

/// Dequeues a waiter whose future was dropped mid-wait. If the key was
/// already handed to it, the key is passed on as if released.
struct PendingWait<'a, K>
where
    K: Eq + Hash + Clone + Debug,
{
    registry: &'a LockRegistry<K, Notify>,
    key: &'a K,
    ctx: ContextId,
    armed: bool,
}

impl<K> Drop for PendingWait<'_, K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut map = self.registry.shard(self.key).lock();
        let Some(slot) = map.get_mut(self.key) else {
            return;
        };
        if slot.record.is_held_by(self.ctx) {
            // The handoff counted this wait in the depth; another wait of the
            // same context may still rely on the remaining levels.
            if slot.record.depth() > 1 {
                slot.record.unwind(self.ctx);
            } else {
                match slot.record.release(self.ctx) {
                    Release::Idle => {
                        map.remove(self.key);
                    }
                    Release::HandedOff(_) => slot.wakeup.wake_waiters(),
                }
            }
        } else {
            slot.record.abandon(self.ctx);
            if slot.record.is_idle() {
                map.remove(self.key);
            }
        }
        trace!(page = ?self.key, context = %self.ctx, "page_sync.lock.wait_cancelled");
    }
}

fn far_future() -> tokio::time::Instant {
    // Roughly 30 years, the same horizon tokio uses for its own sleeps.
    tokio::time::Instant::now() + Duration::from_secs(86400 * 365 * 30)
}
