use std::collections::VecDeque;

use crate::types::ContextId;

/// Per-key lock bookkeeping: the holding context, its reentrancy depth and
/// the contexts queued behind it.
///
/// `depth >= 1` whenever `holder` is set. A context appears in `waiting` at
/// most once and never while it is the holder; its entry counts the waits it
/// has pending, so one wait giving up leaves the others queued.
#[derive(Debug, Default)]
pub struct LockRecord {
    holder: Option<ContextId>,
    depth: u32,
    waiting: VecDeque<(ContextId, u32)>,
}

/// Outcome of asking a record for the lock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Acquire {
    /// The caller now holds the key with depth 1.
    Granted,
    /// The caller already held the key; depth was incremented.
    Reentered(u32),
    /// Another context holds the key; the caller was queued.
    Queued(ContextId),
}

/// Outcome of a full release.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Release {
    /// Nobody was waiting; the record is idle and may be dropped.
    Idle,
    /// Ownership passed to the head of the waiter queue.
    HandedOff(ContextId),
}

impl LockRecord {
    /// Creates a record already held by `ctx`.
    pub fn held_by(ctx: ContextId) -> Self {
        Self {
            holder: Some(ctx),
            depth: 1,
            waiting: VecDeque::new(),
        }
    }

    /// Current holder.
    pub fn holder(&self) -> Option<ContextId> {
        self.holder
    }

    /// Reentrancy depth of the current holder, zero when unheld.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of contexts queued for the key.
    pub fn waiters(&self) -> usize {
        self.waiting.len()
    }

    /// True when the record has no holder and nobody is queued.
    pub fn is_idle(&self) -> bool {
        self.holder.is_none() && self.waiting.is_empty()
    }

    /// Grants, re-enters, or queues `ctx`.
    pub fn acquire(&mut self, ctx: ContextId) -> Acquire {
        match self.holder {
            None => {
                self.waiting.retain(|(w, _)| *w != ctx);
                self.holder = Some(ctx);
                self.depth = 1;
                Acquire::Granted
            }
            Some(holder) if holder == ctx => {
                self.depth = self.depth.saturating_add(1);
                Acquire::Reentered(self.depth)
            }
            Some(holder) => {
                match self.waiting.iter_mut().find(|(w, _)| *w == ctx) {
                    Some((_, pending)) => *pending += 1,
                    None => self.waiting.push_back((ctx, 1)),
                }
                Acquire::Queued(holder)
            }
        }
    }

    /// Returns true if `ctx` holds the key, typically after a handoff.
    pub fn is_held_by(&self, ctx: ContextId) -> bool {
        self.holder == Some(ctx)
    }

    /// Withdraws one pending wait of `ctx`, dequeuing it once none remain.
    pub fn abandon(&mut self, ctx: ContextId) {
        let Some(pos) = self.waiting.iter().position(|(w, _)| *w == ctx) else {
            return;
        };
        let pending = &mut self.waiting[pos].1;
        *pending -= 1;
        if *pending == 0 {
            self.waiting.remove(pos);
        }
    }

    /// Gives back one level of a lock `ctx` holds at depth two or more.
    ///
    /// # Panics
    ///
    /// Panics if `ctx` is not the holder or holds the key only once.
    pub fn unwind(&mut self, ctx: ContextId) {
        assert_eq!(
            self.holder,
            Some(ctx),
            "page lock unwound by {ctx} which does not hold it"
        );
        assert!(self.depth > 1, "page lock unwound past its last level");
        self.depth -= 1;
    }

    /// Drops the holder regardless of depth and hands the key to the next
    /// waiter, whose depth starts at its number of pending waits.
    ///
    /// # Panics
    ///
    /// Panics if `ctx` is not the holder; releasing someone else's page would
    /// break mutual exclusion for every other context.
    pub fn release(&mut self, ctx: ContextId) -> Release {
        assert_eq!(
            self.holder,
            Some(ctx),
            "page lock released by {ctx} which does not hold it"
        );
        match self.waiting.pop_front() {
            Some((next, pending)) => {
                self.holder = Some(next);
                self.depth = pending;
                Release::HandedOff(next)
            }
            None => {
                self.holder = None;
                self.depth = 0;
                Release::Idle
            }
        }
    }
}
