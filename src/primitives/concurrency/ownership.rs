use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::types::ContextId;

/// Keys held by one context, in acquisition order.
pub type HeldKeys<K> = SmallVec<[K; 4]>;

/// Remembers which keys each context holds so they can be released in bulk.
///
/// An entry exists only between a context's first successful acquisition and
/// its release-all, so nothing accumulates across requests.
pub struct OwnershipTracker<K> {
    owned: Mutex<HashMap<ContextId, HeldKeys<K>, RandomState>>,
}

impl<K: Eq + Hash + Clone> Default for OwnershipTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> OwnershipTracker<K> {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            owned: Mutex::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    /// Appends `key` to the context's set unless it is already present.
    pub fn record_acquired(&self, ctx: ContextId, key: K) {
        let mut owned = self.owned.lock();
        let keys = owned.entry(ctx).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    /// Removes a single key, returning whether it was recorded.
    pub fn forget(&self, ctx: ContextId, key: &K) -> bool {
        let mut owned = self.owned.lock();
        let Some(keys) = owned.get_mut(&ctx) else {
            return false;
        };
        let Some(pos) = keys.iter().position(|k| k == key) else {
            return false;
        };
        keys.remove(pos);
        if keys.is_empty() {
            owned.remove(&ctx);
        }
        true
    }

    /// Drains every key the context holds, in acquisition order.
    pub fn take_all(&self, ctx: ContextId) -> HeldKeys<K> {
        self.owned.lock().remove(&ctx).unwrap_or_default()
    }

    /// Snapshot of the keys held by `ctx`.
    pub fn held_by(&self, ctx: ContextId) -> Vec<K> {
        self.owned
            .lock()
            .get(&ctx)
            .map(|keys| keys.to_vec())
            .unwrap_or_default()
    }

    /// Number of contexts holding at least one key.
    pub fn active_contexts(&self) -> usize {
        self.owned.lock().len()
    }
}
