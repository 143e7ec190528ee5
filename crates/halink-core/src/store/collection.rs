// ── Keyed reactive collection ──
//
// Lock-free concurrent storage with O(1) lookups and push-based change
// notification via `watch` channels. Batch operations rebuild the snapshot
// once, so subscribers never observe a half-applied update.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A lock-free, reactive collection keyed by a string id.
///
/// Snapshots are ordered by key. Every effective mutation bumps a version
/// counter and rebuilds the snapshot that subscribers receive.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,

    /// Version counter, bumped on every effective mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Replace the whole contents in one step.
    pub(crate) fn replace_all(&self, entries: impl IntoIterator<Item = (String, T)>) {
        self.by_key.clear();
        for (key, entity) in entries {
            self.by_key.insert(key, Arc::new(entity));
        }
        self.rebuild_snapshot();
        self.bump_version();
    }

    /// Look up an entity by key.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all values in key order and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> EntityCollection<T> {
    /// Patch existing entries in one step. `patch` returns the replacement
    /// for a key, or `None` to leave it alone. Unknown keys are skipped and
    /// never inserted. Returns how many entries actually changed.
    pub(crate) fn patch_many<'a, I, F>(&self, keys: I, mut patch: F) -> usize
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(&str, &T) -> Option<T>,
    {
        let mut changed = 0;
        for key in keys {
            let Some(mut slot) = self.by_key.get_mut(key) else {
                continue;
            };
            if let Some(next) = patch(key, slot.value()) {
                if next != **slot.value() {
                    *slot.value_mut() = Arc::new(next);
                    changed += 1;
                }
            }
        }

        if changed > 0 {
            self.rebuild_snapshot();
            self.bump_version();
        }
        changed
    }
}
