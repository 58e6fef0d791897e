use crate::models::Snapshot;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One snapshot per endpoint label plus the set of labels with a query in
/// flight. Writes to one label never touch another.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: Mutex<HashMap<String, Snapshot>>,
    in_flight: Mutex<HashSet<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty snapshot for labels never written.
    pub fn get(&self, label: &str) -> Snapshot {
        lock(&self.snapshots).get(label).cloned().unwrap_or_default()
    }

    pub fn contains(&self, label: &str) -> bool {
        lock(&self.snapshots).contains_key(label)
    }

    pub fn set(&self, label: &str, snapshot: Snapshot) {
        lock(&self.snapshots).insert(label.to_string(), snapshot);
    }

    pub fn reset(&self, label: &str) {
        tracing::debug!(label, "snapshot reset");
        self.set(label, Snapshot::default());
    }

    /// Marks `label` busy. Returns `None` if a query for it is already running;
    /// the mark is cleared when the guard drops.
    pub fn begin_query(&self, label: &str) -> Option<QueryGuard<'_>> {
        if !lock(&self.in_flight).insert(label.to_string()) {
            return None;
        }
        Some(QueryGuard {
            store: self,
            label: label.to_string(),
        })
    }

    pub fn is_querying(&self, label: &str) -> bool {
        lock(&self.in_flight).contains(label)
    }
}

pub struct QueryGuard<'a> {
    store: &'a SnapshotStore,
    label: String,
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        lock(&self.store.in_flight).remove(&self.label);
    }
}
