// src/reconciler.rs
//
// Keeps a displayed collection in sync with a streamed enumeration from the
// backend: mark every entry unseen, upsert what the stream reports, then drop
// what it did not report. Rows the stream confirms are updated in place, so
// the view never flashes empty and never shows old and new rows side by side.

use indexmap::IndexMap;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::model::Entry;
use crate::pk_enum::{Role, Roles};

/// Ordered set of entries keyed by id, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    entries: IndexMap<String, Entry>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Entries in presentation order.
    pub fn sorted_by_label(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    fn mark_all_unseen(&mut self) {
        for entry in self.entries.values_mut() {
            entry.seen = false;
        }
    }

    fn mark_all_seen(&mut self) {
        for entry in self.entries.values_mut() {
            entry.seen = true;
        }
    }

    fn upsert(&mut self, id: &str, label: &str, enabled: bool) -> &Entry {
        let entry = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| Entry::new(id, label, enabled));
        entry.label = label.to_string();
        entry.enabled = enabled;
        entry.seen = true;
        entry
    }

    fn prune_unseen(&mut self) -> Vec<Entry> {
        let mut removed = Vec::new();
        // retain visits every entry exactly once and keeps survivor order
        self.entries.retain(|_, entry| {
            if entry.seen {
                true
            } else {
                removed.push(entry.clone());
                false
            }
        });
        removed
    }
}

/// Identifies one refresh cycle. Events carrying an older id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CycleId(u64);

#[derive(Debug, Default)]
pub struct ListReconciler {
    collection: Collection,
    current: Option<CycleId>,
    last_cycle: u64,
}

impl ListReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn is_refreshing(&self) -> bool {
        self.current.is_some()
    }

    /// Starts a cycle, superseding any cycle still in flight.
    pub fn begin_refresh(&mut self) -> CycleId {
        self.last_cycle += 1;
        let cycle = CycleId(self.last_cycle);
        if let Some(previous) = self.current.replace(cycle) {
            debug!("refresh cycle {:?} superseded by {:?}", previous, cycle);
        }
        self.collection.mark_all_unseen();
        cycle
    }

    /// Applies one detail event. Returns `None` when the event belongs to a
    /// superseded cycle or carries an empty id.
    pub fn upsert(&mut self, cycle: CycleId, id: &str, label: &str, enabled: bool) -> Option<&Entry> {
        if self.current != Some(cycle) {
            debug!("dropping stale detail '{}' from cycle {:?}", id, cycle);
            return None;
        }
        if id.is_empty() {
            warn!("ignoring detail with an empty id");
            return None;
        }
        Some(self.collection.upsert(id, label, enabled))
    }

    /// Closes the cycle and removes every entry it did not confirm.
    pub fn end_refresh(&mut self, cycle: CycleId) -> Option<Vec<Entry>> {
        if self.current != Some(cycle) {
            debug!("ignoring finish of stale cycle {:?}", cycle);
            return None;
        }
        self.current = None;
        let removed = self.collection.prune_unseen();
        debug!("cycle {:?} finished, {} entries pruned", cycle, removed.len());
        Some(removed)
    }

    /// Closes a failed cycle without pruning. Entries updated before the
    /// failure keep their new values.
    pub fn abort(&mut self, cycle: CycleId) -> bool {
        if self.current != Some(cycle) {
            return false;
        }
        self.current = None;
        self.collection.mark_all_seen();
        true
    }

    /// Optimistically flips `enabled` and returns the new value. The caller
    /// sends the change to the backend and calls `set_enabled` to revert if
    /// that fails.
    pub fn toggle(&mut self, roles: Roles, id: &str) -> Result<bool> {
        if !self.collection.contains(id) {
            return Err(Error::NotFound(id.to_string()));
        }
        if !roles.contains(Role::RepoEnable) {
            return Err(Error::Unsupported(Role::RepoEnable));
        }
        let entry = self
            .collection
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.enabled = !entry.enabled;
        Ok(entry.enabled)
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let entry = self
            .collection
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.enabled = enabled;
        Ok(())
    }
}
