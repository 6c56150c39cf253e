// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error Queue (C5): an indexed, ordered record of events that could not be
//! applied directly, plus optional autoremediation of adjacent entries for
//! the same object.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use hermes_core::{Event, EventType, PKey, Schema};
use hermes_datamodel::{AutoremediationMode, ForeignKeyPolicy};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One queued attempt: the remote event that produced it (absent for
/// synthetic entries such as recycle-drift or datamodel-change events), the
/// local event to retry, and the error from the last attempt, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub event_number: u64,
    pub remote_event: Option<Event>,
    pub local_event: Event,
    pub error_msg: Option<String>,
}

impl QueueEntry {
    fn object_key(&self) -> Option<(String, PKey)> {
        Some((self.local_event.objtype.clone()?, self.local_event.objpkey.clone()?))
    }
}

/// JSON-serializable snapshot of an [`ErrorQueue`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub entries: Vec<QueueEntry>,
    #[serde(default)]
    pub next_event_number: u64,
}

#[derive(Debug, Default)]
pub struct ErrorQueue {
    entries: BTreeMap<u64, QueueEntry>,
    index: HashMap<(String, PKey), BTreeSet<u64>>,
    next_event_number: u64,
}

impl ErrorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a new entry, assigning it the next event number.
    pub fn append(&mut self, remote_event: Option<Event>, local_event: Event, error_msg: Option<String>) -> u64 {
        let event_number = self.next_event_number;
        self.next_event_number += 1;
        let entry = QueueEntry { event_number, remote_event, local_event, error_msg };
        if let Some(key) = entry.object_key() {
            self.index.entry(key).or_default().insert(event_number);
        }
        self.entries.insert(event_number, entry);
        event_number
    }

    pub fn update_error(&mut self, event_number: u64, error_msg: Option<String>) {
        if let Some(entry) = self.entries.get_mut(&event_number) {
            entry.error_msg = error_msg;
        }
    }

    /// Removes an entry by event number. No-op if it is not present.
    pub fn remove(&mut self, event_number: u64) -> Option<QueueEntry> {
        let entry = self.entries.remove(&event_number)?;
        if let Some(key) = entry.object_key() {
            if let Some(set) = self.index.get_mut(&key) {
                set.remove(&event_number);
                if set.is_empty() {
                    self.index.remove(&key);
                }
            }
        }
        Some(entry)
    }

    /// Removes every queued entry for an object, e.g. after it has been
    /// physically removed from both caches.
    pub fn purge_object(&mut self, local_type: &str, pkey: &PKey) {
        let key = (local_type.to_string(), pkey.clone());
        if let Some(nums) = self.index.remove(&key) {
            for n in nums {
                self.entries.remove(&n);
            }
        }
    }

    pub fn has_queue_entries_for(&self, local_type: &str, pkey: &PKey) -> bool {
        self.index.contains_key(&(local_type.to_string(), pkey.clone()))
    }

    /// Entries in ascending event-number order, but yielding only the
    /// smallest event number per object.
    pub fn iter_first_per_object(&self) -> Vec<&QueueEntry> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for entry in self.entries.values() {
            let key = entry.object_key();
            if let Some(key) = &key {
                if !seen.insert(key.clone()) {
                    continue;
                }
            }
            out.push(entry);
        }
        out
    }

    /// Rewrites every queued event's primary key for a type whose primary
    /// key attribute changed, per §4.5.
    pub fn rewrite_primary_keys(&mut self, local_type: &str, old_pkey: &PKey, new_pkey: PKey) {
        let old_key = (local_type.to_string(), old_pkey.clone());
        let Some(nums) = self.index.remove(&old_key) else { return };
        let new_key = (local_type.to_string(), new_pkey.clone());
        for n in &nums {
            if let Some(entry) = self.entries.get_mut(n) {
                entry.local_event.objpkey = Some(new_pkey.clone());
                if let Some(remote) = &mut entry.remote_event {
                    remote.objpkey = Some(new_pkey.clone());
                }
            }
        }
        self.index.entry(new_key).or_default().extend(nums);
    }

    /// Whether `E` (about `local_type`/`pkey`, of `incoming_event_type`)
    /// must be queued rather than processed directly: it already has
    /// errors, or `policy` makes it a dependency of a currently-queued
    /// error because some queued object's type declares a foreign key
    /// pointing at `local_type`.
    pub fn blocks_on_dependency(
        &self,
        schema: &Schema,
        local_type: &str,
        pkey: &PKey,
        policy: ForeignKeyPolicy,
        incoming_event_type: EventType,
    ) -> bool {
        if self.has_queue_entries_for(local_type, pkey) {
            return true;
        }
        if policy == ForeignKeyPolicy::Disabled {
            return false;
        }
        if policy == ForeignKeyPolicy::OnRemove && incoming_event_type != EventType::Removed {
            return false;
        }
        self.index.keys().any(|(other_type, _)| {
            schema
                .get(other_type)
                .is_some_and(|t| t.foreign_keys.values().any(|fk| fk.other_type == local_type))
        })
    }

    /// Merges the last two entries for `(local_type, pkey)`, iff neither is
    /// partially processed, per the §4.4 merge table. `complete_vs_effective_diff`
    /// is invoked only for the `removed`+`added` case and should return the
    /// diff of the complete cache's snapshot against the effective cache's,
    /// or `None` if the data needed to compute it is missing.
    pub fn autoremediate(
        &mut self,
        mode: AutoremediationMode,
        local_type: &str,
        pkey: &PKey,
        complete_vs_effective_diff: impl FnOnce() -> Option<hermes_core::ModifiedAttrs>,
    ) -> Result<(), EngineError> {
        if mode == AutoremediationMode::Disabled {
            return Ok(());
        }
        let key = (local_type.to_string(), pkey.clone());
        let Some(nums) = self.index.get(&key) else { return Ok(()) };
        if nums.len() < 2 {
            return Ok(());
        }
        let mut rev = nums.iter().rev();
        let last_num = *rev
            .next()
            .ok_or_else(|| EngineError::Invariant(format!("autoremediation index for {local_type} {pkey} has fewer than 2 entries")))?;
        let prev_num = *rev
            .next()
            .ok_or_else(|| EngineError::Invariant(format!("autoremediation index for {local_type} {pkey} has fewer than 2 entries")))?;

        let (prev_type, last_type) = {
            let prev = &self.entries[&prev_num];
            let last = &self.entries[&last_num];
            if prev.local_event.is_partially_processed || last.local_event.is_partially_processed {
                return Ok(());
            }
            (prev.local_event.eventtype, last.local_event.eventtype)
        };

        match (prev_type, last_type) {
            (EventType::Added, EventType::Modified) => {
                let merged = merge_added_modified(&self.entries[&prev_num].local_event, &self.entries[&last_num].local_event)?;
                self.replace_pair(&key, prev_num, last_num, Some(merged));
            }
            (EventType::Added, EventType::Removed) => {
                if mode == AutoremediationMode::Maximum {
                    self.replace_pair(&key, prev_num, last_num, None);
                }
            }
            (EventType::Modified, EventType::Modified) => {
                let merged = merge_modified_modified(&self.entries[&prev_num].local_event, &self.entries[&last_num].local_event)?;
                self.replace_pair(&key, prev_num, last_num, Some(merged));
            }
            (EventType::Modified, EventType::Removed) => {
                if mode == AutoremediationMode::Maximum {
                    let category = self.entries[&last_num].local_event.evcategory;
                    let removed = Event::removed(local_type, pkey.clone(), category);
                    self.replace_pair(&key, prev_num, last_num, Some(removed));
                }
            }
            (EventType::Removed, EventType::Added) => match complete_vs_effective_diff() {
                Some(diff) if diff.is_empty() => self.replace_pair(&key, prev_num, last_num, None),
                Some(diff) => {
                    let category = self.entries[&last_num].local_event.evcategory;
                    let modified = Event::modified(local_type, pkey.clone(), diff, category);
                    self.replace_pair(&key, prev_num, last_num, Some(modified));
                }
                None => {}
            },
            (EventType::Added, EventType::Added)
            | (EventType::Removed, EventType::Modified)
            | (EventType::Removed, EventType::Removed)
            | (EventType::Modified, EventType::Added) => {
                return Err(EngineError::Invariant(format!(
                    "impossible autoremediation pair {prev_type:?}->{last_type:?} for {local_type} {pkey}"
                )));
            }
            _ => {}
        }
        Ok(())
    }

    /// Replaces two adjacent entries with (at most) one merged entry,
    /// reusing `prev_num`'s slot so relative ordering against other objects
    /// is preserved.
    fn replace_pair(&mut self, key: &(String, PKey), prev_num: u64, last_num: u64, new_event: Option<Event>) {
        self.entries.remove(&prev_num);
        self.entries.remove(&last_num);
        if let Some(set) = self.index.get_mut(key) {
            set.remove(&prev_num);
            set.remove(&last_num);
        }
        match new_event {
            Some(local_event) => {
                let entry = QueueEntry { event_number: prev_num, remote_event: None, local_event, error_msg: None };
                self.entries.insert(prev_num, entry);
                self.index.entry(key.clone()).or_default().insert(prev_num);
            }
            None => {
                if self.index.get(key).is_some_and(|s| s.is_empty()) {
                    self.index.remove(key);
                }
            }
        }
    }

    pub fn to_snapshot(&self) -> QueueSnapshot {
        QueueSnapshot { entries: self.entries.values().cloned().collect(), next_event_number: self.next_event_number }
    }

    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut queue = Self { next_event_number: snapshot.next_event_number, ..Self::default() };
        for entry in snapshot.entries {
            if let Some(key) = entry.object_key() {
                queue.index.entry(key).or_default().insert(entry.event_number);
            }
            queue.entries.insert(entry.event_number, entry);
        }
        queue
    }
}

fn merge_added_modified(added: &Event, modified: &Event) -> Result<Event, EngineError> {
    let mut attrs = added.added_attrs().unwrap_or_default();
    let diff = modified.modified_attrs().unwrap_or_default();
    for (k, v) in diff.added {
        attrs.insert(k, v);
    }
    for (k, v) in diff.modified {
        attrs.insert(k, v);
    }
    for k in diff.removed.keys() {
        attrs.shift_remove(k);
    }
    let pkey = added
        .objpkey
        .clone()
        .ok_or_else(|| EngineError::Invariant("queued 'added' event has no primary key".to_string()))?;
    Ok(Event::added(added.objtype.clone().unwrap_or_default(), pkey, attrs, modified.evcategory))
}

fn merge_modified_modified(prev: &Event, last: &Event) -> Result<Event, EngineError> {
    let d1 = prev.modified_attrs().unwrap_or_default();
    let d2 = last.modified_attrs().unwrap_or_default();

    let mut added = d1.added;
    for (k, v) in &d2.added {
        added.insert(k.clone(), v.clone());
    }
    for (k, v) in &d2.modified {
        if added.contains_key(k) {
            added.insert(k.clone(), v.clone());
        }
    }

    let mut modified = d2.modified;
    modified.retain(|k, _| !added.contains_key(k));

    let mut removed = d1.removed;
    for (k, v) in d2.removed {
        added.shift_remove(&k);
        modified.shift_remove(&k);
        removed.insert(k, v);
    }

    let out = hermes_core::ModifiedAttrs { added, modified, removed };
    let pkey = prev
        .objpkey
        .clone()
        .ok_or_else(|| EngineError::Invariant("queued 'modified' event has no primary key".to_string()))?;
    Ok(Event::modified(prev.objtype.clone().unwrap_or_default(), pkey, out, last.evcategory))
}

#[cfg(test)]
#[path = "error_queue_tests.rs"]
mod tests;
