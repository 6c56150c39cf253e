// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dual Cache & Trashbin (C4): effective/complete content-addressed object
//! collections per type, plus a per-type trashbin with retention timestamps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hermes_core::{DataObject, PKey};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One side (remote or local) of the dual cache: what has actually been
/// applied (`effective`) and what would be applied if the error queue were
/// empty (`complete`).
#[derive(Debug, Clone, Default)]
pub struct ObjectCache {
    effective: HashMap<String, IndexMap<PKey, DataObject>>,
    complete: HashMap<String, IndexMap<PKey, DataObject>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_effective(&self, local_type: &str, pkey: &PKey) -> Option<&DataObject> {
        self.effective.get(local_type)?.get(pkey)
    }

    pub fn get_complete(&self, local_type: &str, pkey: &PKey) -> Option<&DataObject> {
        self.complete.get(local_type)?.get(pkey)
    }

    pub fn insert_effective(&mut self, local_type: &str, pkey: PKey, obj: DataObject) {
        self.effective.entry(local_type.to_string()).or_default().insert(pkey, obj);
    }

    pub fn insert_complete(&mut self, local_type: &str, pkey: PKey, obj: DataObject) {
        self.complete.entry(local_type.to_string()).or_default().insert(pkey, obj);
    }

    pub fn insert_both(&mut self, local_type: &str, pkey: PKey, obj: DataObject) {
        self.insert_effective(local_type, pkey.clone(), obj.clone());
        self.insert_complete(local_type, pkey, obj);
    }

    pub fn remove_effective(&mut self, local_type: &str, pkey: &PKey) -> Option<DataObject> {
        self.effective.get_mut(local_type)?.shift_remove(pkey)
    }

    pub fn remove_complete(&mut self, local_type: &str, pkey: &PKey) -> Option<DataObject> {
        self.complete.get_mut(local_type)?.shift_remove(pkey)
    }

    pub fn remove_both(&mut self, local_type: &str, pkey: &PKey) {
        self.remove_effective(local_type, pkey);
        self.remove_complete(local_type, pkey);
    }

    /// Moves whichever sides hold `old_pkey` to `new_pkey` (§4.5: primary-key
    /// migration). A no-op on sides that don't have the object.
    pub fn rekey(&mut self, local_type: &str, old_pkey: &PKey, new_pkey: &PKey) {
        if let Some(obj) = self.remove_effective(local_type, old_pkey) {
            self.insert_effective(local_type, new_pkey.clone(), obj);
        }
        if let Some(obj) = self.remove_complete(local_type, old_pkey) {
            self.insert_complete(local_type, new_pkey.clone(), obj);
        }
    }

    pub fn types(&self) -> impl Iterator<Item = &String> {
        self.complete.keys()
    }

    /// Drops `attrs` from every cached object of `local_type`, on both
    /// sides (§4.1: a secret attribute was added, so any plaintext cached
    /// under the old, non-secret schema must not survive).
    pub fn strip_attrs(&mut self, local_type: &str, attrs: &std::collections::HashSet<String>) {
        if attrs.is_empty() {
            return;
        }
        for side in [&mut self.effective, &mut self.complete] {
            if let Some(objs) = side.get_mut(local_type) {
                for obj in objs.values_mut() {
                    obj.attrs.retain(|k, _| !attrs.contains(k));
                }
            }
        }
    }

    pub fn objects_of_type(&self, local_type: &str) -> impl Iterator<Item = (&PKey, &DataObject)> {
        self.complete.get(local_type).into_iter().flat_map(|m| m.iter())
    }

    pub fn remove_type(&mut self, local_type: &str) {
        self.effective.remove(local_type);
        self.complete.remove(local_type);
    }

    /// `true` iff effective and complete agree on every type and object —
    /// the universal property tying an empty error queue to cache agreement.
    pub fn effective_equals_complete(&self) -> bool {
        self.effective == self.complete
    }

    pub fn to_snapshot(&self) -> CacheSideSnapshot {
        CacheSideSnapshot {
            effective: self.effective.iter().map(|(t, m)| (t.clone(), m.values().cloned().collect())).collect(),
            complete: self.complete.iter().map(|(t, m)| (t.clone(), m.values().cloned().collect())).collect(),
        }
    }

    pub fn from_snapshot(snapshot: CacheSideSnapshot, pkey_of: impl Fn(&str, &DataObject) -> Option<PKey>) -> Self {
        let mut cache = Self::new();
        for (local_type, objs) in snapshot.effective {
            for obj in objs {
                if let Some(pkey) = pkey_of(&local_type, &obj) {
                    cache.insert_effective(&local_type, pkey, obj);
                }
            }
        }
        for (local_type, objs) in snapshot.complete {
            for obj in objs {
                if let Some(pkey) = pkey_of(&local_type, &obj) {
                    cache.insert_complete(&local_type, pkey, obj);
                }
            }
        }
        cache
    }
}

/// JSON-serializable snapshot of one [`ObjectCache`] for persistence;
/// `DataObject` doesn't carry its own pkey so the index is rebuilt on load
/// via the owning schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSideSnapshot {
    #[serde(default)]
    pub effective: IndexMap<String, Vec<DataObject>>,
    #[serde(default)]
    pub complete: IndexMap<String, Vec<DataObject>>,
}

/// Per-type trashbin: objects removed with `trashbinRetention > 0`,
/// timestamped so the purge loop can age them out.
#[derive(Debug, Clone, Default)]
pub struct Trashbin {
    entries: HashMap<String, IndexMap<PKey, DataObject>>,
}

impl Trashbin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, local_type: &str, pkey: &PKey) -> bool {
        self.entries.get(local_type).is_some_and(|m| m.contains_key(pkey))
    }

    pub fn get(&self, local_type: &str, pkey: &PKey) -> Option<&DataObject> {
        self.entries.get(local_type)?.get(pkey)
    }

    pub fn insert(&mut self, local_type: &str, pkey: PKey, mut obj: DataObject, at: DateTime<Utc>) {
        obj.trashbin_timestamp = Some(at);
        self.entries.entry(local_type.to_string()).or_default().insert(pkey, obj);
    }

    pub fn remove(&mut self, local_type: &str, pkey: &PKey) -> Option<DataObject> {
        self.entries.get_mut(local_type)?.shift_remove(pkey)
    }

    pub fn remove_type(&mut self, local_type: &str) {
        self.entries.remove(local_type);
    }

    /// Moves a trashed object from `old_pkey` to `new_pkey`, preserving its
    /// trashbin timestamp (§4.5).
    pub fn rekey(&mut self, local_type: &str, old_pkey: &PKey, new_pkey: &PKey) {
        if let Some(obj) = self.remove(local_type, old_pkey) {
            let ts = obj.trashbin_timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            self.insert(local_type, new_pkey.clone(), obj, ts);
        }
    }

    pub fn objects_of_type(&self, local_type: &str) -> impl Iterator<Item = (&PKey, &DataObject)> {
        self.entries.get(local_type).into_iter().flat_map(|m| m.iter())
    }

    /// Entries whose `trashbinTimestamp` is older than `retention`, for
    /// every type, oldest-declared-type-last (reverse declaration order is
    /// applied by the caller using `declared_types`).
    pub fn expired(&self, local_type: &str, now: DateTime<Utc>, retention: chrono::Duration) -> Vec<(PKey, DataObject)> {
        let Some(m) = self.entries.get(local_type) else { return Vec::new() };
        m.iter()
            .filter(|(_, obj)| obj.trashbin_timestamp.is_some_and(|ts| now - ts >= retention))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn to_snapshot(&self) -> IndexMap<String, Vec<DataObject>> {
        self.entries.iter().map(|(t, m)| (t.clone(), m.values().cloned().collect())).collect()
    }

    pub fn from_snapshot(
        snapshot: IndexMap<String, Vec<DataObject>>,
        pkey_of: impl Fn(&str, &DataObject) -> Option<PKey>,
    ) -> Self {
        let mut bin = Self::new();
        for (local_type, objs) in snapshot {
            for obj in objs {
                if let Some(pkey) = pkey_of(&local_type, &obj) {
                    let ts = obj.trashbin_timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                    bin.insert(&local_type, pkey, obj, ts);
                }
            }
        }
        bin
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
