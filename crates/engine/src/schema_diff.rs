// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema change (§4.1) and local datamodel change (§4.8) diffing. Both
//! produce pure, order-independent action lists; executing an action
//! (deleting cache files, rewriting primary keys, synthesizing events
//! through the event processor) is the main loop's job, not this module's.

use hermes_core::Schema;
use hermes_datamodel::Datamodel;

/// One consequence of a remote schema change, to be acted on by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChangeAction {
    /// The type no longer exists: delete its cache files, drop all error
    /// queue entries for its objects.
    TypeRemoved { remote_type: String },
    /// The type's primary-key attribute(s) changed: run the §4.5 rewrite
    /// pass before applying anything else for this type.
    PrimaryKeyChanged { remote_type: String },
    /// A secret attribute was added: force a save-then-reload cycle so any
    /// value already cached for it in plaintext is dropped.
    SecretAttributeAdded { remote_type: String },
}

/// Diffs two remote schemas, producing the actions needed to reconcile
/// caches and the error queue with the new schema. Added types and
/// unchanged types require no action.
pub fn diff_schema(old: &Schema, new: &Schema) -> Vec<SchemaChangeAction> {
    let mut actions = Vec::new();
    for (name, old_type) in &old.types {
        match new.types.get(name) {
            None => actions.push(SchemaChangeAction::TypeRemoved { remote_type: name.clone() }),
            Some(new_type) => {
                if old_type.primary_key != new_type.primary_key {
                    actions.push(SchemaChangeAction::PrimaryKeyChanged { remote_type: name.clone() });
                }
                if new_type.secret_attrs.iter().any(|a| !old_type.secret_attrs.contains(a)) {
                    actions.push(SchemaChangeAction::SecretAttributeAdded { remote_type: name.clone() });
                }
            }
        }
    }
    actions
}

/// One consequence of the local datamodel (mapping configuration) changing
/// between process restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatamodelChangeAction {
    /// A previously-mapped local type was dropped from the configuration:
    /// synthesize `removed` events for every cached (including trashed)
    /// object of that type, then delete its cache files.
    TypeRemoved { local_type: String },
    /// A local type is new, or its mapping changed: rebuild the local
    /// projection from the `complete` remote cache and diff it against the
    /// previously cached local `complete` projection to synthesize events.
    RebuildProjection { local_type: String },
}

/// Diffs the previous and current compiled datamodels. A type is a
/// `RebuildProjection` candidate if it is new or if its compiled mapping
/// differs from the previous run's (attribute mapping, `toString`, or
/// trashbin retention changed).
pub fn diff_datamodel(old: &Datamodel, new: &Datamodel) -> Vec<DatamodelChangeAction> {
    let mut actions = Vec::new();
    for local_type in old.types.keys() {
        if !new.types.contains_key(local_type) {
            actions.push(DatamodelChangeAction::TypeRemoved { local_type: local_type.clone() });
        }
    }
    for (local_type, new_mapping) in &new.types {
        match old.types.get(local_type) {
            None => actions.push(DatamodelChangeAction::RebuildProjection { local_type: local_type.clone() }),
            Some(old_mapping) if old_mapping != new_mapping => {
                actions.push(DatamodelChangeAction::RebuildProjection { local_type: local_type.clone() })
            }
            Some(_) => {}
        }
    }
    actions
}

#[cfg(test)]
#[path = "schema_diff_tests.rs"]
mod tests;
