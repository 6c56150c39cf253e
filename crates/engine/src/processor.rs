// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event Processor (C6): the state machine driving add/modify/remove/
//! recycle/trash transitions across the dual cache, trashbin, and error
//! queue, per §4.6's transition table.

use chrono::{DateTime, Utc};
use hermes_core::{DataObject, Event, EventType, ModifiedAttrs, PKey, Schema};
use hermes_datamodel::{AutoremediationMode, Datamodel, ForeignKeyPolicy};
use hermes_handlers::{HandlerContext, HandlerRegistry, TypeHandler};
use indexmap::IndexMap;
use serde_json::Value;

use crate::cache::{ObjectCache, Trashbin};
use crate::error::EngineError;
use crate::error_queue::ErrorQueue;

/// What happened to one inbound remote event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The type is unmapped, or the converted local event carried no
    /// attribute changes: nothing to do.
    NoLocalProjection,
    /// The local transition was applied (handler ran and succeeded, or no
    /// handler is registered for the type).
    Applied,
    /// Guard A (existing errors or a foreign-key dependency) or a handler
    /// failure routed the event to the error queue instead.
    Queued,
}

pub struct EventProcessor {
    local_schema: Schema,
    datamodel: Datamodel,
    remote_cache: ObjectCache,
    local_cache: ObjectCache,
    trashbin: Trashbin,
    error_queue: ErrorQueue,
    handlers: HandlerRegistry,
    foreign_key_policy: ForeignKeyPolicy,
    autoremediation: AutoremediationMode,
    force_retry: bool,
}

impl EventProcessor {
    pub fn new(
        remote_schema: &Schema,
        datamodel: Datamodel,
        handlers: HandlerRegistry,
        foreign_key_policy: ForeignKeyPolicy,
        autoremediation: AutoremediationMode,
    ) -> Self {
        let local_schema = datamodel.local_schema(remote_schema);
        Self {
            local_schema,
            datamodel,
            remote_cache: ObjectCache::new(),
            local_cache: ObjectCache::new(),
            trashbin: Trashbin::new(),
            error_queue: ErrorQueue::new(),
            handlers,
            foreign_key_policy,
            autoremediation,
            force_retry: false,
        }
    }

    pub fn local_schema(&self) -> &Schema {
        &self.local_schema
    }

    pub fn datamodel(&self) -> &Datamodel {
        &self.datamodel
    }

    pub fn local_cache(&self) -> &ObjectCache {
        &self.local_cache
    }

    pub fn remote_cache(&self) -> &ObjectCache {
        &self.remote_cache
    }

    pub fn trashbin(&self) -> &Trashbin {
        &self.trashbin
    }

    pub fn error_queue(&self) -> &ErrorQueue {
        &self.error_queue
    }

    pub fn error_queue_mut(&mut self) -> &mut ErrorQueue {
        &mut self.error_queue
    }

    /// Restores cache state loaded from a prior run's snapshot.
    pub fn replace_remote_cache(&mut self, cache: ObjectCache) {
        self.remote_cache = cache;
    }

    pub fn replace_local_cache(&mut self, cache: ObjectCache) {
        self.local_cache = cache;
    }

    pub fn replace_trashbin(&mut self, trashbin: Trashbin) {
        self.trashbin = trashbin;
    }

    pub fn replace_error_queue(&mut self, queue: ErrorQueue) {
        self.error_queue = queue;
    }

    /// Whether a recycle transition detected attribute drift against the
    /// trashed snapshot and queued a synthetic `modified` event that should
    /// be retried immediately rather than waiting for the next scheduled
    /// error-queue sweep. Clears the flag.
    pub fn take_force_retry(&mut self) -> bool {
        std::mem::take(&mut self.force_retry)
    }

    /// §4.5: moves a cached/trashed/queued object from its old local
    /// primary key to its new one, following a primary-key migration on the
    /// remote type it's mapped from. `local_cache` and `trashbin` are
    /// content-addressed by the current attribute values, so only the index
    /// changes; queued events have their `objpkey` rewritten in place.
    pub fn rekey_local_object(&mut self, local_type: &str, old_pkey: &PKey, new_pkey: PKey) {
        self.local_cache.rekey(local_type, old_pkey, &new_pkey);
        self.trashbin.rekey(local_type, old_pkey, &new_pkey);
        self.error_queue.rewrite_primary_keys(local_type, old_pkey, new_pkey);
    }

    /// §4.1: drops a newly-secret attribute's cached values for `remote_type`
    /// out of the remote cache, forcing the "save-then-reload" the spec
    /// calls for — the next `persist()` writes the stripped snapshot, and
    /// nothing reloads the plaintext back in since it's gone from memory.
    pub fn drop_remote_secret_attrs(&mut self, remote_type: &str, secret_attrs: &std::collections::HashSet<String>) {
        self.remote_cache.strip_attrs(remote_type, secret_attrs);
    }

    /// Processes one inbound remote event end to end: maintains the remote
    /// `complete` cache unconditionally, converts to a local event, applies
    /// Guard A, and (if not queued) runs the §4.6 transition.
    ///
    /// `enqueue_on_error` is false for error-queue retries (§4.4), where a
    /// handler failure should surface instead of being re-queued so the
    /// caller can update the existing entry's `errorMsg`.
    pub async fn process_remote_event(
        &mut self,
        event: Event,
        now: DateTime<Utc>,
        enqueue_on_error: bool,
        is_an_error_retry: bool,
    ) -> Result<ProcessOutcome, EngineError> {
        self.apply_to_remote_complete(&event);

        let complete_remote = match (&event.objtype, &event.objpkey) {
            (Some(t), Some(p)) => self.remote_cache.get_complete(t, p).cloned(),
            _ => None,
        };

        // Force-empty conversion first: even with no attribute changes, we
        // need the local (type, pkey) to evaluate Guard A and to preserve
        // queue ordering for a trivial local projection.
        let Some(local_or_empty) = self.datamodel.convert_event_to_local(&event, complete_remote.as_ref(), true) else {
            return Ok(ProcessOutcome::NoLocalProjection);
        };
        let local_type = local_or_empty
            .objtype
            .clone()
            .ok_or_else(|| EngineError::Invariant("mapped event has no objtype".to_string()))?;
        let pkey = local_or_empty
            .objpkey
            .clone()
            .ok_or_else(|| EngineError::Invariant("mapped event has no objpkey".to_string()))?;

        if self.error_queue.blocks_on_dependency(&self.local_schema, &local_type, &pkey, self.foreign_key_policy, local_or_empty.eventtype)
        {
            self.error_queue.append(Some(event), local_or_empty, None);
            return Ok(ProcessOutcome::Queued);
        }

        let Some(mut local_event) = self.datamodel.convert_event_to_local(&event, complete_remote.as_ref(), false) else {
            return Ok(ProcessOutcome::NoLocalProjection);
        };

        match self.apply_transition(&local_type, &pkey, &mut local_event, now, is_an_error_retry).await {
            Ok(()) => {
                self.apply_to_remote_effective(&event);
                Ok(ProcessOutcome::Applied)
            }
            Err(EngineError::Handler(err)) => {
                if enqueue_on_error {
                    self.error_queue.append(Some(event), local_event, Some(err.to_string()));
                    Ok(ProcessOutcome::Queued)
                } else {
                    Err(EngineError::Handler(err))
                }
            }
            // Modifying a trashed object is silently re-enqueued from the
            // main path; a retry hitting it again is a real error (the
            // object should have been un-trashed or purged by then).
            Err(EngineError::ModifiedTrashedObject { .. }) if !is_an_error_retry => {
                self.error_queue.append(Some(event), local_event, None);
                Ok(ProcessOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    /// Applies a locally-synthesized event directly through the §4.6
    /// transition table, bypassing remote-event conversion since there is no
    /// backing remote event — used by schema-change (§4.1) and local
    /// datamodel-change (§4.8) handling to replay synthetic `removed`/
    /// `added`/`modified` events.
    pub async fn apply_local_event(
        &mut self,
        mut local_event: Event,
        now: DateTime<Utc>,
        enqueue_on_error: bool,
    ) -> Result<ProcessOutcome, EngineError> {
        let local_type = local_event
            .objtype
            .clone()
            .ok_or_else(|| EngineError::Invariant("synthetic local event has no objtype".to_string()))?;
        let pkey = local_event
            .objpkey
            .clone()
            .ok_or_else(|| EngineError::Invariant("synthetic local event has no objpkey".to_string()))?;

        if self.error_queue.blocks_on_dependency(
            &self.local_schema,
            &local_type,
            &pkey,
            self.foreign_key_policy,
            local_event.eventtype,
        ) {
            self.error_queue.append(None, local_event, None);
            return Ok(ProcessOutcome::Queued);
        }

        match self.apply_transition(&local_type, &pkey, &mut local_event, now, false).await {
            Ok(()) => Ok(ProcessOutcome::Applied),
            Err(EngineError::Handler(err)) => {
                if enqueue_on_error {
                    self.error_queue.append(None, local_event, Some(err.to_string()));
                    Ok(ProcessOutcome::Queued)
                } else {
                    Err(EngineError::Handler(err))
                }
            }
            Err(EngineError::ModifiedTrashedObject { .. }) => {
                self.error_queue.append(None, local_event, None);
                Ok(ProcessOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    /// Removes every residual error-queue entry and cache/trashbin record
    /// for a local type, used once its `removed` events have been
    /// synthesized and applied (§4.1 `TypeRemoved`, §4.8 `TypeRemoved`).
    /// Drops a remote type's cache entries after a schema change reports it
    /// removed (§4.1 `TypeRemoved`); the local projection, if any, is purged
    /// separately once its own `removed` events have been synthesized.
    pub fn purge_remote_type(&mut self, remote_type: &str) {
        self.remote_cache.remove_type(remote_type);
    }

    pub fn purge_local_type(&mut self, local_type: &str) {
        self.local_cache.remove_type(local_type);
        self.trashbin.remove_type(local_type);
        let stale: Vec<PKey> = self
            .error_queue
            .iter_first_per_object()
            .into_iter()
            .filter(|e| e.local_event.objtype.as_deref() == Some(local_type))
            .filter_map(|e| e.local_event.objpkey.clone())
            .collect();
        for pkey in stale {
            self.error_queue.purge_object(local_type, &pkey);
        }
    }

    fn apply_to_remote_complete(&mut self, event: &Event) {
        let (Some(t), Some(p)) = (event.objtype.clone(), event.objpkey.clone()) else { return };
        let existing = self.remote_cache.get_complete(&t, &p).cloned();
        match apply_event_to_object(existing.as_ref(), &t, event) {
            Some(obj) => self.remote_cache.insert_complete(&t, p, obj),
            None => {
                self.remote_cache.remove_complete(&t, &p);
            }
        }
    }

    fn apply_to_remote_effective(&mut self, event: &Event) {
        let (Some(t), Some(p)) = (event.objtype.clone(), event.objpkey.clone()) else { return };
        let existing = self.remote_cache.get_effective(&t, &p).cloned();
        match apply_event_to_object(existing.as_ref(), &t, event) {
            Some(obj) => self.remote_cache.insert_effective(&t, p, obj),
            None => {
                self.remote_cache.remove_effective(&t, &p);
            }
        }
    }

    async fn apply_transition(
        &mut self,
        local_type: &str,
        pkey: &PKey,
        local_event: &mut Event,
        now: DateTime<Utc>,
        is_an_error_retry: bool,
    ) -> Result<(), EngineError> {
        let in_trashbin = self.trashbin.contains(local_type, pkey);
        let retention_positive =
            self.datamodel.types.get(local_type).and_then(|m| m.trashbin_retention).is_some_and(|d| !d.is_zero());

        let mut ctx = HandlerContext::new(local_event.step, local_event.is_partially_processed, is_an_error_retry);
        let handler = self.handlers.get(local_type);
        let handler_ref = handler.as_deref();

        let result = match (local_event.eventtype, in_trashbin, retention_positive) {
            (EventType::Added, true, _) => self.do_recycle(local_type, pkey, local_event, handler_ref, &mut ctx).await,
            (EventType::Added, false, _) => self.do_add(local_type, pkey, local_event, handler_ref, &mut ctx).await,
            (EventType::Modified, true, _) => Err(EngineError::ModifiedTrashedObject {
                local_type: local_type.to_string(),
                pkey: pkey.to_string(),
            }),
            (EventType::Modified, false, _) => self.do_modify(local_type, pkey, local_event, handler_ref, &mut ctx).await,
            (EventType::Removed, _, false) => self.do_remove(local_type, pkey, handler_ref, &mut ctx).await,
            (EventType::Removed, true, true) => self.do_remove(local_type, pkey, handler_ref, &mut ctx).await,
            (EventType::Removed, false, true) => self.do_trash(local_type, pkey, handler_ref, &mut ctx, now).await,
            _ => Ok(()),
        };

        local_event.step = ctx.step;
        local_event.is_partially_processed = ctx.is_partially_processed;
        result
    }

    async fn do_add(
        &mut self,
        local_type: &str,
        pkey: &PKey,
        local_event: &Event,
        handler: Option<&dyn TypeHandler>,
        ctx: &mut HandlerContext,
    ) -> Result<(), EngineError> {
        let attrs = local_event.added_attrs().unwrap_or_default();
        if let Some(h) = handler {
            h.on_added(pkey, &attrs, ctx).await?;
        }
        self.local_cache.insert_both(local_type, pkey.clone(), DataObject::new(local_type, attrs));
        Ok(())
    }

    async fn do_modify(
        &mut self,
        local_type: &str,
        pkey: &PKey,
        local_event: &Event,
        handler: Option<&dyn TypeHandler>,
        ctx: &mut HandlerContext,
    ) -> Result<(), EngineError> {
        let diff = local_event.modified_attrs().unwrap_or_default();
        let cached = self.local_cache.get_effective(local_type, pkey).cloned().unwrap_or_else(|| DataObject::new(local_type, IndexMap::new()));
        let new_attrs = apply_diff(&cached.attrs, &diff);
        if let Some(h) = handler {
            h.on_modified(pkey, &new_attrs, &cached.attrs, ctx).await?;
        }
        self.local_cache.insert_both(local_type, pkey.clone(), DataObject::new(local_type, new_attrs));
        Ok(())
    }

    async fn do_remove(
        &mut self,
        local_type: &str,
        pkey: &PKey,
        handler: Option<&dyn TypeHandler>,
        ctx: &mut HandlerContext,
    ) -> Result<(), EngineError> {
        let cached = self
            .local_cache
            .get_effective(local_type, pkey)
            .or_else(|| self.trashbin.get(local_type, pkey))
            .cloned()
            .unwrap_or_else(|| DataObject::new(local_type, IndexMap::new()));
        if let Some(h) = handler {
            h.on_removed(pkey, &cached.attrs, ctx).await?;
        }
        self.local_cache.remove_both(local_type, pkey);
        self.trashbin.remove(local_type, pkey);
        self.error_queue.purge_object(local_type, pkey);
        Ok(())
    }

    async fn do_trash(
        &mut self,
        local_type: &str,
        pkey: &PKey,
        handler: Option<&dyn TypeHandler>,
        ctx: &mut HandlerContext,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let cached = self.local_cache.get_effective(local_type, pkey).cloned().unwrap_or_else(|| DataObject::new(local_type, IndexMap::new()));
        if let Some(h) = handler {
            h.on_trashed(pkey, &cached.attrs, ctx).await?;
        }
        self.local_cache.remove_both(local_type, pkey);
        self.trashbin.insert(local_type, pkey.clone(), cached, now);
        Ok(())
    }

    async fn do_recycle(
        &mut self,
        local_type: &str,
        pkey: &PKey,
        local_event: &Event,
        handler: Option<&dyn TypeHandler>,
        ctx: &mut HandlerContext,
    ) -> Result<(), EngineError> {
        let new_attrs = local_event.added_attrs().unwrap_or_default();
        let trashed = self.trashbin.get(local_type, pkey).cloned();
        if let Some(h) = handler {
            h.on_recycled(pkey, &new_attrs, ctx).await?;
        }
        self.trashbin.remove(local_type, pkey);
        let new_obj = DataObject::new(local_type, new_attrs);
        self.local_cache.insert_both(local_type, pkey.clone(), new_obj.clone());

        if let Some(trashed_obj) = trashed {
            let diff = diff_attrs(&trashed_obj.attrs, &new_obj.attrs);
            if !diff.is_empty() {
                let synthetic = Event::modified(local_type, pkey.clone(), diff, local_event.evcategory);
                self.error_queue.append(None, synthetic, None);
                self.force_retry = true;
            }
        }
        Ok(())
    }

    /// Runs autoremediation for `(local_type, pkey)` after an event has been
    /// appended to the queue for it, using the `complete` caches (both
    /// sides must agree on the diff; callers invoke once per side).
    pub fn autoremediate(&mut self, local_type: &str, pkey: &PKey, on_local_side: bool) -> Result<(), EngineError> {
        let cache = if on_local_side { &self.local_cache } else { &self.remote_cache };
        let complete = cache.get_complete(local_type, pkey).cloned();
        let effective = cache.get_effective(local_type, pkey).cloned();
        self.error_queue.autoremediate(self.autoremediation, local_type, pkey, move || {
            let complete_attrs = complete.map(|o| o.attrs).unwrap_or_default();
            let effective_attrs = effective.map(|o| o.attrs).unwrap_or_default();
            Some(diff_attrs(&effective_attrs, &complete_attrs))
        })
    }
}

/// Applies one event's attribute payload onto a possibly-absent existing
/// object, producing the resulting object (`None` on `removed`).
fn apply_event_to_object(existing: Option<&DataObject>, object_type: &str, event: &Event) -> Option<DataObject> {
    match event.eventtype {
        EventType::Added => Some(DataObject::new(object_type, event.added_attrs().unwrap_or_default())),
        EventType::Modified => {
            let base = existing.map(|o| o.attrs.clone()).unwrap_or_default();
            let diff = event.modified_attrs().unwrap_or_default();
            Some(DataObject::new(object_type, apply_diff(&base, &diff)))
        }
        EventType::Removed => None,
        _ => existing.cloned(),
    }
}

fn apply_diff(base: &IndexMap<String, Value>, diff: &ModifiedAttrs) -> IndexMap<String, Value> {
    let mut attrs = base.clone();
    for (k, v) in &diff.added {
        attrs.insert(k.clone(), v.clone());
    }
    for (k, v) in &diff.modified {
        attrs.insert(k.clone(), v.clone());
    }
    for k in diff.removed.keys() {
        attrs.shift_remove(k);
    }
    attrs
}

/// Computes the `ModifiedAttrs` diff turning `old` into `new`, used for
/// recycle-drift detection and `removed`+`added` autoremediation.
fn diff_attrs(old: &IndexMap<String, Value>, new: &IndexMap<String, Value>) -> ModifiedAttrs {
    let mut added = IndexMap::new();
    let mut modified = IndexMap::new();
    let mut removed = IndexMap::new();
    for (k, v) in new {
        match old.get(k) {
            None => {
                added.insert(k.clone(), v.clone());
            }
            Some(ov) if ov != v => {
                modified.insert(k.clone(), v.clone());
            }
            _ => {}
        }
    }
    for k in old.keys() {
        if !new.contains_key(k) {
            removed.insert(k.clone(), Value::Null);
        }
    }
    ModifiedAttrs { added, modified, removed }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
