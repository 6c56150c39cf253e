// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Main Loop & Control (C7): the cooperative, single-threaded iteration
//! described in §4.7 — initsync replay, steady-state event processing,
//! error-queue retry, trashbin purge, local-datamodel-change application,
//! and status notification.

use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use hermes_bus::{BusConsumer, BusError};
use hermes_core::{Event, EventCategory, EventType, Schema};
use hermes_datamodel::Datamodel;
use hermes_engine::{diff_datamodel, diff_schema, DatamodelChangeAction, EngineError, Scheduler, SchemaChangeAction};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::lifecycle::{Daemon, LifecycleError};
use crate::status::{notification_edges, StatusSnapshot};

#[derive(Debug, Error)]
pub enum MainLoopError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Mapping(#[from] hermes_datamodel::MappingError),
    #[error("fatal engine error: {0}")]
    Engine(#[from] EngineError),
}

const BUS_RETRY_BACKOFF_SECS: u64 = 60;
const ERROR_RETRY_TIMER: &str = "error_retry";
const TRASHBIN_PURGE_TIMER: &str = "trashbin_purge";

/// Drives a [`Daemon`] against one [`BusConsumer`] until quit is requested
/// or a fatal error occurs.
pub struct MainLoop<B: BusConsumer> {
    daemon: Daemon,
    bus: B,
    scheduler: Scheduler,
}

impl<B: BusConsumer> MainLoop<B> {
    pub fn new(daemon: Daemon, bus: B) -> Self {
        let mut scheduler = Scheduler::new();
        let now = Instant::now();
        scheduler.set_timer(ERROR_RETRY_TIMER, StdDuration::from_millis(daemon.config.hermes.loop_cfg.error_retry_interval_ms), now);
        scheduler.set_timer(TRASHBIN_PURGE_TIMER, StdDuration::from_millis(daemon.config.hermes.loop_cfg.trashbin_purge_interval_ms), now);
        Self { daemon, bus, scheduler }
    }

    pub fn into_daemon(self) -> Daemon {
        self.daemon
    }

    /// Runs iterations until `control.flags.request_quit()` is observed.
    /// Fatal errors (invalid datamodel, internal invariant violations)
    /// propagate and the caller is responsible for the final notification
    /// and process exit code (§7).
    pub async fn run(&mut self) -> Result<(), MainLoopError> {
        let interval = StdDuration::from_millis(self.daemon.config.hermes.loop_cfg.interval_ms.max(1));
        while !self.daemon.control.flags.is_quit() {
            self.iterate().await?;
            if self.daemon.control.flags.is_quit() {
                break;
            }
            tokio::select! {
                _ = sleep(interval) => {}
                _ = self.daemon.control.flags.changed.notified() => {}
            }
        }
        Ok(())
    }

    /// One full pass of §4.7's seven steps.
    async fn iterate(&mut self) -> MainLoopResult {
        // Step 1: acquire the bus session, scoped to this iteration.
        if let Err(e) = self.open_bus_with_backoff().await {
            return Err(e);
        }
        let outcome = self.iterate_inner().await;
        let _ = self.bus.close().await;
        outcome
    }

    async fn iterate_inner(&mut self) -> MainLoopResult {
        // Step 2: paused, or nothing to do this tick.
        if self.daemon.control.flags.is_paused() {
            sleep(StdDuration::from_secs(1)).await;
            return Ok(());
        }

        let now = Utc::now();
        let mut changed = false;

        // Step 3: apply a pending local-datamodel change left over from a
        // restart where initsync had already completed.
        if self.daemon.datamodel_change_pending {
            self.apply_local_datamodel_change(now).await?;
            self.daemon.datamodel_change_pending = false;
            changed = true;
        }

        if self.daemon.offset_cache.is_initsync_complete() {
            let fired = self.scheduler.fired_timers(Instant::now());
            if fired.iter().any(|id| id.as_str() == ERROR_RETRY_TIMER) {
                changed |= self.retry_error_queue(now).await?;
                self.scheduler.set_timer(
                    ERROR_RETRY_TIMER,
                    StdDuration::from_millis(self.daemon.config.hermes.loop_cfg.error_retry_interval_ms),
                    Instant::now(),
                );
            }
            if fired.iter().any(|id| id.as_str() == TRASHBIN_PURGE_TIMER) {
                changed |= self.purge_trashbin(now).await?;
                self.scheduler.set_timer(
                    TRASHBIN_PURGE_TIMER,
                    StdDuration::from_millis(self.daemon.config.hermes.loop_cfg.trashbin_purge_interval_ms),
                    Instant::now(),
                );
            }
            changed |= self.process_steady_state(now).await?;
        } else {
            changed |= self.run_initsync_pass(now).await?;
        }

        let snapshot = self.compute_status();
        changed |= self.notify_on_transitions(&snapshot).await;
        self.daemon.control.status.publish(snapshot);

        // Step 7: persist whatever changed this iteration.
        if changed {
            self.daemon.persist()?;
        }
        Ok(())
    }

    async fn open_bus_with_backoff(&mut self) -> MainLoopResult {
        loop {
            match self.bus.open().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "bus unavailable, backing off");
                    let mut waited = 0;
                    while waited < BUS_RETRY_BACKOFF_SECS {
                        if self.daemon.control.flags.is_quit() {
                            return Ok(());
                        }
                        sleep(StdDuration::from_secs(1)).await;
                        waited += 1;
                    }
                }
            }
        }
    }

    /// §4.7 step 5: locate the chosen `init-start…init-stop` sequence and
    /// replay every object inside it.
    async fn run_initsync_pass(&mut self, now: DateTime<Utc>) -> Result<bool, MainLoopError> {
        let Some((init_start_offset, schema)) = self.find_init_start().await? else {
            return Ok(false);
        };

        self.daemon.rebuild_processor_for_schema(schema)?;
        self.daemon.offset_cache.init_start_offset = Some(init_start_offset);

        self.bus.seek(init_start_offset).await.map_err(bus_fatal)?;
        // Skip the init-start event itself.
        self.bus.next_event().await.map_err(bus_fatal)?;

        loop {
            if self.daemon.control.flags.is_quit() {
                return Ok(true);
            }
            let Some(event) = self.bus.next_event().await.map_err(bus_fatal)? else {
                // Bus exhausted before init-stop: retry from init-start next iteration.
                return Ok(true);
            };
            if event.eventtype == EventType::InitStop {
                let offset = event.offset.unwrap_or(init_start_offset);
                self.daemon.offset_cache.init_stop_offset = Some(offset);
                self.daemon.offset_cache.next_offset = offset + 1;
                self.daemon.datamodel_change_pending = false;
                return Ok(true);
            }
            if let Some(processor) = &mut self.daemon.processor {
                processor.process_remote_event(event, now, true, false).await?;
            }
        }
        // unreachable, loop always returns
    }

    /// Scans the whole bus for `init-start` events and picks the first or
    /// last occurrence per configuration, returning its offset and the
    /// schema carried in its payload.
    async fn find_init_start(&mut self) -> Result<Option<(u64, Schema)>, MainLoopError> {
        self.bus.seek_to_beginning().await.map_err(bus_fatal)?;
        let prefer_last = self.daemon.config.hermes.loop_cfg.prefer_last_init_sequence;
        let mut chosen: Option<(u64, Schema)> = None;
        loop {
            let Some(event) = self.bus.next_event().await.map_err(bus_fatal)? else { break };
            if event.eventtype != EventType::InitStart {
                continue;
            }
            let Some(offset) = event.offset else { continue };
            let schema: Schema = match serde_json::from_value(event.objattrs.clone()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "init-start payload is not a valid schema, skipping");
                    continue;
                }
            };
            if chosen.is_none() || prefer_last {
                chosen = Some((offset, schema));
            }
        }
        Ok(chosen)
    }

    /// §4.7 step 4 (continued): process events from `nextOffset` onward.
    async fn process_steady_state(&mut self, now: DateTime<Utc>) -> Result<bool, MainLoopError> {
        let next_offset = self.daemon.offset_cache.next_offset;
        if self.bus.seek(next_offset).await.is_err() {
            // Nothing at this offset yet; nothing to do this tick.
            return Ok(false);
        }
        let mut changed = false;
        loop {
            if self.daemon.control.flags.is_quit() {
                return Ok(changed);
            }
            let Some(event) = self.bus.next_event().await.map_err(bus_fatal)? else { break };
            let Some(offset) = event.offset else { continue };
            if matches!(event.eventtype, EventType::InitStart | EventType::InitStop) {
                self.daemon.offset_cache.next_offset = offset + 1;
                changed = true;
                continue;
            }
            if event.eventtype == EventType::Dataschema {
                self.apply_schema_change(event.objattrs.clone()).await?;
                self.daemon.offset_cache.next_offset = offset + 1;
                changed = true;
                continue;
            }
            if let Some(processor) = &mut self.daemon.processor {
                processor.process_remote_event(event, now, true, false).await?;
            }
            self.daemon.offset_cache.next_offset = offset + 1;
            changed = true;
        }
        Ok(changed)
    }

    /// §4.1: a `dataschema` event announces a new remote schema mid-run.
    async fn apply_schema_change(&mut self, payload: serde_json::Value) -> Result<(), MainLoopError> {
        let new_schema: Schema = match serde_json::from_value(payload) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "dataschema payload is not a valid schema, ignoring");
                return Ok(());
            }
        };
        let Some(old_schema) = self.daemon.remote_schema.clone() else {
            self.daemon.rebuild_processor_for_schema(new_schema)?;
            return Ok(());
        };
        let actions = diff_schema(&old_schema, &new_schema);
        self.daemon.rebuild_processor_for_schema(new_schema)?;
        for action in actions {
            match action {
                SchemaChangeAction::TypeRemoved { remote_type } => {
                    if let Some(processor) = &mut self.daemon.processor {
                        processor.purge_remote_type(&remote_type);
                    }
                }
                SchemaChangeAction::PrimaryKeyChanged { remote_type } => {
                    self.rewrite_primary_keys_for_remote_type(&remote_type, &old_schema).await?;
                }
                SchemaChangeAction::SecretAttributeAdded { remote_type } => {
                    self.drop_secret_attrs_for_remote_type(&remote_type);
                }
            }
        }
        Ok(())
    }

    /// §4.5: the remote type's primary-key attribute changed. `old_schema`
    /// still has the previous definition; `self.daemon.processor` has
    /// already been rebuilt against the new one (caches carried over
    /// verbatim, still indexed under the old key). For every object of the
    /// local type this remote type maps to, recompute its primary key under
    /// the new schema and rekey the cache, trashbin, and error queue.
    async fn rewrite_primary_keys_for_remote_type(&mut self, remote_type: &str, old_schema: &Schema) -> Result<(), MainLoopError> {
        let Some(processor) = &self.daemon.processor else { return Ok(()) };
        let Some(local_type) = processor.datamodel().by_hermes_type(remote_type).map(|m| m.local_type.clone()) else {
            return Ok(());
        };
        let Some(new_local_type) = processor.local_schema().get(&local_type).cloned() else { return Ok(()) };
        // Confirms the remote type actually existed (and was mapped) under
        // the previous schema; `DataObject::pkey` below reads straight from
        // stored attributes, so the old type definition itself isn't needed.
        let old_datamodel = Datamodel::compile(&self.daemon.config.datamodel, old_schema)?;
        if old_datamodel.local_schema(old_schema).get(&local_type).is_none() {
            return Ok(());
        }

        let mut old_pkeys: Vec<hermes_core::PKey> = processor.local_cache().objects_of_type(&local_type).map(|(k, _)| k.clone()).collect();
        old_pkeys.extend(processor.trashbin().objects_of_type(&local_type).map(|(k, _)| k.clone()));
        old_pkeys.sort();
        old_pkeys.dedup();

        for old_pkey in old_pkeys {
            let Some(processor) = &self.daemon.processor else { break };
            let obj = processor
                .local_cache()
                .get_complete(&local_type, &old_pkey)
                .or_else(|| processor.trashbin().get(&local_type, &old_pkey))
                .cloned();
            let Some(obj) = obj else { continue };
            let new_pkey = match obj.pkey(&new_local_type) {
                Ok(pkey) => pkey,
                Err(e) => {
                    warn!(local_type, error = %e, "could not compute new primary key after schema change; object stays under its old key");
                    continue;
                }
            };
            if new_pkey == old_pkey {
                continue;
            }
            if let Some(processor) = &mut self.daemon.processor {
                processor.rekey_local_object(&local_type, &old_pkey, new_pkey);
            }
        }
        Ok(())
    }

    /// §4.1: a secret attribute was added to `remote_type`. Strips its
    /// cached values out of the remote cache so the next persisted
    /// snapshot — and every run after it — no longer carries the plaintext
    /// that was cached back when the attribute wasn't secret.
    fn drop_secret_attrs_for_remote_type(&mut self, remote_type: &str) {
        let Some(schema) = &self.daemon.remote_schema else { return };
        let Some(object_type) = schema.get(remote_type) else { return };
        if object_type.secret_attrs.is_empty() {
            return;
        }
        let secret_attrs = object_type.secret_attrs.clone();
        info!(remote_type, "secret attribute added; dropping cached plaintext for this type");
        if let Some(processor) = &mut self.daemon.processor {
            processor.drop_remote_secret_attrs(remote_type, &secret_attrs);
        }
    }

    /// §4.8: diff the previous run's datamodel config against the current
    /// one and synthesize the events that bring caches in line.
    async fn apply_local_datamodel_change(&mut self, now: DateTime<Utc>) -> Result<(), MainLoopError> {
        let Some(schema) = self.daemon.remote_schema.clone() else { return Ok(()) };
        let old_datamodel = Datamodel::compile(&self.daemon.previous_datamodel_configs, &schema)?;
        let Some(processor) = &self.daemon.processor else { return Ok(()) };
        let actions = diff_datamodel(&old_datamodel, processor.datamodel());
        drop(processor);

        for action in actions {
            match action {
                DatamodelChangeAction::TypeRemoved { local_type } => {
                    self.synthesize_removals_for_type(&local_type, now).await?;
                    if let Some(processor) = &mut self.daemon.processor {
                        processor.purge_local_type(&local_type);
                    }
                }
                DatamodelChangeAction::RebuildProjection { local_type } => {
                    self.rebuild_projection(&local_type, now).await?;
                }
            }
        }
        self.daemon.previous_datamodel_configs = self.daemon.config.datamodel.clone();
        Ok(())
    }

    async fn synthesize_removals_for_type(&mut self, local_type: &str, now: DateTime<Utc>) -> Result<(), MainLoopError> {
        let Some(processor) = &self.daemon.processor else { return Ok(()) };
        let mut pkeys: Vec<_> = processor.local_cache().objects_of_type(local_type).map(|(k, _)| k.clone()).collect();
        pkeys.extend(processor.trashbin().objects_of_type(local_type).map(|(k, _)| k.clone()));
        pkeys.sort();
        pkeys.dedup();
        drop(processor);

        for pkey in pkeys {
            let event = Event::removed(local_type, pkey, EventCategory::Base);
            if let Some(processor) = &mut self.daemon.processor {
                processor.apply_local_event(event, now, true).await?;
            }
        }
        Ok(())
    }

    /// Rebuilds a local type's projection from the `complete` remote cache
    /// and synthesizes `added`/`modified`/`removed` events for the diff
    /// against the cached local `complete` projection.
    async fn rebuild_projection(&mut self, local_type: &str, now: DateTime<Utc>) -> Result<(), MainLoopError> {
        let Some(processor) = &self.daemon.processor else { return Ok(()) };
        let Some(mapping) = processor.datamodel().types.get(local_type) else { return Ok(()) };
        let remote_type = mapping.hermes_type.clone();
        let Some(local_obj_type) = processor.local_schema().get(local_type).cloned() else { return Ok(()) };

        let remote_objects: Vec<_> = processor.remote_cache().objects_of_type(&remote_type).map(|(_, o)| o.clone()).collect();
        let mut projected: Vec<(hermes_core::PKey, hermes_core::DataObject)> = Vec::new();
        for remote_obj in &remote_objects {
            if let Some(local_obj) = processor.datamodel().project_remote_object(local_type, remote_obj) {
                if let Ok(pkey) = local_obj.pkey(&local_obj_type) {
                    projected.push((pkey, local_obj));
                }
            }
        }

        let existing: std::collections::HashMap<_, _> =
            processor.local_cache().objects_of_type(local_type).map(|(k, v)| (k.clone(), v.clone())).collect();
        let trashed: std::collections::HashMap<_, _> =
            processor.trashbin().objects_of_type(local_type).map(|(k, v)| (k.clone(), v.clone())).collect();
        drop(processor);

        let mut seen = std::collections::HashSet::new();
        for (pkey, new_obj) in &projected {
            seen.insert(pkey.clone());
            if let Some(trashed_obj) = trashed.get(pkey) {
                if !existing.contains_key(pkey) {
                    let added = Event::added(local_type, pkey.clone(), new_obj.attrs.clone().into_iter().collect(), EventCategory::Base);
                    if let Some(processor) = &mut self.daemon.processor {
                        processor.apply_local_event(added, now, true).await?;
                    }
                    let removed = Event::removed(local_type, pkey.clone(), EventCategory::Base);
                    let ts = trashed_obj.trashbin_timestamp.unwrap_or(now);
                    if let Some(processor) = &mut self.daemon.processor {
                        processor.apply_local_event(removed, ts, true).await?;
                    }
                }
                continue;
            }
            match existing.get(pkey) {
                None => {
                    let added = Event::added(local_type, pkey.clone(), new_obj.attrs.clone().into_iter().collect(), EventCategory::Base);
                    if let Some(processor) = &mut self.daemon.processor {
                        processor.apply_local_event(added, now, true).await?;
                    }
                }
                Some(old_obj) if old_obj.attrs != new_obj.attrs => {
                    let diff = diff_attrs(&old_obj.attrs, &new_obj.attrs);
                    let modified = Event::modified(local_type, pkey.clone(), diff, EventCategory::Base);
                    if let Some(processor) = &mut self.daemon.processor {
                        processor.apply_local_event(modified, now, true).await?;
                    }
                }
                Some(_) => {}
            }
        }
        for pkey in existing.keys() {
            if !seen.contains(pkey) {
                let removed = Event::removed(local_type, pkey.clone(), EventCategory::Base);
                if let Some(processor) = &mut self.daemon.processor {
                    processor.apply_local_event(removed, now, true).await?;
                }
            }
        }
        Ok(())
    }

    /// §4.4 error-queue retry: each object whose dependency has cleared is
    /// retried in ascending event-number order.
    async fn retry_error_queue(&mut self, now: DateTime<Utc>) -> Result<bool, MainLoopError> {
        let Some(processor) = &self.daemon.processor else { return Ok(false) };
        if processor.error_queue().is_empty() {
            return Ok(false);
        }
        let entries: Vec<_> = processor
            .error_queue()
            .iter_first_per_object()
            .into_iter()
            .map(|e| (e.event_number, e.remote_event.clone(), e.local_event.clone()))
            .collect();
        drop(processor);

        for (event_number, remote_event, local_event) in entries {
            if self.daemon.control.flags.is_quit() {
                break;
            }
            let Some(processor) = &mut self.daemon.processor else { break };
            // Remove before retrying: `blocks_on_dependency` treats an
            // entry's own presence in the queue as self-blocking.
            processor.error_queue_mut().remove(event_number);
            match remote_event {
                Some(re) => processor.process_remote_event(re, now, true, true).await?,
                None => processor.apply_local_event(local_event, now, true).await?,
            };
        }
        Ok(true)
    }

    /// §4.3/§4.7 step 4: expire trashbin entries in reverse declared-type
    /// order (children before parents).
    async fn purge_trashbin(&mut self, now: DateTime<Utc>) -> Result<bool, MainLoopError> {
        let Some(processor) = &self.daemon.processor else { return Ok(false) };
        let types: Vec<String> = processor.datamodel().types.keys().rev().cloned().collect();
        let mut to_purge = Vec::new();
        for local_type in &types {
            let Some(mapping) = processor.datamodel().types.get(local_type) else { continue };
            let Some(retention) = mapping.trashbin_retention else { continue };
            if retention.is_zero() {
                continue;
            }
            let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
            for (pkey, _) in processor.trashbin().expired(local_type, now, retention) {
                to_purge.push((local_type.clone(), pkey));
            }
        }
        drop(processor);
        if to_purge.is_empty() {
            return Ok(false);
        }
        for (local_type, pkey) in to_purge {
            if self.daemon.control.flags.is_quit() {
                break;
            }
            let event = Event::removed(&local_type, pkey, EventCategory::Base);
            if let Some(processor) = &mut self.daemon.processor {
                processor.apply_local_event(event, now, true).await?;
            }
        }
        Ok(true)
    }

    fn compute_status(&self) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::default();
        let engine = snapshot.component("engine");
        engine.information.insert("next_offset".to_string(), self.daemon.offset_cache.next_offset.to_string());
        engine.information.insert("initsync_complete".to_string(), self.daemon.offset_cache.is_initsync_complete().to_string());
        if let Some(processor) = &self.daemon.processor {
            engine.information.insert("error_queue_len".to_string(), processor.error_queue().len().to_string());
            for warning in &processor.datamodel().warnings {
                engine.warning.insert(warning.clone(), warning.clone());
            }
            if !processor.error_queue().is_empty() {
                engine.error.insert("pending_errors".to_string(), processor.error_queue().len().to_string());
            }
        }
        snapshot
    }

    /// Compares `snapshot` against the last-notified error/warning sets
    /// persisted in the offset cache, notifies on every crossed edge, and
    /// returns whether that persisted state changed (so the caller persists
    /// it this iteration).
    async fn notify_on_transitions(&mut self, snapshot: &StatusSnapshot) -> bool {
        let mut prev_errors: Vec<String> = self.daemon.offset_cache.last_known_errors.iter().cloned().collect();
        let mut prev_warnings: Vec<String> = self.daemon.offset_cache.last_known_datamodel_warnings.iter().cloned().collect();
        prev_errors.sort();
        prev_warnings.sort();
        let mut next_errors = snapshot.error_keys();
        let mut next_warnings = snapshot.warning_keys();
        next_errors.sort();
        next_warnings.sort();
        let exception = self.daemon.offset_cache.last_unhandled_exception.clone();

        let edges = notification_edges(&prev_errors, &next_errors, &prev_warnings, &next_warnings, exception.as_deref(), exception.as_deref());
        for edge in &edges {
            self.daemon.observer.notify(edge.clone(), snapshot, exception.as_deref()).await;
        }
        let changed = !edges.is_empty();
        self.daemon.offset_cache.last_known_errors = next_errors.into_iter().collect();
        self.daemon.offset_cache.last_known_datamodel_warnings = next_warnings.into_iter().collect();
        changed
    }
}

type MainLoopResult = Result<(), MainLoopError>;

fn bus_fatal(e: BusError) -> MainLoopError {
    // Bus consumer errors surfacing mid-iteration (beyond the open() backoff
    // handled separately) are logged and treated as this iteration's fatal
    // condition; the outer loop retries on the next tick.
    error!(error = %e, "bus error during iteration");
    MainLoopError::Engine(EngineError::Invariant(e.to_string()))
}

fn diff_attrs(old: &indexmap::IndexMap<String, serde_json::Value>, new: &indexmap::IndexMap<String, serde_json::Value>) -> hermes_core::ModifiedAttrs {
    let mut out = hermes_core::ModifiedAttrs::default();
    for (k, v) in new {
        match old.get(k) {
            None => {
                out.added.insert(k.clone(), v.clone());
            }
            Some(old_v) if old_v != v => {
                out.modified.insert(k.clone(), v.clone());
            }
            Some(_) => {}
        }
    }
    for k in old.keys() {
        if !new.contains_key(k) {
            out.removed.insert(k.clone(), serde_json::Value::Null);
        }
    }
    out
}

#[cfg(test)]
#[path = "main_loop_tests.rs"]
mod tests;
