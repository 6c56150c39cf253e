// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: single-instance lock, cache loading on
//! startup, atomic persistence and lock release on shutdown.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use fs2::FileExt;
use hermes_core::{PKey, Schema};
use hermes_datamodel::{Datamodel, HermesConfig, TypeMappingConfig};
use hermes_engine::{CacheSideSnapshot, ErrorQueue, EventProcessor, ObjectCache, QueueSnapshot, Trashbin};
use hermes_handlers::HandlerRegistry;
use hermes_storage::{cache_file, OffsetCache};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{self, ConfigLoadError, DaemonPaths};
use crate::control::ControlHandle;
use crate::status::ObserverAdapter;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error("hermesd is already running (lock held at {0})")]
    LockFailed(std::path::PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] hermes_storage::StorageError),

    #[error(transparent)]
    Mapping(#[from] hermes_datamodel::MappingError),

    #[error(transparent)]
    Core(#[from] hermes_core::CoreError),
}

/// Everything the main loop needs, assembled once at startup.
pub struct Daemon {
    pub config: HermesConfig,
    pub paths: DaemonPaths,
    pub control: ControlHandle,
    pub observer: Arc<dyn ObserverAdapter>,
    pub offset_cache: OffsetCache,
    /// `None` until the authoritative remote schema arrives via `init-start`
    /// (first run) or is reloaded from the schema cache (restart).
    pub processor: Option<EventProcessor>,
    pub remote_schema: Option<Schema>,
    /// The `[[datamodel]]` configuration the *previous* run compiled
    /// against, used to diff against the current one at startup (§4.8).
    pub previous_datamodel_configs: Vec<TypeMappingConfig>,
    pub datamodel_change_pending: bool,
    handlers: HandlerRegistry,
    lock_file: File,
}

impl Daemon {
    /// Start the daemon: acquire the single-instance lock, load whatever
    /// caches exist from a prior run, and (if a schema was cached) rebuild
    /// the event processor so a restart doesn't need to wait for another
    /// initsync pass.
    pub async fn startup(
        config_path: Option<&std::path::Path>,
        handlers: HandlerRegistry,
        observer: Arc<dyn ObserverAdapter>,
    ) -> Result<Self, LifecycleError> {
        let config = config::load_config(config_path)?;
        let paths = DaemonPaths::resolve(&config);
        paths.ensure_state_dir()?;

        let lock_file = acquire_lock(&paths)?;

        let offset_cache = OffsetCache::load(&paths.offset_cache_path, config.hermes.cache.gzip)?;
        let previous_datamodel_configs: Vec<TypeMappingConfig> =
            cache_file::load(&paths.datamodel_path, config.hermes.cache.gzip, &cache_file::NoMigration)?.unwrap_or_default();

        let remote_schema: Option<Schema> =
            cache_file::load(&paths.schema_path, config.hermes.cache.gzip, &cache_file::NoMigration)?;

        let processor = match &remote_schema {
            Some(schema) => Some(Self::rebuild_processor(&config, schema, &paths, handlers.clone(), &previous_datamodel_configs)?),
            None => None,
        };

        info!(
            app = %config.hermes.app_name,
            initsync_complete = offset_cache.is_initsync_complete(),
            "hermesd started"
        );

        Ok(Self {
            datamodel_change_pending: offset_cache.is_initsync_complete() && processor.is_some(),
            config,
            paths,
            control: ControlHandle::new(),
            observer,
            offset_cache,
            processor,
            remote_schema,
            previous_datamodel_configs,
            handlers,
            lock_file,
        })
    }

    /// Rebuilds the event processor against a freshly-received remote
    /// schema (a schema change mid-run, §4.1), carrying the previous
    /// processor's in-memory cache/trashbin/error-queue state across —
    /// individual `TypeRemoved`/`PrimaryKeyChanged` actions are applied by
    /// the caller afterwards via `diff_schema`.
    pub fn rebuild_processor_for_schema(&mut self, schema: Schema) -> Result<(), LifecycleError> {
        let mut processor = Self::construct_processor(&self.config, &schema, self.handlers.clone())?;
        if let Some(old) = self.processor.take() {
            processor.replace_remote_cache(old.remote_cache().clone());
            processor.replace_local_cache(old.local_cache().clone());
            processor.replace_trashbin(old.trashbin().clone());
            processor.replace_error_queue(ErrorQueue::from_snapshot(old.error_queue().to_snapshot()));
        }
        self.processor = Some(processor);
        self.remote_schema = Some(schema);
        Ok(())
    }

    /// Builds a bare [`EventProcessor`] for `schema` with no cache state.
    fn construct_processor(config: &HermesConfig, schema: &Schema, handlers: HandlerRegistry) -> Result<EventProcessor, LifecycleError> {
        let datamodel = Datamodel::compile(&config.datamodel, schema)?;
        for warning in &datamodel.warnings {
            warn!(warning, "datamodel compiled with a warning");
        }
        Ok(EventProcessor::new(
            schema,
            datamodel,
            handlers,
            config.hermes.error_queue.foreign_key_policy,
            config.hermes.error_queue.autoremediation,
        ))
    }

    /// Builds the processor for a cached schema found at startup and loads
    /// whatever cache-side snapshots exist on disk into it.
    ///
    /// Cache entries are keyed against both the *new* local schema and the
    /// local schema implied by `previous_datamodel_configs`: a type the
    /// current config just dropped must still round-trip through its old
    /// primary key so §4.8's `TypeRemoved` handling can see it and
    /// synthesize `removed` events, instead of it silently vanishing here.
    fn rebuild_processor(
        config: &HermesConfig,
        schema: &Schema,
        paths: &DaemonPaths,
        handlers: HandlerRegistry,
        previous_datamodel_configs: &[TypeMappingConfig],
    ) -> Result<EventProcessor, LifecycleError> {
        let mut processor = Self::construct_processor(config, schema, handlers)?;

        let local_schema = processor.local_schema().clone();
        let previous_local_schema = Datamodel::compile(previous_datamodel_configs, schema)
            .map(|d| d.local_schema(schema))
            .unwrap_or_default();
        let pkey_of = move |local_type: &str, obj: &hermes_core::DataObject| -> Option<PKey> {
            local_schema
                .get(local_type)
                .or_else(|| previous_local_schema.get(local_type))
                .and_then(|t| obj.pkey(t).ok())
        };
        let gzip = config.hermes.cache.gzip;
        if let Some(remote_snapshot) = cache_file::load::<CacheSideSnapshot>(&paths.remote_cache_path, gzip, &cache_file::NoMigration)? {
            let cache = ObjectCache::from_snapshot(remote_snapshot, |t, o| schema.get(t).and_then(|st| o.pkey(st).ok()));
            processor.replace_remote_cache(cache);
        }
        if let Some(local_snapshot) = cache_file::load::<CacheSideSnapshot>(&paths.local_cache_path, gzip, &cache_file::NoMigration)? {
            let cache = ObjectCache::from_snapshot(local_snapshot, &pkey_of);
            processor.replace_local_cache(cache);
        }
        if let Some(trashbin_snapshot) =
            cache_file::load::<indexmap::IndexMap<String, Vec<hermes_core::DataObject>>>(&paths.trashbin_path, gzip, &cache_file::NoMigration)?
        {
            let bin = Trashbin::from_snapshot(trashbin_snapshot, &pkey_of);
            processor.replace_trashbin(bin);
        }
        if let Some(queue_snapshot) = cache_file::load::<QueueSnapshot>(&paths.error_queue_path, gzip, &cache_file::NoMigration)? {
            processor.replace_error_queue(ErrorQueue::from_snapshot(queue_snapshot));
        }

        Ok(processor)
    }

    /// Atomically persists the state the loop mutates every iteration
    /// (§4.7 step 7): both cache sides, the trashbin, the error queue, and
    /// the offset cache. Schema and datamodel config are persisted
    /// separately, only when they actually change.
    pub fn persist(&self) -> Result<(), LifecycleError> {
        let gzip = self.config.hermes.cache.gzip;
        let backups = self.config.hermes.cache.backup_count;

        self.offset_cache.save(&self.paths.offset_cache_path, gzip, backups)?;

        if let Some(processor) = &self.processor {
            cache_file::save(&self.paths.remote_cache_path, &processor.remote_cache().to_snapshot(), gzip, backups)?;
            cache_file::save(&self.paths.local_cache_path, &processor.local_cache().to_snapshot(), gzip, backups)?;
            cache_file::save(&self.paths.trashbin_path, &processor.trashbin().to_snapshot(), gzip, backups)?;
            cache_file::save(&self.paths.error_queue_path, &processor.error_queue().to_snapshot(), gzip, backups)?;
        }
        Ok(())
    }

    pub fn persist_schema_and_config(&self) -> Result<(), LifecycleError> {
        let Some(schema) = &self.remote_schema else { return Ok(()) };
        let gzip = self.config.hermes.cache.gzip;
        let backups = self.config.hermes.cache.backup_count;
        cache_file::save(&self.paths.schema_path, schema, gzip, backups)?;
        cache_file::save(&self.paths.datamodel_path, &self.config.datamodel, gzip, backups)?;
        Ok(())
    }

    /// Graceful shutdown: persist final state, remove the socket, release
    /// the lock (dropping `lock_file` at the end of this call releases the
    /// advisory flock).
    pub fn shutdown(self) -> Result<(), LifecycleError> {
        self.persist()?;
        self.persist_schema_and_config()?;
        let socket_path = DaemonPaths::socket_path(&self.config);
        if socket_path.exists() {
            let _ = std::fs::remove_file(&socket_path);
        }
        if self.paths.lock_path.exists() {
            let _ = std::fs::remove_file(&self.paths.lock_path);
        }
        info!("hermesd stopped");
        Ok(())
    }
}

fn acquire_lock(paths: &DaemonPaths) -> Result<File, LifecycleError> {
    let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&paths.lock_path)?;
    lock_file.try_lock_exclusive().map_err(|_| LifecycleError::LockFailed(paths.lock_path.clone()))?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    Ok(lock_file)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
