// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves the on-disk layout (lock file, socket, per-entity cache files)
//! that a loaded [`HermesConfig`] implies, mirroring the "each entity owns
//! its own filename" policy of §5.

use std::path::{Path, PathBuf};

use hermes_datamodel::HermesConfig;

/// Every path the daemon touches on disk, derived once from `state_dir`.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub schema_path: PathBuf,
    /// Previous run's `[[datamodel]]` mapping configuration, persisted so
    /// the next startup can diff it against the current one (§4.8).
    pub datamodel_path: PathBuf,
    pub offset_cache_path: PathBuf,
    pub remote_cache_path: PathBuf,
    pub local_cache_path: PathBuf,
    pub trashbin_path: PathBuf,
    pub error_queue_path: PathBuf,
    pub bus_path: PathBuf,
}

impl DaemonPaths {
    pub fn resolve(config: &HermesConfig) -> Self {
        let state_dir = PathBuf::from(&config.hermes.state_dir);
        let gzip_ext = if config.hermes.cache.gzip { "json.gz" } else { "json" };
        let entity = |name: &str| state_dir.join(format!("{name}.{gzip_ext}"));

        Self {
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            schema_path: entity("schema"),
            datamodel_path: entity("datamodel"),
            offset_cache_path: entity("offsets"),
            remote_cache_path: entity("remote_cache"),
            local_cache_path: entity("local_cache"),
            trashbin_path: entity("trashbin"),
            error_queue_path: entity("error_queue"),
            bus_path: PathBuf::from(&config.hermes.bus.path),
            state_dir,
        }
    }

    pub fn socket_path(config: &HermesConfig) -> PathBuf {
        PathBuf::from(&config.hermes.socket.path)
    }

    pub fn ensure_state_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)
    }
}

/// Loads `hermes.toml` from `path`, falling back to `HERMES_CONFIG` only
/// when the caller passed no explicit `--config` value.
pub fn load_config(path: Option<&Path>) -> Result<HermesConfig, ConfigLoadError> {
    let resolved = match path {
        Some(p) => p.to_path_buf(),
        None => match std::env::var("HERMES_CONFIG") {
            Ok(p) => PathBuf::from(p),
            Err(_) => PathBuf::from("hermes.toml"),
        },
    };
    HermesConfig::load(&resolved).map_err(|source| ConfigLoadError { path: resolved, source })
}

#[derive(Debug, thiserror::Error)]
#[error("failed to load config from {path}: {source}", path = path.display())]
pub struct ConfigLoadError {
    path: PathBuf,
    #[source]
    source: hermes_datamodel::MappingError,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
