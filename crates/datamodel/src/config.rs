// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hermes.toml` configuration surface: process/socket/logging ambient
//! settings plus the per-local-type datamodel mapping declarations.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MappingError;

#[derive(Debug, Clone, Deserialize)]
pub struct HermesConfig {
    pub hermes: HermesSection,
    #[serde(rename = "datamodel", default)]
    pub datamodel: Vec<TypeMappingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HermesSection {
    pub app_name: String,
    pub state_dir: String,
    pub socket: SocketConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(rename = "loop", default)]
    pub loop_cfg: LoopConfig,
    #[serde(rename = "errorqueue", default)]
    pub error_queue: ErrorQueueConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

/// Location of the message bus this client reads from. Not part of the
/// distilled configuration surface; added because a concrete transport
/// needs somewhere to point its consumer at.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub path: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { path: "hermes-bus.jsonl".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    pub path: String,
    pub owner: Option<String>,
    pub group: Option<String>,
    #[serde(default = "default_socket_mode")]
    pub mode: u32,
}

fn default_socket_mode() -> u32 {
    0o700
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub verbosity: String,
    pub logfile: Option<String>,
    pub backup_count: u32,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self { verbosity: "info".to_string(), logfile: None, backup_count: 7 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub interval_ms: u64,
    pub error_retry_interval_ms: u64,
    pub trashbin_purge_interval_ms: u64,
    /// When more than one complete `init-start…init-stop` sequence is found
    /// on the bus, replay the last one instead of the first.
    pub prefer_last_init_sequence: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            error_retry_interval_ms: 60_000,
            trashbin_purge_interval_ms: 3_600_000,
            prefer_last_init_sequence: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForeignKeyPolicy {
    Disabled,
    OnRemove,
    OnEvery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoremediationMode {
    Disabled,
    Conservative,
    Maximum,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ErrorQueueConfig {
    pub foreign_key_policy: ForeignKeyPolicy,
    pub autoremediation: AutoremediationMode,
}

impl Default for ErrorQueueConfig {
    fn default() -> Self {
        Self {
            foreign_key_policy: ForeignKeyPolicy::Disabled,
            autoremediation: AutoremediationMode::Disabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backup_count: u32,
    pub gzip: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { backup_count: 3, gzip: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeMappingConfig {
    pub local_type: String,
    pub hermes_type: String,
    pub attrs_mapping: HashMap<String, String>,
    pub to_string: Option<String>,
    pub trashbin_retention_secs: Option<u64>,
}

impl HermesConfig {
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MappingError::ConfigIo { path: path.display().to_string(), source: e })?;
        toml::from_str(&raw)
            .map_err(|e| MappingError::ConfigParse { path: path.display().to_string(), source: e })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
