// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned, atomically-persisted, optionally gzip-compressed cache files.
//!
//! Every entity that persists to disk (offset cache, schema, dual cache,
//! trashbins, error queue) owns its own file and goes through this module so
//! the on-disk format, atomicity, and rotation policy stay uniform.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StorageError;

/// Current on-disk schema version written into every envelope.
pub const HERMES_VERSION: &str = "1.0.0";

const VERSION_KEY: &str = "__HERMES_VERSION__";

/// A migration hook converting an older payload shape to the current one.
/// Implementations should be idempotent: migrating an already-current
/// payload must be a no-op.
pub trait Migration {
    fn migrate(&self, from_version: &str, content: Value) -> Value;
}

/// No-op migration for cache files with a single, stable shape.
pub struct NoMigration;
impl Migration for NoMigration {
    fn migrate(&self, _from_version: &str, content: Value) -> Value {
        content
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io { path: path.display().to_string(), source }
}

/// Loads and migrates a cache file. Returns `Ok(None)` if the file does not
/// exist yet (first run).
pub fn load<T: DeserializeOwned>(
    path: &Path,
    gzip: bool,
    migration: &dyn Migration,
) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = read_bytes(path, gzip)?;
    let envelope: Value = serde_json::from_slice(&raw)
        .map_err(|e| StorageError::Corrupt { path: path.display().to_string(), message: e.to_string() })?;

    let Value::Object(mut map) = envelope else {
        return Err(StorageError::Corrupt {
            path: path.display().to_string(),
            message: "top-level value is not an object".to_string(),
        });
    };
    let version = map
        .get(VERSION_KEY)
        .and_then(Value::as_str)
        .unwrap_or("0.0.0")
        .to_string();
    let content = map.remove("content").unwrap_or(Value::Null);
    let migrated = migration.migrate(&version, content);

    serde_json::from_value(migrated)
        .map(Some)
        .map_err(|e| StorageError::Corrupt { path: path.display().to_string(), message: e.to_string() })
}

fn read_bytes(path: &Path, gzip: bool) -> Result<Vec<u8>, StorageError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw).map_err(|e| io_err(path, e))?;
    if gzip {
        let mut decoder = GzDecoder::new(&raw[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| io_err(path, e))?;
        Ok(out)
    } else {
        Ok(raw)
    }
}

/// Saves `content` atomically (temp file + fsync + rename) and rotates up to
/// `backup_count` prior generations as `<name>.<6-digit-index>.json[.gz]`.
pub fn save<T: Serialize>(
    path: &Path,
    content: &T,
    gzip: bool,
    backup_count: u32,
) -> Result<(), StorageError> {
    let envelope = serde_json::json!({
        VERSION_KEY: HERMES_VERSION,
        "content": serde_json::to_value(content)?,
    });
    let body = serde_json::to_vec_pretty(&envelope)?;
    let bytes = if gzip { gzip_encode(&body)? } else { body };

    if path.exists() && backup_count > 0 {
        rotate_backups(path, backup_count, gzip)?;
    }

    write_atomic(path, &bytes)
}

fn gzip_encode(body: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(body)
        .map_err(|e| StorageError::Io { path: "<gzip buffer>".to_string(), source: e })?;
    encoder
        .finish()
        .map_err(|e| StorageError::Io { path: "<gzip buffer>".to_string(), source: e })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("cache")
    ));
    {
        let mut tmp = File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
        tmp.write_all(bytes).map_err(|e| io_err(&tmp_path, e))?;
        tmp.sync_all().map_err(|e| io_err(&tmp_path, e))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;

    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}

/// Shifts `<name>.<index>.json[.gz]` generations up by one, dropping the
/// oldest past `backup_count`, then moves the current live file into slot 1.
fn rotate_backups(path: &Path, backup_count: u32, gzip: bool) -> Result<(), StorageError> {
    let ext = if gzip { "json.gz" } else { "json" };
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("cache");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let indexed = |i: u32| dir.join(format!("{stem}.{i:06}.{ext}"));

    if let Some(oldest) = Some(indexed(backup_count)) {
        if oldest.exists() {
            fs::remove_file(&oldest).map_err(|e| io_err(&oldest, e))?;
        }
    }
    for i in (1..backup_count).rev() {
        let src = indexed(i);
        if src.exists() {
            fs::rename(&src, indexed(i + 1)).map_err(|e| io_err(&src, e))?;
        }
    }
    fs::rename(path, indexed(1)).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Convenience helper building the canonical cache-file path for a named
/// entity under a state directory, honoring the gzip extension convention.
pub fn entity_path(state_dir: &Path, name: &str, gzip: bool) -> PathBuf {
    let ext = if gzip { "json.gz" } else { "json" };
    state_dir.join(format!("{name}.{ext}"))
}

#[cfg(test)]
#[path = "cache_file_tests.rs"]
mod tests;
