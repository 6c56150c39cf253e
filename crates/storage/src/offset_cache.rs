// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offset Cache (C1): the bus cursor plus notification-edge state, the
//! smallest and most frequently persisted piece of engine state.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache_file::{self, NoMigration};
use crate::error::StorageError;

/// `{initStartOffset, initStopOffset, nextOffset}` plus the last-notified
/// error/warning sets and unhandled-exception trace, used by the main loop
/// to decide whether a notification edge has been crossed (§4.7 step 6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffsetCache {
    pub init_start_offset: Option<u64>,
    pub init_stop_offset: Option<u64>,
    pub next_offset: u64,
    #[serde(default)]
    pub last_known_errors: HashSet<String>,
    #[serde(default)]
    pub last_known_datamodel_warnings: HashSet<String>,
    #[serde(default)]
    pub last_unhandled_exception: Option<String>,
}

impl OffsetCache {
    pub fn is_initsync_complete(&self) -> bool {
        self.init_start_offset.is_some() && self.init_stop_offset.is_some()
    }

    pub fn load(path: &Path, gzip: bool) -> Result<Self, StorageError> {
        Ok(cache_file::load(path, gzip, &NoMigration)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path, gzip: bool, backup_count: u32) -> Result<(), StorageError> {
        cache_file::save(path, self, gzip, backup_count)
    }
}

#[cfg(test)]
#[path = "offset_cache_tests.rs"]
mod tests;
