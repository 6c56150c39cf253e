// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("corrupt cache file {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
