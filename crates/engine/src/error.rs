// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors the event processor itself can raise, as distinct from a target
/// adapter's [`hermes_handlers::HandlerError`] (which is caught and turned
/// into an error-queue entry rather than propagated).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown local type '{0}'")]
    UnknownLocalType(String),

    #[error("object {pkey} of type '{local_type}' has no primary key value for '{attr}'")]
    MissingPrimaryKey { local_type: String, pkey: String, attr: String },

    #[error("trashed objects cannot be modified: {local_type} {pkey}")]
    ModifiedTrashedObject { local_type: String, pkey: String },

    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Handler(#[from] hermes_handlers::HandlerError),

    #[error(transparent)]
    Storage(#[from] hermes_storage::StorageError),

    #[error(transparent)]
    Core(#[from] hermes_core::CoreError),
}
