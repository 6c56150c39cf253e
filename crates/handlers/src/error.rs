// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// A handler callback raised an error. Wrapped exactly as `HandlerError` in
/// §4.6/§7: the event processor catches this, records the transition as
/// failed, and appends (or updates) the error-queue entry with the current
/// resume state (`step`/`isPartiallyProcessed`).
#[derive(Debug, Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
