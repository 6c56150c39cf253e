// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bus record JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt bus record at offset {offset}: {message}")]
    Corrupt { offset: u64, message: String },

    #[error("bus consumer is not open")]
    NotOpen,

    #[error("seek target offset {0} does not exist")]
    UnknownOffset(u64),
}
