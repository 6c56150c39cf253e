// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket client for `hermesctl`: connects to a running `hermesd`,
//! sends one `{argv: [...]}` request, prints the reply.

use std::path::PathBuf;
use std::time::Duration;

use hermes_daemon::protocol::{self, ProtocolError, Request, Response};
use thiserror::Error;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("hermesd is not running (no socket at {0})")]
    DaemonNotRunning(PathBuf),

    #[error("connection timed out")]
    Timeout,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn connect(socket_path: PathBuf) -> Result<Self, ClientError> {
        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning(socket_path));
        }
        Ok(Self { socket_path })
    }

    /// Sends one argv request and returns the daemon's response, bounded by
    /// `timeout` so a hung daemon doesn't wedge the CLI forever.
    pub async fn send(&self, argv: Vec<String>, timeout: Duration) -> Result<Response, ClientError> {
        let connect = UnixStream::connect(&self.socket_path);
        let stream = tokio::time::timeout(timeout, connect).await.map_err(|_| ClientError::Timeout)??;
        let request = Request { argv };
        tokio::time::timeout(timeout, protocol::send_request(stream, &request)).await.map_err(|_| ClientError::Timeout)?.map_err(Into::into)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
