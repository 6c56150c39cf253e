// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control socket wire protocol (§6): client sends one JSON message, server
//! replies with one JSON message, then both sides close. No length prefix
//! and no framing beyond "one message then EOF" — grounded in the upstream
//! `lib/utils/socket.py` request/response shape, not the daemon's internal
//! event-bus wire format.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub argv: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub retcode: i32,
    pub retmsg: String,
}

impl Response {
    pub fn ok(retmsg: impl Into<String>) -> Self {
        Self { retcode: 0, retmsg: retmsg.into() }
    }

    pub fn error(retmsg: impl Into<String>) -> Self {
        Self { retcode: 1, retmsg: retmsg.into() }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads the client's whole request off the stream (it shuts down its write
/// half once sent) and parses it as one JSON value.
pub async fn read_request<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Request, ProtocolError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}

pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
) -> Result<(), ProtocolError> {
    let body = serde_json::to_vec(response)?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

/// Sends a request over an already-connected stream and reads the response,
/// used by both the CLI client and tests driving the socket directly.
pub async fn send_request<S>(mut stream: S, request: &Request) -> Result<Response, ProtocolError>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let body = serde_json::to_vec(request)?;
    stream.write_all(&body).await?;
    stream.shutdown().await?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
