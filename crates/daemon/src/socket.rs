// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control socket listener (C8): accepts one connection at a time, reads a
//! single `{argv: [...]}` request, dispatches it against [`ControlHandle`],
//! and replies before closing — never touches engine state beyond the
//! pause/quit flags and the published status snapshot (§5).

use std::path::Path;

use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::control::ControlHandle;
use crate::protocol::{self, Request, Response};

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Binds the control socket, removing a stale socket file left behind by an
/// unclean shutdown first.
pub fn bind(path: &Path, mode: u32) -> Result<UnixListener, SocketError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    set_permissions(path, mode);
    Ok(listener)
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        warn!(error = %e, path = %path.display(), "failed to set control socket permissions");
    }
}

/// Runs the accept loop until `control.flags.is_quit()` is observed. Each
/// connection is handled sequentially on this same task — the protocol is
/// one request per connection, and the daemon is administered by a single
/// operator at a time, so no concurrency is needed here.
pub async fn run(listener: UnixListener, control: ControlHandle) {
    loop {
        if control.flags.is_quit() {
            return;
        }
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => handle_connection(stream, &control).await,
                    Err(e) => error!(error = %e, "control socket accept failed"),
                }
            }
            _ = control.flags.changed.notified() => {}
        }
    }
}

async fn handle_connection(mut stream: UnixStream, control: &ControlHandle) {
    let (mut reader, mut writer) = stream.split();
    let request = match protocol::read_request(&mut reader).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "malformed control request");
            let _ = protocol::write_response(&mut writer, &Response::error(format!("bad request: {e}"))).await;
            return;
        }
    };
    debug!(argv = ?request.argv, "control request");
    let response = dispatch(&request, control);
    if let Err(e) = protocol::write_response(&mut writer, &response).await {
        warn!(error = %e, "failed to write control response");
    }
}

fn dispatch(request: &Request, control: &ControlHandle) -> Response {
    let Some(command) = request.argv.first() else {
        return Response::error("empty command");
    };
    match command.as_str() {
        "quit" => {
            control.flags.request_quit();
            info!("quit requested over control socket");
            Response::ok("stopping")
        }
        "pause" => {
            control.flags.pause();
            Response::ok("paused")
        }
        "resume" => {
            control.flags.resume();
            Response::ok("resumed")
        }
        "status" => {
            let json = request.argv.iter().any(|a| a == "--json");
            let verbose = request.argv.iter().any(|a| a == "--verbose");
            status_response(control, json, verbose)
        }
        other => Response::error(format!("unknown command: {other}")),
    }
}

fn status_response(control: &ControlHandle, json: bool, verbose: bool) -> Response {
    let snapshot = control.status.current();
    if json {
        return match serde_json::to_string(&snapshot) {
            Ok(body) => Response::ok(body),
            Err(e) => Response::error(format!("failed to serialize status: {e}")),
        };
    }

    let mut lines = Vec::new();
    for (name, status) in &snapshot.components {
        let error_count = status.error.len();
        let warning_count = status.warning.len();
        lines.push(format!("{name}: {error_count} error(s), {warning_count} warning(s)"));
        if verbose {
            for (k, v) in &status.information {
                lines.push(format!("  info: {k} = {v}"));
            }
            for (k, v) in &status.warning {
                lines.push(format!("  warning: {k} = {v}"));
            }
            for (k, v) in &status.error {
                lines.push(format!("  error: {k} = {v}"));
            }
        }
    }
    if lines.is_empty() {
        lines.push("no components reporting".to_string());
    }
    Response::ok(lines.join("\n"))
}

#[cfg(test)]
#[path = "socket_tests.rs"]
mod tests;
