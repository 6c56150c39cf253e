// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use hermes_daemon::control::ControlHandle;
use hermes_daemon::socket;

use super::*;

#[tokio::test]
async fn connect_fails_fast_when_no_socket_file_exists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir.path().join("hermes.sock");

    let err = DaemonClient::connect(socket_path.clone()).unwrap_err();
    assert!(matches!(err, ClientError::DaemonNotRunning(p) if p == socket_path));
}

#[tokio::test]
async fn send_round_trips_a_quit_request_over_a_real_unix_stream() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir.path().join("hermes.sock");
    let listener = socket::bind(&socket_path, 0o700).expect("bind");
    let control = ControlHandle::new();
    let server_control = control.clone();

    let server = tokio::spawn(socket::run(listener, server_control));

    let client = DaemonClient::connect(socket_path).expect("connect");
    let response = client.send(vec!["quit".to_string()], Duration::from_secs(1)).await.expect("send");

    assert_eq!(response.retcode, 0);
    assert_eq!(response.retmsg, "stopping");
    assert!(control.flags.is_quit());

    server.await.expect("server task");
}

#[tokio::test]
async fn send_times_out_when_nothing_is_listening() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir.path().join("hermes.sock");
    // No listener bound; the file doesn't exist, so connect() itself fails
    // the "not running" check rather than hanging in send().
    let err = DaemonClient::connect(socket_path).unwrap_err();
    assert!(matches!(err, ClientError::DaemonNotRunning(_)));
}

#[tokio::test]
async fn send_surfaces_a_protocol_error_for_a_malformed_reply() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir.path().join("hermes.sock");
    let listener = socket::bind(&socket_path, 0o700).expect("bind");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        use tokio::io::AsyncWriteExt;
        let _ = stream.write_all(b"not json").await;
        stream.shutdown().await.ok();
    });

    let client = DaemonClient::connect(socket_path).expect("connect");
    let result = client.send(vec!["status".to_string()], Duration::from_secs(1)).await;
    assert!(result.is_err());

    server.await.expect("server task");
}
