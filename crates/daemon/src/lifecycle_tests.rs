// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::status::LoggingObserver;
use hermes_handlers::HandlerRegistry;

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let state_dir = dir.join("state");
    let socket_path = dir.join("hermes.sock");
    let config_path = dir.join("hermes.toml");
    std::fs::write(
        &config_path,
        format!(
            "[hermes]\napp_name = \"test\"\nstate_dir = {state_dir:?}\n\n[hermes.socket]\npath = {socket_path:?}\n"
        ),
    )
    .expect("write config");
    config_path
}

#[tokio::test]
async fn startup_acquires_the_lock_and_starts_with_no_processor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_config(dir.path());

    let daemon = Daemon::startup(Some(&config_path), HandlerRegistry::new(), Arc::new(LoggingObserver))
        .await
        .expect("startup");

    assert!(daemon.processor.is_none());
    assert!(daemon.paths.lock_path.exists());
    assert!(!daemon.offset_cache.is_initsync_complete());
}

#[tokio::test]
async fn a_second_startup_against_the_same_state_dir_fails_to_lock() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_config(dir.path());

    let first = Daemon::startup(Some(&config_path), HandlerRegistry::new(), Arc::new(LoggingObserver))
        .await
        .expect("first startup");

    let second = Daemon::startup(Some(&config_path), HandlerRegistry::new(), Arc::new(LoggingObserver)).await;
    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));

    first.shutdown().expect("shutdown");
}

#[tokio::test]
async fn shutdown_removes_the_lock_and_socket_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_config(dir.path());

    let daemon = Daemon::startup(Some(&config_path), HandlerRegistry::new(), Arc::new(LoggingObserver))
        .await
        .expect("startup");
    let lock_path = daemon.paths.lock_path.clone();
    std::fs::write(DaemonPaths::socket_path(&daemon.config), b"").expect("fake socket file");

    daemon.shutdown().expect("shutdown");

    assert!(!lock_path.exists());
}
