// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! hermesd: the client-side event-consumption engine's daemon entrypoint.
//!
//! Architecture:
//! - Main Loop task: owns the bus session and all cache/error-queue/trashbin
//!   state, single-threaded.
//! - Control Socket task: spawned alongside it, only flips pause/quit flags
//!   and reads a published status snapshot.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hermes_bus::JsonlBusConsumer;
use hermes_daemon::{status, Daemon, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use hermes_daemon::main_loop::MainLoop;
use hermes_daemon::socket;

#[derive(Parser, Debug)]
#[command(name = "hermesd", version, about = "Hermes client-side event-consumption daemon")]
struct Cli {
    /// Path to hermes.toml. Falls back to $HERMES_CONFIG, then ./hermes.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let daemon = match Daemon::startup(cli.config.as_deref(), hermes_handlers::HandlerRegistry::new(), Arc::new(status::LoggingObserver)).await {
        Ok(d) => d,
        Err(LifecycleError::LockFailed(path)) => {
            eprintln!("hermesd is already running (lock held at {})", path.display());
            std::process::exit(1);
        }
        Err(e @ LifecycleError::Config(_)) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("failed to start hermesd: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = setup_logging(&daemon)?;
    info!(app = %daemon.config.hermes.app_name, "hermesd starting");

    let socket_path = hermes_daemon::DaemonPaths::socket_path(&daemon.config);
    let socket_mode = daemon.config.hermes.socket.mode;
    if daemon.config.hermes.socket.owner.is_some() || daemon.config.hermes.socket.group.is_some() {
        tracing::warn!("control socket owner/group configured but not applied (no safe chown available)");
    }
    let listener = socket::bind(&socket_path, socket_mode)?;
    let control = daemon.control.clone();
    let socket_task = tokio::spawn(socket::run(listener, control.clone()));

    let bus = JsonlBusConsumer::new(daemon.paths.bus_path.clone());
    let mut main_loop = MainLoop::new(daemon, bus);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let run_result = loop {
        tokio::select! {
            result = main_loop.run() => break result,
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                control.flags.request_quit();
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                control.flags.request_quit();
            }
        }
    };

    control.flags.request_quit();
    socket_task.abort();

    let daemon = main_loop.into_daemon();
    daemon.shutdown()?;

    match run_result {
        Ok(()) => {
            info!("hermesd stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "hermesd terminated on a fatal error");
            std::process::exit(1);
        }
    }
}

fn setup_logging(daemon: &Daemon) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_new(&daemon.config.hermes.logs.verbosity).unwrap_or_else(|_| EnvFilter::new("info"));

    match &daemon.config.hermes.logs.logfile {
        Some(logfile) => {
            let path = PathBuf::from(logfile);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let filename = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("hermesd.log"));
            let file_appender = tracing_appender::rolling::daily(dir, filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
            Ok(None)
        }
    }
}
