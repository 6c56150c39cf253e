// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! hermesctl: a thin control-socket client for `hermesd`.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use client::DaemonClient;
use hermes_daemon::DaemonPaths;

#[derive(Parser, Debug)]
#[command(name = "hermesctl", version, about = "Control client for hermesd")]
struct Cli {
    /// Path to hermes.toml, used to resolve the control socket path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Talk to this socket directly instead of resolving it from config.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Request timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask hermesd to stop.
    Quit,
    /// Pause the main loop without stopping the process.
    Pause,
    /// Resume a paused main loop.
    Resume,
    /// Report component status.
    Status {
        /// Print the raw JSON status snapshot.
        #[arg(long)]
        json: bool,
        /// Include informational fields, not just error/warning counts.
        #[arg(long)]
        verbose: bool,
    },
}

fn command_argv(command: &Command) -> Vec<String> {
    match command {
        Command::Quit => vec!["quit".to_string()],
        Command::Pause => vec!["pause".to_string()],
        Command::Resume => vec!["resume".to_string()],
        Command::Status { json, verbose } => {
            let mut argv = vec!["status".to_string()];
            if *json {
                argv.push("--json".to_string());
            }
            if *verbose {
                argv.push("--verbose".to_string());
            }
            argv
        }
    }
}

fn resolve_socket_path(cli: &Cli) -> Result<PathBuf, String> {
    if let Some(p) = &cli.socket {
        return Ok(p.clone());
    }
    hermes_daemon::config::load_config(cli.config.as_deref())
        .map(|config| DaemonPaths::socket_path(&config))
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let socket_path = match resolve_socket_path(&cli) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    let client = match DaemonClient::connect(socket_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let argv = command_argv(&cli.command);
    match client.send(argv, Duration::from_millis(cli.timeout_ms)).await {
        Ok(response) => {
            println!("{}", response.retmsg);
            std::process::exit(if response.retcode == 0 { 0 } else { 1 });
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
