//! Test helpers for behavioral specifications.
//!
//! Black-box: these tests spawn the compiled `hermesd`/`hermesctl` binaries
//! against a temp state dir and a hand-written JSONL bus fixture, then drive
//! them exactly as an operator would — over the control socket.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Returns the path to a binary, checking llvm-cov's target directory first
/// (matches how `cargo llvm-cov` lays out binaries), falling back to the
/// standard debug dir and then to a path resolved off the test binary
/// itself so this keeps working under a relocated `target/`.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

fn hermesd_binary() -> PathBuf {
    binary_path("hermesd")
}

fn hermesctl_binary() -> PathBuf {
    binary_path("hermesctl")
}

pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// A throwaway `hermes.toml` + state dir + JSONL bus fixture, wired together
/// with absolute paths so the daemon's CWD never matters.
pub struct Harness {
    dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self { dir: tempfile::tempdir().expect("tempdir") }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.path().join("state")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.path().join("hermes.sock")
    }

    pub fn bus_path(&self) -> PathBuf {
        self.path().join("bus.jsonl")
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("hermes.toml")
    }

    /// Writes a minimal `hermes.toml` pointing at this harness's own state
    /// dir, socket, and bus file, with fast loop/retry intervals so tests
    /// don't have to wait out the real defaults (1s loop, 60s retry, 1h
    /// purge).
    pub fn write_config(&self, extra: &str) {
        let toml = format!(
            r#"
[hermes]
app_name = "hermes-spec-test"
state_dir = {state_dir:?}

[hermes.socket]
path = {socket_path:?}

[hermes.bus]
path = {bus_path:?}

[hermes.loop]
interval_ms = 50
error_retry_interval_ms = 200
trashbin_purge_interval_ms = 200

{extra}
"#,
            state_dir = self.state_dir().to_string_lossy(),
            socket_path = self.socket_path().to_string_lossy(),
            bus_path = self.bus_path().to_string_lossy(),
        );
        std::fs::write(self.config_path(), toml).expect("write hermes.toml");
        // An empty bus file by default: `open_bus_with_backoff` only gives
        // up its 60s retry loop on quit, so a *missing* bus file would make
        // every status/pause/quit test in this suite wait out that backoff.
        // Tests that care about bus content call `write_bus` afterwards.
        if !self.bus_path().exists() {
            std::fs::write(self.bus_path(), "").expect("write empty bus.jsonl");
        }
    }

    /// Writes the bus fixture from pre-built JSONL lines (one JSON object
    /// per line, see `bus::*` builders below).
    pub fn write_bus(&self, lines: &[String]) {
        std::fs::write(self.bus_path(), lines.join("\n") + "\n").expect("write bus.jsonl");
    }

    pub fn spawn_daemon(&self) -> DaemonProcess {
        let child = Command::new(hermesd_binary())
            .arg("--config")
            .arg(self.config_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn hermesd");
        let proc = DaemonProcess { child: Some(child), socket_path: self.socket_path() };
        assert!(
            wait_for(2_000, || proc.socket_path.exists()),
            "hermesd never created its control socket at {}",
            proc.socket_path.display()
        );
        // The socket is bound before the main loop runs its first iteration,
        // so a query could race the first `compute_status` publish; wait
        // for that first snapshot so callers never see an empty one.
        assert!(
            wait_for(2_000, || !self.status_json()["components"]["engine"].is_null()),
            "hermesd never published an initial status snapshot"
        );
        proc
    }

    /// Spawns `hermesd` without waiting for the socket, for scenarios that
    /// expect startup to fail (e.g. a held single-instance lock).
    pub fn try_spawn_daemon(&self) -> Child {
        Command::new(hermesd_binary())
            .arg("--config")
            .arg(self.config_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn hermesd")
    }

    pub fn ctl(&self) -> std::process::Command {
        let mut cmd = Command::new(hermesctl_binary());
        cmd.arg("--socket").arg(self.socket_path());
        cmd
    }

    pub fn status_json(&self) -> serde_json::Value {
        let output = self.ctl().args(["status", "--json"]).output().expect("hermesctl status");
        assert!(output.status.success(), "status failed: {}", String::from_utf8_lossy(&output.stderr));
        serde_json::from_slice(&output.stdout).expect("status --json output is valid JSON")
    }

    /// Polls `status --json`'s `engine.information.next_offset` until it
    /// reaches (or passes) `target`, or times out.
    pub fn wait_for_next_offset(&self, target: u64, timeout_ms: u64) -> bool {
        wait_for(timeout_ms, || {
            let snapshot = self.status_json();
            next_offset(&snapshot) >= target
        })
    }
}

pub fn next_offset(snapshot: &serde_json::Value) -> u64 {
    snapshot["components"]["engine"]["information"]["next_offset"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

pub struct DaemonProcess {
    child: Option<Child>,
    socket_path: PathBuf,
}

impl DaemonProcess {
    pub fn wait_for_exit(mut self, timeout_ms: u64) -> Option<std::process::ExitStatus> {
        let mut child = self.child.take().expect("child already taken");
        let start = Instant::now();
        loop {
            if let Ok(Some(status)) = child.try_wait() {
                return Some(status);
            }
            if start.elapsed() > Duration::from_millis(timeout_ms) {
                let _ = child.kill();
                return None;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Minimal JSONL bus line builders, matching `hermes_bus::jsonl`'s
/// `BusRecord { offset, timestamp, #[serde(flatten)] event }` shape and
/// `hermes_core::Event`'s wire field names.
pub mod bus {
    use serde_json::{json, Value};

    pub fn init_start(offset: u64, schema: Value) -> String {
        line(offset, "initsync", "init-start", None, None, schema)
    }

    pub fn init_stop(offset: u64) -> String {
        line(offset, "initsync", "init-stop", None, None, json!({}))
    }

    pub fn added(offset: u64, objtype: &str, pkey: Value, attrs: Value) -> String {
        line(offset, "base", "added", Some(objtype), Some(pkey), attrs)
    }

    pub fn removed(offset: u64, objtype: &str, pkey: Value) -> String {
        line(offset, "base", "removed", Some(objtype), Some(pkey), json!({}))
    }

    fn line(offset: u64, category: &str, eventtype: &str, objtype: Option<&str>, objpkey: Option<Value>, objattrs: Value) -> String {
        let record = json!({
            "offset": offset,
            "timestamp": "2026-01-01T00:00:00Z",
            "evcategory": category,
            "eventtype": eventtype,
            "objtype": objtype,
            "objpkey": objpkey,
            "objattrs": objattrs,
            "step": 0,
            "is_partially_processed": false,
        });
        serde_json::to_string(&record).expect("serialize bus record")
    }

    /// A single-type schema with a scalar primary key and no foreign keys —
    /// enough for `init-start`'s payload to deserialize as `hermes_core::Schema`.
    pub fn simple_schema(type_name: &str, attrs: &[&str], pkey_attr: &str) -> Value {
        json!({
            "types": {
                type_name: {
                    "name": type_name,
                    "attributes": attrs,
                    "primary_key": [pkey_attr],
                    "secret_attrs": [],
                    "local_only_attrs": [],
                    "cache_only_attrs": [],
                    "display_template": null,
                    "foreign_keys": {},
                }
            }
        })
    }
}
