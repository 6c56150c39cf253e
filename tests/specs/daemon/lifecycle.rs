//! Black-box process lifecycle: start, report status, quit.

use crate::prelude::Harness;

#[test]
fn status_reports_zero_errors_immediately_after_startup() {
    let harness = Harness::new();
    harness.write_config("");
    let daemon = harness.spawn_daemon();

    let output = harness.ctl().arg("status").output().expect("hermesctl status");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0 error(s)"), "unexpected status output: {stdout}");

    drop(daemon);
}

#[test]
fn status_json_reports_the_engine_component_with_no_processor_yet() {
    let harness = Harness::new();
    harness.write_config("");
    let daemon = harness.spawn_daemon();

    let snapshot = harness.status_json();
    assert!(snapshot["components"]["engine"]["information"]["next_offset"].is_string());
    assert!(snapshot["components"]["engine"]["error"].as_object().unwrap().is_empty());

    drop(daemon);
}

#[test]
fn quit_over_the_control_socket_stops_the_process_cleanly() {
    let harness = Harness::new();
    harness.write_config("");
    let daemon = harness.spawn_daemon();

    let output = harness.ctl().arg("quit").output().expect("hermesctl quit");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "stopping");

    let status = daemon.wait_for_exit(2_000).expect("hermesd should exit after quit");
    assert!(status.success(), "hermesd did not exit cleanly: {status:?}");
}

#[test]
fn pause_then_resume_round_trip_over_the_control_socket() {
    let harness = Harness::new();
    harness.write_config("");
    let daemon = harness.spawn_daemon();

    let pause = harness.ctl().arg("pause").output().expect("hermesctl pause");
    assert!(pause.status.success());
    assert_eq!(String::from_utf8_lossy(&pause.stdout).trim(), "paused");

    let resume = harness.ctl().arg("resume").output().expect("hermesctl resume");
    assert!(resume.status.success());
    assert_eq!(String::from_utf8_lossy(&resume.stdout).trim(), "resumed");

    drop(daemon);
}

#[test]
fn hermesctl_fails_fast_when_no_daemon_is_listening() {
    let harness = Harness::new();
    harness.write_config("");

    let output = harness.ctl().arg("status").output().expect("hermesctl status");
    assert!(!output.status.success());
    assert!(!String::from_utf8_lossy(&output.stderr).is_empty());
}

#[test]
fn a_second_daemon_refuses_to_start_while_the_lock_is_held() {
    let harness = Harness::new();
    harness.write_config("");
    let daemon = harness.spawn_daemon();

    let mut second = harness.try_spawn_daemon();
    let status = second.wait().expect("wait on second hermesd");
    assert_eq!(status.code(), Some(1));

    drop(daemon);
}
