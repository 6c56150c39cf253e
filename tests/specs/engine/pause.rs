//! §5: pausing the main loop must block event delivery, not just return a
//! "paused" acknowledgement — `nextOffset` must not move while paused.

use crate::prelude::{bus, Harness};

#[test]
fn pausing_before_the_bus_has_data_blocks_offset_advancement_until_resumed() {
    let harness = Harness::new();
    // Empty bus at spawn time — the daemon is paused before any
    // init-start…init-stop sequence exists, so there is no race between
    // "pause takes effect" and "initsync already finished".
    harness.write_config("");

    let daemon = harness.spawn_daemon();

    let pause = harness.ctl().arg("pause").output().expect("hermesctl pause");
    assert!(pause.status.success());

    let schema = bus::simple_schema("posixAccount", &["uid", "cn"], "uid");
    harness.write_bus(&[bus::init_start(0, schema), bus::init_stop(1)]);

    // Give the paused loop several iterations' worth of real time to prove
    // it isn't quietly still processing the now-populated bus.
    std::thread::sleep(std::time::Duration::from_millis(300));
    let snapshot = harness.status_json();
    assert_eq!(snapshot["components"]["engine"]["information"]["next_offset"], "0");
    assert_eq!(snapshot["components"]["engine"]["information"]["initsync_complete"], "false");

    let resume = harness.ctl().arg("resume").output().expect("hermesctl resume");
    assert!(resume.status.success());

    assert!(harness.wait_for_next_offset(2, 3_000), "next_offset never advanced after resume: {:?}", harness.status_json());

    drop(daemon);
}

#[test]
fn quitting_while_paused_still_exits_promptly() {
    let harness = Harness::new();
    harness.write_config("");

    let daemon = harness.spawn_daemon();
    assert!(harness.ctl().arg("pause").output().expect("pause").status.success());
    std::thread::sleep(std::time::Duration::from_millis(100));

    let quit = harness.ctl().arg("quit").output().expect("hermesctl quit");
    assert!(quit.status.success());
    let status = daemon.wait_for_exit(3_000).expect("hermesd should exit promptly even while paused");
    assert!(status.success());
}
