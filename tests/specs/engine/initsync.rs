//! Black-box bus-to-offset plumbing: an `init-start…init-stop` sequence is
//! discovered and replayed, and `nextOffset` lands past `init-stop` (§4.7
//! steps 4-5). No `[[datamodel]]` mapping is configured, so the replayed
//! `added` event has no local projection and no handler is invoked — this
//! test only exercises offset/schema bookkeeping, not object caches.

use serde_json::json;

use crate::prelude::{bus, Harness};

#[test]
fn initsync_advances_next_offset_past_init_stop() {
    let harness = Harness::new();
    harness.write_config("");
    let schema = bus::simple_schema("posixAccount", &["uid", "cn"], "uid");
    harness.write_bus(&[
        bus::init_start(0, schema),
        bus::added(1, "posixAccount", json!("alice"), json!({"uid": "alice", "cn": "Alice"})),
        bus::init_stop(2),
    ]);

    let daemon = harness.spawn_daemon();

    assert!(harness.wait_for_next_offset(3, 3_000), "next_offset never reached 3: {:?}", harness.status_json());

    let snapshot = harness.status_json();
    assert_eq!(snapshot["components"]["engine"]["information"]["initsync_complete"], "true");
    assert_eq!(snapshot["components"]["engine"]["information"]["error_queue_len"], "0");

    drop(daemon);
}

#[test]
fn steady_state_events_after_initsync_keep_advancing_next_offset() {
    let harness = Harness::new();
    harness.write_config("");
    let schema = bus::simple_schema("posixAccount", &["uid", "cn"], "uid");
    harness.write_bus(&[
        bus::init_start(0, schema),
        bus::init_stop(1),
        bus::added(2, "posixAccount", json!("bob"), json!({"uid": "bob", "cn": "Bob"})),
        bus::removed(3, "posixAccount", json!("bob")),
    ]);

    let daemon = harness.spawn_daemon();

    assert!(harness.wait_for_next_offset(4, 3_000), "next_offset never reached 4: {:?}", harness.status_json());

    drop(daemon);
}

#[test]
fn a_second_daemon_run_resumes_from_the_persisted_offset() {
    let harness = Harness::new();
    harness.write_config("");
    let schema = bus::simple_schema("posixAccount", &["uid", "cn"], "uid");
    harness.write_bus(&[bus::init_start(0, schema), bus::init_stop(1)]);

    {
        let daemon = harness.spawn_daemon();
        assert!(harness.wait_for_next_offset(2, 3_000));
        let quit = harness.ctl().arg("quit").output().expect("hermesctl quit");
        assert!(quit.status.success());
        daemon.wait_for_exit(2_000);
    }

    // Restart against the same state dir: the offset cache is reloaded and
    // initsync is not repeated, so next_offset starts at (at least) 2.
    let daemon = harness.spawn_daemon();
    let snapshot = harness.status_json();
    assert_eq!(snapshot["components"]["engine"]["information"]["next_offset"], "2");
    drop(daemon);
}
