// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hermes_bus::FakeBusConsumer;
use hermes_core::{EventCategory, ObjectType, PKey, Schema};
use hermes_handlers::HandlerRegistry;
use indexmap::{IndexMap, IndexSet};
use serde_json::json;

fn user_schema() -> Schema {
    let mut types = IndexMap::new();
    types.insert(
        "user".to_string(),
        ObjectType::new("user", IndexSet::from(["id".to_string(), "name".to_string()]), vec!["id".to_string()]),
    );
    Schema::new(types)
}

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let state_dir = dir.join("state");
    let socket_path = dir.join("hermes.sock");
    let config_path = dir.join("hermes.toml");
    std::fs::write(
        &config_path,
        format!(
            "[hermes]\napp_name = \"test\"\nstate_dir = {state_dir:?}\n\n\
             [hermes.socket]\npath = {socket_path:?}\n\n\
             [[datamodel]]\nlocal_type = \"user\"\nhermes_type = \"user\"\n\
             attrs_mapping = {{ id = \"id\", name = \"name\" }}\n"
        ),
    )
    .expect("write config");
    config_path
}

async fn started_daemon(dir: &std::path::Path) -> Daemon {
    let config_path = write_config(dir);
    Daemon::startup(Some(&config_path), HandlerRegistry::new(), std::sync::Arc::new(crate::status::LoggingObserver))
        .await
        .expect("startup")
}

fn init_start(schema: &Schema) -> Event {
    let mut ev = Event::added("user", PKey::single(json!(0)), IndexMap::new(), EventCategory::Initsync);
    ev.eventtype = EventType::InitStart;
    ev.objattrs = serde_json::to_value(schema).expect("serialize schema");
    ev
}

fn init_stop() -> Event {
    let mut ev = Event::removed("user", PKey::single(json!(0)), EventCategory::Initsync);
    ev.eventtype = EventType::InitStop;
    ev
}

fn added_user(id: i64, name: &str) -> Event {
    let mut attrs = IndexMap::new();
    attrs.insert("id".to_string(), json!(id));
    attrs.insert("name".to_string(), json!(name));
    Event::added("user", PKey::single(json!(id)), attrs, EventCategory::Initsync)
}

#[tokio::test]
async fn initsync_pass_replays_every_object_between_init_start_and_init_stop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let daemon = started_daemon(dir.path()).await;
    let schema = user_schema();

    let events = vec![init_start(&schema), added_user(1, "alice"), added_user(2, "bob"), init_stop()];
    let bus = FakeBusConsumer::new(events);
    let mut main_loop = MainLoop::new(daemon, bus);

    main_loop.iterate().await.expect("iterate");

    let daemon = main_loop.into_daemon();
    assert!(daemon.offset_cache.is_initsync_complete());
    let processor = daemon.processor.expect("processor built from init-start schema");
    assert_eq!(processor.local_cache().objects_of_type("user").count(), 2);
}

#[tokio::test]
async fn steady_state_processes_events_after_initsync_completes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let daemon = started_daemon(dir.path()).await;
    let schema = user_schema();

    let events = vec![
        init_start(&schema),
        added_user(1, "alice"),
        init_stop(),
        Event::added("user", PKey::single(json!(2)), {
            let mut attrs = IndexMap::new();
            attrs.insert("id".to_string(), json!(2));
            attrs.insert("name".to_string(), json!("carol"));
            attrs
        }, EventCategory::Base),
    ];
    let bus = FakeBusConsumer::new(events);
    let mut main_loop = MainLoop::new(daemon, bus);

    main_loop.iterate().await.expect("init pass");
    main_loop.iterate().await.expect("steady state pass");

    let daemon = main_loop.into_daemon();
    let processor = daemon.processor.expect("processor");
    assert_eq!(processor.local_cache().objects_of_type("user").count(), 2);
    assert_eq!(daemon.offset_cache.next_offset, 4);
}

#[tokio::test]
async fn local_datamodel_change_removes_an_object_whose_type_was_dropped_from_the_mapping() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_config(dir.path());
    let schema = user_schema();

    let daemon = Daemon::startup(Some(&config_path), HandlerRegistry::new(), std::sync::Arc::new(crate::status::LoggingObserver))
        .await
        .expect("startup");
    let events = vec![init_start(&schema), added_user(1, "alice"), init_stop()];
    let bus = FakeBusConsumer::new(events);
    let mut main_loop = MainLoop::new(daemon, bus);
    main_loop.iterate().await.expect("init pass");
    let mut daemon = main_loop.into_daemon();
    daemon.persist().expect("persist");
    daemon.persist_schema_and_config().expect("persist schema");

    // Simulate a restart with the `user` mapping dropped from the config.
    std::fs::write(
        &config_path,
        format!(
            "[hermes]\napp_name = \"test\"\nstate_dir = {:?}\n\n[hermes.socket]\npath = {:?}\n",
            daemon.paths.state_dir, DaemonPaths::socket_path(&daemon.config)
        ),
    )
    .expect("rewrite config");
    drop(daemon);

    let restarted = Daemon::startup(Some(&config_path), HandlerRegistry::new(), std::sync::Arc::new(crate::status::LoggingObserver))
        .await
        .expect("restart");
    assert!(restarted.datamodel_change_pending);
    let bus = FakeBusConsumer::new(vec![]);
    let mut main_loop = MainLoop::new(restarted, bus);
    main_loop.iterate().await.expect("iterate applies pending datamodel change");

    let daemon = main_loop.into_daemon();
    let processor = daemon.processor.expect("processor");
    assert_eq!(processor.local_cache().objects_of_type("user").count(), 0);
}
