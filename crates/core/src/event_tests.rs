use super::*;
use serde_json::json;

#[test]
fn added_event_round_trips_through_json() {
    let mut attrs = IndexMap::new();
    attrs.insert("name".to_string(), json!("alice"));
    let ev = Event::added("User", PKey::single("u1"), attrs, EventCategory::Base);

    let wire = serde_json::to_value(&ev).unwrap();
    assert_eq!(wire["eventtype"], json!("added"));
    assert_eq!(wire["objpkey"], json!("u1"));

    let back: Event = serde_json::from_value(wire).unwrap();
    assert_eq!(back.objtype, ev.objtype);
    assert_eq!(back.added_attrs().unwrap()["name"], json!("alice"));
}

#[test]
fn modified_event_carries_added_modified_removed_subtrees() {
    let mut diff = ModifiedAttrs::default();
    diff.modified.insert("name".to_string(), json!("bob"));
    let ev = Event::modified("User", PKey::single("u1"), diff, EventCategory::Base);

    let attrs = ev.modified_attrs().unwrap();
    assert_eq!(attrs.modified["name"], json!("bob"));
    assert!(attrs.added.is_empty());
}

#[test]
fn display_redacts_secret_attrs_and_truncates_long_strings() {
    let mut attrs = IndexMap::new();
    attrs.insert("password".to_string(), json!("hunter2"));
    attrs.insert("bio".to_string(), json!("x".repeat(300)));
    let ev = Event::added("User", PKey::single("u1"), attrs, EventCategory::Base);

    let mut secrets = HashSet::new();
    secrets.insert("password".to_string());
    let s = ev.to_display_string(&secrets);

    assert!(s.contains("<SECRET_VALUE"));
    assert!(s.contains("<LONG_STR(300"));
    assert!(!s.contains("hunter2"));
}

#[test]
fn removed_event_has_empty_attrs() {
    let ev = Event::removed("User", PKey::single("u1"), EventCategory::Base);
    assert_eq!(ev.objattrs, json!({}));
}
