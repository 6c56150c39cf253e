use super::*;
use hermes_core::{EventCategory, ForeignKey, ObjectType};
use indexmap::{IndexMap, IndexSet};
use serde_json::json;

fn pkey(id: &str) -> PKey {
    PKey::single(json!(id))
}

fn added_event(id: &str, name: &str) -> Event {
    let mut attrs = IndexMap::new();
    attrs.insert("id".to_string(), json!(id));
    attrs.insert("name".to_string(), json!(name));
    Event::added("User", pkey(id), attrs, EventCategory::Base)
}

#[test]
fn append_assigns_increasing_event_numbers() {
    let mut q = ErrorQueue::new();
    let a = q.append(None, added_event("1", "A"), Some("boom".to_string()));
    let b = q.append(None, added_event("2", "B"), None);
    assert!(b > a);
    assert_eq!(q.len(), 2);
}

#[test]
fn iter_first_per_object_yields_only_smallest_event_number() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("1", "A"), Some("e1".to_string()));
    let diff = hermes_core::ModifiedAttrs {
        added: IndexMap::new(),
        modified: IndexMap::from([("name".to_string(), json!("B"))]),
        removed: IndexMap::new(),
    };
    q.append(None, Event::modified("User", pkey("1"), diff, EventCategory::Base), Some("e2".to_string()));
    q.append(None, added_event("2", "C"), None);

    let first = q.iter_first_per_object();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].local_event.objpkey, Some(pkey("1")));
    assert_eq!(first[0].error_msg.as_deref(), Some("e1"));
}

#[test]
fn purge_object_removes_every_entry_for_it() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("1", "A"), Some("e".to_string()));
    q.append(
        None,
        Event::modified("User", pkey("1"), hermes_core::ModifiedAttrs::default(), EventCategory::Base),
        Some("e2".to_string()),
    );
    q.purge_object("User", &pkey("1"));
    assert!(!q.has_queue_entries_for("User", &pkey("1")));
    assert_eq!(q.len(), 0);
}

#[test]
fn remove_is_noop_tolerant_for_unknown_event_number() {
    let mut q = ErrorQueue::new();
    assert!(q.remove(999).is_none());
}

fn schema_with_fk() -> Schema {
    let mut child_attrs = IndexSet::new();
    child_attrs.insert("id".to_string());
    child_attrs.insert("parentId".to_string());
    let mut child = ObjectType::new("Child", child_attrs, vec!["id".to_string()]);
    child
        .foreign_keys
        .insert("parentId".to_string(), ForeignKey { other_type: "Parent".to_string(), other_pkey_attr: "id".to_string() });

    let mut parent_attrs = IndexSet::new();
    parent_attrs.insert("id".to_string());
    let parent = ObjectType::new("Parent", parent_attrs, vec!["id".to_string()]);

    let mut types = indexmap::IndexMap::new();
    types.insert("Parent".to_string(), parent);
    types.insert("Child".to_string(), child);
    Schema::new(types)
}

#[test]
fn blocks_on_dependency_when_object_already_has_errors() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("1", "A"), Some("e".to_string()));
    let schema = schema_with_fk();
    assert!(q.blocks_on_dependency(&schema, "User", &pkey("1"), ForeignKeyPolicy::Disabled, EventType::Modified));
}

#[test]
fn blocks_on_dependency_for_on_every_parent_of_queued_child() {
    let mut q = ErrorQueue::new();
    let mut attrs = IndexMap::new();
    attrs.insert("id".to_string(), json!("c1"));
    attrs.insert("parentId".to_string(), json!("p1"));
    q.append(None, Event::added("Child", pkey("c1"), attrs, EventCategory::Base), Some("e".to_string()));

    let schema = schema_with_fk();
    assert!(q.blocks_on_dependency(&schema, "Parent", &pkey("p1"), ForeignKeyPolicy::OnEvery, EventType::Modified));
    assert!(!q.blocks_on_dependency(&schema, "Parent", &pkey("p1"), ForeignKeyPolicy::Disabled, EventType::Modified));
}

#[test]
fn on_remove_policy_only_blocks_on_removed_events() {
    let mut q = ErrorQueue::new();
    let mut attrs = IndexMap::new();
    attrs.insert("id".to_string(), json!("c1"));
    attrs.insert("parentId".to_string(), json!("p1"));
    q.append(None, Event::added("Child", pkey("c1"), attrs, EventCategory::Base), Some("e".to_string()));

    let schema = schema_with_fk();
    assert!(!q.blocks_on_dependency(&schema, "Parent", &pkey("p1"), ForeignKeyPolicy::OnRemove, EventType::Modified));
    assert!(q.blocks_on_dependency(&schema, "Parent", &pkey("p1"), ForeignKeyPolicy::OnRemove, EventType::Removed));
}

#[test]
fn autoremediate_merges_added_then_modified_conservative() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("1", "A"), Some("fail1".to_string()));
    let diff = hermes_core::ModifiedAttrs {
        added: IndexMap::new(),
        modified: IndexMap::from([("name".to_string(), json!("B"))]),
        removed: IndexMap::new(),
    };
    q.append(None, Event::modified("User", pkey("1"), diff, EventCategory::Base), Some("fail2".to_string()));

    q.autoremediate(AutoremediationMode::Conservative, "User", &pkey("1"), || None).unwrap();

    let remaining = q.iter_first_per_object();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].local_event.eventtype, EventType::Added);
    let attrs = remaining[0].local_event.added_attrs().unwrap();
    assert_eq!(attrs.get("name"), Some(&json!("B")));
}

#[test]
fn autoremediate_added_removed_maximum_drops_both() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("1", "A"), Some("f".to_string()));
    q.append(None, Event::removed("User", pkey("1"), EventCategory::Base), Some("f2".to_string()));

    q.autoremediate(AutoremediationMode::Maximum, "User", &pkey("1"), || None).unwrap();
    assert!(!q.has_queue_entries_for("User", &pkey("1")));
}

#[test]
fn autoremediate_added_removed_conservative_keeps_both() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("1", "A"), Some("f".to_string()));
    q.append(None, Event::removed("User", pkey("1"), EventCategory::Base), Some("f2".to_string()));

    q.autoremediate(AutoremediationMode::Conservative, "User", &pkey("1"), || None).unwrap();
    assert_eq!(q.len(), 2);
}

#[test]
fn autoremediate_removed_added_maximum_empty_diff_drops_both() {
    let mut q = ErrorQueue::new();
    q.append(None, Event::removed("User", pkey("1"), EventCategory::Base), Some("f".to_string()));
    q.append(None, added_event("1", "A"), Some("f2".to_string()));

    q.autoremediate(AutoremediationMode::Maximum, "User", &pkey("1"), || Some(hermes_core::ModifiedAttrs::default()))
        .unwrap();
    assert!(!q.has_queue_entries_for("User", &pkey("1")));
}

#[test]
fn autoremediate_removed_added_maximum_nonempty_diff_becomes_modified() {
    let mut q = ErrorQueue::new();
    q.append(None, Event::removed("User", pkey("3"), EventCategory::Base), Some("f".to_string()));
    let mut attrs = IndexMap::new();
    attrs.insert("id".to_string(), json!("3"));
    attrs.insert("name".to_string(), json!("X'"));
    attrs.insert("desc".to_string(), json!("Y"));
    q.append(None, Event::added("User", pkey("3"), attrs, EventCategory::Base), Some("f2".to_string()));

    let diff = hermes_core::ModifiedAttrs {
        added: IndexMap::new(),
        modified: IndexMap::from([("name".to_string(), json!("X'"))]),
        removed: IndexMap::new(),
    };
    q.autoremediate(AutoremediationMode::Maximum, "User", &pkey("3"), || Some(diff)).unwrap();

    let remaining = q.iter_first_per_object();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].local_event.eventtype, EventType::Modified);
}

#[test]
fn autoremediate_skips_when_either_side_is_partially_processed() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("1", "A"), Some("f".to_string()));
    let mut modified = added_event("1", "B");
    modified.is_partially_processed = true;
    q.append(None, modified, Some("f2".to_string()));

    q.autoremediate(AutoremediationMode::Maximum, "User", &pkey("1"), || None).unwrap();
    assert_eq!(q.len(), 2);
}

#[test]
fn autoremediate_impossible_pair_is_an_invariant_error() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("1", "A"), Some("f".to_string()));
    q.append(None, added_event("1", "A"), Some("f2".to_string()));

    let err = q.autoremediate(AutoremediationMode::Maximum, "User", &pkey("1"), || None).unwrap_err();
    assert!(matches!(err, EngineError::Invariant(_)));
}

#[test]
fn rewrite_primary_keys_moves_all_entries_for_the_object() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("old", "A"), Some("f".to_string()));
    q.rewrite_primary_keys("User", &pkey("old"), pkey("new"));

    assert!(!q.has_queue_entries_for("User", &pkey("old")));
    assert!(q.has_queue_entries_for("User", &pkey("new")));
    let entries = q.iter_first_per_object();
    assert_eq!(entries[0].local_event.objpkey, Some(pkey("new")));
}

#[test]
fn snapshot_round_trips_through_json() {
    let mut q = ErrorQueue::new();
    q.append(None, added_event("1", "A"), Some("f".to_string()));
    q.append(None, added_event("2", "B"), None);

    let json_str = serde_json::to_string(&q.to_snapshot()).unwrap();
    let restored_snapshot: QueueSnapshot = serde_json::from_str(&json_str).unwrap();
    let restored = ErrorQueue::from_snapshot(restored_snapshot);

    assert_eq!(restored.len(), q.len());
    assert!(restored.has_queue_entries_for("User", &pkey("1")));
    assert!(restored.has_queue_entries_for("User", &pkey("2")));
}
