//! Array fields: replace, clear and index-shifting edits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use oxide_form_state::{
    FieldData, FieldValue, FieldValues, FormCallbacks, FormStore, NamePath, Rule, ValidatorError,
};
use serde_json::json;

fn keys_under(store: &FormStore, root: &str) -> Vec<String> {
    let prefix = format!("{root}.");
    store
        .get_fields_value(None)
        .into_keys()
        .filter(|key| key.starts_with(&prefix))
        .collect()
}

fn record_value_changes(store: &FormStore) -> Arc<Mutex<Vec<FieldValues>>> {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    store.set_callbacks(FormCallbacks::new().on_values_change(move |changed, _| {
        sink.lock().unwrap().push(changed.clone());
    }));
    changes
}

fn two_items() -> FormStore {
    let store = FormStore::new();
    store.set_array_field_value(
        "items",
        [json!({ "name": "a", "qty": 1 }), json!({ "name": "b", "qty": 2 })],
    );
    store
}

// =============================================================================
// Test: replace and clear
// =============================================================================

#[test]
fn test_set_array_writes_exactly_flattened_items() {
    let store = FormStore::new();
    store.set_array_field_value(
        "items",
        [
            json!({ "name": "a", "qty": 1 }),
            json!({ "name": "b", "qty": 2 }),
            json!({ "name": "c", "qty": 3 }),
        ],
    );
    store.set_array_field_value("items", [json!({ "name": "only", "tags": ["x", "y"] })]);

    assert_eq!(keys_under(&store, "items"), vec!["items.0.name", "items.0.tags"]);
    assert_eq!(store.get_field_value("items.0.name"), FieldValue::from("only"));
    assert_eq!(
        store.get_field_value("items.0.tags"),
        FieldValue::from(vec!["x", "y"])
    );
    assert!(store.is_field_touched("items.0.name"));
}

#[test]
fn test_primitive_items_are_indexed() {
    let store = FormStore::new();
    store.set_array_field_value("tags", ["red", "green"]);

    assert_eq!(keys_under(&store, "tags"), vec!["tags.0", "tags.1"]);
    assert_eq!(store.get_field_value("tags.1"), FieldValue::from("green"));
}

#[test]
fn test_set_then_clear_leaves_no_keys() {
    let store = two_items();
    store.set_field_value("other", "kept");
    let changes = record_value_changes(&store);

    store.clear_array_field_value("items");

    assert!(keys_under(&store, "items").is_empty());
    assert_eq!(store.get_field_value("other"), FieldValue::from("kept"));
    assert_eq!(store.get_field_meta("items.0.name").errors, Vec::<String>::new());
    assert!(!store.is_field_touched("items.0.name"));

    let changes = changes.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].len(), 4);
    assert!(changes[0].values().all(|value| *value == FieldValue::Undefined));
}

#[test]
fn test_replace_removes_seeded_primitive_array() {
    let store = FormStore::with_initial_values(json!({ "tags": ["a", "b"] }));
    assert_eq!(store.get_field_value("tags"), FieldValue::from(vec!["a", "b"]));
    let changes = record_value_changes(&store);

    store.set_array_field_value("tags", ["x"]);

    let values = store.get_fields_value(None);
    assert!(!values.contains_key("tags"));
    assert_eq!(values.get("tags.0"), Some(&FieldValue::from("x")));
    assert_eq!(values.len(), 1);

    let changes = changes.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].get("tags"), Some(&FieldValue::Undefined));
    assert_eq!(changes[0].get("tags.0"), Some(&FieldValue::from("x")));
}

#[test]
fn test_replace_reports_removed_items() {
    let store = two_items();
    let changes = record_value_changes(&store);

    store.set_array_field_value("items", [json!({ "name": "a" })]);

    let changes = changes.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].get("items.0.qty"), Some(&FieldValue::Undefined));
    assert_eq!(changes[0].get("items.1.name"), Some(&FieldValue::Undefined));
    assert_eq!(changes[0].get("items.1.qty"), Some(&FieldValue::Undefined));
    assert!(!changes[0].contains_key("items.0.name"));
}

#[test]
fn test_add_item_splits_seeded_primitive_array() {
    let store = FormStore::with_initial_values(json!({ "tags": ["a", "b"] }));

    store.add_array_item("tags", "c", None);

    let values = store.get_fields_value(None);
    assert!(!values.contains_key("tags"));
    assert_eq!(keys_under(&store, "tags"), vec!["tags.0", "tags.1", "tags.2"]);
    assert_eq!(values.get("tags.0"), Some(&FieldValue::from("a")));
    assert_eq!(values.get("tags.2"), Some(&FieldValue::from("c")));
    assert_eq!(store.get_field_meta("tags.1").name, NamePath::from(["tags", "1"]));
}

#[tokio::test]
async fn test_clear_during_validation_drops_field() {
    let store = two_items();
    store.register_field(
        "items.0.name",
        Some(vec![
            Rule::new().required(),
            Rule::new().validator_fn(|_| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let outcome: Result<(), ValidatorError> = Err("slow failure".into());
                outcome
            }),
        ]),
    );

    let running = store.validate_fields(None);
    futures::pin_mut!(running);
    assert!(futures::poll!(&mut running).is_pending());

    store.clear_array_field_value("items");
    let values = running.await.unwrap();
    assert!(values.is_empty());

    assert!(store.get_fields_value(None).is_empty());
    assert!(store.get_field_error("items.0.name").is_empty());
    assert!(store.get_fields_error(None).is_empty());
    assert!(store.validate_fields(None).await.is_ok());
}

#[test]
fn test_clear_missing_array_is_silent() {
    let store = FormStore::new();
    let changes = record_value_changes(&store);
    store.clear_array_field_value("items");
    assert!(changes.lock().unwrap().is_empty());
}

// =============================================================================
// Test: add / remove / move
// =============================================================================

#[test]
fn test_add_item_shifts_metadata() {
    let store = two_items();
    store.set_fields([FieldData::new("items.1.name").touched(true).errors(["bad"])]);

    store.add_array_item("items", json!({ "name": "z", "qty": 0 }), Some(0));

    assert_eq!(store.get_field_value("items.0.name"), FieldValue::from("z"));
    assert_eq!(store.get_field_value("items.1.name"), FieldValue::from("a"));
    assert_eq!(store.get_field_value("items.2.name"), FieldValue::from("b"));

    let moved = store.get_field_meta("items.2.name");
    assert_eq!(moved.errors, vec!["bad".to_string()]);
    assert_eq!(moved.name, NamePath::from(["items", "2", "name"]));
    assert!(store.get_field_error("items.1.name").is_empty());
}

#[test]
fn test_add_item_appends_by_default() {
    let store = two_items();
    store.add_array_item("items", json!({ "name": "c", "qty": 3 }), None);
    store.add_array_item("items", json!({ "name": "d", "qty": 4 }), Some(99));

    assert_eq!(store.get_field_value("items.2.name"), FieldValue::from("c"));
    assert_eq!(store.get_field_value("items.3.name"), FieldValue::from("d"));
    assert_eq!(keys_under(&store, "items").len(), 8);
}

#[test]
fn test_remove_items_renumbers() {
    let store = two_items();
    store.add_array_item("items", json!({ "name": "c", "qty": 3 }), None);

    store.remove_array_items("items", [0, 7]);

    assert_eq!(
        keys_under(&store, "items"),
        vec!["items.0.name", "items.0.qty", "items.1.name", "items.1.qty"]
    );
    assert_eq!(store.get_field_value("items.0.name"), FieldValue::from("b"));
    assert_eq!(store.get_field_value("items.1.qty"), FieldValue::from(3));
}

#[test]
fn test_move_item() {
    let store = two_items();
    store.add_array_item("items", json!({ "name": "c", "qty": 3 }), None);
    store.set_fields([FieldData::new("items.0.qty").errors(["too many"])]);

    store.move_array_item("items", 0, 2);

    let names: Vec<FieldValue> = (0..3)
        .map(|index| store.get_field_value(format!("items.{index}.name")))
        .collect();
    assert_eq!(names, vec![FieldValue::from("b"), FieldValue::from("c"), FieldValue::from("a")]);
    assert_eq!(store.get_field_error("items.2.qty"), vec!["too many".to_string()]);
}

#[test]
fn test_out_of_range_move_is_noop() {
    let store = two_items();
    let before = store.get_fields_value(None);
    let changes = record_value_changes(&store);

    store.move_array_item("items", 0, 5);
    store.move_array_item("items", 1, 1);

    assert_eq!(store.get_fields_value(None), before);
    assert!(changes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rules_follow_items() {
    let store = two_items();
    store.register_field("items.1.name", Some(vec![Rule::new().min(3)]));

    store.remove_array_items("items", [0]);
    let info = store.validate_fields(None).await.unwrap_err();
    assert_eq!(info.len(), 1);
    assert!(info.get("items.0.name").is_some());

    store.set_field_value("items.0.name", "bob");
    assert!(store.validate_fields(None).await.is_ok());
}
