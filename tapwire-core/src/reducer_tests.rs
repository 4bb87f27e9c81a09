use super::*;
use serde_json::json;

fn doc(value: Value) -> StateDocument {
    StateDocument::with_value(value)
}

#[test]
fn test_add_key_to_empty_object() {
    let mut d = StateDocument::new();
    d.apply_delta(&[PatchOp::add("/user_name", json!("Alice"))])
        .unwrap();
    assert_eq!(d.value(), &json!({"user_name": "Alice"}));
    assert_eq!(d.version(), 1);
}

#[test]
fn test_add_dash_appends() {
    let mut d = doc(json!({"topics": ["weather"]}));
    d.apply_delta(&[PatchOp::add("/topics/-", json!("math"))])
        .unwrap();
    assert_eq!(d.value(), &json!({"topics": ["weather", "math"]}));
}

#[test]
fn test_add_at_index_inserts() {
    let mut d = doc(json!({"xs": [1, 3]}));
    d.apply_delta(&[PatchOp::add("/xs/1", json!(2))]).unwrap();
    assert_eq!(d.value(), &json!({"xs": [1, 2, 3]}));

    d.apply_delta(&[PatchOp::add("/xs/3", json!(4))]).unwrap();
    assert_eq!(d.value(), &json!({"xs": [1, 2, 3, 4]}));
}

#[test]
fn test_add_past_end_fails() {
    let mut d = doc(json!({"xs": [1]}));
    let err = d
        .apply_delta(&[PatchOp::add("/xs/5", json!(2))])
        .unwrap_err();
    assert_eq!(
        err,
        (
            0,
            PatchError::IndexOutOfBounds {
                path: "/xs/5".to_string(),
                index: 5,
                len: 1,
            }
        )
    );
}

#[test]
fn test_add_creates_intermediate_objects() {
    let mut d = StateDocument::new();
    d.apply_delta(&[PatchOp::add("/preferences/theme", json!("dark"))])
        .unwrap();
    assert_eq!(d.value(), &json!({"preferences": {"theme": "dark"}}));
}

#[test]
fn test_add_overwrites_existing_key() {
    let mut d = doc(json!({"user_name": "Alice"}));
    d.apply_delta(&[PatchOp::add("/user_name", json!("Bob"))])
        .unwrap();
    assert_eq!(d.value(), &json!({"user_name": "Bob"}));
}

#[test]
fn test_add_at_root_replaces_document() {
    let mut d = doc(json!({"a": 1}));
    d.apply_delta(&[PatchOp::add("", json!({"b": 2}))]).unwrap();
    assert_eq!(d.value(), &json!({"b": 2}));
}

#[test]
fn test_remove_at_root_fails() {
    let mut d = doc(json!({"a": 1}));
    assert_eq!(
        d.apply_delta(&[PatchOp::remove("")]).unwrap_err(),
        (0, PatchError::RootRemoval)
    );
}

#[test]
fn test_replace_existing_key_and_index() {
    let mut d = doc(json!({"conversation_count": 1, "xs": [1, 2]}));
    d.apply_delta(&[
        PatchOp::replace("/conversation_count", json!(2)),
        PatchOp::replace("/xs/0", json!(9)),
    ])
    .unwrap();
    assert_eq!(d.value(), &json!({"conversation_count": 2, "xs": [9, 2]}));
}

#[test]
fn test_replace_missing_key_fails() {
    let mut d = StateDocument::new();
    let err = d
        .apply_delta(&[PatchOp::replace("/user_name", json!("Alice"))])
        .unwrap_err();
    assert_eq!(
        err,
        (
            0,
            PatchError::MissingTarget {
                path: "/user_name".to_string()
            }
        )
    );
    assert_eq!(d.value(), &json!({}));
    assert_eq!(d.version(), 0);
}

#[test]
fn test_replace_missing_intermediate_fails() {
    let mut d = StateDocument::new();
    let err = d
        .apply_delta(&[PatchOp::replace("/a/b", json!(1))])
        .unwrap_err();
    assert_eq!(
        err.1,
        PatchError::MissingParent {
            path: "/a/b".to_string(),
            parent: "/a".to_string(),
        }
    );
}

#[test]
fn test_remove_key_and_index() {
    let mut d = doc(json!({"a": 1, "xs": [1, 2, 3]}));
    d.apply_delta(&[PatchOp::remove("/a"), PatchOp::remove("/xs/0")])
        .unwrap();
    assert_eq!(d.value(), &json!({"xs": [2, 3]}));
}

#[test]
fn test_remove_missing_target_fails() {
    let mut d = doc(json!({"xs": [1]}));
    assert!(matches!(
        d.apply_delta(&[PatchOp::remove("/nope")]),
        Err((0, PatchError::MissingTarget { .. }))
    ));
    assert!(matches!(
        d.apply_delta(&[PatchOp::remove("/xs/1")]),
        Err((0, PatchError::IndexOutOfBounds { .. }))
    ));
}

#[test]
fn test_leading_zero_index_is_invalid() {
    let mut d = doc(json!({"xs": [1, 2]}));
    assert!(matches!(
        d.apply_delta(&[PatchOp::replace("/xs/01", json!(0))]),
        Err((0, PatchError::InvalidIndex { .. }))
    ));
}

#[test]
fn test_scalar_parent_is_not_a_container() {
    let mut d = doc(json!({"name": "Alice"}));
    assert!(matches!(
        d.apply_delta(&[PatchOp::add("/name/first", json!("A"))]),
        Err((0, PatchError::NotAContainer { .. }))
    ));
}

#[test]
fn test_delta_rolls_back_on_failure() {
    let before = json!({"topics": ["weather"], "count": 1});
    let mut d = doc(before.clone());
    let err = d
        .apply_delta(&[
            PatchOp::replace("/count", json!(2)),
            PatchOp::add("/topics/-", json!("math")),
            PatchOp::remove("/missing"),
        ])
        .unwrap_err();

    assert_eq!(err.0, 2);
    assert_eq!(d.value(), &before);
    assert_eq!(d.version(), 0);
}

#[test]
fn test_snapshot_is_idempotent() {
    let snapshot = json!({"user_name": null, "topics": []});
    let mut once = StateDocument::new();
    once.apply_snapshot(snapshot.clone());
    let mut twice = StateDocument::new();
    twice.apply_snapshot(snapshot.clone());
    twice.apply_snapshot(snapshot);
    assert_eq!(once.value(), twice.value());
}

#[test]
fn test_apply_op_standalone() {
    let mut value = json!({});
    apply_op(&mut value, &PatchOp::add("/a", json!([]))).unwrap();
    apply_op(&mut value, &PatchOp::add("/a/-", json!(1))).unwrap();
    assert_eq!(value, json!({"a": [1]}));
}

#[test]
fn test_handle_seed_only_applies_once() {
    let handle = StateHandle::default();
    assert!(handle.seed(json!({"seeded": true})));
    assert!(!handle.seed(json!({"seeded": false})));
    assert_eq!(handle.snapshot(), json!({"seeded": true}));
    assert_eq!(handle.version(), 1);
}

#[test]
fn test_handle_clones_share_the_document() {
    let handle = StateHandle::default();
    let other = handle.clone();
    other
        .apply_delta(&[PatchOp::add("/x", json!(1))])
        .unwrap();
    assert_eq!(handle.snapshot(), json!({"x": 1}));
    assert_eq!(handle.read(|doc| doc.version()), 1);
}

#[test]
fn test_handle_failed_delta_leaves_version() {
    let handle = StateHandle::new(StateDocument::with_value(json!({"x": 1})));
    assert!(handle.apply_delta(&[PatchOp::remove("/y")]).is_err());
    assert_eq!(handle.version(), 0);
    assert_eq!(handle.snapshot(), json!({"x": 1}));
}

#[test]
fn test_concurrent_readers_never_see_partial_delta() {
    let handle = StateHandle::new(StateDocument::with_value(json!({"a": 0, "b": 0})));
    let writer = handle.clone();

    let reader = std::thread::spawn(move || {
        for _ in 0..1000 {
            let snap = handle.snapshot();
            assert_eq!(snap["a"], snap["b"], "observed a half-applied delta");
        }
    });

    for i in 1..=1000 {
        writer
            .apply_delta(&[
                PatchOp::replace("/a", json!(i)),
                PatchOp::replace("/b", json!(i)),
            ])
            .unwrap();
    }
    reader.join().unwrap();
}
