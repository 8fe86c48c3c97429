//! Declaration, mutation and event delivery through the store.

use pretty_assertions::assert_eq;
use replicant_store::{DeclareOptions, MemoryAdapter, ReplicantStore, StoreError, StoreEvent};
use replicant_types::{ClientId, OpArgs, OpPath, Operation, ReplicantId, Revision};
use serde_json::{json, Value};
use std::sync::Arc;

fn id(name: &str) -> ReplicantId {
    ReplicantId::new("test-bundle", name)
}

fn scoreboard_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "scores": {
                "type": "object",
                "additionalProperties": { "type": "number" }
            },
            "round": { "type": "number", "default": 1 }
        },
        "additionalProperties": false
    })
}

fn store() -> (ReplicantStore, Arc<MemoryAdapter>) {
    let adapter = Arc::new(MemoryAdapter::new());
    (ReplicantStore::new(adapter.clone()), adapter)
}

// ── Declaration ──────────────────────────────────────────────────

#[tokio::test]
async fn declare_without_schema_or_default_yields_null() {
    let (store, _) = store();
    let snapshot = store
        .declare(id("bare"), DeclareOptions::default())
        .await
        .unwrap();
    assert_eq!(snapshot.value, Value::Null);
    assert_eq!(snapshot.revision, Revision::ZERO);
    assert_eq!(snapshot.schema, None);
    assert_eq!(snapshot.schema_sum, None);
}

#[tokio::test]
async fn declare_with_schema_generates_default() {
    let (store, _) = store();
    let snapshot = store
        .declare(
            id("board"),
            DeclareOptions {
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(snapshot.value, json!({ "scores": {}, "round": 1 }));
    assert!(snapshot.schema_sum.is_some());
}

#[tokio::test]
async fn declare_prefers_caller_default_over_generated() {
    let (store, _) = store();
    let snapshot = store
        .declare(
            id("board"),
            DeclareOptions {
                default_value: Some(json!({ "scores": { "alice": 3 }, "round": 2 })),
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(snapshot.value, json!({ "scores": { "alice": 3 }, "round": 2 }));
}

#[tokio::test]
async fn declare_prefers_valid_persisted_value() {
    let (store, adapter) = store();
    adapter.seed(id("board"), json!({ "scores": { "bob": 7 }, "round": 4 }));

    let snapshot = store
        .declare(
            id("board"),
            DeclareOptions {
                default_value: Some(json!({ "scores": {}, "round": 1 })),
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(snapshot.value, json!({ "scores": { "bob": 7 }, "round": 4 }));
}

#[tokio::test]
async fn declare_discards_invalid_persisted_value() {
    let (store, adapter) = store();
    // `round` must be a number; this record predates the schema.
    adapter.seed(id("board"), json!({ "scores": {}, "round": "one" }));

    let snapshot = store
        .declare(
            id("board"),
            DeclareOptions {
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(snapshot.value, json!({ "scores": {}, "round": 1 }));
}

#[tokio::test]
async fn declare_ignores_persisted_value_for_transient_replicant() {
    let (store, adapter) = store();
    adapter.seed(id("scratch"), json!("stale"));

    let snapshot = store
        .declare(
            id("scratch"),
            DeclareOptions {
                default_value: Some(json!("fresh")),
                persistent: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(snapshot.value, json!("fresh"));
}

#[tokio::test]
async fn declare_rejects_default_violating_own_schema() {
    let (store, _) = store();
    let err = store
        .declare(
            id("board"),
            DeclareOptions {
                default_value: Some(json!({ "scores": 5, "round": 1 })),
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidDefault { .. }));
    assert!(!store.exists(&id("board")).await);
}

#[tokio::test]
async fn declare_rejects_schema_that_fails_to_compile() {
    let (store, _) = store();
    let err = store
        .declare(
            id("board"),
            DeclareOptions {
                schema: Some(json!({ "type": "object", "properties": { "x": { "$ref": "#/definitions/missing" } } })),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::SchemaCompile { .. }));
}

#[tokio::test]
async fn declare_is_idempotent_and_first_options_win() {
    let (store, _) = store();
    let first = store
        .declare(
            id("board"),
            DeclareOptions {
                default_value: Some(json!({ "scores": {}, "round": 9 })),
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store.assign(&id("board"), json!({ "scores": { "a": 1 }, "round": 9 })).await.unwrap();

    // Re-declaring with a different default and no schema changes nothing.
    let second = store
        .declare(
            id("board"),
            DeclareOptions {
                default_value: Some(json!("something else entirely")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(second.value, json!({ "scores": { "a": 1 }, "round": 9 }));
    assert_eq!(second.revision, Revision::new(1));
    assert_eq!(second.schema_sum, first.schema_sum);
}

// ── Assignment ───────────────────────────────────────────────────

#[tokio::test]
async fn assign_commits_and_bumps_revision() {
    let (store, _) = store();
    store.declare(id("board"), DeclareOptions::default()).await.unwrap();

    let r1 = store.assign(&id("board"), json!(1)).await.unwrap();
    let r2 = store.assign(&id("board"), json!(2)).await.unwrap();
    assert_eq!(r1, Revision::new(1));
    assert_eq!(r2, Revision::new(2));
    assert_eq!(store.read(&id("board")).await, Some(json!(2)));
}

#[tokio::test]
async fn assign_rejects_value_violating_schema() {
    let (store, _) = store();
    store
        .declare(
            id("board"),
            DeclareOptions {
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = store
        .assign(&id("board"), json!({ "scores": {}, "round": true }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue { .. }));

    // Rejection leaves value and revision untouched.
    let snapshot = store.snapshot(&id("board")).await.unwrap();
    assert_eq!(snapshot.value, json!({ "scores": {}, "round": 1 }));
    assert_eq!(snapshot.revision, Revision::ZERO);
}

#[tokio::test]
async fn assign_to_undeclared_replicant_is_not_found() {
    let (store, _) = store();
    let err = store.assign(&id("ghost"), json!(1)).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ── Operation batches ────────────────────────────────────────────

#[tokio::test]
async fn operations_apply_in_order_and_bump_revision_once() {
    let (store, _) = store();
    let snapshot = store
        .declare(
            id("board"),
            DeclareOptions {
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let batch = vec![
        Operation::new(
            OpPath::parse("/scores"),
            OpArgs::Add { prop: "alice".into(), new_value: json!(10) },
        ),
        Operation::new(
            OpPath::parse("/scores"),
            OpArgs::Update { prop: "alice".into(), old_value: json!(10), new_value: json!(12) },
        ),
    ];
    let revision = store
        .apply_operations(&id("board"), snapshot.schema_sum.clone(), batch)
        .await
        .unwrap();
    assert_eq!(revision, Revision::new(1));
    assert_eq!(
        store.read(&id("board")).await,
        Some(json!({ "scores": { "alice": 12 }, "round": 1 }))
    );
}

#[tokio::test]
async fn operations_with_stale_schema_sum_are_dropped_whole() {
    let (store, _) = store();
    store
        .declare(
            id("board"),
            DeclareOptions {
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let batch = vec![Operation::new(
        OpPath::parse("/scores"),
        OpArgs::Add { prop: "alice".into(), new_value: json!(10) },
    )];
    let err = store
        .apply_operations(&id("board"), None, batch)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    assert_eq!(
        store.read(&id("board")).await,
        Some(json!({ "scores": {}, "round": 1 }))
    );
}

#[tokio::test]
async fn operations_producing_invalid_result_are_rejected_atomically() {
    let (store, _) = store();
    let snapshot = store
        .declare(
            id("board"),
            DeclareOptions {
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // First op is fine on its own; second one breaks the schema. Neither
    // must land.
    let batch = vec![
        Operation::new(
            OpPath::parse("/scores"),
            OpArgs::Add { prop: "alice".into(), new_value: json!(10) },
        ),
        Operation::new(
            OpPath::root(),
            OpArgs::Add { prop: "intruder".into(), new_value: json!(true) },
        ),
    ];
    let err = store
        .apply_operations(&id("board"), snapshot.schema_sum, batch)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue { .. }));

    let after = store.snapshot(&id("board")).await.unwrap();
    assert_eq!(after.value, json!({ "scores": {}, "round": 1 }));
    assert_eq!(after.revision, Revision::ZERO);
}

#[tokio::test]
async fn operations_at_missing_path_are_rejected() {
    let (store, _) = store();
    store.declare(id("bare"), DeclareOptions::default()).await.unwrap();

    let batch = vec![Operation::new(
        OpPath::parse("/nowhere"),
        OpArgs::Add { prop: "x".into(), new_value: json!(1) },
    )];
    let err = store.apply_operations(&id("bare"), None, batch).await.unwrap_err();
    assert!(matches!(err, StoreError::Operation { .. }));
}

// ── Events ───────────────────────────────────────────────────────

#[tokio::test]
async fn events_arrive_in_commit_order_with_origin() {
    let (store, _) = store();
    store.declare(id("board"), DeclareOptions::default()).await.unwrap();
    let mut events = store.subscribe();

    let client = ClientId::new();
    store
        .assign_by(&id("board"), json!({ "scores": {} }), Some(client))
        .await
        .unwrap();
    store
        .apply_operations_by(
            &id("board"),
            None,
            vec![Operation::new(
                OpPath::parse("/scores"),
                OpArgs::Add { prop: "alice".into(), new_value: json!(10) },
            )],
            None,
        )
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        StoreEvent::Assigned { id: event_id, value, revision, origin } => {
            assert_eq!(event_id, id("board"));
            assert_eq!(value, json!({ "scores": {} }));
            assert_eq!(revision, Revision::new(1));
            assert_eq!(origin, Some(client));
        }
        other => panic!("expected Assigned, got {other:?}"),
    }
    match events.recv().await.unwrap() {
        StoreEvent::Changed { revision, operations, origin, .. } => {
            assert_eq!(revision, Revision::new(2));
            assert_eq!(operations.len(), 1);
            assert_eq!(operations[0].method(), "add");
            assert_eq!(origin, None);
        }
        other => panic!("expected Changed, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_changes_publish_no_event() {
    let (store, _) = store();
    store
        .declare(
            id("board"),
            DeclareOptions {
                schema: Some(scoreboard_schema()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let mut events = store.subscribe();

    store.assign(&id("board"), json!("nope")).await.unwrap_err();
    store.assign(&id("board"), json!({ "scores": {}, "round": 2 })).await.unwrap();

    // Only the successful assign shows up.
    match events.recv().await.unwrap() {
        StoreEvent::Assigned { revision, .. } => assert_eq!(revision, Revision::new(1)),
        other => panic!("expected Assigned, got {other:?}"),
    }
    assert!(events.try_recv().is_err());
}
