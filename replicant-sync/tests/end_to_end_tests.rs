//! Full authority-and-mirrors scenarios over the in-process transport.

use pretty_assertions::assert_eq;
use replicant_schema::SchemaCompiler;
use replicant_store::{MemoryAdapter, ReplicantStore};
use replicant_sync::{
    ChangeEvent, DeclareReplicant, LocalHub, RejectReason, ReplicantClient, SyncError,
    SyncServer,
};
use replicant_types::{OpPath, ReplicantId, Revision};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn board() -> ReplicantId {
    ReplicantId::new("scoreboard", "state")
}

fn scoreboard_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "string": { "type": "string" },
            "object": {
                "type": "object",
                "properties": { "numA": { "type": "number" } },
                "additionalProperties": false
            }
        },
        "additionalProperties": false
    })
}

struct Harness {
    hub: LocalHub,
    store: ReplicantStore,
}

impl Harness {
    fn start() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        let store = ReplicantStore::new(Arc::new(MemoryAdapter::new()));
        let hub = LocalHub::new();
        let mut schemas = SchemaCompiler::new();
        schemas.add_document("scoreboard.json", scoreboard_schema());
        let server = SyncServer::with_schemas(store.clone(), Arc::new(hub.clone()), schemas);
        tokio::spawn(async move { server.run().await });
        Self { hub, store }
    }

    fn client(&self) -> Arc<ReplicantClient> {
        let client = Arc::new(ReplicantClient::new(Arc::new(self.hub.connect())));
        let pump = client.clone();
        tokio::spawn(async move { pump.run().await });
        client
    }
}

async fn events_of(
    client: &ReplicantClient,
    id: &ReplicantId,
) -> mpsc::UnboundedReceiver<ChangeEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    client
        .on_change(id, move |event| {
            let _ = tx.send(event.clone());
        })
        .await
        .unwrap();
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>) -> ChangeEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for change event")
        .expect("event channel closed")
}

async fn wait_for_revision(client: &ReplicantClient, id: &ReplicantId, revision: Revision) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if client.revision(id).await == Some(revision) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for revision");
}

#[tokio::test]
async fn declare_yields_schema_generated_default() {
    let harness = Harness::start();
    let client = harness.client();

    let value = client
        .declare(DeclareReplicant::new(board()).with_schema_path("scoreboard.json"))
        .await
        .unwrap();
    assert_eq!(value, json!({ "string": "", "object": { "numA": 0 } }));
    assert_eq!(client.revision(&board()).await, Some(Revision::ZERO));
}

#[tokio::test]
async fn edits_propagate_between_mirrors() {
    let harness = Harness::start();
    let editor = harness.client();
    let watcher = harness.client();

    let declare = DeclareReplicant::new(board()).with_schema_path("scoreboard.json");
    editor.declare(declare.clone()).await.unwrap();
    watcher.declare(declare).await.unwrap();
    let mut watched = events_of(&watcher, &board()).await;

    let revision = editor
        .mutate(&board(), |t| {
            t.set(&OpPath::root(), "string", json!("hello"))?;
            t.set(&OpPath::parse("/object"), "numA", json!(5))
        })
        .await
        .unwrap();
    assert_eq!(revision, Revision::new(1));

    let event = next_event(&mut watched).await;
    assert_eq!(event.old_value, json!({ "string": "", "object": { "numA": 0 } }));
    assert_eq!(event.new_value, json!({ "string": "hello", "object": { "numA": 5 } }));
    assert_eq!(event.revision, Revision::new(1));
    assert_eq!(
        watcher.value(&board()).await,
        Some(json!({ "string": "hello", "object": { "numA": 5 } }))
    );
}

#[tokio::test]
async fn editor_sees_its_own_change_once() {
    let harness = Harness::start();
    let editor = harness.client();
    editor
        .declare(DeclareReplicant::new(board()).with_schema_path("scoreboard.json"))
        .await
        .unwrap();
    let mut events = events_of(&editor, &board()).await;

    editor
        .mutate(&board(), |t| t.set(&OpPath::root(), "string", json!("once")))
        .await
        .unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.revision, Revision::new(1));

    // The broadcast excludes the editor; no duplicate arrives.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(
        editor.value(&board()).await,
        Some(json!({ "string": "once", "object": { "numA": 0 } }))
    );
}

#[tokio::test]
async fn invalid_change_is_rejected_and_rolled_back() {
    let harness = Harness::start();
    let editor = harness.client();
    let watcher = harness.client();

    let declare = DeclareReplicant::new(board()).with_schema_path("scoreboard.json");
    editor.declare(declare.clone()).await.unwrap();
    watcher.declare(declare).await.unwrap();

    let err = editor
        .mutate(&board(), |t| t.set(&OpPath::root(), "string", json!(123)))
        .await
        .unwrap_err();
    match err {
        SyncError::Rejected {
            reason: RejectReason::InvalidValue { violations },
            ..
        } => assert!(!violations.is_empty()),
        other => panic!("expected invalid-value rejection, got {other}"),
    }

    // The optimistic edit was rolled back; nothing reached the authority
    // or the other mirror.
    let default = json!({ "string": "", "object": { "numA": 0 } });
    assert_eq!(editor.value(&board()).await, Some(default.clone()));
    assert_eq!(editor.revision(&board()).await, Some(Revision::ZERO));
    assert_eq!(harness.store.read(&board()).await, Some(default.clone()));
    assert_eq!(watcher.value(&board()).await, Some(default));
}

#[tokio::test]
async fn assign_overwrites_and_propagates() {
    let harness = Harness::start();
    let editor = harness.client();
    let watcher = harness.client();

    let declare = DeclareReplicant::new(board()).with_schema_path("scoreboard.json");
    editor.declare(declare.clone()).await.unwrap();
    watcher.declare(declare).await.unwrap();

    let fresh = json!({ "string": "reset", "object": { "numA": 9 } });
    let revision = editor.assign(&board(), fresh.clone()).await.unwrap();
    assert_eq!(revision, Revision::new(1));

    wait_for_revision(&watcher, &board(), Revision::new(1)).await;
    assert_eq!(watcher.value(&board()).await, Some(fresh));
}

#[tokio::test]
async fn concurrent_editors_converge() {
    let harness = Harness::start();
    let alice = harness.client();
    let bob = harness.client();

    let declare = DeclareReplicant::new(board()).with_schema_path("scoreboard.json");
    alice.declare(declare.clone()).await.unwrap();
    bob.declare(declare).await.unwrap();

    alice
        .mutate(&board(), |t| t.set(&OpPath::root(), "string", json!("from alice")))
        .await
        .unwrap();
    bob.mutate(&board(), |t| t.set(&OpPath::parse("/object"), "numA", json!(7)))
        .await
        .unwrap();

    wait_for_revision(&alice, &board(), Revision::new(2)).await;
    wait_for_revision(&bob, &board(), Revision::new(2)).await;

    let expected = json!({ "string": "from alice", "object": { "numA": 7 } });
    assert_eq!(alice.value(&board()).await, Some(expected.clone()));
    assert_eq!(bob.value(&board()).await, Some(expected.clone()));
    assert_eq!(harness.store.read(&board()).await, Some(expected));
}

#[tokio::test]
async fn read_does_not_join_the_room() {
    let harness = Harness::start();
    let owner = harness.client();
    let reader = harness.client();

    owner
        .declare(DeclareReplicant::new(board()).with_schema_path("scoreboard.json"))
        .await
        .unwrap();
    owner.assign(&board(), json!({ "string": "v1", "object": { "numA": 1 } })).await.unwrap();

    let read = reader.read(&board()).await.unwrap();
    assert_eq!(read, Some(json!({ "string": "v1", "object": { "numA": 1 } })));

    // Reading created no mirror and no subscription.
    owner.assign(&board(), json!({ "string": "v2", "object": { "numA": 2 } })).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reader.value(&board()).await, None);

    // Reads of never-declared replicants answer with nothing.
    let missing = reader
        .read(&ReplicantId::new("scoreboard", "missing"))
        .await
        .unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn unknown_schema_path_fails_the_declare() {
    let harness = Harness::start();
    let client = harness.client();

    let err = client
        .declare(DeclareReplicant::new(board()).with_schema_path("nope.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Server(_)));
    assert_eq!(client.value(&board()).await, None);
}

#[tokio::test]
async fn second_process_resumes_from_declared_state() {
    let harness = Harness::start();
    let first = harness.client();
    first
        .declare(DeclareReplicant::new(board()).with_schema_path("scoreboard.json"))
        .await
        .unwrap();
    first
        .mutate(&board(), |t| t.set(&OpPath::root(), "string", json!("warm")))
        .await
        .unwrap();

    // A mirror connecting later starts from the current state, not the
    // default, and its options are ignored.
    let late = harness.client();
    let value = late
        .declare(
            DeclareReplicant::new(board())
                .with_schema_path("scoreboard.json")
                .with_default(json!({ "string": "ignored", "object": { "numA": 0 } })),
        )
        .await
        .unwrap();
    assert_eq!(value, json!({ "string": "warm", "object": { "numA": 0 } }));
    assert_eq!(late.revision(&board()).await, Some(Revision::new(1)));
}
