use pretty_assertions::assert_eq;
use replicant_types::{OpArgs, OpPath, Operation, Revision, SchemaSum};
use serde_json::{json, Value};

fn roundtrip(op: &Operation) -> Operation {
    let encoded = serde_json::to_string(op).unwrap();
    serde_json::from_str(&encoded).unwrap()
}

// ── Wire shape ───────────────────────────────────────────────────

#[test]
fn operation_serializes_as_path_method_args() {
    let op = Operation::new(
        OpPath::from_segments(["scores"]),
        OpArgs::Add {
            prop: "alice".into(),
            new_value: json!(10),
        },
    );

    let encoded: Value = serde_json::to_value(&op).unwrap();
    assert_eq!(
        encoded,
        json!({
            "path": "/scores",
            "method": "add",
            "args": { "prop": "alice", "newValue": 10 }
        })
    );
}

#[test]
fn method_names_are_camel_case() {
    let cases: Vec<(Operation, &str)> = vec![
        (
            Operation::new(OpPath::root(), OpArgs::Overwrite { new_value: json!(1) }),
            "overwrite",
        ),
        (
            Operation::new(
                OpPath::root(),
                OpArgs::ArraySplice {
                    index: 0,
                    removed: vec![],
                    inserted: vec![json!(1)],
                },
            ),
            "arraySplice",
        ),
        (
            Operation::new(OpPath::root(), OpArgs::ArrayCopyWithin {
                target: 0,
                start: 1,
                end: 2,
                overwritten: vec![json!(0)],
            }),
            "arrayCopyWithin",
        ),
        (
            Operation::new(OpPath::root(), OpArgs::ArrayReverse),
            "arrayReverse",
        ),
    ];

    for (op, expected) in cases {
        assert_eq!(op.method(), expected);
        let encoded: Value = serde_json::to_value(&op).unwrap();
        assert_eq!(encoded["method"], json!(expected));
    }
}

#[test]
fn unit_method_roundtrips() {
    let op = Operation::new(OpPath::from_segments(["list"]), OpArgs::ArrayReverse);
    assert_eq!(roundtrip(&op), op);
}

#[test]
fn update_carries_old_and_new_value() {
    let op = Operation::new(
        OpPath::root(),
        OpArgs::Update {
            prop: "title".into(),
            old_value: json!("before"),
            new_value: json!("after"),
        },
    );

    let encoded: Value = serde_json::to_value(&op).unwrap();
    assert_eq!(encoded["args"]["oldValue"], json!("before"));
    assert_eq!(encoded["args"]["newValue"], json!("after"));
    assert_eq!(roundtrip(&op), op);
}

#[test]
fn splice_roundtrips_removed_elements() {
    let op = Operation::new(
        OpPath::from_segments(["queue"]),
        OpArgs::ArraySplice {
            index: 2,
            removed: vec![json!("a"), json!("b")],
            inserted: vec![json!("c")],
        },
    );
    assert_eq!(roundtrip(&op), op);
}

// ── Paths ────────────────────────────────────────────────────────

#[test]
fn root_path_is_empty() {
    let root = OpPath::root();
    assert!(root.is_root());
    assert!(root.segments().is_empty());
    assert_eq!(root.to_string(), "/");
}

#[test]
fn path_segments_roundtrip() {
    let path = OpPath::from_segments(["a", "b", "0"]);
    assert_eq!(path.as_str(), "/a/b/0");
    assert_eq!(path.segments(), vec!["a", "b", "0"]);
}

#[test]
fn path_escapes_slashes_and_tildes() {
    let path = OpPath::from_segments(["odd/key", "ti~lde"]);
    assert_eq!(path.as_str(), "/odd~1key/ti~0lde");
    assert_eq!(path.segments(), vec!["odd/key", "ti~lde"]);
}

#[test]
fn path_join_extends() {
    let path = OpPath::from_segments(["a"]).join("b/c");
    assert_eq!(path.segments(), vec!["a", "b/c"]);
}

// ── Revisions ────────────────────────────────────────────────────

#[test]
fn revision_starts_at_zero_and_increments() {
    let r = Revision::ZERO;
    assert_eq!(r.get(), 0);
    assert_eq!(r.next().get(), 1);
    assert!(r.next().follows(r));
    assert!(!r.next().next().follows(r));
}

#[test]
fn revision_serializes_transparently() {
    let r = Revision::new(7);
    assert_eq!(serde_json::to_value(r).unwrap(), json!(7));
}

#[test]
fn schema_sum_is_transparent_string() {
    let sum = SchemaSum::new("abc123");
    assert_eq!(serde_json::to_value(&sum).unwrap(), json!("abc123"));
    assert_eq!(sum.as_str(), "abc123");
}
