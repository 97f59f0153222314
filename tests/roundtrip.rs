//! Round-trip tests over the demo schema fixture
//!
//! Exercises the full snapshot pipeline: fixture schema → index → codec
//! tree → encode/decode, including augmentations, choice dispatch, typedef
//! unwrapping, union/leafref leaves and the caching identity guarantees.

use std::collections::BTreeMap;
use std::sync::Arc;

use bindcodec::{
    CodecError, CodecConfig, CodecRegistry, GeneratedTypes, NodeBody, NodeId, NormalizedNode,
    QName, ScalarValue, SchemaTree, TypeName, TypedObject, TypedPath, TypedValue,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

fn demo_tree() -> SchemaTree {
    serde_json::from_str(include_str!("fixtures/demo.json")).expect("fixture parses")
}

/// Registry with the fixture snapshot adopted and the full generated-type
/// universe registered
fn demo_registry() -> (CodecRegistry, GeneratedTypes) {
    let tree = demo_tree();
    let config = CodecConfig::default();
    let index = bindcodec::SchemaIndex::build(&tree, &config).expect("index builds");
    let types = index.generated_types();
    let registry = CodecRegistry::new();
    registry.adopt(tree, &types, &config).expect("snapshot adopts");
    (registry, types)
}

fn top_path() -> TypedPath {
    TypedPath::new().child(TypeName::new("demo.Top"))
}

fn name_key(value: &str) -> BTreeMap<QName, ScalarValue> {
    let mut key = BTreeMap::new();
    key.insert(
        QName::new("demo", "name"),
        ScalarValue::String(value.to_string()),
    );
    key
}

fn list_entry(name: &str) -> TypedObject {
    let augmentation = TypedObject::builder(TypeName::new("aug_mod.TopLevelList1"))
        .scalar(
            QName::new("aug-mod", "simple-value"),
            ScalarValue::String("x".to_string()),
        )
        .scalar(
            QName::new("aug-mod", "simple-type"),
            ScalarValue::Int32(16),
        )
        .build();
    TypedObject::builder(TypeName::new("demo.Top.TopLevelList"))
        .scalar(
            QName::new("demo", "name"),
            ScalarValue::String(name.to_string()),
        )
        .augment(augmentation)
        .build()
}

#[test]
fn test_simple_round_trip_with_augmentation() {
    init_tracing();
    let (registry, _) = demo_registry();

    let top = TypedObject::builder(TypeName::new("demo.Top"))
        .list(QName::new("demo", "top-level-list"), vec![list_entry("test")])
        .build();

    let (instance, node) = registry.encode(&top_path(), &top).unwrap();
    assert_eq!(instance.to_string(), "/demo:top");

    // The augmentation encodes as a wrapper tagged with its identifier.
    let list_node = node.child(&QName::new("demo", "top-level-list")).unwrap();
    let entry = &list_node.children()[0];
    assert!(matches!(entry.id, NodeId::ListEntry { .. }));
    let has_aug_wrapper = entry
        .children()
        .iter()
        .any(|c| matches!(c.id, NodeId::Augmentation(_)));
    assert!(has_aug_wrapper, "augmentation wrapper missing from entry");

    let (typed_path, decoded) = registry.decode(&instance, &node).unwrap();
    assert_eq!(typed_path, top_path());
    assert_eq!(decoded, top);

    // The augmentation stays retrievable by its generated type.
    let entries = match decoded.get(&QName::new("demo", "top-level-list")) {
        Some(TypedValue::List(entries)) => entries,
        other => panic!("expected list field, got {other:?}"),
    };
    let aug = entries[0]
        .augmentation(&TypeName::new("aug_mod.TopLevelList1"))
        .expect("augmentation retrievable by type");
    assert_eq!(
        aug.scalar(&QName::new("aug-mod", "simple-type")),
        Some(&ScalarValue::Int32(16))
    );
}

#[test]
fn test_list_entry_addressed_encode() {
    init_tracing();
    let (registry, _) = demo_registry();

    let entry = list_entry("test");
    let path = top_path().child_keyed(TypeName::new("demo.Top.TopLevelList"), name_key("test"));

    let (instance, node) = registry.encode(&path, &entry).unwrap();
    assert_eq!(instance.to_string(), "/demo:top/demo:top-level-list[demo:name=test]");
    match &node.id {
        NodeId::ListEntry { keys, .. } => {
            assert_eq!(
                keys.get(&QName::new("demo", "name")),
                Some(&ScalarValue::String("test".to_string()))
            );
        }
        other => panic!("expected list entry node, got {other}"),
    }

    let (typed_path, decoded) = registry.decode(&instance, &node).unwrap();
    assert_eq!(typed_path, path);
    assert_eq!(decoded, entry);
}

#[test]
fn test_case_dispatch() {
    init_tracing();
    let (registry, _) = demo_registry();

    let simple = TypedObject::builder(TypeName::new("demo.Top.Identifier.SimpleId"))
        .scalar(
            QName::new("demo", "id"),
            ScalarValue::String("myvalue".to_string()),
        )
        .build();
    let top = TypedObject::builder(TypeName::new("demo.Top"))
        .object(QName::new("demo", "identifier"), simple)
        .build();

    let (instance, node) = registry.encode(&top_path(), &top).unwrap();

    // Exactly one case wrapper, and it is the simple-id case.
    let choice = node.child(&QName::new("demo", "identifier")).unwrap();
    match &choice.body {
        NodeBody::Choice(cases) => {
            assert_eq!(cases.len(), 1);
            assert_eq!(cases[0].id, NodeId::Node(QName::new("demo", "simple-id")));
        }
        other => panic!("expected choice body, got {other:?}"),
    }

    let (_, decoded) = registry.decode(&instance, &node).unwrap();
    let case = match decoded.get(&QName::new("demo", "identifier")) {
        Some(TypedValue::Object(case)) => case,
        other => panic!("expected case object, got {other:?}"),
    };
    assert_eq!(case.descriptor().as_str(), "demo.Top.Identifier.SimpleId");
    assert_eq!(decoded, top);
}

#[test]
fn test_choice_decode_rejects_multiple_cases() {
    init_tracing();
    let (registry, _) = demo_registry();

    let case = |qname: &str, leaf: &str| {
        Arc::new(NormalizedNode::container(
            QName::new("demo", qname),
            vec![Arc::new(NormalizedNode::leaf(
                QName::new("demo", leaf),
                ScalarValue::String("v".to_string()),
            ))],
        ))
    };
    let bad = NormalizedNode::new(
        NodeId::Node(QName::new("demo", "top")),
        NodeBody::Container(vec![Arc::new(NormalizedNode::new(
            NodeId::Node(QName::new("demo", "identifier")),
            NodeBody::Choice(vec![case("simple-id", "id"), case("extended-id", "id-value")]),
        ))]),
    );

    let instance = registry.to_instance_path(&top_path()).unwrap();
    let err = registry.decode(&instance, &bad).unwrap_err();
    assert!(matches!(err, CodecError::AmbiguousChoice { count: 2, .. }));

    // An empty choice wrapper simply decodes to an absent field.
    let empty = NormalizedNode::new(
        NodeId::Node(QName::new("demo", "top")),
        NodeBody::Container(vec![Arc::new(NormalizedNode::new(
            NodeId::Node(QName::new("demo", "identifier")),
            NodeBody::Choice(vec![]),
        ))]),
    );
    let (_, decoded) = registry.decode(&instance, &empty).unwrap();
    assert!(decoded.get(&QName::new("demo", "identifier")).is_none());
}

#[test]
fn test_typedef_unwrap_round_trip() {
    init_tracing();
    let (registry, _) = demo_registry();

    let top = TypedObject::builder(TypeName::new("demo.Top"))
        .field(
            QName::new("demo", "flag"),
            TypedValue::Typedef {
                ty: TypeName::new("demo.MyEmpty"),
                value: ScalarValue::Empty,
            },
        )
        .build();

    let (instance, node) = registry.encode(&top_path(), &top).unwrap();

    // Same scalar representation as the built-in empty type
    let flag = node.child(&QName::new("demo", "flag")).unwrap();
    assert_eq!(flag.scalar(), Some(&ScalarValue::Empty));

    // Decodes back to the typedef-wrapped instance, not the raw built-in
    let (_, decoded) = registry.decode(&instance, &node).unwrap();
    assert_eq!(decoded, top);
    assert!(matches!(
        decoded.get(&QName::new("demo", "flag")),
        Some(TypedValue::Typedef { .. })
    ));
}

#[test]
fn test_union_and_leafref_round_trip() {
    init_tracing();
    let (registry, _) = demo_registry();
    let field = QName::new("demo", "ref-or-count");

    for value in [
        ScalarValue::Uint32(7),
        ScalarValue::String("test".to_string()),
    ] {
        let top = TypedObject::builder(TypeName::new("demo.Top"))
            .scalar(field.clone(), value.clone())
            .build();
        let (instance, node) = registry.encode(&top_path(), &top).unwrap();
        assert_eq!(node.child(&field).unwrap().scalar(), Some(&value));
        let (_, decoded) = registry.decode(&instance, &node).unwrap();
        assert_eq!(decoded, top);
    }

    // No union member accepts a bool
    let bad = TypedObject::builder(TypeName::new("demo.Top"))
        .scalar(field, ScalarValue::Bool(true))
        .build();
    assert!(registry.encode(&top_path(), &bad).is_err());
}

#[test]
fn test_leaf_list_and_unkeyed_list_round_trip() {
    init_tracing();
    let (registry, _) = demo_registry();

    let event = |note: &str| {
        TypedObject::builder(TypeName::new("demo.Top.Events"))
            .scalar(
                QName::new("demo", "note"),
                ScalarValue::String(note.to_string()),
            )
            .build()
    };
    let top = TypedObject::builder(TypeName::new("demo.Top"))
        .leaf_list(
            QName::new("demo", "tags"),
            vec![
                ScalarValue::String("a".to_string()),
                ScalarValue::String("b".to_string()),
            ],
        )
        .list(
            QName::new("demo", "events"),
            vec![event("first"), event("second")],
        )
        .build();

    let (instance, node) = registry.encode(&top_path(), &top).unwrap();

    let tags = node.child(&QName::new("demo", "tags")).unwrap();
    assert!(matches!(tags.body, NodeBody::LeafList { ordered: true, .. }));
    let events = node.child(&QName::new("demo", "events")).unwrap();
    assert!(matches!(events.body, NodeBody::UnkeyedList(_)));

    let (_, decoded) = registry.decode(&instance, &node).unwrap();
    assert_eq!(decoded, top);
}

#[test]
fn test_anyxml_passthrough() {
    init_tracing();
    let (registry, _) = demo_registry();

    let payload = serde_json::json!({"raw": [1, 2, 3], "nested": {"k": "v"}});
    let top = TypedObject::builder(TypeName::new("demo.Top"))
        .field(
            QName::new("demo", "payload"),
            TypedValue::Opaque(payload.clone()),
        )
        .build();

    let (instance, node) = registry.encode(&top_path(), &top).unwrap();
    match &node.child(&QName::new("demo", "payload")).unwrap().body {
        NodeBody::Anyxml(content) => assert_eq!(content, &payload),
        other => panic!("expected anyxml body, got {other:?}"),
    }

    let (_, decoded) = registry.decode(&instance, &node).unwrap();
    assert_eq!(decoded, top);
}

#[test]
fn test_missing_case_type_is_skipped_not_fatal() {
    init_tracing();
    let tree = demo_tree();
    let config = CodecConfig::default();
    let index = bindcodec::SchemaIndex::build(&tree, &config).unwrap();
    let extended = TypeName::new("demo.Top.Identifier.ExtendedId");
    let types = index.generated_types().without(&extended);

    // Adoption succeeds; only the missing case is unavailable.
    let registry = CodecRegistry::new();
    registry.adopt(tree, &types, &config).expect("lenient adopt");

    let simple = TypedObject::builder(TypeName::new("demo.Top.Identifier.SimpleId"))
        .scalar(
            QName::new("demo", "id"),
            ScalarValue::String("ok".to_string()),
        )
        .build();
    let top = TypedObject::builder(TypeName::new("demo.Top"))
        .object(QName::new("demo", "identifier"), simple)
        .build();
    registry.encode(&top_path(), &top).expect("sibling case still encodes");

    let ext = TypedObject::builder(extended)
        .scalar(
            QName::new("demo", "id-value"),
            ScalarValue::String("x".to_string()),
        )
        .build();
    let top_ext = TypedObject::builder(TypeName::new("demo.Top"))
        .object(QName::new("demo", "identifier"), ext)
        .build();
    let err = registry.encode(&top_path(), &top_ext).unwrap_err();
    assert!(matches!(err, CodecError::InvalidCase { .. }));
}

#[test]
fn test_caching_identity_law() {
    init_tracing();
    let (registry, _) = demo_registry();

    let entry_ty = TypeName::new("demo.Top.TopLevelList");
    let top_ty = TypeName::new("demo.Top");
    let mut caching = registry
        .caching_codec(&top_path(), [top_ty.clone(), entry_ty.clone()])
        .unwrap();

    let top_of = |names: &[&str]| {
        TypedObject::builder(top_ty.clone())
            .list(
                QName::new("demo", "top-level-list"),
                names.iter().map(|n| list_entry(n)).collect(),
            )
            .build()
    };

    // Structurally equal inputs yield the identical subtree.
    let first = caching.serialize(&top_of(&["a", "b"])).unwrap();
    let again = caching.serialize(&top_of(&["a", "b"])).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    // One more entry: new top-level subtree, but overlapping entries stay
    // reference-identical to their first-produced counterparts.
    let grown = caching.serialize(&top_of(&["a", "b", "c"])).unwrap();
    assert!(!Arc::ptr_eq(&first, &grown));

    let entries = |node: &Arc<NormalizedNode>| -> Vec<Arc<NormalizedNode>> {
        node.child(&QName::new("demo", "top-level-list"))
            .unwrap()
            .children()
            .to_vec()
    };
    let old_entries = entries(&first);
    let new_entries = entries(&grown);
    assert_eq!(old_entries.len(), 2);
    assert_eq!(new_entries.len(), 3);
    for old in &old_entries {
        assert!(new_entries.iter().any(|n| Arc::ptr_eq(old, n)));
    }
}

#[test]
fn test_caching_codec_rejects_other_snapshot() {
    init_tracing();
    let (registry, types) = demo_registry();
    let mut caching = registry
        .caching_codec(&top_path(), [TypeName::new("demo.Top")])
        .unwrap();

    // Adopt a modified tree; the old caching codec no longer applies.
    let mut tree = demo_tree();
    tree.modules[0].namespace = Some("urn:demo:v2".to_string());
    registry
        .adopt(tree, &types, &CodecConfig::default())
        .unwrap();

    let top = TypedObject::builder(TypeName::new("demo.Top")).build();
    let err = registry
        .encode_cached(&top_path(), &top, &mut caching)
        .unwrap_err();
    assert!(matches!(err, CodecError::SnapshotMismatch { .. }));
}

#[test]
fn test_snapshot_swap_keeps_old_readers_valid() {
    init_tracing();
    let (registry, types) = demo_registry();
    let old = registry.snapshot().unwrap();

    let mut tree = demo_tree();
    tree.modules[0].namespace = Some("urn:demo:v2".to_string());
    registry
        .adopt(tree, &types, &CodecConfig::default())
        .unwrap();

    // The held snapshot still serves in-flight operations.
    let top = TypedObject::builder(TypeName::new("demo.Top"))
        .list(QName::new("demo", "top-level-list"), vec![list_entry("test")])
        .build();
    let (instance, node) = old.encode(&top_path(), &top).unwrap();
    let (_, decoded) = old.decode(&instance, &node).unwrap();
    assert_eq!(decoded, top);

    // And the registry now answers with the new fingerprint.
    assert_ne!(
        registry.snapshot().unwrap().info().fingerprint,
        old.info().fingerprint
    );
}

#[test]
fn test_adopt_fails_fast_on_invalid_schema() {
    init_tracing();
    let mut tree = demo_tree();
    // Break the list key reference.
    if let Some(root) = tree.roots.get_mut(0) {
        if let Some(list) = root.children.get_mut(0) {
            if let bindcodec::SchemaKind::List { keys, .. } = &mut list.kind {
                keys.push(QName::new("demo", "does-not-exist"));
            }
        }
    }
    let registry = CodecRegistry::new();
    let err = registry
        .adopt(tree, &GeneratedTypes::new(), &CodecConfig::default())
        .unwrap_err();
    assert!(matches!(err, CodecError::Validation(_)));

    // Nothing was published.
    assert!(matches!(registry.snapshot(), Err(CodecError::NoSchema)));
}
