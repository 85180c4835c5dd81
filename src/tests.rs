//! End-to-end serialize/deserialize tests over the public surface.

use serde_json::Value as Json;

use crate::serialize::{serialize, SerializeContext};
use crate::types::{
    CellKind, Constant, DeferredState, Error, TypeTag, Value, ValueGraph, ValueHandle,
};
use crate::{Container, ContainerOptions, NodeHost};

fn container(text: &str) -> Container {
    Container::new(text, ContainerOptions::default()).unwrap()
}

fn obj(graph: &mut ValueGraph, entries: Vec<(&str, ValueHandle)>) -> ValueHandle {
    let entries = entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    graph.alloc(Value::Object(entries))
}

#[test]
fn round_trip_mixed_primitives() {
    let mut g = ValueGraph::new();
    let n = g.alloc(Value::Number(42.5));
    let s = g.alloc(Value::String("hello".into()));
    let big = g.alloc(Value::BigInt("123456789012345678901234567890".into()));
    let date = g.alloc(Value::Date(1_700_000_000_000.0));
    let url = g.alloc(Value::Url("https://example.com/a".into()));
    let re = g.alloc(Value::Regex {
        source: "a+b".into(),
        flags: "gi".into(),
    });
    let root = g.alloc(Value::Array(vec![n, s, big, date, url, re]));

    let state = serialize(&g, &[root]).unwrap();
    let mut c = container(&state.text);
    let r = c.get_object_by_id(0).unwrap();
    let items = match c.value(r) {
        Value::Array(items) => items.clone(),
        other => panic!("expected array, got {other:?}"),
    };
    assert_eq!(c.value(items[0]), &Value::Number(42.5));
    assert_eq!(c.value(items[1]), &Value::String("hello".into()));
    assert_eq!(
        c.value(items[2]),
        &Value::BigInt("123456789012345678901234567890".into())
    );
    assert_eq!(c.value(items[3]), &Value::Date(1_700_000_000_000.0));
    assert_eq!(c.value(items[4]), &Value::Url("https://example.com/a".into()));
    assert_eq!(
        c.value(items[5]),
        &Value::Regex {
            source: "a+b".into(),
            flags: "gi".into(),
        }
    );
}

#[test]
fn round_trip_containers_and_bytes() {
    let mut g = ValueGraph::new();
    let one = g.alloc(Value::Number(1.0));
    let two = g.alloc(Value::Number(2.0));
    let set = g.alloc(Value::Set(vec![one, two]));
    let key = g.alloc(Value::String("k".into()));
    let map = g.alloc(Value::Map(vec![(key, two)]));
    let bytes = g.alloc(Value::Bytes(vec![0, 1, 2, 250, 255]));
    let err = g.alloc(Value::Error {
        message: "boom".into(),
        entries: vec![("cause".into(), one)],
    });
    let root = g.alloc(Value::Array(vec![set, map, bytes, err]));

    let state = serialize(&g, &[root]).unwrap();
    let mut c = container(&state.text);
    let r = c.get_object_by_id(0).unwrap();
    let items = match c.value(r) {
        Value::Array(items) => items.clone(),
        other => panic!("expected array, got {other:?}"),
    };
    match c.value(items[0]) {
        Value::Set(members) => {
            assert_eq!(c.value(members[0]), &Value::Number(1.0));
            assert_eq!(c.value(members[1]), &Value::Number(2.0));
        }
        other => panic!("expected set, got {other:?}"),
    }
    match c.value(items[1]).clone() {
        Value::Map(pairs) => {
            assert_eq!(c.value(pairs[0].0), &Value::String("k".into()));
            assert_eq!(c.value(pairs[0].1), &Value::Number(2.0));
        }
        other => panic!("expected map, got {other:?}"),
    }
    assert_eq!(c.value(items[2]), &Value::Bytes(vec![0, 1, 2, 250, 255]));
    match c.value(items[3]).clone() {
        Value::Error { message, entries } => {
            assert_eq!(message, "boom");
            assert_eq!(entries[0].0, "cause");
            assert_eq!(c.value(entries[0].1), &Value::Number(1.0));
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[test]
fn preserved_sharing_within_one_root() {
    // Goal: two fields referencing the same value before serialization
    // reference the identical handle after deserialization.
    let mut g = ValueGraph::new();
    let inner = obj(&mut g, vec![]);
    let shared = g.alloc(Value::Array(vec![inner]));
    let root = obj(&mut g, vec![("x", shared), ("y", shared)]);

    let state = serialize(&g, &[root]).unwrap();
    let mut c = container(&state.text);
    let r = c.get_object_by_id(0).unwrap();
    let entries = match c.value(r) {
        Value::Object(entries) => entries.clone(),
        other => panic!("expected object, got {other:?}"),
    };
    assert_eq!(entries[0].1, entries[1].1, "sharing must survive the trip");
}

#[test]
fn root_ref_between_roots() {
    // Goal: the second root's field must serialize as a back-reference,
    // not a duplicate inline object, and resolve to the first root.
    let mut g = ValueGraph::new();
    let one = g.alloc(Value::Number(1.0));
    let first = obj(&mut g, vec![("a", one)]);
    let second = obj(&mut g, vec![("b", first)]);

    let state = serialize(&g, &[first, second]).unwrap();
    let parsed: Json = serde_json::from_str(&state.text).unwrap();
    let slots = parsed.as_array().unwrap();
    // Slot 1 payload is ["b", 0]: a bare integer reference, nothing inline.
    assert_eq!(slots[3].as_array().unwrap()[1], Json::from(0));

    let mut c = container(&state.text);
    let r0 = c.get_object_by_id(0).unwrap();
    let r1 = c.get_object_by_id(1).unwrap();
    match c.value(r1).clone() {
        Value::Object(entries) => assert_eq!(entries[0].1, r0),
        other => panic!("expected object, got {other:?}"),
    }
}

#[test]
fn cycle_through_a_record() {
    // Goal: a.self = a round-trips as a cycle, not a diverging recursion
    // and not a duplicate copy.
    let mut g = ValueGraph::new();
    let a = obj(&mut g, vec![]);
    if let Value::Object(entries) = g.get_mut(a) {
        entries.push(("self".into(), a));
    }

    let state = serialize(&g, &[a]).unwrap();
    let mut c = container(&state.text);
    let r = c.get_object_by_id(0).unwrap();
    match c.value(r) {
        Value::Object(entries) => assert_eq!(entries[0].1, r),
        other => panic!("expected object, got {other:?}"),
    }
}

#[test]
fn cycle_through_nested_promotion() {
    // Goal: a cycle whose shared value is discovered mid-walk gets promoted
    // and still resolves to one identity.
    let mut g = ValueGraph::new();
    let c_val = obj(&mut g, vec![]);
    let d = obj(&mut g, vec![("q", c_val)]);
    if let Value::Object(entries) = g.get_mut(c_val) {
        entries.push(("p".into(), d));
    }
    let root = g.alloc(Value::Array(vec![c_val]));

    let state = serialize(&g, &[root]).unwrap();
    let mut c = container(&state.text);
    let r = c.get_object_by_id(0).unwrap();
    let first = match c.value(r) {
        Value::Array(items) => items[0],
        other => panic!("expected array, got {other:?}"),
    };
    let d_handle = match c.value(first) {
        Value::Object(entries) => entries[0].1,
        other => panic!("expected object, got {other:?}"),
    };
    match c.value(d_handle) {
        Value::Object(entries) => assert_eq!(entries[0].1, first, "cycle must close"),
        other => panic!("expected object, got {other:?}"),
    }
}

#[test]
fn promotion_emits_a_path_back_reference() {
    // Goal: a value inlined under one root and referenced again from
    // another gets its own slot holding a path reference, and both sites
    // share one identity after resume.
    let mut g = ValueGraph::new();
    let two = g.alloc(Value::Number(2.0));
    let shared = obj(&mut g, vec![("v", two)]);
    let root0 = obj(&mut g, vec![("x", shared)]);
    let root1 = obj(&mut g, vec![("y", shared)]);

    let state = serialize(&g, &[root0, root1]).unwrap();
    assert!(
        state.text.contains("\"0 0\""),
        "expected a path back-reference in {}",
        state.text
    );

    let mut c = container(&state.text);
    let r0 = c.get_object_by_id(0).unwrap();
    let r1 = c.get_object_by_id(1).unwrap();
    let x = match c.value(r0) {
        Value::Object(entries) => entries[0].1,
        other => panic!("expected object, got {other:?}"),
    };
    let y = match c.value(r1) {
        Value::Object(entries) => entries[0].1,
        other => panic!("expected object, got {other:?}"),
    };
    assert_eq!(x, y);
    // The promoted slot resolves to the same identity as well.
    assert_eq!(c.get_object_by_id(2).unwrap(), x);
}

#[test]
fn add_root_is_idempotent() {
    let mut g = ValueGraph::new();
    let v = obj(&mut g, vec![]);
    let mut ctx = SerializeContext::new(&g);
    let first = ctx.add_root(v, None);
    let second = ctx.add_root(v, None);
    assert_eq!(first, second);
    let state = ctx.serialize().unwrap();
    let parsed: Json = serde_json::from_str(&state.text).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2, "one slot, no duplicate");
}

#[test]
fn interned_constants_dedup_to_bare_tags() {
    // Goal: [undefined, undefined, Infinity] serializes as three constant
    // pairs with no payload beyond the constant id.
    let mut g = ValueGraph::new();
    let undef = g.undefined();
    let inf = g.alloc(Value::Number(f64::INFINITY));
    let root = g.alloc(Value::Array(vec![undef, undef, inf]));

    let state = serialize(&g, &[root]).unwrap();
    let parsed: Json = serde_json::from_str(&state.text).unwrap();
    let payload = parsed.as_array().unwrap()[1].as_array().unwrap().clone();
    let expected = |c: Constant| {
        Json::Array(vec![
            Json::from(TypeTag::Constant.as_u8()),
            Json::from(c.as_u8()),
        ])
    };
    assert_eq!(payload[0], expected(Constant::Undefined));
    assert_eq!(payload[1], expected(Constant::Undefined));
    assert_eq!(payload[2], expected(Constant::PositiveInfinity));

    let mut c = container(&state.text);
    let r = c.get_object_by_id(0).unwrap();
    match c.value(r) {
        Value::Array(items) => {
            assert_eq!(items[0], items[1], "interned undefined stays shared");
            match c.value(items[2]) {
                Value::Number(n) => assert!(n.is_infinite() && n.is_sign_positive()),
                other => panic!("expected number, got {other:?}"),
            }
        }
        other => panic!("expected array, got {other:?}"),
    }
}

#[test]
fn deferred_round_trips_settled_and_pending() {
    let mut g = ValueGraph::new();
    let inner = g.alloc(Value::String("done".into()));
    let resolved = g.alloc(Value::Deferred(DeferredState::Resolved(inner)));
    let pending = g.alloc(Value::Deferred(DeferredState::Pending));

    let state = serialize(&g, &[resolved, pending]).unwrap();
    let mut c = container(&state.text);
    match c.get_object_by_id(0).map(|h| c.value(h).clone()).unwrap() {
        Value::Deferred(DeferredState::Resolved(v)) => {
            assert_eq!(c.value(v), &Value::String("done".into()));
        }
        other => panic!("expected resolved deferred, got {other:?}"),
    }
    let p = c.get_object_by_id(1).unwrap();
    assert_eq!(c.value(p), &Value::Deferred(DeferredState::Pending));
}

#[test]
fn lazy_ref_captures_become_roots() {
    let mut g = ValueGraph::new();
    let count = g.alloc(Value::Number(3.0));
    let cell = g.alloc(Value::Cell {
        kind: CellKind::Plain,
        compute: g.undefined(),
        value: count,
    });
    let lazy = g.alloc(Value::LazyRef {
        chunk: "app".into(),
        symbol: "onClick".into(),
        captures: vec![cell],
    });

    let state = serialize(&g, &[lazy]).unwrap();
    assert!(state.text.contains("app#onClick[1]"), "{}", state.text);

    let mut c = container(&state.text);
    let l = c.get_object_by_id(0).unwrap();
    let captured = match c.value(l).clone() {
        Value::LazyRef {
            chunk,
            symbol,
            captures,
        } => {
            assert_eq!(chunk, "app");
            assert_eq!(symbol, "onClick");
            captures[0]
        }
        other => panic!("expected lazy ref, got {other:?}"),
    };
    assert_eq!(captured, c.get_object_by_id(1).unwrap());
    match c.value(captured).clone() {
        Value::Cell { kind, value, .. } => {
            assert_eq!(kind, CellKind::Plain);
            assert_eq!(c.value(value), &Value::Number(3.0));
        }
        other => panic!("expected cell, got {other:?}"),
    }
}

#[test]
fn computed_cells_and_props_proxies_round_trip() {
    let mut g = ValueGraph::new();
    let compute = g.alloc(Value::LazyRef {
        chunk: "app".into(),
        symbol: "derive".into(),
        captures: vec![],
    });
    let sentinel = g.constant_handle(Constant::NeedsComputation);
    let cell = g.alloc(Value::Cell {
        kind: CellKind::Computed,
        compute,
        value: sentinel,
    });
    let varying = obj(&mut g, vec![("count", cell)]);
    let constant = obj(&mut g, vec![]);
    let props = g.alloc(Value::PropsProxy { varying, constant });
    let component = g.alloc(Value::Component { entry: compute });

    let state = serialize(&g, &[props, component]).unwrap();
    let mut c = container(&state.text);
    let p = c.get_object_by_id(0).unwrap();
    let varying = match c.value(p) {
        Value::PropsProxy { varying, .. } => *varying,
        other => panic!("expected props proxy, got {other:?}"),
    };
    let cell = match c.value(varying) {
        Value::Object(entries) => entries[0].1,
        other => panic!("expected object, got {other:?}"),
    };
    let (kind, compute_back, value_back) = match c.value(cell) {
        Value::Cell {
            kind,
            compute,
            value,
        } => (*kind, *compute, *value),
        other => panic!("expected cell, got {other:?}"),
    };
    assert_eq!(kind, CellKind::Computed);
    assert_eq!(
        c.value(value_back),
        &Value::Marker(crate::types::Marker::NeedsComputation)
    );
    let comp = c.get_object_by_id(1).unwrap();
    match c.value(comp) {
        Value::Component { entry } => assert_eq!(*entry, compute_back, "one compute identity"),
        other => panic!("expected component, got {other:?}"),
    }
}

#[test]
fn forward_refs_resolve_by_id() {
    let mut g = ValueGraph::new();
    let late = obj(&mut g, vec![]);
    let mut ctx = SerializeContext::new(&g);
    let id = ctx.add_forward_ref(late);
    assert_eq!(id, 0);
    let state = ctx.serialize().unwrap();

    let mut c = container(&state.text);
    let by_forward = c.forward_ref(0).unwrap();
    let by_slot = c.get_object_by_id(0).unwrap();
    assert_eq!(by_forward, by_slot);
    assert!(matches!(
        c.forward_ref(5),
        Err(Error::UnresolvedForwardRef(5))
    ));
}

#[test]
fn preloads_are_collected() {
    let mut g = ValueGraph::new();
    let warm = g.alloc(Value::Preload("vendor#init".into()));
    let state = serialize(&g, &[warm]).unwrap();
    let c = container(&state.text);
    assert_eq!(c.preloads(), ["vendor#init".to_string()]);
}

#[test]
fn sync_fns_dedup_by_source() {
    let g = ValueGraph::new();
    let mut ctx = SerializeContext::new(&g);
    let a = ctx.add_sync_fn("(a,b)=>a+b", 2);
    let again = ctx.add_sync_fn("(a,b)=>a+b", 2);
    let b = ctx.add_sync_fn("(x)=>!x", 1);
    assert_eq!(a, again);
    assert_ne!(a, b);
    let state = ctx.serialize().unwrap();
    assert_eq!(state.sync_fns.len(), 2);
    assert_eq!(state.sync_fns[0].source, "(a,b)=>a+b");
    assert_eq!(state.sync_fns[1].arg_count, 1);
}

#[test]
fn path_for_unseen_value_fails_loudly() {
    let mut g = ValueGraph::new();
    let stray = obj(&mut g, vec![]);
    let mut ctx = SerializeContext::new(&g);
    assert!(matches!(
        ctx.add_root_path(stray),
        Err(Error::MissingRootId(_))
    ));
}

#[test]
fn out_of_range_reference_fails_at_access() {
    let mut c = container("[0,7]");
    assert!(matches!(
        c.get_object_by_id(0),
        Err(Error::OutOfRangeReference { index: 7, len: 1 })
    ));
}

#[test]
fn failed_inflation_refails_on_repeat_reads() {
    // Goal: a slot whose payload cannot inflate fails every strict read,
    // not just the first; the empty placeholder must not escape as a
    // resolved value.
    let mut c = container(r#"[16,"!!!not-base64!!!"]"#);
    assert!(matches!(
        c.get_object_by_id(0),
        Err(Error::MalformedPayload { slot: 0, .. })
    ));
    assert!(matches!(
        c.get_object_by_id(0),
        Err(Error::MalformedPayload { slot: 0, .. })
    ));
}

#[test]
fn unknown_tag_fails_the_whole_parse() {
    assert!(matches!(
        Container::new("[99,null]", ContainerOptions::default()),
        Err(Error::UnsupportedValueKind(99))
    ));
}

#[test]
fn degraded_mode_logs_and_continues() {
    // Slot 0 is malformed (number tag with a string payload); slot 1 is
    // fine. Non-strict resolution degrades slot 0 and keeps slot 1 usable.
    let text = r#"[3,"oops",4,"fine"]"#;
    let mut strict = container(text);
    assert!(strict.get_object_by_id(0).is_err());

    let mut lenient = Container::new(text, ContainerOptions { strict: false }).unwrap();
    let degraded = lenient.get_object_by_id(0).unwrap();
    assert_eq!(lenient.value(degraded), &Value::Undefined);
    let fine = lenient.get_object_by_id(1).unwrap();
    assert_eq!(lenient.value(fine), &Value::String("fine".into()));
}

#[test]
fn resolution_is_memoized() {
    let mut g = ValueGraph::new();
    let root = obj(&mut g, vec![]);
    let state = serialize(&g, &[root]).unwrap();
    let mut c = container(&state.text);
    let first = c.get_object_by_id(0).unwrap();
    let second = c.get_object_by_id(0).unwrap();
    assert_eq!(first, second);
}

#[test]
fn node_refs_consult_the_host() {
    struct RecordingHost {
        known: Vec<String>,
    }
    impl NodeHost for RecordingHost {
        fn get_prop(&self, address: &str, name: &str) -> Option<String> {
            (name == "id" && self.known.iter().any(|a| a == address))
                .then(|| address.to_string())
        }
        fn set_prop(&mut self, address: &str, _name: &str, value: &str) {
            self.known.push(format!("{address}:{value}"));
        }
    }

    let mut g = ValueGraph::new();
    let node = g.alloc(Value::NodeRef("4AB".into()));
    let state = serialize(&g, &[node]).unwrap();

    let host = RecordingHost {
        known: vec!["4AB".into()],
    };
    let mut c = container(&state.text).with_host(Box::new(host));
    let n = c.get_object_by_id(0).unwrap();
    assert_eq!(c.value(n), &Value::NodeRef("4AB".into()));
}
