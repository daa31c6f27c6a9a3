//! Identity, cycle, and deduplication laws: shared sub-objects come back
//! shared, cycles come back closed, and the wire layout for the canonical
//! scenarios is byte-exact.

use joltwire::intern;
use joltwire::module::ModuleData;
use joltwire::runtime::Runtime;
use joltwire::tags;
use joltwire::value::{ArrayData, ArrayStorage, DictData, DictKind, RecordRepr};
use joltwire::{deserialize, serialize, Deserializer, Serializer, Symbol, Value};

fn encode_no_header(v: &Value) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut s = Serializer::new(&mut bytes);
    s.serialize(v).unwrap();
    bytes
}

fn roundtrip(v: &Value) -> Value {
    let mut bytes = Vec::new();
    serialize(&mut bytes, v).unwrap();
    deserialize(bytes.as_slice()).unwrap()
}

fn set_field(rec: &Value, index: usize, value: Value) {
    if let Value::Record(r) = rec {
        if let RecordRepr::Fields(fields) = &mut r.write().repr {
            fields[index] = Some(value);
        }
    }
}

fn get_field(rec: &Value, index: usize) -> Option<Value> {
    if let Value::Record(r) = rec {
        if let RecordRepr::Fields(fields) = &r.read().repr {
            return fields[index].clone();
        }
    }
    None
}

#[test]
fn small_integer_fast_path_is_one_byte() {
    let bytes = encode_no_header(&Value::Int64(5));
    assert_eq!(bytes, vec![tags::INT64_LITERALS_BASE + 5]);
    let back = Deserializer::new(bytes.as_slice()).deserialize().unwrap();
    assert!(back.deep_eq(&Value::Int64(5)));
}

#[test]
fn shared_string_stream_layout() {
    // (s, s) with a 10-byte string: SHARED_REF reserves slot 0, the second
    // occurrence is a short back-reference to it.
    let s = Value::string("abcdefghij");
    let bytes = encode_no_header(&Value::tuple(vec![s.clone(), s]));
    let mut expect = vec![
        tags::TUPLE_TAG,
        2,
        tags::SHARED_REF_TAG,
        tags::STRING_TAG,
        10,
    ];
    expect.extend(b"abcdefghij");
    expect.push(tags::SHORTBACKREF_TAG);
    expect.extend(0u16.to_ne_bytes());
    assert_eq!(bytes, expect);
}

#[test]
fn shared_strings_decode_pointer_equal() {
    let s = Value::string("abcdefghij");
    let back = roundtrip(&Value::tuple(vec![s.clone(), s]));
    if let Value::Tuple(items) = &back {
        assert!(items[0].egal(&items[1]), "elements must share one allocation");
        assert!(items[0].deep_eq(&Value::string("abcdefghij")));
    } else {
        panic!("expected tuple");
    }
}

#[test]
fn distinct_equal_strings_are_canonicalized_by_content() {
    // Two separate allocations of the same long text still fuse on the wire.
    let a = Value::string("abcdefghij");
    let b = Value::string("abcdefghij");
    assert!(!a.egal(&b));
    let back = roundtrip(&Value::tuple(vec![a, b]));
    if let Value::Tuple(items) = &back {
        assert!(items[0].egal(&items[1]));
    }
}

#[test]
fn long_symbols_share_a_slot() {
    let sym = Value::symbol("a_rather_long_symbol");
    let bytes = encode_no_header(&Value::tuple(vec![sym.clone(), sym]));
    // tag + count + (SYMBOL + len + 20 bytes) + short backref to slot 0
    let tail = &bytes[bytes.len() - 3..];
    assert_eq!(tail[0], tags::SHORTBACKREF_TAG);
    assert_eq!(u16::from_ne_bytes([tail[1], tail[2]]), 0);
}

#[test]
fn shared_mutable_array_keeps_identity() {
    let xs = Value::array(ArrayData::boxed(
        &[2],
        vec![Some(Value::Int64(1)), Some(Value::Int64(2))],
    ));
    let back = roundtrip(&Value::tuple(vec![xs.clone(), xs]));
    if let Value::Tuple(items) = &back {
        assert!(items[0].egal(&items[1]));
    } else {
        panic!("expected tuple");
    }
}

#[test]
fn record_cycle_stream_layout() {
    let root = ModuleData::root(Symbol::new("sh_cycle_layout"), None, false);
    Runtime::global().register_root(&root);
    let ty = Runtime::global().define_struct(
        &root,
        "Knot",
        &[("self", intern::CORE.any.clone())],
        true,
    );
    let rec = Runtime::global().allocate(ty.as_type().unwrap()).unwrap();
    set_field(&rec, 0, rec.clone());

    let bytes = encode_no_header(&rec);
    // Pre-order reservation gives the record slot 0; the cycle closes with
    // SHORTBACKREF(0) as the last three bytes.
    assert_eq!(bytes[0], tags::REF_OBJECT_TAG);
    let tail = &bytes[bytes.len() - 3..];
    assert_eq!(tail[0], tags::SHORTBACKREF_TAG);
    assert_eq!(u16::from_ne_bytes([tail[1], tail[2]]), 0);
}

#[test]
fn record_cycle_is_restored() {
    let root = ModuleData::root(Symbol::new("sh_cycle_rt"), None, false);
    Runtime::global().register_root(&root);
    let ty = Runtime::global().define_struct(
        &root,
        "Loop",
        &[("self", intern::CORE.any.clone())],
        true,
    );
    let rec = Runtime::global().allocate(ty.as_type().unwrap()).unwrap();
    set_field(&rec, 0, rec.clone());

    let back = roundtrip(&rec);
    let inner = get_field(&back, 0).expect("field must be present");
    assert!(inner.egal(&back), "cycle must close on the same object");
}

#[test]
fn array_containing_itself() {
    let xs = Value::array(ArrayData::boxed(&[2], vec![None, None]));
    if let Value::Array(a) = &xs {
        if let ArrayStorage::Boxed(items) = &mut a.write().storage {
            items[0] = Some(xs.clone());
            items[1] = Some(Value::Int64(7));
        }
    }
    let back = roundtrip(&xs);
    if let Value::Array(a) = &back {
        match &a.read().storage {
            ArrayStorage::Boxed(items) => {
                assert!(items[0].as_ref().unwrap().egal(&back));
                assert!(items[1].as_ref().unwrap().deep_eq(&Value::Int64(7)));
            }
            _ => panic!("expected boxed storage"),
        }
    } else {
        panic!("expected array");
    }
}

#[test]
fn dict_of_dicts_shares_the_inner() {
    let mut inner = DictData::new(DictKind::Hashed);
    inner.insert(Value::Int64(1), Value::Int64(2));
    let inner = Value::dict(inner);

    let mut outer = DictData::new(DictKind::Hashed);
    outer.insert(Value::string("a"), inner.clone());
    outer.insert(Value::string("b"), inner);
    let outer = Value::dict(outer);

    let back = roundtrip(&outer);
    if let Value::Dict(d) = &back {
        let d = d.read();
        let va = d.get(&Value::string("a")).unwrap().clone();
        let vb = d.get(&Value::string("b")).unwrap().clone();
        assert!(va.egal(&vb), "inner dictionaries must be one object");
        if let Value::Dict(i) = &va {
            assert_eq!(i.read().len(), 1);
        }
    } else {
        panic!("expected dictionary");
    }
}

#[test]
fn cyclic_identity_dictionary() {
    let d = Value::dict(DictData::new(DictKind::Identity));
    if let Value::Dict(dd) = &d {
        dd.write()
            .entries
            .push((Value::string("me, myself"), d.clone()));
    }
    let back = roundtrip(&d);
    if let Value::Dict(dd) = &back {
        let entries = &dd.read().entries;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.egal(&back));
    } else {
        panic!("expected dictionary");
    }
}

#[test]
fn repeated_tuple_backrefs_after_first_emission() {
    let t = Value::tuple(vec![Value::string("shared tuple body"), Value::Int64(1)]);
    let pair = Value::tuple(vec![t.clone(), t]);
    let back = roundtrip(&pair);
    if let Value::Tuple(items) = &back {
        assert!(items[0].egal(&items[1]));
    }
}

#[test]
fn expression_cycle_through_args() {
    let e = Value::expr("block", vec![]);
    if let Value::Expr(ed) = &e {
        ed.write().args.push(e.clone());
        ed.write().args.push(Value::symbol("tail"));
    }
    let back = roundtrip(&e);
    if let Value::Expr(ed) = &back {
        let ed = ed.read();
        assert_eq!(ed.head, Symbol::new("block"));
        assert!(ed.args[0].egal(&back));
    } else {
        panic!("expected expression");
    }
}
