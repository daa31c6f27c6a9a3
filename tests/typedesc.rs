//! Type-descriptor subprotocol: name resolution, sandbox synthesis, method
//! re-installation, stable-number deduplication, and version-tolerant method
//! extras.

use std::sync::Arc;

use joltwire::intern;
use joltwire::module::ModuleData;
use joltwire::runtime::Runtime;
use joltwire::tags;
use joltwire::value::{MethodData, RecordRepr};
use joltwire::{deserialize, serialize, Deserializer, JoltError, Serializer, Symbol, Value};

fn encode(v: &Value) -> Vec<u8> {
    let mut bytes = Vec::new();
    serialize(&mut bytes, v).unwrap();
    bytes
}

fn set_field(rec: &Value, index: usize, value: Value) {
    if let Value::Record(r) = rec {
        if let RecordRepr::Fields(fields) = &mut r.write().repr {
            fields[index] = Some(value);
        }
    }
}

fn record_type(v: &Value) -> Arc<joltwire::dtype::DataType> {
    match v {
        Value::Record(r) => r.read().ty.clone(),
        _ => panic!("expected record"),
    }
}

#[test]
fn interned_type_roundtrips_in_one_byte() {
    let mut bytes = Vec::new();
    let mut s = Serializer::new(&mut bytes);
    s.serialize(&intern::CORE.int64).unwrap();
    assert_eq!(bytes.len(), 1);
    let back = Deserializer::new(bytes.as_slice()).deserialize().unwrap();
    assert!(back.egal(&intern::CORE.int64));
}

#[test]
fn named_struct_resolves_to_the_registered_type() {
    let root = ModuleData::root(Symbol::new("td_shapes"), None, false);
    Runtime::global().register_root(&root);
    let ty = Runtime::global().define_struct(
        &root,
        "Point",
        &[
            ("x", intern::CORE.float64.clone()),
            ("y", intern::CORE.float64.clone()),
        ],
        false,
    );
    let rec = Runtime::global().allocate(ty.as_type().unwrap()).unwrap();
    set_field(&rec, 0, Value::Float64(1.25));
    set_field(&rec, 1, Value::Float64(-3.5));

    let back = deserialize(encode(&rec).as_slice()).unwrap();
    assert!(back.deep_eq(&rec));
    // By-name resolution hands back the very same type object.
    assert!(Arc::ptr_eq(&record_type(&back), ty.as_type().unwrap()));
}

#[test]
fn primitive_bits_record_needs_only_the_local_size() {
    let root = ModuleData::root(Symbol::new("td_prims"), None, false);
    Runtime::global().register_root(&root);
    let ty = Runtime::global().define_primitive(&root, "Fixed16", 2);
    let rec = Value::record(joltwire::value::RecordData {
        ty: ty.as_type().unwrap().clone(),
        repr: RecordRepr::Bits(vec![0xAB, 0xCD]),
    });
    let back = deserialize(encode(&rec).as_slice()).unwrap();
    assert!(back.deep_eq(&rec));
    if let Value::Record(r) = &back {
        match &r.read().repr {
            RecordRepr::Bits(b) => assert_eq!(b, &vec![0xAB, 0xCD]),
            _ => panic!("expected bits repr"),
        }
    }
}

#[test]
fn singleton_decodes_to_the_canonical_instance() {
    let root = ModuleData::root(Symbol::new("td_single"), None, false);
    Runtime::global().register_root(&root);
    let ty = Runtime::global().define_singleton(&root, "Unit");
    let instance = ty
        .as_type()
        .unwrap()
        .name
        .instance
        .read()
        .clone()
        .unwrap();
    let back = deserialize(encode(&instance).as_slice()).unwrap();
    assert!(back.egal(&instance), "singletons decode to the one instance");
}

#[test]
fn sandbox_type_is_synthesized_with_fields_intact() {
    let scratch = ModuleData::root(Symbol::new("td_scratch"), None, true);
    let ty = Runtime::global().define_struct(
        &scratch,
        "Ghost",
        &[
            ("tag", intern::CORE.string.clone()),
            ("next", intern::CORE.any.clone()),
        ],
        true,
    );
    let rec = Runtime::global().allocate(ty.as_type().unwrap()).unwrap();
    set_field(&rec, 0, Value::string("spooky payload"));
    let bytes = encode(&rec);

    let rt = Runtime::new();
    let back = Deserializer::with_runtime(bytes.as_slice(), rt.clone())
        .deserialize()
        .unwrap();
    let dt = record_type(&back);
    assert_eq!(dt.name.name, Symbol::new("Ghost"));
    assert!(Arc::ptr_eq(&dt.name.module, &rt.sandbox()));
    assert!(rt.sandbox().get_binding(Symbol::new("Ghost")).is_some());
    assert_eq!(dt.name.info.read().field_names.len(), 2);
    assert!(dt.name.info.read().is_mutable);
    if let Value::Record(r) = &back {
        match &r.read().repr {
            RecordRepr::Fields(f) => {
                assert!(f[0]
                    .as_ref()
                    .unwrap()
                    .deep_eq(&Value::string("spooky payload")));
                assert!(f[1].is_none());
            }
            _ => panic!("expected field repr"),
        }
    }
}

#[test]
fn received_numbers_deduplicate_across_streams() {
    let scratch = ModuleData::root(Symbol::new("td_dedup"), None, true);
    let ty = Runtime::global().define_struct(
        &scratch,
        "Twice",
        &[("n", intern::CORE.int64.clone())],
        true,
    );
    let rec = Runtime::global().allocate(ty.as_type().unwrap()).unwrap();
    set_field(&rec, 0, Value::Int64(1));
    let bytes = encode(&rec);

    let rt = Runtime::new();
    let a = Deserializer::with_runtime(bytes.as_slice(), rt.clone())
        .deserialize()
        .unwrap();
    let b = Deserializer::with_runtime(bytes.as_slice(), rt)
        .deserialize()
        .unwrap();
    assert!(Arc::ptr_eq(&record_type(&a).name, &record_type(&b).name));
    assert!(!a.egal(&b), "instances stay distinct; only the type fuses");
}

#[test]
fn sandbox_name_collision_renames_the_second_type() {
    let scratch = ModuleData::root(Symbol::new("td_collide"), None, true);
    let make = |field: &str| {
        let ty = Runtime::global().define_struct(
            &scratch,
            "SameName",
            &[(field, intern::CORE.any.clone())],
            true,
        );
        let rec = Runtime::global().allocate(ty.as_type().unwrap()).unwrap();
        encode(&rec)
    };
    let first = make("alpha");
    let second = make("beta");

    let rt = Runtime::new();
    let a = Deserializer::with_runtime(first.as_slice(), rt.clone())
        .deserialize()
        .unwrap();
    let b = Deserializer::with_runtime(second.as_slice(), rt.clone())
        .deserialize()
        .unwrap();
    let (ta, tb) = (record_type(&a), record_type(&b));
    assert!(!Arc::ptr_eq(&ta.name, &tb.name));
    assert_eq!(ta.name.name, Symbol::new("SameName"));
    assert!(tb.name.name.as_str().starts_with("SameName##"));
    assert!(rt
        .sandbox()
        .get_binding(tb.name.name)
        .is_some());
}

#[test]
fn anonymous_callable_reinstalls_its_methods() {
    let root = ModuleData::root(Symbol::new("td_anon"), None, false);
    Runtime::global().register_root(&root);
    let fty = Runtime::global().define_callable(
        &root,
        "worker",
        &[("captured", intern::CORE.any.clone())],
    );
    let tn = fty.as_type().unwrap().name.clone();
    let mut md = MethodData::new(
        root.clone(),
        Symbol::new("worker"),
        Symbol::new("jobs/worker.src"),
        3,
    );
    // The signature names the callable's own type; the cycle must survive.
    md.sig = Value::tuple(vec![fty.clone(), intern::CORE.int64.clone()]);
    md.nargs = 2;
    md.slot_names = Value::simple_vec(vec![Value::symbol("self"), Value::symbol("n")]);
    Runtime::global().install_methods(&tn, vec![Value::method(md)]);

    let bytes = encode(&fty);
    let rt = Runtime::new();
    rt.register_root(&root);
    let back = Deserializer::with_runtime(bytes.as_slice(), rt.clone())
        .deserialize()
        .unwrap();
    let dt = back.as_type().unwrap();
    assert!(dt.name.is_anonymous());
    assert!(!Arc::ptr_eq(&dt.name, &tn), "full descriptor synthesizes");
    let methods = dt.name.methods.read().clone();
    assert_eq!(methods.len(), 1);
    if let Value::Method(m) = &methods[0] {
        let m = m.read();
        assert_eq!(m.name, Symbol::new("worker"));
        assert_eq!(m.line, 3);
        assert_eq!(m.nargs, 2);
        // The reinstalled signature closes back on the synthesized type.
        if let Value::Tuple(sig) = &m.sig {
            assert!(sig[0].egal(&back));
        } else {
            panic!("expected tuple signature");
        }
    } else {
        panic!("expected method");
    }
    assert_eq!(dt.name.info.read().max_args, 2);
}

#[test]
fn full_globalref_travels_as_a_type_payload() {
    let root = ModuleData::root(Symbol::new("td_fgref"), None, false);
    Runtime::global().register_root(&root);
    let fty = Runtime::global().define_callable(&root, "closure", &[]);
    let name = fty.as_type().unwrap().name.name;
    let gref = Value::global_ref(root.clone(), name);

    let bytes = encode(&gref);
    assert_eq!(
        bytes[8],
        tags::FULL_GLOBALREF_TAG,
        "anonymous targets force the full form"
    );
    let rt = Runtime::new();
    rt.register_root(&root);
    let back = Deserializer::with_runtime(bytes.as_slice(), rt.clone())
        .deserialize()
        .unwrap();
    if let Value::GlobalRef(g) = &back {
        assert!(Arc::ptr_eq(&g.module, &rt.sandbox()));
        assert_eq!(g.name, name);
    } else {
        panic!("expected global ref");
    }
}

#[test]
fn method_roundtrip_keeps_versioned_fields() {
    let root = ModuleData::root(Symbol::new("td_method"), None, false);
    Runtime::global().register_root(&root);
    let mut md = MethodData::new(
        root.clone(),
        Symbol::new("step"),
        Symbol::new("engine/step.src"),
        12,
    );
    md.sig = Value::tuple(vec![intern::CORE.int64.clone()]);
    md.nargs = 1;
    md.isva = true;
    md.constprop = 2;
    md.purity = 5;
    md.source = Some(Value::expr("block", vec![Value::symbol("body")]));
    md.recursion_relation = Some(Value::symbol("shallow"));
    let m = Value::method(md);

    let rt = Runtime::new();
    rt.register_root(&root);
    let back = Deserializer::with_runtime(encode(&m).as_slice(), rt)
        .deserialize()
        .unwrap();
    if let Value::Method(got) = &back {
        let got = got.read();
        assert_eq!(got.name, Symbol::new("step"));
        assert!(got.isva);
        assert_eq!(got.constprop, 2);
        assert_eq!(got.purity, 5);
        assert!(got.source.is_some());
        assert!(got
            .recursion_relation
            .as_ref()
            .unwrap()
            .deep_eq(&Value::symbol("shallow")));
    } else {
        panic!("expected method");
    }
}

#[test]
fn misspelled_legacy_extras_key_is_tolerated() {
    let root = ModuleData::root(Symbol::new("td_typo"), None, false);
    let mut md = MethodData::new(
        root.clone(),
        Symbol::new("legacy"),
        Symbol::new("old/producer.src"),
        8,
    );
    md.recursion_relation = Some(Value::symbol("shallow"));
    let bytes = encode(&Value::method(md));

    // Rewrite the extras key the way pre-fix producers spelled it.
    let needle: Vec<u8> = {
        let mut v = vec![tags::SYMBOL_TAG, 18];
        v.extend_from_slice(b"recursion_relation");
        v
    };
    let replacement: Vec<u8> = {
        let mut v = vec![tags::SYMBOL_TAG, 17];
        v.extend_from_slice(b"recusion_relation");
        v
    };
    let patched = replace_once(&bytes, &needle, &replacement);

    let rt = Runtime::new();
    rt.register_root(&root);
    let back = Deserializer::with_runtime(patched.as_slice(), rt)
        .deserialize()
        .unwrap();
    if let Value::Method(m) = &back {
        assert!(m
            .read()
            .recursion_relation
            .as_ref()
            .unwrap()
            .deep_eq(&Value::symbol("shallow")));
    } else {
        panic!("expected method");
    }
}

fn replace_once(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let pos = haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("pattern must occur");
    let mut out = Vec::with_capacity(haystack.len());
    out.extend_from_slice(&haystack[..pos]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&haystack[pos + needle.len()..]);
    out
}

#[test]
fn external_dispatch_methods_refuse_to_serialize() {
    let root = ModuleData::root(Symbol::new("td_ext"), None, false);
    let mut md = MethodData::new(
        root,
        Symbol::new("foreign"),
        Symbol::new("elsewhere.src"),
        1,
    );
    md.external = true;
    let mut bytes = Vec::new();
    let err = serialize(&mut bytes, &Value::method(md)).unwrap_err();
    assert!(matches!(err, JoltError::Unsupported(_)));
}

#[test]
fn unknown_root_module_is_an_error() {
    let root = ModuleData::root(Symbol::new("td_missing_pkg"), None, false);
    Runtime::global().register_root(&root);
    let ty = Runtime::global().define_struct(
        &root,
        "Orphan",
        &[("v", intern::CORE.any.clone())],
        false,
    );
    let rec = Runtime::global().allocate(ty.as_type().unwrap()).unwrap();
    let bytes = encode(&rec);

    // A runtime that never registered the package cannot resolve the path.
    let rt = Runtime::new();
    let err = Deserializer::with_runtime(bytes.as_slice(), rt)
        .deserialize()
        .unwrap_err();
    assert!(matches!(err, JoltError::UnknownModule { .. }));
}
