//! Header layout, version negotiation and tolerance, sessions, and the file
//! helpers.

use joltwire::intern;
use joltwire::module::ModuleData;
use joltwire::runtime::Runtime;
use joltwire::tags;
use joltwire::value::MethodData;
use joltwire::{
    deserialize, deserialize_from_file, deserialize_session, serialize, serialize_no_header,
    serialize_to_file, Deserializer, JoltError, Serializer, Symbol, Value,
};

fn host_flags() -> u8 {
    let endian = cfg!(target_endian = "big") as u8;
    let word = if std::mem::size_of::<usize>() == 4 {
        0u8
    } else {
        1u8
    };
    endian | (word << 2)
}

#[test]
fn header_law() {
    let mut bytes = Vec::new();
    serialize(&mut bytes, &Value::Int64(5)).unwrap();
    assert_eq!(bytes[0], 0x37);
    assert_eq!(&bytes[1..3], b"JL");
    assert_eq!(bytes[3], tags::PROTOCOL_VERSION);
    assert_eq!(bytes[4], host_flags());
    assert_eq!(&bytes[5..8], &[0, 0, 0]);
    assert_eq!(bytes[8], tags::INT64_LITERALS_BASE + 5);
    assert_eq!(bytes.len(), 9);
}

#[test]
fn newer_peer_version_is_refused() {
    let mut bytes = Vec::new();
    serialize(&mut bytes, &Value::Int64(1)).unwrap();
    bytes[3] = tags::PROTOCOL_VERSION + 1;
    let err = deserialize(bytes.as_slice()).unwrap_err();
    assert!(matches!(
        err,
        JoltError::VersionMismatch { peer, .. } if peer == tags::PROTOCOL_VERSION + 1
    ));
}

#[test]
fn foreign_endianness_is_refused() {
    let mut bytes = Vec::new();
    serialize(&mut bytes, &Value::Int64(1)).unwrap();
    bytes[4] ^= 0b01; // flip the endianness field
    let err = deserialize(bytes.as_slice()).unwrap_err();
    assert!(matches!(err, JoltError::BadHeader(_)));
}

#[test]
fn corrupt_magic_is_refused() {
    let mut bytes = Vec::new();
    serialize(&mut bytes, &Value::Int64(1)).unwrap();
    bytes[2] = b'X';
    assert!(matches!(
        deserialize(bytes.as_slice()),
        Err(JoltError::BadHeader(_))
    ));
}

#[test]
fn word_size_is_advisory() {
    let mut bytes = Vec::new();
    serialize(&mut bytes, &Value::Int64(1)).unwrap();
    bytes[4] ^= 0b0100; // flip the word-size field
    assert!(deserialize(bytes.as_slice())
        .unwrap()
        .deep_eq(&Value::Int64(1)));
}

#[test]
fn older_streams_are_accepted() {
    let mut bytes = Vec::new();
    let mut s = Serializer::with_version(&mut bytes, 2).unwrap();
    s.write_header().unwrap();
    s.serialize(&Value::string("from an old peer")).unwrap();
    let mut d = Deserializer::new(bytes.as_slice());
    let back = d.deserialize().unwrap();
    assert!(back.deep_eq(&Value::string("from an old peer")));
    assert_eq!(d.version(), 2);
}

#[test]
fn pinned_writer_rejects_out_of_range_versions() {
    assert!(Serializer::with_version(Vec::new(), 0).is_err());
    assert!(Serializer::with_version(Vec::new(), tags::PROTOCOL_VERSION + 1).is_err());
}

fn sample_method(root: &std::sync::Arc<ModuleData>) -> Value {
    let mut md = MethodData::new(
        root.clone(),
        Symbol::new("tick"),
        Symbol::new("clock/tick.src"),
        21,
    );
    md.sig = Value::tuple(vec![intern::CORE.int64.clone()]);
    md.nargs = 1;
    md.constprop = 9;
    md.purity = 3;
    md.recursion_relation = Some(Value::symbol("bounded"));
    Value::method(md)
}

#[test]
fn v2_streams_default_the_gated_method_fields() {
    let root = ModuleData::root(Symbol::new("hv_v2_pkg"), None, false);
    let m = sample_method(&root);
    let mut bytes = Vec::new();
    let mut s = Serializer::with_version(&mut bytes, 2).unwrap();
    s.write_header().unwrap();
    s.serialize(&m).unwrap();

    let rt = Runtime::new();
    rt.register_root(&root);
    let back = Deserializer::with_runtime(bytes.as_slice(), rt)
        .deserialize()
        .unwrap();
    if let Value::Method(got) = &back {
        let got = got.read();
        assert_eq!(got.constprop, 0, "inference flags arrive in v3");
        assert_eq!(got.purity, 0);
        assert!(got.recursion_relation.is_none(), "extras arrive in v4");
        assert_eq!(got.nargs, 1, "ungated fields still travel");
    } else {
        panic!("expected method");
    }
}

#[test]
fn current_streams_keep_the_gated_method_fields() {
    let root = ModuleData::root(Symbol::new("hv_v4_pkg"), None, false);
    let m = sample_method(&root);
    let mut bytes = Vec::new();
    serialize(&mut bytes, &m).unwrap();

    let rt = Runtime::new();
    rt.register_root(&root);
    let back = Deserializer::with_runtime(bytes.as_slice(), rt)
        .deserialize()
        .unwrap();
    if let Value::Method(got) = &back {
        let got = got.read();
        assert_eq!(got.constprop, 9);
        assert_eq!(got.purity, 3);
        assert!(got
            .recursion_relation
            .as_ref()
            .unwrap()
            .deep_eq(&Value::symbol("bounded")));
    } else {
        panic!("expected method");
    }
}

#[test]
fn headerless_streams_decode_at_the_current_version() {
    let mut bytes = Vec::new();
    let mut s = Serializer::new(&mut bytes);
    s.serialize(&Value::tuple(vec![Value::Int64(1), Value::Bool(true)]))
        .unwrap();
    let back = deserialize(bytes.as_slice()).unwrap();
    assert!(back.deep_eq(&Value::tuple(vec![Value::Int64(1), Value::Bool(true)])));
}

#[test]
fn sessions_share_one_slot_space() {
    let shared = Value::string("shared across roots");
    let mut bytes = Vec::new();
    let mut s = Serializer::new(&mut bytes);
    serialize_no_header(&mut s, &shared).unwrap();
    serialize_no_header(&mut s, &shared).unwrap();

    let mut d = Deserializer::new(bytes.as_slice());
    let first = deserialize_session(&mut d).unwrap();
    let second = deserialize_session(&mut d).unwrap();
    assert!(
        first.egal(&second),
        "the second root must be a back-reference to the first"
    );
}

#[test]
fn serializer_reset_recycles_the_state() {
    let v = Value::string("recycled state body");
    let mut bytes = Vec::new();
    let mut s = Serializer::new(&mut bytes);
    s.serialize(&v).unwrap();
    s.reset();
    s.serialize(&v).unwrap();
    drop(s);
    // After a reset the second emission is a full re-emit, not a backref.
    assert_eq!(bytes.len() % 2, 0);
    let half = bytes.len() / 2;
    assert_eq!(&bytes[..half], &bytes[half..]);
}

#[test]
fn file_helpers_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("value.jolt");
    let v = Value::tuple(vec![
        Value::string("to disk and back"),
        Value::Int64(1 << 40),
    ]);
    serialize_to_file(&path, &v).unwrap();
    let back = deserialize_from_file(&path).unwrap();
    assert!(back.deep_eq(&v));
}

#[test]
fn truncated_stream_is_an_io_error() {
    let mut bytes = Vec::new();
    serialize(&mut bytes, &Value::string("truncate me please")).unwrap();
    bytes.truncate(bytes.len() - 4);
    assert!(matches!(
        deserialize(bytes.as_slice()),
        Err(JoltError::Io(_))
    ));
}
