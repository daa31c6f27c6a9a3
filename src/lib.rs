//! Joltwire: a self-describing binary codec for cyclic object graphs.
//!
//! The crate converts in-memory [`Value`] graphs (primitives, strings,
//! symbols, tuples, arrays, records, dictionaries, type descriptors, module
//! references, method and call-frame records) into a compact tag-driven
//! byte stream and back, preserving identity for mutable objects and
//! restoring cycles and shared substructure.
//!
//! Encoding shape
//! - Every value opens with a one-byte tag; a band of *literal* tags encodes
//!   common singletons and small integers in the tag byte itself. See
//!   [`tags`].
//! - Sharable values get back-reference slots in visitation order; a second
//!   occurrence is a two-to-nine-byte back-reference instead of a re-emit.
//! - Mutable objects are allocated before their fields are read, so a field
//!   can point back at its owner.
//! - A stream opens with an 8-byte header (`7JL`, version, endianness and
//!   word-size flags); payloads are native-endian and a reader refuses a
//!   stream from the other endianness.
//!
//! ```
//! use joltwire::{deserialize, serialize, Value};
//!
//! let s = Value::string("abcdefghij");
//! let v = Value::tuple(vec![s.clone(), s]);
//! let mut bytes = Vec::new();
//! serialize(&mut bytes, &v).unwrap();
//! let back = deserialize(bytes.as_slice()).unwrap();
//! assert!(back.deep_eq(&v));
//! ```

pub mod de;
pub mod dtype;
pub mod intern;
pub mod module;
pub mod runtime;
pub mod ser;
pub mod tags;
pub mod utils;
pub mod value;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub use de::Deserializer;
pub use ser::Serializer;
pub use utils::error::{JoltError, JoltResult};
pub use value::{Symbol, Value};

/// Write a stream header followed by one encoded value.
pub fn serialize<W: Write>(sink: W, value: &Value) -> JoltResult<()> {
    let mut s = Serializer::new(sink);
    s.write_header()?;
    s.serialize(value)
}

/// Encode one value into an existing session, no header. Successive calls
/// share one slot space, so repeated sub-objects cross value boundaries as
/// back-references.
pub fn serialize_no_header<W: Write>(session: &mut Serializer<W>, value: &Value) -> JoltResult<()> {
    session.serialize(value)
}

/// Read a header (when present) and decode one value.
pub fn deserialize<R: Read>(source: R) -> JoltResult<Value> {
    Deserializer::new(source).deserialize()
}

/// Decode one more value from an existing session.
pub fn deserialize_session<R: Read>(session: &mut Deserializer<R>) -> JoltResult<Value> {
    session.deserialize()
}

/// Serialize to a named file.
pub fn serialize_to_file<P: AsRef<Path>>(path: P, value: &Value) -> JoltResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serialize(&mut out, value)?;
    out.flush()?;
    Ok(())
}

/// Deserialize one value from a named file.
pub fn deserialize_from_file<P: AsRef<Path>>(path: P) -> JoltResult<Value> {
    deserialize(BufReader::new(File::open(path)?))
}
