//! Writer state and the value encoder.
//!
//! One entry point, [`Serializer::serialize`], dispatches on the value kind.
//! Sharing discipline (who gets a back-reference slot, and when) is the
//! contract both sides must agree on:
//!
//! - mutable aggregates reserve their slot *before* their type and fields go
//!   out, so a field can close a cycle with a back-reference;
//! - immutable aggregates are looked up first, emitted inline, then recorded
//!   at the next counter value (the reader mirrors this with
//!   `resolve_ref_immediately`);
//! - strings longer than 7 bytes are canonicalized by content, symbols
//!   longer than 7 bytes by interned identity;
//! - literal-tag values are never tracked at all.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::dtype::defs::{stable_number, DataType, TypeName};
use crate::intern;
use crate::module::ModuleData;
use crate::tags::{self, StreamHeader};
use crate::utils::error::{JoltError, JoltResult};
use crate::utils::ref_id::ObjId;
use crate::value::array::ArrayStorage;
use crate::value::defs::{GlobalRefData, MethodData, RecordData, RecordRepr, Value};
use crate::value::dict::{DictData, DictKind};
use crate::value::symbol::Symbol;

/// Per-stream writer state.
pub struct Serializer<W: Write> {
    out: W,
    counter: u64,
    table: HashMap<ObjId, u64>,
    /// Content-canonicalized strings (length > 7).
    strings: HashMap<String, u64>,
    /// Slot-tracked symbols (length > 7).
    symbols: HashMap<Symbol, u64>,
    pending: Vec<u64>,
    version: u8,
}

impl<W: Write> Serializer<W> {
    pub fn new(out: W) -> Serializer<W> {
        Serializer {
            out,
            counter: 0,
            table: HashMap::new(),
            strings: HashMap::new(),
            symbols: HashMap::new(),
            pending: Vec::new(),
            version: tags::PROTOCOL_VERSION,
        }
    }

    /// A writer pinned to an older protocol version. The stream omits
    /// everything gated on a newer version, exactly as a peer of that
    /// version would have written it.
    pub fn with_version(out: W, version: u8) -> JoltResult<Serializer<W>> {
        if !(tags::MIN_VERSION..=tags::PROTOCOL_VERSION).contains(&version) {
            return Err(JoltError::VersionMismatch {
                peer: version,
                supported: tags::PROTOCOL_VERSION,
            });
        }
        let mut s = Serializer::new(out);
        s.version = version;
        Ok(s)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Recycle the writer for a fresh stream: counter back to zero, all
    /// sharing tables cleared.
    pub fn reset(&mut self) {
        self.counter = 0;
        self.table.clear();
        self.strings.clear();
        self.symbols.clear();
        self.pending.clear();
    }

    /// Write the 8-byte stream header.
    pub fn write_header(&mut self) -> JoltResult<()> {
        let header = StreamHeader::for_host(self.version).encode();
        self.put(&header)
    }

    fn put(&mut self, bytes: &[u8]) -> JoltResult<()> {
        self.out.write_all(bytes)?;
        Ok(())
    }

    fn emit_tag(&mut self, tag: u8) -> JoltResult<()> {
        self.put(&[tag])
    }

    /// Emit a tag in value position. Tags below the literal band need the
    /// zero-byte escape so the reader takes them as a tag-literal rather
    /// than an operator.
    fn emit_as_value(&mut self, tag: u8) -> JoltResult<()> {
        if tag < tags::VALUE_TAGS {
            self.put(&[0, tag])
        } else {
            self.put(&[tag])
        }
    }

    fn emit_backref(&mut self, slot: u64) -> JoltResult<()> {
        if slot <= u16::MAX as u64 {
            self.emit_tag(tags::SHORTBACKREF_TAG)?;
            self.put(&(slot as u16).to_ne_bytes())
        } else if slot <= u32::MAX as u64 {
            self.emit_tag(tags::BACKREF_TAG)?;
            self.put(&(slot as u32).to_ne_bytes())
        } else {
            self.emit_tag(tags::LONGBACKREF_TAG)?;
            self.put(&slot.to_ne_bytes())
        }
    }

    /// Emit the narrowest back-reference if `key` already has a slot.
    fn try_backref(&mut self, key: ObjId) -> JoltResult<bool> {
        if let Some(&slot) = self.table.get(&key) {
            self.emit_backref(slot)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Pre-order slot reservation for a mutable value.
    fn reserve(&mut self, key: ObjId) -> u64 {
        let slot = self.counter;
        self.counter += 1;
        self.table.insert(key, slot);
        slot
    }

    /// Post-order slot for an atomically-finished value that cannot
    /// self-refer but may be pointed at again.
    fn note_immediate(&mut self, key: ObjId) {
        let slot = self.counter;
        self.counter += 1;
        self.table.insert(key, slot);
    }

    /// Encode one value.
    pub fn serialize(&mut self, v: &Value) -> JoltResult<()> {
        if let Some(tag) = intern::literal_tag(v) {
            return self.emit_as_value(tag);
        }
        match v {
            // Always caught by the literal table above; kept total anyway.
            Value::Nothing => self.emit_as_value(tags::NOTHING_TAG),
            Value::Bool(b) => {
                self.emit_as_value(if *b { tags::TRUE_TAG } else { tags::FALSE_TAG })
            }
            Value::Int8(x) => {
                self.emit_tag(tags::INT8_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::Int16(x) => {
                self.emit_tag(tags::INT16_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::Int32(x) => {
                self.emit_tag(tags::INT32_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::Int64(x) => {
                if let Ok(short) = i32::try_from(*x) {
                    self.emit_tag(tags::SHORTINT64_TAG)?;
                    self.put(&short.to_ne_bytes())
                } else {
                    self.emit_tag(tags::INT64_TAG)?;
                    self.put(&x.to_ne_bytes())
                }
            }
            Value::Int128(x) => {
                self.emit_tag(tags::INT128_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::UInt8(x) => {
                self.emit_tag(tags::UINT8_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::UInt16(x) => {
                self.emit_tag(tags::UINT16_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::UInt32(x) => {
                self.emit_tag(tags::UINT32_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::UInt64(x) => {
                self.emit_tag(tags::UINT64_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::UInt128(x) => {
                self.emit_tag(tags::UINT128_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::Float16(bits) => {
                self.emit_tag(tags::FLOAT16_TAG)?;
                self.put(&bits.to_ne_bytes())
            }
            Value::Float32(x) => {
                self.emit_tag(tags::FLOAT32_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::Float64(x) => {
                self.emit_tag(tags::FLOAT64_TAG)?;
                self.put(&x.to_ne_bytes())
            }
            Value::Char(c) => {
                self.emit_tag(tags::CHAR_TAG)?;
                self.put(&(*c as u32).to_ne_bytes())
            }
            Value::Str(s) => self.serialize_string(s),
            Value::Symbol(s) => self.serialize_symbol(*s),
            Value::Tuple(items) => {
                let key = ObjId::of(items);
                if self.try_backref(key)? {
                    return Ok(());
                }
                if items.len() <= u8::MAX as usize {
                    self.emit_tag(tags::TUPLE_TAG)?;
                    self.put(&[items.len() as u8])?;
                } else {
                    self.emit_tag(tags::LONGTUPLE_TAG)?;
                    self.put(&(items.len() as u32).to_ne_bytes())?;
                }
                for item in items.iter() {
                    self.serialize(item)?;
                }
                self.note_immediate(key);
                Ok(())
            }
            Value::SimpleVec(items) => {
                let key = ObjId::of(items);
                if self.try_backref(key)? {
                    return Ok(());
                }
                self.emit_tag(tags::SIMPLEVECTOR_TAG)?;
                self.put(&(items.len() as u32).to_ne_bytes())?;
                for item in items.iter() {
                    self.serialize(item)?;
                }
                self.note_immediate(key);
                Ok(())
            }
            Value::Array(a) => self.serialize_array(a),
            Value::Record(r) => self.serialize_record(r),
            Value::Dict(d) => self.serialize_dict(d),
            Value::Expr(e) => self.serialize_expr(e),
            Value::Type(dt) => self.serialize_datatype(dt),
            Value::TypeName(tn) => self.serialize_typename(tn),
            Value::Module(m) => self.serialize_module(m),
            Value::Method(m) => self.serialize_method(m),
            Value::Frame(f) => self.serialize_frame(f),
            Value::Task(t) => self.serialize_task(t),
            Value::GlobalRef(g) => self.serialize_globalref(g),
        }
    }

    fn serialize_symbol(&mut self, sym: Symbol) -> JoltResult<()> {
        // Interned symbols never reach this point; serialize() catches them.
        let text = sym.as_str();
        if text.len() > 7 {
            if let Some(&slot) = self.symbols.get(&sym) {
                return self.emit_backref(slot);
            }
            let slot = self.counter;
            self.counter += 1;
            self.symbols.insert(sym, slot);
        }
        if text.len() <= u8::MAX as usize {
            self.emit_tag(tags::SYMBOL_TAG)?;
            self.put(&[text.len() as u8])?;
        } else {
            self.emit_tag(tags::LONGSYMBOL_TAG)?;
            self.put(&(text.len() as u32).to_ne_bytes())?;
        }
        self.put(text.as_bytes())
    }

    fn serialize_string(&mut self, s: &Arc<String>) -> JoltResult<()> {
        let len = s.len();
        if len > 7 {
            if let Some(&slot) = self.strings.get(s.as_str()) {
                return self.emit_backref(slot);
            }
            let slot = self.counter;
            self.counter += 1;
            self.strings.insert(s.as_str().to_string(), slot);
            self.emit_tag(tags::SHARED_REF_TAG)?;
        }
        if len <= u8::MAX as usize {
            self.emit_tag(tags::STRING_TAG)?;
            self.put(&[len as u8])?;
        } else {
            self.emit_tag(tags::LONGSTRING_TAG)?;
            self.put(&(len as u64).to_ne_bytes())?;
        }
        self.put(s.as_bytes())
    }

    fn serialize_array(&mut self, a: &Arc<RwLock<crate::value::array::ArrayData>>) -> JoltResult<()> {
        let key = ObjId::of(a);
        if self.try_backref(key)? {
            return Ok(());
        }
        let slot = self.reserve(key);
        self.pending.push(slot);
        self.emit_tag(tags::ARRAY_TAG)?;

        let (elem, dims) = {
            let ad = a.read();
            (ad.elem, ad.dims.clone())
        };
        // A byte array's element descriptor is implied; the reader tells the
        // cases apart by whether the first value is a type.
        if elem != crate::value::array::ElemType::UInt8 {
            self.serialize(&intern::elem_type_value(elem))?;
        }
        if dims.len() == 1 {
            self.serialize(&Value::Int64(dims[0] as i64))?;
        } else {
            self.emit_tag(tags::TUPLE_TAG)?;
            self.put(&[dims.len() as u8])?;
            for d in dims.iter() {
                self.serialize(&Value::Int64(*d as i64))?;
            }
            self.counter += 1; // the shape tuple's post-order slot
        }

        let storage = a.read().storage.clone();
        match &storage {
            ArrayStorage::Bits(bytes) => self.put(bytes)?,
            ArrayStorage::Bools(bits) => self.write_bool_rle(bits)?,
            ArrayStorage::Boxed(elems) => {
                for e in elems {
                    match e {
                        Some(v) => self.serialize(v)?,
                        None => self.emit_tag(tags::UNDEFREF_TAG)?,
                    }
                }
            }
        }
        self.pending.pop();
        Ok(())
    }

    /// Boolean elements travel run-length encoded: `(bit << 7) | run`, runs
    /// capped at 127.
    fn write_bool_rle(&mut self, bits: &[bool]) -> JoltResult<()> {
        let mut i = 0usize;
        while i < bits.len() {
            let bit = bits[i];
            let mut run = 1usize;
            while run < 127 && i + run < bits.len() && bits[i + run] == bit {
                run += 1;
            }
            self.put(&[((bit as u8) << 7) | run as u8])?;
            i += run;
        }
        Ok(())
    }

    fn serialize_record(&mut self, r: &Arc<RwLock<RecordData>>) -> JoltResult<()> {
        let key = ObjId::of(r);
        let (ty, repr) = {
            let rd = r.read();
            (rd.ty.clone(), rd.repr.clone())
        };
        match repr {
            RecordRepr::Bits(bytes) => {
                self.emit_tag(tags::OBJECT_TAG)?;
                self.serialize(&Value::Type(ty))?;
                self.put(&bytes)
            }
            RecordRepr::Fields(fields) => {
                let (has_instance, is_mutable) = {
                    let info = ty.name.info.read();
                    (info.has_instance, info.is_mutable)
                };
                if has_instance {
                    self.emit_tag(tags::OBJECT_TAG)?;
                    return self.serialize(&Value::Type(ty));
                }
                if self.try_backref(key)? {
                    return Ok(());
                }
                if is_mutable {
                    let slot = self.reserve(key);
                    self.pending.push(slot);
                    self.emit_tag(tags::REF_OBJECT_TAG)?;
                    self.serialize(&Value::Type(ty))?;
                    for field in &fields {
                        match field {
                            Some(v) => self.serialize(v)?,
                            None => self.emit_tag(tags::UNDEFREF_TAG)?,
                        }
                    }
                    self.pending.pop();
                    Ok(())
                } else {
                    self.emit_tag(tags::OBJECT_TAG)?;
                    self.serialize(&Value::Type(ty))?;
                    for field in &fields {
                        match field {
                            Some(v) => self.serialize(v)?,
                            None => self.emit_tag(tags::UNDEFREF_TAG)?,
                        }
                    }
                    self.note_immediate(key);
                    Ok(())
                }
            }
        }
    }

    fn serialize_dict(&mut self, d: &Arc<RwLock<DictData>>) -> JoltResult<()> {
        let key = ObjId::of(d);
        if self.try_backref(key)? {
            return Ok(());
        }
        let (kind, entries) = {
            let dd = d.read();
            (dd.kind, dd.entries.clone())
        };
        let slot = self.reserve(key);
        self.pending.push(slot);
        match kind {
            DictKind::Identity => self.emit_tag(tags::IDDICT_TAG)?,
            DictKind::Hashed => self.emit_tag(tags::REF_OBJECT_TAG)?,
        }
        let dict_type = intern::CORE.dict_type(kind).clone();
        self.serialize(&dict_type)?;
        self.put(&(entries.len() as u32).to_ne_bytes())?;
        for (k, v) in &entries {
            self.serialize(k)?;
            self.serialize(v)?;
        }
        self.pending.pop();
        Ok(())
    }

    fn serialize_expr(&mut self, e: &Arc<RwLock<crate::value::defs::ExprData>>) -> JoltResult<()> {
        let key = ObjId::of(e);
        if self.try_backref(key)? {
            return Ok(());
        }
        let (head, args) = {
            let ed = e.read();
            (ed.head, ed.args.clone())
        };
        let slot = self.reserve(key);
        self.pending.push(slot);
        if args.len() <= u8::MAX as usize {
            self.emit_tag(tags::EXPR_TAG)?;
            self.put(&[args.len() as u8])?;
        } else {
            self.emit_tag(tags::LONGEXPR_TAG)?;
            self.put(&(args.len() as u32).to_ne_bytes())?;
        }
        self.serialize(&Value::Symbol(head))?;
        for arg in &args {
            self.serialize(arg)?;
        }
        self.pending.pop();
        Ok(())
    }

    fn serialize_datatype(&mut self, dt: &Arc<DataType>) -> JoltResult<()> {
        let key = ObjId::of(dt);
        if self.try_backref(key)? {
            return Ok(());
        }
        let tn = &dt.name;
        // Resolvable by name: the owning module really binds this name to
        // the wrapper, and the name is neither synthetic nor anonymous.
        let resolvable = !tn.module.sandbox
            && !tn.is_anonymous()
            && matches!(tn.module.get_binding(tn.name), Some(Value::Type(w)) if tn.is_wrapper(&w));
        self.reserve(key);
        if resolvable {
            self.emit_tag(tags::DATATYPE_TAG)?;
            self.serialize(&Value::Symbol(tn.name))?;
            self.serialize(&Value::Module(tn.module.clone()))?;
            self.put(&(dt.params.len() as u32).to_ne_bytes())?;
            for p in &dt.params {
                self.serialize(p)?;
            }
        } else if tn.is_wrapper(dt) {
            self.emit_tag(tags::WRAPPER_DATATYPE_TAG)?;
            self.serialize(&Value::TypeName(tn.clone()))?;
        } else {
            self.emit_tag(tags::FULL_DATATYPE_TAG)?;
            self.serialize(&Value::TypeName(tn.clone()))?;
            self.put(&(dt.params.len() as u32).to_ne_bytes())?;
            for p in &dt.params {
                self.serialize(p)?;
            }
        }
        Ok(())
    }

    fn serialize_typename(&mut self, tn: &Arc<TypeName>) -> JoltResult<()> {
        let key = ObjId::of(tn);
        if self.try_backref(key)? {
            return Ok(());
        }
        let slot = self.reserve(key);
        self.pending.push(slot);
        self.emit_tag(tags::TYPENAME_TAG)?;
        self.put(&stable_number(key).to_ne_bytes())?;
        self.serialize(&Value::Symbol(tn.name))?;

        let (field_names, supertype, parameters, field_types, flags, n_initialized, max_args) = {
            let info = tn.info.read();
            (
                info.field_names.clone(),
                info.supertype.clone(),
                info.parameters.clone(),
                info.field_types.clone(),
                (info.has_instance, info.is_abstract, info.is_mutable),
                info.n_initialized,
                info.max_args,
            )
        };
        self.write_symbol_list(&field_names)?;
        match &supertype {
            Some(s) => self.serialize(s)?,
            None => self.serialize(&Value::Nothing)?,
        }
        self.write_value_list(&parameters)?;
        self.write_value_list(&field_types)?;
        self.serialize(&Value::Bool(flags.0))?;
        self.serialize(&Value::Bool(flags.1))?;
        self.serialize(&Value::Bool(flags.2))?;
        self.serialize(&Value::Int32(n_initialized as i32))?;
        self.serialize(&Value::Int32(max_args as i32))?;

        let methods = tn.methods.read().clone();
        if methods.is_empty() {
            self.serialize(&Value::Nothing)?;
        } else {
            self.write_value_list(&methods)?;
        }
        self.pending.pop();
        Ok(())
    }

    /// Emit a simple vector without materializing one; takes the post-order
    /// slot a real simple vector would, keeping both counters aligned.
    fn write_value_list(&mut self, items: &[Value]) -> JoltResult<()> {
        self.emit_tag(tags::SIMPLEVECTOR_TAG)?;
        self.put(&(items.len() as u32).to_ne_bytes())?;
        for item in items {
            self.serialize(item)?;
        }
        self.counter += 1;
        Ok(())
    }

    fn write_symbol_list(&mut self, names: &[Symbol]) -> JoltResult<()> {
        self.emit_tag(tags::SIMPLEVECTOR_TAG)?;
        self.put(&(names.len() as u32).to_ne_bytes())?;
        for name in names {
            self.serialize(&Value::Symbol(*name))?;
        }
        self.counter += 1;
        Ok(())
    }

    fn serialize_module(&mut self, m: &Arc<ModuleData>) -> JoltResult<()> {
        let key = ObjId::of(m);
        if self.try_backref(key)? {
            return Ok(());
        }
        self.reserve(key);
        self.emit_tag(tags::MODULE_TAG)?;
        let (root, path) = m.path_from_root();
        match root.uuid {
            Some(u) => self.serialize(&Value::UInt128(u.as_u128()))?,
            None => self.serialize(&Value::Nothing)?,
        }
        self.serialize(&Value::Symbol(root.name))?;
        for name in path {
            self.serialize(&Value::Symbol(name))?;
        }
        self.emit_as_value(tags::EMPTYTUPLE_TAG)
    }

    fn serialize_method(&mut self, m: &Arc<RwLock<MethodData>>) -> JoltResult<()> {
        let key = ObjId::of(m);
        if self.try_backref(key)? {
            return Ok(());
        }
        let md = m.read();
        if md.external {
            return Err(JoltError::Unsupported(format!(
                "method '{}' has an external dispatch table",
                md.name
            )));
        }
        let slot = self.reserve(key);
        self.pending.push(slot);
        self.emit_tag(tags::METHOD_TAG)?;
        self.put(&stable_number(key).to_ne_bytes())?;
        self.serialize(&Value::Module(md.module.clone()))?;
        self.serialize(&Value::Symbol(md.name))?;
        self.serialize(&Value::Symbol(md.file))?;
        self.serialize(&Value::Int32(md.line))?;
        self.serialize(&md.sig)?;
        self.serialize(&md.slot_names)?;
        self.serialize(&Value::Int32(md.nargs))?;
        self.serialize(&Value::Bool(md.isva))?;
        self.serialize(&Value::Bool(md.is_opaque))?;
        if self.version >= tags::VER_INFERENCE_FLAGS {
            self.put(&[md.constprop, md.purity])?;
        }
        match &md.source {
            Some(src) => self.serialize(src)?,
            None => self.serialize(&Value::Nothing)?,
        }
        match &md.generator {
            Some(g) => self.serialize(g)?,
            None => self.serialize(&Value::Nothing)?,
        }
        if self.version >= tags::VER_METHOD_EXTRAS {
            if let Some(rr) = &md.recursion_relation {
                self.serialize(&Value::symbol("recursion_relation"))?;
                self.serialize(rr)?;
            }
            self.emit_as_value(tags::EMPTYTUPLE_TAG)?;
        }
        drop(md);
        self.pending.pop();
        Ok(())
    }

    fn serialize_frame(&mut self, f: &Arc<RwLock<crate::value::defs::FrameData>>) -> JoltResult<()> {
        let key = ObjId::of(f);
        if self.try_backref(key)? {
            return Ok(());
        }
        let slot = self.reserve(key);
        self.pending.push(slot);
        self.emit_tag(tags::FRAME_TAG)?;
        self.put(&stable_number(key).to_ne_bytes())?;
        let (def, spec_types, sparams) = {
            let fd = f.read();
            (fd.def.clone(), fd.spec_types.clone(), fd.sparams.clone())
        };
        self.serialize(&def)?;
        self.serialize(&spec_types)?;
        if self.version >= tags::VER_FRAME_SPARAMS {
            self.serialize(&sparams)?;
        }
        self.pending.pop();
        Ok(())
    }

    fn serialize_task(&mut self, t: &Arc<RwLock<crate::value::defs::TaskData>>) -> JoltResult<()> {
        let key = ObjId::of(t);
        let state_sym = {
            let td = t.read();
            td.state
                .symbol()
                .ok_or_else(|| JoltError::Unsupported("cannot serialize a running task".into()))?
        };
        if self.try_backref(key)? {
            return Ok(());
        }
        let slot = self.reserve(key);
        self.pending.push(slot);
        self.emit_tag(tags::TASK_TAG)?;
        let (body, storage, result, failed) = {
            let td = t.read();
            (
                td.body.clone(),
                td.storage.clone(),
                td.result.clone(),
                td.failed,
            )
        };
        self.serialize(&body)?;
        self.serialize(&storage)?;
        self.serialize(&Value::Symbol(state_sym))?;
        self.serialize(&result)?;
        self.serialize(&Value::Bool(failed))?;
        self.pending.pop();
        Ok(())
    }

    fn serialize_globalref(&mut self, g: &Arc<GlobalRefData>) -> JoltResult<()> {
        let binding = g.module.get_binding(g.name);
        let full_type = match &binding {
            Some(Value::Type(dt)) if g.module.sandbox || dt.name.is_anonymous() => {
                Some(dt.clone())
            }
            _ => None,
        };
        match full_type {
            Some(dt) => {
                self.emit_tag(tags::FULL_GLOBALREF_TAG)?;
                self.serialize(&Value::Type(dt))
            }
            None => {
                self.emit_tag(tags::GLOBALREF_TAG)?;
                self.serialize(&Value::Module(g.module.clone()))?;
                self.serialize(&Value::Symbol(g.name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::array::ArrayData;

    fn encode(v: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        let mut s = Serializer::new(&mut out);
        s.serialize(v).unwrap();
        out
    }

    #[test]
    fn small_int64_is_one_byte() {
        assert_eq!(encode(&Value::Int64(5)), vec![tags::INT64_LITERALS_BASE + 5]);
        assert_eq!(encode(&Value::Int32(0)), vec![tags::INT32_LITERALS_BASE]);
    }

    #[test]
    fn int64_outside_literal_range_narrows_to_shortint64() {
        let bytes = encode(&Value::Int64(40));
        assert_eq!(bytes[0], tags::SHORTINT64_TAG);
        assert_eq!(bytes.len(), 5);
        let wide = encode(&Value::Int64(1 << 40));
        assert_eq!(wide[0], tags::INT64_TAG);
        assert_eq!(wide.len(), 9);
    }

    #[test]
    fn interned_type_is_one_byte() {
        let bytes = encode(&intern::CORE.int64);
        assert_eq!(bytes.len(), 1);
        assert!(bytes[0] >= tags::VALUE_TAGS);
    }

    #[test]
    fn bool_rle_splits_long_runs() {
        let mut bits = vec![true; 128];
        bits.extend(vec![false; 128]);
        bits.extend(vec![true; 44]);
        let v = Value::array(ArrayData::bools(bits));
        let bytes = encode(&v);
        // ARRAY, elem type (1 byte, interned Bool), shape (Int64 300 =>
        // SHORTINT64 + 4), then the five run bytes.
        let runs = &bytes[bytes.len() - 5..];
        assert_eq!(runs, &[0xFF, 0x81, 0x7F, 0x01, 0xAC]);
    }

    #[test]
    fn shared_string_layout_matches_contract() {
        let s = Value::string("abcdefghij");
        let t = Value::tuple(vec![s.clone(), s]);
        let bytes = encode(&t);
        let mut expect = vec![tags::TUPLE_TAG, 2, tags::SHARED_REF_TAG, tags::STRING_TAG, 10];
        expect.extend(b"abcdefghij");
        expect.extend([tags::SHORTBACKREF_TAG]);
        expect.extend(0u16.to_ne_bytes());
        assert_eq!(bytes, expect);
    }

    #[test]
    fn short_strings_are_not_shared() {
        let s = Value::string("ab");
        let t = Value::tuple(vec![s.clone(), s]);
        let bytes = encode(&t);
        let expect = vec![
            tags::TUPLE_TAG,
            2,
            tags::STRING_TAG,
            2,
            b'a',
            b'b',
            tags::STRING_TAG,
            2,
            b'a',
            b'b',
        ];
        assert_eq!(bytes, expect);
    }

    #[test]
    fn running_task_refuses() {
        use crate::value::defs::{TaskData, TaskState};
        let mut td = TaskData::placeholder();
        td.state = TaskState::Running;
        let v = Value::Task(Arc::new(RwLock::new(td)));
        let mut out = Vec::new();
        let mut s = Serializer::new(&mut out);
        assert!(matches!(
            s.serialize(&v),
            Err(JoltError::Unsupported(_))
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn escape_prefixes_sub_literal_tags() {
        let mut out = Vec::new();
        let mut s = Serializer::new(&mut out);
        s.emit_as_value(tags::INT64_TAG).unwrap();
        s.emit_as_value(tags::TRUE_TAG).unwrap();
        assert_eq!(out, vec![0, tags::INT64_TAG, tags::TRUE_TAG]);
    }
}
