//! Reader state and the value decoder.
//!
//! One entry point, [`Deserializer::deserialize`], reads a tag and hands it
//! to the matching subroutine. Slot numbering must replay the writer's
//! visitation order exactly; the rules are the mirror image of the encoder's
//! (pre-order reservation for mutables, `resolve_ref_immediately` for
//! finished immutables, at-encounter slots for long strings and symbols).
//! Any disagreement is unrecoverable and surfaces as a desynchronization
//! error.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::dtype::defs::{DataType, TypeName};
use crate::intern;
use crate::runtime::Runtime;
use crate::tags::{self, StreamHeader};
use crate::utils::error::{JoltError, JoltResult};
use crate::value::array::{ArrayStorage, ElemType};
use crate::value::defs::{
    ExprData, FrameData, MethodData, RecordData, RecordRepr, TaskData, TaskState, Value,
};
use crate::value::dict::{DictData, DictKind};
use crate::value::symbol::Symbol;

enum DtForm {
    Named,
    Full,
    Wrapper,
}

/// Per-stream reader state.
pub struct Deserializer<R: Read> {
    input: R,
    counter: u64,
    table: HashMap<u64, Value>,
    pending: Vec<u64>,
    version: u8,
    runtime: Arc<Runtime>,
}

impl<R: Read> Deserializer<R> {
    pub fn new(input: R) -> Deserializer<R> {
        Deserializer::with_runtime(input, Runtime::global())
    }

    pub fn with_runtime(input: R, runtime: Arc<Runtime>) -> Deserializer<R> {
        Deserializer {
            input,
            counter: 0,
            table: HashMap::new(),
            pending: Vec::new(),
            version: tags::PROTOCOL_VERSION,
            runtime,
        }
    }

    /// The negotiated protocol version (the writer's, once a header has been
    /// seen).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Recycle the reader for a fresh stream.
    pub fn reset(&mut self) {
        self.counter = 0;
        self.table.clear();
        self.pending.clear();
    }

    fn read_exact(&mut self, n: usize) -> JoltResult<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.input.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_u8(&mut self) -> JoltResult<u8> {
        let mut b = [0u8; 1];
        self.input.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_u16(&mut self) -> JoltResult<u16> {
        let mut b = [0u8; 2];
        self.input.read_exact(&mut b)?;
        Ok(u16::from_ne_bytes(b))
    }

    fn read_u32(&mut self) -> JoltResult<u32> {
        let mut b = [0u8; 4];
        self.input.read_exact(&mut b)?;
        Ok(u32::from_ne_bytes(b))
    }

    fn read_u64(&mut self) -> JoltResult<u64> {
        let mut b = [0u8; 8];
        self.input.read_exact(&mut b)?;
        Ok(u64::from_ne_bytes(b))
    }

    fn read_i32(&mut self) -> JoltResult<i32> {
        let mut b = [0u8; 4];
        self.input.read_exact(&mut b)?;
        Ok(i32::from_ne_bytes(b))
    }

    pub fn read_tag(&mut self) -> JoltResult<u8> {
        self.read_u8()
    }

    /// The value at an already-assigned slot; absence means the two sides
    /// have lost agreement.
    pub fn gettable(&self, slot: u64) -> JoltResult<Value> {
        self.table
            .get(&slot)
            .cloned()
            .ok_or(JoltError::UnboundSlot { slot })
    }

    /// Pre-order reservation for a mutable value under construction.
    fn reserve_slot(&mut self) -> u64 {
        let slot = self.counter;
        self.counter += 1;
        self.pending.push(slot);
        slot
    }

    /// Slot for a value that is filled in one step (shared refs, types).
    fn reserve_slot_plain(&mut self) -> u64 {
        let slot = self.counter;
        self.counter += 1;
        slot
    }

    fn install(&mut self, slot: u64, value: Value) {
        self.table.insert(slot, value);
    }

    fn finish_slot(&mut self, slot: u64) {
        debug_assert_eq!(self.pending.last(), Some(&slot));
        self.pending.pop();
    }

    /// Store an atomically-finished value at the next counter slot.
    fn resolve_ref_immediately(&mut self, value: Value) -> Value {
        let slot = self.counter;
        self.counter += 1;
        self.table.insert(slot, value.clone());
        value
    }

    /// Decode one value.
    pub fn deserialize(&mut self) -> JoltResult<Value> {
        let tag = self.read_tag()?;
        self.handle(tag)
    }

    fn handle(&mut self, tag: u8) -> JoltResult<Value> {
        match tag {
            0 => {
                let inner = self.read_tag()?;
                intern::tag_value(inner).ok_or(JoltError::UnknownTag { tag: inner })
            }
            t if t >= tags::VALUE_TAGS => {
                intern::tag_value(t).ok_or(JoltError::UnknownTag { tag: t })
            }
            tags::INT8_TAG => Ok(Value::Int8(self.read_u8()? as i8)),
            tags::UINT8_TAG => Ok(Value::UInt8(self.read_u8()?)),
            tags::INT16_TAG => Ok(Value::Int16(self.read_u16()? as i16)),
            tags::UINT16_TAG => Ok(Value::UInt16(self.read_u16()?)),
            tags::INT32_TAG => Ok(Value::Int32(self.read_i32()?)),
            tags::UINT32_TAG => Ok(Value::UInt32(self.read_u32()?)),
            tags::INT64_TAG => Ok(Value::Int64(self.read_u64()? as i64)),
            tags::UINT64_TAG => Ok(Value::UInt64(self.read_u64()?)),
            tags::INT128_TAG => {
                let b: [u8; 16] = self.read_exact(16)?.try_into().unwrap();
                Ok(Value::Int128(i128::from_ne_bytes(b)))
            }
            tags::UINT128_TAG => {
                let b: [u8; 16] = self.read_exact(16)?.try_into().unwrap();
                Ok(Value::UInt128(u128::from_ne_bytes(b)))
            }
            tags::FLOAT16_TAG => Ok(Value::Float16(self.read_u16()?)),
            tags::FLOAT32_TAG => Ok(Value::Float32(f32::from_ne_bytes(
                self.read_exact(4)?.try_into().unwrap(),
            ))),
            tags::FLOAT64_TAG => Ok(Value::Float64(f64::from_ne_bytes(
                self.read_exact(8)?.try_into().unwrap(),
            ))),
            tags::CHAR_TAG => {
                let code = self.read_u32()?;
                char::from_u32(code)
                    .map(Value::Char)
                    .ok_or_else(|| JoltError::Desync(format!("invalid char scalar {code:#x}")))
            }
            tags::SHORTINT64_TAG => Ok(Value::Int64(self.read_i32()? as i64)),
            tags::SYMBOL_TAG => {
                let len = self.read_u8()? as usize;
                self.read_symbol(len)
            }
            tags::LONGSYMBOL_TAG => {
                let len = self.read_u32()? as usize;
                self.read_symbol(len)
            }
            tags::STRING_TAG => {
                let len = self.read_u8()? as usize;
                self.read_string(len)
            }
            tags::LONGSTRING_TAG => {
                let len = self.read_u64()? as usize;
                self.read_string(len)
            }
            tags::SHARED_REF_TAG => {
                let slot = self.reserve_slot_plain();
                let value = self.deserialize()?;
                self.install(slot, value.clone());
                Ok(value)
            }
            tags::TUPLE_TAG => {
                let n = self.read_u8()? as usize;
                self.read_tuple(n)
            }
            tags::LONGTUPLE_TAG => {
                let n = self.read_u32()? as usize;
                self.read_tuple(n)
            }
            tags::SIMPLEVECTOR_TAG => {
                let n = self.read_u32()? as usize;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.deserialize()?);
                }
                Ok(self.resolve_ref_immediately(Value::SimpleVec(Arc::new(items))))
            }
            tags::EXPR_TAG => {
                let n = self.read_u8()? as usize;
                self.read_expr(n)
            }
            tags::LONGEXPR_TAG => {
                let n = self.read_u32()? as usize;
                self.read_expr(n)
            }
            tags::ARRAY_TAG => self.read_array(),
            tags::OBJECT_TAG => self.read_object(false),
            tags::REF_OBJECT_TAG => self.read_object(true),
            tags::IDDICT_TAG => {
                let slot = self.reserve_slot();
                let ty = self.read_type_value()?;
                let kind = intern::CORE
                    .dict_kind_of(&ty)
                    .ok_or_else(|| JoltError::Desync("IDDICT carries a non-dictionary type".into()))?;
                self.read_dict_body(slot, kind)
            }
            tags::DATATYPE_TAG => self.read_datatype(DtForm::Named),
            tags::FULL_DATATYPE_TAG => self.read_datatype(DtForm::Full),
            tags::WRAPPER_DATATYPE_TAG => self.read_datatype(DtForm::Wrapper),
            tags::TYPENAME_TAG => self.read_typename_body(None),
            tags::MODULE_TAG => self.read_module(),
            tags::METHOD_TAG => self.read_method(),
            tags::FRAME_TAG => self.read_frame(),
            tags::TASK_TAG => self.read_task(),
            tags::GLOBALREF_TAG => {
                let module = self
                    .deserialize()?
                    .as_module()
                    .cloned()
                    .ok_or_else(|| JoltError::Desync("global ref expects a module".into()))?;
                let name = self.read_symbol_value()?;
                Ok(Value::global_ref(module, name))
            }
            tags::FULL_GLOBALREF_TAG => {
                let ty = self.read_type_value()?;
                Ok(Value::global_ref(ty.name.module.clone(), ty.name.name))
            }
            tags::SHORTBACKREF_TAG => {
                let slot = self.read_u16()? as u64;
                self.gettable(slot)
            }
            tags::BACKREF_TAG => {
                let slot = self.read_u32()? as u64;
                self.gettable(slot)
            }
            tags::LONGBACKREF_TAG => {
                let slot = self.read_u64()?;
                self.gettable(slot)
            }
            tags::HEADER_TAG => {
                self.read_header_body()?;
                self.deserialize()
            }
            tags::UNDEFREF_TAG => Err(JoltError::Desync(
                "undefined reference in value position".into(),
            )),
            t => Err(JoltError::UnknownTag { tag: t }),
        }
    }

    /// Read the next value expecting `UNDEFREF` to mean "leave absent".
    fn read_field(&mut self) -> JoltResult<Option<Value>> {
        let tag = self.read_tag()?;
        if tag == tags::UNDEFREF_TAG {
            Ok(None)
        } else {
            Ok(Some(self.handle(tag)?))
        }
    }

    fn read_symbol_value(&mut self) -> JoltResult<Symbol> {
        self.deserialize()?
            .as_symbol()
            .ok_or_else(|| JoltError::Desync("expected a symbol".into()))
    }

    fn read_type_value(&mut self) -> JoltResult<Arc<DataType>> {
        self.deserialize()?
            .as_type()
            .cloned()
            .ok_or_else(|| JoltError::Desync("expected a type descriptor".into()))
    }

    fn read_symbol(&mut self, len: usize) -> JoltResult<Value> {
        let text = String::from_utf8(self.read_exact(len)?)?;
        let sym = Value::Symbol(Symbol::new(&text));
        if len > 7 {
            Ok(self.resolve_ref_immediately(sym))
        } else {
            Ok(sym)
        }
    }

    fn read_string(&mut self, len: usize) -> JoltResult<Value> {
        let text = String::from_utf8(self.read_exact(len)?)?;
        Ok(Value::Str(Arc::new(text)))
    }

    fn read_tuple(&mut self, n: usize) -> JoltResult<Value> {
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(self.deserialize()?);
        }
        Ok(self.resolve_ref_immediately(Value::Tuple(Arc::new(items))))
    }

    fn read_expr(&mut self, n: usize) -> JoltResult<Value> {
        let slot = self.reserve_slot();
        let head = self.read_symbol_value()?;
        let expr = Arc::new(RwLock::new(ExprData {
            head,
            args: Vec::with_capacity(n),
        }));
        self.install(slot, Value::Expr(expr.clone()));
        for _ in 0..n {
            let arg = self.deserialize()?;
            expr.write().args.push(arg);
        }
        self.finish_slot(slot);
        Ok(Value::Expr(expr))
    }

    fn read_array(&mut self) -> JoltResult<Value> {
        let slot = self.reserve_slot();
        // Byte arrays omit the element descriptor; the first value tells the
        // cases apart.
        let first = self.deserialize()?;
        let (elem, shape) = match intern::elem_type_of(&first) {
            Some(e) => (e, self.deserialize()?),
            None => (ElemType::UInt8, first),
        };
        let dims: Vec<usize> = match &shape {
            Value::Tuple(t) => t
                .iter()
                .map(|d| {
                    d.as_int()
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or_else(|| JoltError::Desync("malformed array shape".into()))
                })
                .collect::<JoltResult<_>>()?,
            other => vec![other
                .as_int()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| JoltError::Desync("malformed array shape".into()))?],
        };
        let count: usize = dims.iter().product();

        let value = self.runtime.new_array(elem, &dims);
        self.install(slot, value.clone());
        let arr = match &value {
            Value::Array(a) => a.clone(),
            _ => return Err(JoltError::Desync("array allocation failed".into())),
        };
        match elem {
            ElemType::Any => {
                for i in 0..count {
                    if let Some(v) = self.read_field()? {
                        if let ArrayStorage::Boxed(items) = &mut arr.write().storage {
                            items[i] = Some(v);
                        }
                    }
                }
            }
            ElemType::Bool => {
                let mut bits = Vec::with_capacity(count);
                while bits.len() < count {
                    let b = self.read_u8()?;
                    let bit = b & 0x80 != 0;
                    let run = (b & 0x7F) as usize;
                    if run == 0 || bits.len() + run > count {
                        return Err(JoltError::Desync("malformed boolean run".into()));
                    }
                    bits.extend(std::iter::repeat(bit).take(run));
                }
                if let ArrayStorage::Bools(stored) = &mut arr.write().storage {
                    *stored = bits;
                }
            }
            _ => {
                let width = elem.byte_width().expect("fixed-width element");
                let bytes = self.read_exact(count * width)?;
                if let ArrayStorage::Bits(stored) = &mut arr.write().storage {
                    *stored = bytes;
                }
            }
        }
        self.finish_slot(slot);
        Ok(value)
    }

    fn read_object(&mut self, mutable: bool) -> JoltResult<Value> {
        if mutable {
            let slot = self.reserve_slot();
            let ty = self.read_type_value()?;
            if let Some(kind) = intern::CORE.dict_kind_of(&ty) {
                return self.read_dict_body(slot, kind);
            }
            let value = self.runtime.allocate(&ty)?;
            self.install(slot, value.clone());
            let nfields = ty.name.info.read().field_names.len();
            for i in 0..nfields {
                if let Some(v) = self.read_field()? {
                    self.runtime.set_field(&value, i, v)?;
                }
            }
            self.finish_slot(slot);
            Ok(value)
        } else {
            let ty = self.read_type_value()?;
            if let Some(size) = ty.name.primitive_size {
                let bytes = self.read_exact(size as usize)?;
                return Ok(Value::Record(Arc::new(RwLock::new(RecordData {
                    ty,
                    repr: RecordRepr::Bits(bytes),
                }))));
            }
            let (has_instance, nfields) = {
                let info = ty.name.info.read();
                (info.has_instance, info.field_names.len())
            };
            if has_instance {
                return ty
                    .name
                    .instance
                    .read()
                    .clone()
                    .ok_or_else(|| JoltError::TypeUnderConstruction {
                        name: ty.name.name.as_str().to_string(),
                    });
            }
            let mut fields = Vec::with_capacity(nfields);
            for _ in 0..nfields {
                fields.push(self.read_field()?);
            }
            let value = Value::Record(Arc::new(RwLock::new(RecordData {
                ty,
                repr: RecordRepr::Fields(fields),
            })));
            Ok(self.resolve_ref_immediately(value))
        }
    }

    fn read_dict_body(&mut self, slot: u64, kind: DictKind) -> JoltResult<Value> {
        let dict = Arc::new(RwLock::new(DictData::new(kind)));
        self.install(slot, Value::Dict(dict.clone()));
        let n = self.read_u32()? as usize;
        for _ in 0..n {
            let key = self.deserialize()?;
            let value = self.deserialize()?;
            dict.write().entries.push((key, value));
        }
        self.finish_slot(slot);
        Ok(Value::Dict(dict))
    }

    fn read_datatype(&mut self, form: DtForm) -> JoltResult<Value> {
        let slot = self.reserve_slot_plain();
        let value = match form {
            DtForm::Named => {
                let name = self.read_symbol_value()?;
                let module = self
                    .deserialize()?
                    .as_module()
                    .cloned()
                    .ok_or_else(|| JoltError::Desync("type descriptor expects a module".into()))?;
                let binding =
                    module
                        .get_binding(name)
                        .ok_or_else(|| JoltError::UnresolvedBinding {
                            module: module.full_name(),
                            name: name.as_str().to_string(),
                        })?;
                let wrapper = binding
                    .as_type()
                    .cloned()
                    .ok_or_else(|| {
                        JoltError::Desync(format!("binding '{name}' is not a type"))
                    })?;
                let params = self.read_type_params()?;
                if params.is_empty() {
                    Value::Type(wrapper)
                } else {
                    Value::Type(DataType::apply(wrapper.name.clone(), params))
                }
            }
            DtForm::Wrapper => {
                let tn = self.read_wrapper_typename(slot)?;
                tn.wrapper_type()?
            }
            DtForm::Full => {
                let tn = self.read_typename_ref()?;
                let params = self.read_type_params()?;
                if params.is_empty() {
                    tn.wrapper_type()?
                } else {
                    Value::Type(DataType::apply(tn, params))
                }
            }
        };
        self.install(slot, value.clone());
        Ok(value)
    }

    fn read_type_params(&mut self) -> JoltResult<Vec<Value>> {
        let n = self.read_u32()? as usize;
        let mut params = Vec::with_capacity(n);
        for _ in 0..n {
            params.push(self.deserialize()?);
        }
        Ok(params)
    }

    fn read_typename_ref(&mut self) -> JoltResult<Arc<TypeName>> {
        match self.deserialize()? {
            Value::TypeName(tn) => Ok(tn),
            _ => Err(JoltError::Desync("expected a type-name record".into())),
        }
    }

    /// Read the type-name record behind a `WRAPPER_DATATYPE`, installing the
    /// wrapper into `dt_slot` *before* the record body is consumed. Attached
    /// methods routinely back-reference the wrapper (a callable's signature
    /// names its own type), so the slot must be live while they are read.
    fn read_wrapper_typename(&mut self, dt_slot: u64) -> JoltResult<Arc<TypeName>> {
        let tag = self.read_tag()?;
        if tag == tags::TYPENAME_TAG {
            match self.read_typename_body(Some(dt_slot))? {
                Value::TypeName(tn) => Ok(tn),
                _ => Err(JoltError::Desync("expected a type-name record".into())),
            }
        } else {
            match self.handle(tag)? {
                Value::TypeName(tn) => Ok(tn),
                _ => Err(JoltError::Desync("expected a type-name record".into())),
            }
        }
    }

    fn as_value_list(v: &Value) -> JoltResult<Vec<Value>> {
        match v {
            Value::SimpleVec(items) => Ok(items.as_ref().clone()),
            _ => Err(JoltError::Desync("expected a simple vector".into())),
        }
    }

    fn as_symbol_list(v: &Value) -> JoltResult<Vec<Symbol>> {
        Self::as_value_list(v)?
            .iter()
            .map(|s| {
                s.as_symbol()
                    .ok_or_else(|| JoltError::Desync("expected a symbol list".into()))
            })
            .collect()
    }

    fn read_typename_body(&mut self, dt_slot: Option<u64>) -> JoltResult<Value> {
        let slot = self.reserve_slot();
        let number = self.read_u64()?;
        let name = self.read_symbol_value()?;

        let (tn, fresh) = match self.runtime.known_lookup(number) {
            Some(Value::TypeName(existing)) => (existing, false),
            _ => {
                let unique = self.runtime.fresh_sandbox_name(name);
                let tn = TypeName::new(unique, self.runtime.sandbox());
                tn.make_wrapper();
                self.runtime
                    .known_insert(number, Value::TypeName(tn.clone()));
                (tn, true)
            }
        };
        self.install(slot, Value::TypeName(tn.clone()));
        if let Some(ds) = dt_slot {
            self.install(ds, tn.wrapper_type()?);
        }

        // The body is always on the wire; a reader that already knows the
        // number consumes it without applying.
        let field_names = self.deserialize()?;
        let supertype = self.deserialize()?;
        let parameters = self.deserialize()?;
        let field_types = self.deserialize()?;
        let has_instance = self
            .deserialize()?
            .as_bool()
            .ok_or_else(|| JoltError::Desync("malformed type-name record".into()))?;
        let is_abstract = self
            .deserialize()?
            .as_bool()
            .ok_or_else(|| JoltError::Desync("malformed type-name record".into()))?;
        let is_mutable = self
            .deserialize()?
            .as_bool()
            .ok_or_else(|| JoltError::Desync("malformed type-name record".into()))?;
        let n_initialized = self
            .deserialize()?
            .as_int()
            .ok_or_else(|| JoltError::Desync("malformed type-name record".into()))?;
        let max_args = self
            .deserialize()?
            .as_int()
            .ok_or_else(|| JoltError::Desync("malformed type-name record".into()))?;
        let methods = self.deserialize()?;

        if fresh {
            {
                let mut info = tn.info.write();
                info.field_names = Self::as_symbol_list(&field_names)?;
                info.supertype = match supertype {
                    Value::Nothing => None,
                    s => Some(s),
                };
                info.parameters = Self::as_value_list(&parameters)?;
                info.field_types = Self::as_value_list(&field_types)?;
                info.has_instance = has_instance;
                info.is_abstract = is_abstract;
                info.is_mutable = is_mutable;
                info.n_initialized = n_initialized as u32;
                info.max_args = max_args as u32;
            }
            let wrapper = tn.make_wrapper();
            if has_instance {
                let dt = wrapper.as_type().expect("wrapper is a type").clone();
                *tn.instance.write() = Some(Value::Record(Arc::new(RwLock::new(RecordData {
                    ty: dt,
                    repr: RecordRepr::Fields(Vec::new()),
                }))));
            }
            self.runtime.sandbox().set_binding(tn.name, wrapper);
            debug!("synthesized type '{}' for received number {number}", tn.name);
            match &methods {
                Value::Nothing => {}
                list => {
                    self.runtime
                        .install_methods(&tn, Self::as_value_list(list)?);
                }
            }
        }
        self.finish_slot(slot);
        Ok(Value::TypeName(tn))
    }

    fn read_module(&mut self) -> JoltResult<Value> {
        let slot = self.reserve_slot_plain();
        let uuid = match self.deserialize()? {
            Value::Nothing => None,
            Value::UInt128(raw) => Some(Uuid::from_u128(raw)),
            _ => return Err(JoltError::Desync("malformed module path".into())),
        };
        let root_name = self.read_symbol_value()?;
        let mut module = self.runtime.resolve_root(uuid, root_name)?;
        loop {
            let next = self.deserialize()?;
            if next.is_empty_tuple() {
                break;
            }
            let name = next
                .as_symbol()
                .ok_or_else(|| JoltError::Desync("malformed module path".into()))?;
            module = module
                .get_child(name)
                .ok_or_else(|| JoltError::UnknownModule {
                    name: format!("{}.{}", module.full_name(), name),
                })?;
        }
        let value = Value::Module(module);
        self.install(slot, value.clone());
        Ok(value)
    }

    fn read_method(&mut self) -> JoltResult<Value> {
        let slot = self.reserve_slot();
        let number = self.read_u64()?;
        let module = self
            .deserialize()?
            .as_module()
            .cloned()
            .ok_or_else(|| JoltError::Desync("method expects a module".into()))?;
        let name = self.read_symbol_value()?;
        let file = self.read_symbol_value()?;
        let line = self
            .deserialize()?
            .as_int()
            .ok_or_else(|| JoltError::Desync("malformed method record".into()))? as i32;

        let (method, fresh) = match self.runtime.known_lookup(number) {
            Some(Value::Method(existing)) => (existing, false),
            _ => {
                let m = Arc::new(RwLock::new(MethodData::new(module, name, file, line)));
                self.runtime.known_insert(number, Value::Method(m.clone()));
                (m, true)
            }
        };
        self.install(slot, Value::Method(method.clone()));

        let sig = self.deserialize()?;
        let slot_names = self.deserialize()?;
        let nargs = self
            .deserialize()?
            .as_int()
            .ok_or_else(|| JoltError::Desync("malformed method record".into()))? as i32;
        let isva = self
            .deserialize()?
            .as_bool()
            .ok_or_else(|| JoltError::Desync("malformed method record".into()))?;
        let is_opaque = self
            .deserialize()?
            .as_bool()
            .ok_or_else(|| JoltError::Desync("malformed method record".into()))?;
        let (constprop, purity) = if self.version >= tags::VER_INFERENCE_FLAGS {
            (self.read_u8()?, self.read_u8()?)
        } else {
            (0, 0)
        };
        let source = match self.deserialize()? {
            Value::Nothing => None,
            v => Some(v),
        };
        let generator = match self.deserialize()? {
            Value::Nothing => None,
            v => Some(v),
        };
        let mut recursion_relation = None;
        if self.version >= tags::VER_METHOD_EXTRAS {
            loop {
                let key = self.deserialize()?;
                if key.is_empty_tuple() {
                    break;
                }
                let key = key
                    .as_symbol()
                    .ok_or_else(|| JoltError::Desync("malformed method extras".into()))?;
                let value = self.deserialize()?;
                match key.as_str() {
                    // Older producers wrote the misspelled key; accept both.
                    "recursion_relation" | "recusion_relation" => {
                        recursion_relation = Some(value)
                    }
                    other => debug!("ignoring unknown method extra '{other}'"),
                }
            }
        }

        if fresh {
            let mut md = method.write();
            md.sig = sig;
            md.slot_names = slot_names;
            md.nargs = nargs;
            md.isva = isva;
            md.is_opaque = is_opaque;
            md.constprop = constprop;
            md.purity = purity;
            md.source = source;
            md.generator = generator;
            md.recursion_relation = recursion_relation;
        }
        self.finish_slot(slot);
        Ok(Value::Method(method))
    }

    fn read_frame(&mut self) -> JoltResult<Value> {
        let slot = self.reserve_slot();
        let number = self.read_u64()?;
        let (frame, fresh) = match self.runtime.known_lookup(number) {
            Some(Value::Frame(existing)) => (existing, false),
            _ => {
                let f = Arc::new(RwLock::new(FrameData::placeholder()));
                self.runtime.known_insert(number, Value::Frame(f.clone()));
                (f, true)
            }
        };
        self.install(slot, Value::Frame(frame.clone()));
        let def = self.deserialize()?;
        let spec_types = self.deserialize()?;
        let sparams = if self.version >= tags::VER_FRAME_SPARAMS {
            self.deserialize()?
        } else {
            Value::SimpleVec(Arc::new(Vec::new()))
        };
        if fresh {
            let mut fd = frame.write();
            fd.def = def;
            fd.spec_types = spec_types;
            fd.sparams = sparams;
        }
        self.finish_slot(slot);
        Ok(Value::Frame(frame))
    }

    fn read_task(&mut self) -> JoltResult<Value> {
        let slot = self.reserve_slot();
        let task = Arc::new(RwLock::new(TaskData::placeholder()));
        self.install(slot, Value::Task(task.clone()));
        let body = self.deserialize()?;
        let storage = self.deserialize()?;
        let state_sym = self.read_symbol_value()?;
        let state = TaskState::from_symbol(state_sym)
            .ok_or_else(|| JoltError::Desync(format!("unknown task state :{state_sym}")))?;
        let result = self.deserialize()?;
        let failed = self
            .deserialize()?
            .as_bool()
            .ok_or_else(|| JoltError::Desync("malformed task record".into()))?;
        {
            let mut td = task.write();
            td.body = body;
            td.storage = storage;
            td.state = state;
            td.result = result;
            td.failed = failed;
        }
        self.finish_slot(slot);
        Ok(Value::Task(task))
    }

    fn read_header_body(&mut self) -> JoltResult<()> {
        let mut body = [0u8; 7];
        self.input.read_exact(&mut body)?;
        let header = StreamHeader::decode_body(&body)
            .ok_or_else(|| JoltError::BadHeader("magic mismatch".into()))?;
        if header.version > tags::PROTOCOL_VERSION {
            return Err(JoltError::VersionMismatch {
                peer: header.version,
                supported: tags::PROTOCOL_VERSION,
            });
        }
        if header.big_endian != cfg!(target_endian = "big") {
            return Err(JoltError::BadHeader(
                "stream endianness differs from host".into(),
            ));
        }
        if header.word_size as usize != std::mem::size_of::<usize>() {
            debug!(
                "peer word size is {} bytes; native-width payloads are advisory",
                header.word_size
            );
        }
        debug!("negotiated protocol version {}", header.version);
        self.version = header.version;
        Ok(())
    }
}
