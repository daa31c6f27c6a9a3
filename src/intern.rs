//! Interning tables for well-known singletons.
//!
//! One table per direction: [`literal_tag`] answers "does this value encode
//! as a single literal byte", [`tag_value`] materializes the singleton a tag
//! stands for. The two must agree exactly; the literal band is a wire
//! contract, so table order here mirrors the band layout in [`crate::tags`].

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::dtype::defs::{DataType, TypeName};
use crate::module::ModuleData;
use crate::tags;
use crate::utils::ref_id::ObjId;
use crate::value::array::ElemType;
use crate::value::defs::Value;
use crate::value::dict::DictKind;
use crate::value::symbol::Symbol;

static CORE_MODULE: Lazy<Arc<ModuleData>> =
    Lazy::new(|| ModuleData::root(Symbol::new("core"), None, false));

/// The built-in root module every well-known type is bound in.
pub fn core_module() -> Arc<ModuleData> {
    CORE_MODULE.clone()
}

/// All interned singleton values, built once per process.
pub struct CoreTypes {
    pub boolean: Value,
    pub int8: Value,
    pub uint8: Value,
    pub int16: Value,
    pub uint16: Value,
    pub int32: Value,
    pub uint32: Value,
    pub int64: Value,
    pub uint64: Value,
    pub int128: Value,
    pub uint128: Value,
    pub float16: Value,
    pub float32: Value,
    pub float64: Value,
    pub char_t: Value,
    pub string: Value,
    pub symbol_t: Value,
    pub any: Value,
    pub nothing_t: Value,
    pub datatype: Value,
    pub typename: Value,
    pub tuple: Value,
    pub array: Value,
    pub simple_vector: Value,
    pub expr: Value,
    pub module_t: Value,
    pub dict: Value,
    /// Identity dictionary type. Bound in `core` but not interned (the
    /// literal band is full; it travels by name.
    pub id_dict: Value,
    pub empty_tuple: Value,
    type_literals: Vec<Value>,
    symbol_literals: Vec<Symbol>,
    type_tags: HashMap<ObjId, u8>,
    symbol_tags: HashMap<Symbol, u8>,
    elem_types: HashMap<ObjId, ElemType>,
}

fn builtin(name: &str, primitive_size: Option<u32>, is_abstract: bool) -> Value {
    let tn = TypeName::with_primitive_size(Symbol::new(name), CORE_MODULE.clone(), primitive_size);
    tn.info.write().is_abstract = is_abstract;
    let w = tn.make_wrapper();
    CORE_MODULE.set_binding(tn.name, w.clone());
    w
}

pub static CORE: Lazy<CoreTypes> = Lazy::new(|| {
    let boolean = builtin("Bool", Some(1), false);
    let int8 = builtin("Int8", Some(1), false);
    let uint8 = builtin("UInt8", Some(1), false);
    let int16 = builtin("Int16", Some(2), false);
    let uint16 = builtin("UInt16", Some(2), false);
    let int32 = builtin("Int32", Some(4), false);
    let uint32 = builtin("UInt32", Some(4), false);
    let int64 = builtin("Int64", Some(8), false);
    let uint64 = builtin("UInt64", Some(8), false);
    let int128 = builtin("Int128", Some(16), false);
    let uint128 = builtin("UInt128", Some(16), false);
    let float16 = builtin("Float16", Some(2), false);
    let float32 = builtin("Float32", Some(4), false);
    let float64 = builtin("Float64", Some(8), false);
    let char_t = builtin("Char", Some(4), false);
    let string = builtin("String", None, false);
    let symbol_t = builtin("Symbol", None, false);
    let any = builtin("Any", None, true);
    let nothing_t = builtin("Nothing", None, false);
    let datatype = builtin("DataType", None, false);
    let typename = builtin("TypeName", None, false);
    let tuple = builtin("Tuple", None, false);
    let array = builtin("Array", None, false);
    let simple_vector = builtin("SimpleVector", None, false);
    let expr = builtin("Expr", None, false);
    let module_t = builtin("Module", None, false);
    let dict = builtin("Dict", None, false);
    let id_dict = builtin("IdDict", None, false);

    // Band order; see tags.rs.
    let type_literals = vec![
        boolean.clone(),
        int8.clone(),
        uint8.clone(),
        int16.clone(),
        uint16.clone(),
        int32.clone(),
        uint32.clone(),
        int64.clone(),
        uint64.clone(),
        int128.clone(),
        uint128.clone(),
        float16.clone(),
        float32.clone(),
        float64.clone(),
        char_t.clone(),
        string.clone(),
        symbol_t.clone(),
        any.clone(),
        nothing_t.clone(),
        datatype.clone(),
        typename.clone(),
        tuple.clone(),
        array.clone(),
        simple_vector.clone(),
        expr.clone(),
        module_t.clone(),
        dict.clone(),
    ];
    assert_eq!(type_literals.len(), tags::N_TYPE_LITERALS as usize);

    let mut symbol_literals: Vec<Symbol> = (b'a'..=b'z')
        .map(|c| Symbol::new(&(c as char).to_string()))
        .collect();
    for text in [
        "call", "invoke", "block", "quote", "line", "file", "name", "type", "value", "self",
        "Tuple", "Any", "runnable", "done", "failed",
    ] {
        symbol_literals.push(Symbol::new(text));
    }
    assert_eq!(symbol_literals.len(), tags::N_SYMBOL_LITERALS as usize);

    let mut type_tags = HashMap::new();
    for (i, v) in type_literals.iter().enumerate() {
        let dt = v.as_type().expect("interned types are types");
        type_tags.insert(ObjId::of(dt), tags::TYPE_LITERALS_BASE + i as u8);
    }
    let mut symbol_tags = HashMap::new();
    for (i, s) in symbol_literals.iter().enumerate() {
        symbol_tags.insert(*s, tags::SYMBOL_LITERALS_BASE + i as u8);
    }

    let mut elem_types = HashMap::new();
    for (v, e) in [
        (&boolean, ElemType::Bool),
        (&int8, ElemType::Int8),
        (&uint8, ElemType::UInt8),
        (&int16, ElemType::Int16),
        (&uint16, ElemType::UInt16),
        (&int32, ElemType::Int32),
        (&uint32, ElemType::UInt32),
        (&int64, ElemType::Int64),
        (&uint64, ElemType::UInt64),
        (&int128, ElemType::Int128),
        (&uint128, ElemType::UInt128),
        (&float16, ElemType::Float16),
        (&float32, ElemType::Float32),
        (&float64, ElemType::Float64),
        (&char_t, ElemType::Char),
        (&any, ElemType::Any),
    ] {
        elem_types.insert(ObjId::of(v.as_type().expect("interned types are types")), e);
    }

    CoreTypes {
        boolean,
        int8,
        uint8,
        int16,
        uint16,
        int32,
        uint32,
        int64,
        uint64,
        int128,
        uint128,
        float16,
        float32,
        float64,
        char_t,
        string,
        symbol_t,
        any,
        nothing_t,
        datatype,
        typename,
        tuple,
        array,
        simple_vector,
        expr,
        module_t,
        dict,
        id_dict,
        empty_tuple: Value::Tuple(Arc::new(Vec::new())),
        type_literals,
        symbol_literals,
        type_tags,
        symbol_tags,
        elem_types,
    }
});

impl CoreTypes {
    /// Whether `dt` is one of the dictionary types, and which discipline.
    pub fn dict_kind_of(&self, dt: &Arc<DataType>) -> Option<DictKind> {
        let hashed = self.dict.as_type().expect("Dict is a type");
        let identity = self.id_dict.as_type().expect("IdDict is a type");
        if Arc::ptr_eq(&dt.name, &hashed.name) {
            Some(DictKind::Hashed)
        } else if Arc::ptr_eq(&dt.name, &identity.name) {
            Some(DictKind::Identity)
        } else {
            None
        }
    }

    pub fn dict_type(&self, kind: DictKind) -> &Value {
        match kind {
            DictKind::Hashed => &self.dict,
            DictKind::Identity => &self.id_dict,
        }
    }
}

/// The literal-band tag a value encodes to, if any.
pub fn literal_tag(v: &Value) -> Option<u8> {
    match v {
        Value::Nothing => Some(tags::NOTHING_TAG),
        Value::Bool(true) => Some(tags::TRUE_TAG),
        Value::Bool(false) => Some(tags::FALSE_TAG),
        Value::Int32(x) if (0..tags::N_INT_LITERALS as i32).contains(x) => {
            Some(tags::INT32_LITERALS_BASE + *x as u8)
        }
        Value::Int64(x) if (0..tags::N_INT_LITERALS as i64).contains(x) => {
            Some(tags::INT64_LITERALS_BASE + *x as u8)
        }
        Value::Tuple(t) if t.is_empty() => Some(tags::EMPTYTUPLE_TAG),
        Value::Symbol(s) => CORE.symbol_tags.get(s).copied(),
        Value::Type(dt) => CORE.type_tags.get(&ObjId::of(dt)).copied(),
        _ => None,
    }
}

/// The singleton value a tag stands for when read in value position. Covers
/// the literal band plus the escape-reachable type-band codes.
pub fn tag_value(tag: u8) -> Option<Value> {
    match tag {
        tags::EMPTYTUPLE_TAG => Some(CORE.empty_tuple.clone()),
        tags::TRUE_TAG => Some(Value::Bool(true)),
        tags::FALSE_TAG => Some(Value::Bool(false)),
        tags::NOTHING_TAG => Some(Value::Nothing),
        t if (tags::TYPE_LITERALS_BASE..tags::SYMBOL_LITERALS_BASE).contains(&t) => Some(
            CORE.type_literals[(t - tags::TYPE_LITERALS_BASE) as usize].clone(),
        ),
        t if (tags::SYMBOL_LITERALS_BASE..tags::INT32_LITERALS_BASE).contains(&t) => Some(
            Value::Symbol(CORE.symbol_literals[(t - tags::SYMBOL_LITERALS_BASE) as usize]),
        ),
        t if (tags::INT32_LITERALS_BASE..tags::INT64_LITERALS_BASE).contains(&t) => {
            Some(Value::Int32((t - tags::INT32_LITERALS_BASE) as i32))
        }
        t if (tags::INT64_LITERALS_BASE..=tags::MAX_TAG).contains(&t) => {
            Some(Value::Int64((t - tags::INT64_LITERALS_BASE) as i64))
        }
        // Type-band codes intern to their type singleton when escaped into
        // value position.
        tags::SYMBOL_TAG => Some(CORE.symbol_t.clone()),
        tags::INT8_TAG => Some(CORE.int8.clone()),
        tags::UINT8_TAG => Some(CORE.uint8.clone()),
        tags::INT16_TAG => Some(CORE.int16.clone()),
        tags::UINT16_TAG => Some(CORE.uint16.clone()),
        tags::INT32_TAG => Some(CORE.int32.clone()),
        tags::UINT32_TAG => Some(CORE.uint32.clone()),
        tags::INT64_TAG => Some(CORE.int64.clone()),
        tags::UINT64_TAG => Some(CORE.uint64.clone()),
        tags::INT128_TAG => Some(CORE.int128.clone()),
        tags::UINT128_TAG => Some(CORE.uint128.clone()),
        tags::FLOAT16_TAG => Some(CORE.float16.clone()),
        tags::FLOAT32_TAG => Some(CORE.float32.clone()),
        tags::FLOAT64_TAG => Some(CORE.float64.clone()),
        tags::CHAR_TAG => Some(CORE.char_t.clone()),
        tags::STRING_TAG => Some(CORE.string.clone()),
        tags::TUPLE_TAG => Some(CORE.tuple.clone()),
        tags::SIMPLEVECTOR_TAG => Some(CORE.simple_vector.clone()),
        tags::ARRAY_TAG => Some(CORE.array.clone()),
        tags::EXPR_TAG => Some(CORE.expr.clone()),
        tags::DATATYPE_TAG => Some(CORE.datatype.clone()),
        tags::TYPENAME_TAG => Some(CORE.typename.clone()),
        tags::MODULE_TAG => Some(CORE.module_t.clone()),
        _ => None,
    }
}

/// Element type of an array whose element descriptor is `v`.
pub fn elem_type_of(v: &Value) -> Option<ElemType> {
    let dt = v.as_type()?;
    CORE.elem_types.get(&ObjId::of(dt)).copied()
}

/// The type descriptor an element type serializes as.
pub fn elem_type_value(e: ElemType) -> Value {
    match e {
        ElemType::Bool => CORE.boolean.clone(),
        ElemType::Int8 => CORE.int8.clone(),
        ElemType::UInt8 => CORE.uint8.clone(),
        ElemType::Int16 => CORE.int16.clone(),
        ElemType::UInt16 => CORE.uint16.clone(),
        ElemType::Int32 => CORE.int32.clone(),
        ElemType::UInt32 => CORE.uint32.clone(),
        ElemType::Int64 => CORE.int64.clone(),
        ElemType::UInt64 => CORE.uint64.clone(),
        ElemType::Int128 => CORE.int128.clone(),
        ElemType::UInt128 => CORE.uint128.clone(),
        ElemType::Float16 => CORE.float16.clone(),
        ElemType::Float32 => CORE.float32.clone(),
        ElemType::Float64 => CORE.float64.clone(),
        ElemType::Char => CORE.char_t.clone(),
        ElemType::Any => CORE.any.clone(),
    }
}
