//! The closed dynamic value model the codec operates on.
//!
//! `Value` is a tagged union over every kind the wire format can carry. The
//! encoder dispatches on the variant (via a `match`, not open virtual
//! dispatch), so the set is deliberately closed. Heap-backed variants hold
//! `Arc`s; object identity is allocation identity, which is what the
//! back-reference machinery keys on. Mutable variants wrap their payload in
//! a lock so the decoder can allocate first and fill fields later. That
//! deferred fill is what lets a field close a cycle.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use strum::{EnumDiscriminants, EnumIs};

use crate::dtype::defs::DataType;
use crate::module::ModuleData;
use crate::utils::ref_id::ObjId;
use crate::value::array::{ArrayData, ArrayStorage};
use crate::value::dict::DictData;
use crate::value::symbol::Symbol;

/// A serializable runtime value.
#[derive(Clone, EnumIs, EnumDiscriminants)]
#[strum_discriminants(name(ValueKind), derive(Hash, PartialOrd, Ord))]
pub enum Value {
    /// The absent value.
    Nothing,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    /// Half-precision float kept as raw bits.
    Float16(u16),
    Float32(f32),
    Float64(f64),
    Char(char),
    Str(Arc<String>),
    Symbol(Symbol),
    Tuple(Arc<Vec<Value>>),
    SimpleVec(Arc<Vec<Value>>),
    Array(Arc<RwLock<ArrayData>>),
    Record(Arc<RwLock<RecordData>>),
    Dict(Arc<RwLock<DictData>>),
    Expr(Arc<RwLock<ExprData>>),
    Type(Arc<DataType>),
    TypeName(Arc<crate::dtype::defs::TypeName>),
    Module(Arc<ModuleData>),
    Method(Arc<RwLock<MethodData>>),
    Frame(Arc<RwLock<FrameData>>),
    Task(Arc<RwLock<TaskData>>),
    GlobalRef(Arc<GlobalRefData>),
}

/// Payload of a nominal record instance.
pub struct RecordData {
    pub ty: Arc<DataType>,
    pub repr: RecordRepr,
}

#[derive(Clone)]
pub enum RecordRepr {
    /// Field slots; `None` is an uninitialized field.
    Fields(Vec<Option<Value>>),
    /// Raw native bytes of a primitive-bits type.
    Bits(Vec<u8>),
}

/// Head/arguments expression node.
pub struct ExprData {
    pub head: Symbol,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Runnable,
    Running,
    Done,
    Failed,
}

impl TaskState {
    /// The symbol this state travels as. `Running` has none: running tasks
    /// refuse serialization.
    pub fn symbol(&self) -> Option<Symbol> {
        match self {
            TaskState::Runnable => Some(Symbol::new("runnable")),
            TaskState::Done => Some(Symbol::new("done")),
            TaskState::Failed => Some(Symbol::new("failed")),
            TaskState::Running => None,
        }
    }

    pub fn from_symbol(s: Symbol) -> Option<TaskState> {
        match s.as_str() {
            "runnable" => Some(TaskState::Runnable),
            "done" => Some(TaskState::Done),
            "failed" => Some(TaskState::Failed),
            _ => None,
        }
    }
}

/// Snapshot of a cooperative task.
pub struct TaskData {
    /// The body closure.
    pub body: Value,
    /// Task-local storage.
    pub storage: Value,
    pub state: TaskState,
    /// Result on completion, or the captured exception on failure.
    pub result: Value,
    /// Whether `result` holds a captured exception.
    pub failed: bool,
}

impl TaskData {
    pub(crate) fn placeholder() -> TaskData {
        TaskData {
            body: Value::Nothing,
            storage: Value::Nothing,
            state: TaskState::Runnable,
            result: Value::Nothing,
            failed: false,
        }
    }
}

/// A method definition attached to a callable type or module binding.
pub struct MethodData {
    pub module: Arc<ModuleData>,
    pub name: Symbol,
    pub file: Symbol,
    pub line: i32,
    /// Signature value (a type).
    pub sig: Value,
    /// Simple vector of argument slot names, or `Nothing`.
    pub slot_names: Value,
    pub nargs: i32,
    pub isva: bool,
    pub is_opaque: bool,
    /// Constant-propagation heuristic (v3+ on the wire).
    pub constprop: u8,
    /// Purity flags (v3+ on the wire).
    pub purity: u8,
    /// Body source, if retained.
    pub source: Option<Value>,
    pub generator: Option<Value>,
    /// Recursion-limit relation (v4+ on the wire, symbol-keyed).
    pub recursion_relation: Option<Value>,
    /// Methods whose dispatch table lives outside the runtime cannot travel.
    pub external: bool,
}

impl MethodData {
    pub fn new(module: Arc<ModuleData>, name: Symbol, file: Symbol, line: i32) -> MethodData {
        MethodData {
            module,
            name,
            file,
            line,
            sig: Value::Nothing,
            slot_names: Value::Nothing,
            nargs: 0,
            isva: false,
            is_opaque: false,
            constprop: 0,
            purity: 0,
            source: None,
            generator: None,
            recursion_relation: None,
            external: false,
        }
    }
}

/// A call-frame record: one specialization of a method.
pub struct FrameData {
    /// The defining method, or a module for top-level frames.
    pub def: Value,
    /// Signature types at the call site.
    pub spec_types: Value,
    /// Static parameter values (simple vector; empty before v2 streams).
    pub sparams: Value,
}

impl FrameData {
    pub(crate) fn placeholder() -> FrameData {
        FrameData {
            def: Value::Nothing,
            spec_types: Value::Nothing,
            sparams: Value::SimpleVec(Arc::new(Vec::new())),
        }
    }
}

/// A reference to a global binding by module and name.
pub struct GlobalRefData {
    pub module: Arc<ModuleData>,
    pub name: Symbol,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Arc::new(s.into()))
    }

    pub fn symbol(text: &str) -> Value {
        Value::Symbol(Symbol::new(text))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Arc::new(items))
    }

    pub fn simple_vec(items: Vec<Value>) -> Value {
        Value::SimpleVec(Arc::new(items))
    }

    pub fn array(data: ArrayData) -> Value {
        Value::Array(Arc::new(RwLock::new(data)))
    }

    pub fn dict(data: DictData) -> Value {
        Value::Dict(Arc::new(RwLock::new(data)))
    }

    pub fn expr(head: &str, args: Vec<Value>) -> Value {
        Value::Expr(Arc::new(RwLock::new(ExprData {
            head: Symbol::new(head),
            args,
        })))
    }

    pub fn global_ref(module: Arc<ModuleData>, name: Symbol) -> Value {
        Value::GlobalRef(Arc::new(GlobalRefData { module, name }))
    }

    pub fn record(data: RecordData) -> Value {
        Value::Record(Arc::new(RwLock::new(data)))
    }

    pub fn method(data: MethodData) -> Value {
        Value::Method(Arc::new(RwLock::new(data)))
    }

    pub fn frame(data: FrameData) -> Value {
        Value::Frame(Arc::new(RwLock::new(data)))
    }

    pub fn task(data: TaskData) -> Value {
        Value::Task(Arc::new(RwLock::new(data)))
    }

    pub fn kind(&self) -> ValueKind {
        self.into()
    }

    /// Integral view across all integer widths, when the value fits in i64.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int8(x) => Some(x as i64),
            Value::Int16(x) => Some(x as i64),
            Value::Int32(x) => Some(x as i64),
            Value::Int64(x) => Some(x),
            Value::Int128(x) => i64::try_from(x).ok(),
            Value::UInt8(x) => Some(x as i64),
            Value::UInt16(x) => Some(x as i64),
            Value::UInt32(x) => Some(x as i64),
            Value::UInt64(x) => i64::try_from(x).ok(),
            Value::UInt128(x) => i64::try_from(x).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Symbol> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&Arc<ModuleData>> {
        match self {
            Value::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&Arc<DataType>> {
        match self {
            Value::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_empty_tuple(&self) -> bool {
        matches!(self, Value::Tuple(t) if t.is_empty())
    }

    /// Identity key for back-reference tables; `None` for values that have
    /// no allocation (primitives, symbols).
    pub fn identity(&self) -> Option<ObjId> {
        match self {
            Value::Str(a) => Some(ObjId::of(a)),
            Value::Tuple(a) | Value::SimpleVec(a) => Some(ObjId::of(a)),
            Value::Array(a) => Some(ObjId::of(a)),
            Value::Record(a) => Some(ObjId::of(a)),
            Value::Dict(a) => Some(ObjId::of(a)),
            Value::Expr(a) => Some(ObjId::of(a)),
            Value::Type(a) => Some(ObjId::of(a)),
            Value::TypeName(a) => Some(ObjId::of(a)),
            Value::Module(a) => Some(ObjId::of(a)),
            Value::Method(a) => Some(ObjId::of(a)),
            Value::Frame(a) => Some(ObjId::of(a)),
            Value::Task(a) => Some(ObjId::of(a)),
            Value::GlobalRef(a) => Some(ObjId::of(a)),
            _ => None,
        }
    }

    /// Identity-flavored equality: pointer equality for heap values, bitwise
    /// equality for inline values. This is the key discipline of identity
    /// dictionaries.
    pub fn egal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Arc::ptr_eq(a, b),
            (Value::SimpleVec(a), Value::SimpleVec(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b),
            (Value::Expr(a), Value::Expr(b)) => Arc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => Arc::ptr_eq(a, b),
            (Value::TypeName(a), Value::TypeName(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Arc::ptr_eq(a, b),
            (Value::Frame(a), Value::Frame(b)) => Arc::ptr_eq(a, b),
            (Value::Task(a), Value::Task(b)) => Arc::ptr_eq(a, b),
            (Value::GlobalRef(a), Value::GlobalRef(b)) => Arc::ptr_eq(a, b),
            _ => self.prim_eq(other),
        }
    }

    fn prim_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int8(a), Value::Int8(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Int128(a), Value::Int128(b)) => a == b,
            (Value::UInt8(a), Value::UInt8(b)) => a == b,
            (Value::UInt16(a), Value::UInt16(b)) => a == b,
            (Value::UInt32(a), Value::UInt32(b)) => a == b,
            (Value::UInt64(a), Value::UInt64(b)) => a == b,
            (Value::UInt128(a), Value::UInt128(b)) => a == b,
            (Value::Float16(a), Value::Float16(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            _ => false,
        }
    }

    /// Structural equality: primitives bitwise, strings/symbols by text,
    /// aggregates elementwise, dictionaries as entry sets. Diverges on
    /// cyclic graphs; use identity checks there.
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) | (Value::SimpleVec(a), Value::SimpleVec(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.deep_eq(y))
            }
            (Value::Array(a), Value::Array(b)) => {
                let (a, b) = (a.read(), b.read());
                if a.elem != b.elem || a.dims != b.dims {
                    return false;
                }
                match (&a.storage, &b.storage) {
                    (ArrayStorage::Bits(x), ArrayStorage::Bits(y)) => x == y,
                    (ArrayStorage::Bools(x), ArrayStorage::Bools(y)) => x == y,
                    (ArrayStorage::Boxed(x), ArrayStorage::Boxed(y)) => {
                        x.len() == y.len()
                            && x.iter().zip(y.iter()).all(|(p, q)| match (p, q) {
                                (Some(p), Some(q)) => p.deep_eq(q),
                                (None, None) => true,
                                _ => false,
                            })
                    }
                    _ => false,
                }
            }
            (Value::Record(a), Value::Record(b)) => {
                let (a, b) = (a.read(), b.read());
                if !Value::Type(a.ty.clone()).deep_eq(&Value::Type(b.ty.clone())) {
                    return false;
                }
                match (&a.repr, &b.repr) {
                    (RecordRepr::Bits(x), RecordRepr::Bits(y)) => x == y,
                    (RecordRepr::Fields(x), RecordRepr::Fields(y)) => {
                        x.len() == y.len()
                            && x.iter().zip(y.iter()).all(|(p, q)| match (p, q) {
                                (Some(p), Some(q)) => p.deep_eq(q),
                                (None, None) => true,
                                _ => false,
                            })
                    }
                    _ => false,
                }
            }
            (Value::Dict(a), Value::Dict(b)) => {
                // Entry sets compare structurally even for identity
                // dictionaries; the keys on the two sides are never the same
                // allocations.
                let (a, b) = (a.read(), b.read());
                a.kind == b.kind
                    && a.len() == b.len()
                    && a.entries.iter().all(|(k, v)| {
                        b.entries
                            .iter()
                            .any(|(k2, v2)| k.deep_eq(k2) && v.deep_eq(v2))
                    })
            }
            (Value::Expr(a), Value::Expr(b)) => {
                let (a, b) = (a.read(), b.read());
                a.head == b.head
                    && a.args.len() == b.args.len()
                    && a.args.iter().zip(b.args.iter()).all(|(x, y)| x.deep_eq(y))
            }
            (Value::Type(a), Value::Type(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let names_match = Arc::ptr_eq(&a.name, &b.name)
                    || a.name.name == b.name.name;
                names_match
                    && a.params.len() == b.params.len()
                    && a.params
                        .iter()
                        .zip(b.params.iter())
                        .all(|(x, y)| x.deep_eq(y))
            }
            (Value::TypeName(a), Value::TypeName(b)) => Arc::ptr_eq(a, b) || a.name == b.name,
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::GlobalRef(a), Value::GlobalRef(b)) => {
                Arc::ptr_eq(&a.module, &b.module) && a.name == b.name
            }
            (Value::Method(a), Value::Method(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.name == b.name
                    && a.file == b.file
                    && a.line == b.line
                    && a.nargs == b.nargs
                    && a.isva == b.isva
                    && a.sig.deep_eq(&b.sig)
            }
            (Value::Frame(a), Value::Frame(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.def.deep_eq(&b.def) && a.spec_types.deep_eq(&b.spec_types)
            }
            (Value::Task(a), Value::Task(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.state == b.state
                    && a.failed == b.failed
                    && a.body.deep_eq(&b.body)
                    && a.result.deep_eq(&b.result)
            }
            _ => self.prim_eq(other),
        }
    }

    fn fmt_value(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "nothing"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int8(x) => write!(f, "{x}"),
            Value::Int16(x) => write!(f, "{x}"),
            Value::Int32(x) => write!(f, "{x}"),
            Value::Int64(x) => write!(f, "{x}"),
            Value::Int128(x) => write!(f, "{x}"),
            Value::UInt8(x) => write!(f, "{x}"),
            Value::UInt16(x) => write!(f, "{x}"),
            Value::UInt32(x) => write!(f, "{x}"),
            Value::UInt64(x) => write!(f, "{x}"),
            Value::UInt128(x) => write!(f, "{x}"),
            Value::Float16(bits) => write!(f, "float16({bits:#06x})"),
            Value::Float32(x) => write!(f, "{x}"),
            Value::Float64(x) => write!(f, "{x}"),
            Value::Char(c) => write!(f, "{c:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Symbol(s) => write!(f, ":{s}"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    v.fmt_value(f)?;
                }
                write!(f, ")")
            }
            Value::SimpleVec(items) => write!(f, "svec[{}]", items.len()),
            Value::Array(a) => {
                let a = a.read();
                write!(f, "array{:?}({:?})", a.elem, &a.dims[..])
            }
            Value::Record(r) => {
                let r = r.read();
                write!(f, "{}(…)", r.ty.name.name)
            }
            Value::Dict(d) => {
                let d = d.read();
                write!(f, "dict[{}]", d.len())
            }
            Value::Expr(e) => {
                let e = e.read();
                write!(f, "expr(:{}, {} args)", e.head, e.args.len())
            }
            Value::Type(t) => {
                write!(f, "{}", t.name.name)?;
                if !t.params.is_empty() {
                    write!(f, "{{{} params}}", t.params.len())?;
                }
                Ok(())
            }
            Value::TypeName(tn) => write!(f, "typename({})", tn.name),
            Value::Module(m) => write!(f, "module {}", m.full_name()),
            Value::Method(m) => {
                let m = m.read();
                write!(f, "method {} at {}:{}", m.name, m.file, m.line)
            }
            Value::Frame(_) => write!(f, "frame(…)"),
            Value::Task(t) => write!(f, "task({:?})", t.read().state),
            Value::GlobalRef(g) => write!(f, "{}.{}", g.module.full_name(), g.name),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_value(f)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_value(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_eq_is_structural() {
        let a = Value::tuple(vec![Value::Int64(1), Value::string("abc")]);
        let b = Value::tuple(vec![Value::Int64(1), Value::string("abc")]);
        assert!(a.deep_eq(&b));
        assert!(!a.egal(&b));
        assert!(a.egal(&a.clone()));
    }

    #[test]
    fn nan_compares_bitwise() {
        let a = Value::Float64(f64::NAN);
        let b = Value::Float64(f64::NAN);
        assert!(a.deep_eq(&b));
        assert!(!Value::Float64(0.0).deep_eq(&Value::Float64(-0.0)));
    }

    #[test]
    fn int_coercion_view() {
        assert_eq!(Value::UInt8(7).as_int(), Some(7));
        assert_eq!(Value::Int128(i128::MAX).as_int(), None);
    }
}
