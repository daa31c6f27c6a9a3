//! Runtime value model: the closed `Value` union and its aggregate payloads.

pub mod array;
pub mod defs;
pub mod dict;
pub mod symbol;

pub use array::{ArrayData, ArrayStorage, ElemType};
pub use defs::{
    ExprData, FrameData, GlobalRefData, MethodData, RecordData, RecordRepr, TaskData, TaskState,
    Value, ValueKind,
};
pub use dict::{DictData, DictKind};
pub use symbol::Symbol;
