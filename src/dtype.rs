//! Type descriptors: nominal types, their name records, and the process-wide
//! stable numbering used to deduplicate named reference objects across
//! streams.

pub mod defs;

pub use defs::{stable_number, DataType, TypeName, TypeNameInfo};
