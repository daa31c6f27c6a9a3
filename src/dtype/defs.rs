use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::module::ModuleData;
use crate::utils::error::{JoltError, JoltResult};
use crate::utils::ref_id::ObjId;
use crate::value::defs::Value;
use crate::value::symbol::Symbol;

/// A concrete nominal type: a name record plus applied parameters.
///
/// The unparameterized form of a type is its *wrapper*; parameterized
/// variants share the wrapper's [`TypeName`] and differ only in `params`.
pub struct DataType {
    pub name: Arc<TypeName>,
    pub params: Vec<Value>,
}

impl DataType {
    /// Apply parameters to a name record, producing a concrete type.
    pub fn apply(name: Arc<TypeName>, params: Vec<Value>) -> Arc<DataType> {
        Arc::new(DataType { name, params })
    }
}

/// Structural information behind a type name.
///
/// Everything here can be filled after the record exists, because the
/// decoder installs a blank record into its slot table before reading the
/// body (a field type may back-reference the type under construction).
pub struct TypeNameInfo {
    pub field_names: Vec<Symbol>,
    pub supertype: Option<Value>,
    pub parameters: Vec<Value>,
    pub field_types: Vec<Value>,
    /// Whether a unique instance exists (zero-field singleton types).
    pub has_instance: bool,
    pub is_abstract: bool,
    pub is_mutable: bool,
    /// Count of fields initialized at construction.
    pub n_initialized: u32,
    /// Maximum dispatch arity of attached methods.
    pub max_args: u32,
}

impl Default for TypeNameInfo {
    fn default() -> Self {
        TypeNameInfo {
            field_names: Vec::new(),
            supertype: None,
            parameters: Vec::new(),
            field_types: Vec::new(),
            has_instance: false,
            is_abstract: false,
            is_mutable: false,
            n_initialized: 0,
            max_args: 0,
        }
    }
}

/// The name record of a nominal type: enough information to locate the type
/// by (module, name), or to synthesize it when the reader cannot.
pub struct TypeName {
    pub name: Symbol,
    pub module: Arc<ModuleData>,
    pub info: RwLock<TypeNameInfo>,
    /// Attached method definitions (anonymous callable types).
    pub methods: RwLock<Vec<Value>>,
    /// The unparameterized type, once constructed.
    pub wrapper: RwLock<Option<Value>>,
    /// The unique instance of a singleton type.
    pub instance: RwLock<Option<Value>>,
    /// Byte size for primitive-bits types. Local knowledge only; it does not
    /// travel, so primitive records decode only against a registered type.
    pub primitive_size: Option<u32>,
}

impl TypeName {
    pub fn new(name: Symbol, module: Arc<ModuleData>) -> Arc<TypeName> {
        TypeName::with_primitive_size(name, module, None)
    }

    pub fn with_primitive_size(
        name: Symbol,
        module: Arc<ModuleData>,
        primitive_size: Option<u32>,
    ) -> Arc<TypeName> {
        Arc::new(TypeName {
            name,
            module,
            info: RwLock::new(TypeNameInfo::default()),
            methods: RwLock::new(Vec::new()),
            wrapper: RwLock::new(None),
            instance: RwLock::new(None),
            primitive_size,
        })
    }

    /// Anonymous callable types carry generated `#`-prefixed names; their
    /// descriptors always travel in full.
    pub fn is_anonymous(&self) -> bool {
        self.name.as_str().starts_with('#')
    }

    /// Build and store the wrapper type. Idempotent.
    pub fn make_wrapper(self: &Arc<Self>) -> Value {
        let mut slot = self.wrapper.write();
        if let Some(w) = slot.as_ref() {
            return w.clone();
        }
        let w = Value::Type(DataType::apply(self.clone(), Vec::new()));
        *slot = Some(w.clone());
        w
    }

    /// The wrapper type, failing if the record is still under construction.
    pub fn wrapper_type(&self) -> JoltResult<Value> {
        self.wrapper
            .read()
            .clone()
            .ok_or_else(|| JoltError::TypeUnderConstruction {
                name: self.name.as_str().to_string(),
            })
    }

    /// Whether `dt` is this name's wrapper object.
    pub fn is_wrapper(&self, dt: &Arc<DataType>) -> bool {
        match &*self.wrapper.read() {
            Some(Value::Type(w)) => Arc::ptr_eq(w, dt),
            _ => false,
        }
    }
}

static NUMBER_SALT: AtomicU64 = AtomicU64::new(1);
static ASSIGNED_NUMBERS: Lazy<Mutex<HashMap<ObjId, u64>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-wide stable number for a named reference object (type names,
/// methods, call frames). Assigned monotonically on first request; the same
/// object keeps its number across streams within one process.
pub fn stable_number(key: ObjId) -> u64 {
    let mut map = ASSIGNED_NUMBERS.lock();
    *map.entry(key)
        .or_insert_with(|| NUMBER_SALT.fetch_add(1, Ordering::Relaxed))
}
