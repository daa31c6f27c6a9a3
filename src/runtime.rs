//! The runtime-type resolution oracle.
//!
//! A [`Runtime`] is what the decoder leans on for everything that is not
//! bytes: resolving a root module from its identity pair, looking up global
//! bindings, allocating uninitialized instances, building array storage, and
//! owning the sandbox namespace that synthesized types land in. It also
//! holds the received-number cache for named reference objects; share one
//! runtime across decoders to get cross-stream identity.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::dtype::defs::{DataType, TypeName};
use crate::intern;
use crate::module::ModuleData;
use crate::utils::error::{JoltError, JoltResult};
use crate::value::array::{ArrayData, ElemType};
use crate::value::defs::{RecordData, RecordRepr, Value};
use crate::value::symbol::Symbol;

pub struct Runtime {
    roots: RwLock<HashMap<(Option<Uuid>, Symbol), Arc<ModuleData>>>,
    sandbox: Arc<ModuleData>,
    known: Mutex<HashMap<u64, Value>>,
}

static GLOBAL: Lazy<Arc<Runtime>> = Lazy::new(Runtime::new);

impl Runtime {
    pub fn new() -> Arc<Runtime> {
        Lazy::force(&intern::CORE);
        let core = intern::core_module();
        let sandbox = ModuleData::root(Symbol::new("sandbox"), None, true);
        let mut roots = HashMap::new();
        roots.insert((core.uuid, core.name), core);
        roots.insert((sandbox.uuid, sandbox.name), sandbox.clone());
        Arc::new(Runtime {
            roots: RwLock::new(roots),
            sandbox,
            known: Mutex::new(HashMap::new()),
        })
    }

    /// The default process-wide runtime used by the convenience entry points.
    pub fn global() -> Arc<Runtime> {
        GLOBAL.clone()
    }

    /// The synthetic namespace reconstructed types are installed into.
    pub fn sandbox(&self) -> Arc<ModuleData> {
        self.sandbox.clone()
    }

    /// Make a root module resolvable through this runtime.
    pub fn register_root(&self, module: &Arc<ModuleData>) {
        self.roots
            .write()
            .insert((module.uuid, module.name), module.clone());
    }

    pub fn resolve_root(
        &self,
        uuid: Option<Uuid>,
        name: Symbol,
    ) -> JoltResult<Arc<ModuleData>> {
        self.roots
            .read()
            .get(&(uuid, name))
            .cloned()
            .ok_or_else(|| JoltError::UnknownModule {
                name: name.as_str().to_string(),
            })
    }

    pub fn known_lookup(&self, number: u64) -> Option<Value> {
        self.known.lock().get(&number).cloned()
    }

    pub fn known_insert(&self, number: u64, value: Value) {
        self.known.lock().insert(number, value);
    }

    /// Allocate an uninitialized instance of a concrete type; every field
    /// starts absent so the decoder can install them one by one.
    pub fn allocate(&self, ty: &Arc<DataType>) -> JoltResult<Value> {
        let info = ty.name.info.read();
        if info.is_abstract {
            return Err(JoltError::Unsupported(format!(
                "cannot allocate abstract type '{}'",
                ty.name.name
            )));
        }
        let nfields = info.field_names.len();
        drop(info);
        Ok(Value::Record(Arc::new(RwLock::new(RecordData {
            ty: ty.clone(),
            repr: RecordRepr::Fields(vec![None; nfields]),
        }))))
    }

    /// Install a field value at the given index of an allocated instance.
    pub fn set_field(&self, record: &Value, index: usize, value: Value) -> JoltResult<()> {
        match record {
            Value::Record(r) => match &mut r.write().repr {
                RecordRepr::Fields(fields) if index < fields.len() => {
                    fields[index] = Some(value);
                    Ok(())
                }
                _ => Err(JoltError::Desync(format!(
                    "no field slot {index} to install"
                ))),
            },
            _ => Err(JoltError::Desync(
                "field installation on a non-record value".into(),
            )),
        }
    }

    /// Construct arrayed storage of the given element type and shape.
    pub fn new_array(&self, elem: ElemType, dims: &[usize]) -> Value {
        Value::array(ArrayData::uninit(elem, dims.iter().copied().collect()))
    }

    /// A sandbox binding name that does not collide with an existing one.
    pub fn fresh_sandbox_name(&self, base: Symbol) -> Symbol {
        if self.sandbox.get_binding(base).is_none() {
            return base;
        }
        let mut n = 1u32;
        loop {
            let candidate = Symbol::new(&format!("{}##{}", base, n));
            if self.sandbox.get_binding(candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Method-registration primitive: attach reconstructed method
    /// definitions to a type name and refresh its dispatch arity.
    pub fn install_methods(&self, tn: &Arc<TypeName>, methods: Vec<Value>) {
        let mut max_args = tn.info.read().max_args;
        for m in &methods {
            if let Value::Method(md) = m {
                max_args = max_args.max(md.read().nargs.max(0) as u32);
            }
        }
        debug!(
            "installing {} method(s) on type '{}'",
            methods.len(),
            tn.name
        );
        tn.info.write().max_args = max_args;
        *tn.methods.write() = methods;
    }

    /// Define a nominal struct type with named, typed fields and bind it in
    /// `module` under its name.
    pub fn define_struct(
        &self,
        module: &Arc<ModuleData>,
        name: &str,
        fields: &[(&str, Value)],
        mutable: bool,
    ) -> Value {
        let tn = TypeName::new(Symbol::new(name), module.clone());
        {
            let mut info = tn.info.write();
            info.field_names = fields.iter().map(|(n, _)| Symbol::new(n)).collect();
            info.field_types = fields.iter().map(|(_, t)| t.clone()).collect();
            info.is_mutable = mutable;
            info.n_initialized = fields.len() as u32;
            info.supertype = Some(intern::CORE.any.clone());
        }
        let wrapper = tn.make_wrapper();
        module.set_binding(tn.name, wrapper.clone());
        wrapper
    }

    /// Define a primitive-bits type of the given byte size.
    pub fn define_primitive(&self, module: &Arc<ModuleData>, name: &str, size: u32) -> Value {
        let tn = TypeName::with_primitive_size(Symbol::new(name), module.clone(), Some(size));
        tn.info.write().supertype = Some(intern::CORE.any.clone());
        let wrapper = tn.make_wrapper();
        module.set_binding(tn.name, wrapper.clone());
        wrapper
    }

    /// Define a zero-field singleton type; its unique instance is created
    /// eagerly.
    pub fn define_singleton(&self, module: &Arc<ModuleData>, name: &str) -> Value {
        let tn = TypeName::new(Symbol::new(name), module.clone());
        {
            let mut info = tn.info.write();
            info.has_instance = true;
            info.supertype = Some(intern::CORE.any.clone());
        }
        let wrapper = tn.make_wrapper();
        let dt = wrapper.as_type().expect("wrapper is a type").clone();
        *tn.instance.write() = Some(Value::Record(Arc::new(RwLock::new(RecordData {
            ty: dt,
            repr: RecordRepr::Fields(Vec::new()),
        }))));
        module.set_binding(tn.name, wrapper.clone());
        wrapper
    }

    /// Define an anonymous callable type. The generated `#`-prefixed name
    /// forces the full descriptor (type-name record plus attached methods)
    /// onto the wire.
    pub fn define_callable(
        &self,
        module: &Arc<ModuleData>,
        base: &str,
        fields: &[(&str, Value)],
    ) -> Value {
        let name = format!("#{}", base);
        let tn = TypeName::new(Symbol::new(&name), module.clone());
        {
            let mut info = tn.info.write();
            info.field_names = fields.iter().map(|(n, _)| Symbol::new(n)).collect();
            info.field_types = fields.iter().map(|(_, t)| t.clone()).collect();
            info.n_initialized = fields.len() as u32;
            info.supertype = Some(intern::CORE.any.clone());
        }
        let wrapper = tn.make_wrapper();
        module.set_binding(tn.name, wrapper.clone());
        wrapper
    }
}
