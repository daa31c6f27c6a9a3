//! Module tree: named namespaces with global bindings.
//!
//! A module chain bottoms out at a *root* whose identity is the pair
//! `(uuid-or-none, name)`; that pair plus the child-name path is what the
//! wire format emits for a module reference. Modules are process-lifetime
//! objects; parent and child links are both strong on purpose.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::value::defs::Value;
use crate::value::symbol::Symbol;

pub struct ModuleData {
    pub name: Symbol,
    parent: Option<Arc<ModuleData>>,
    /// Root package identity; `None` below the root and for anonymous roots.
    pub uuid: Option<Uuid>,
    /// Synthetic namespaces force full type descriptors on the wire.
    pub sandbox: bool,
    bindings: RwLock<BTreeMap<Symbol, Value>>,
    children: RwLock<BTreeMap<Symbol, Arc<ModuleData>>>,
}

impl ModuleData {
    pub fn root(name: Symbol, uuid: Option<Uuid>, sandbox: bool) -> Arc<ModuleData> {
        Arc::new(ModuleData {
            name,
            parent: None,
            uuid,
            sandbox,
            bindings: RwLock::new(BTreeMap::new()),
            children: RwLock::new(BTreeMap::new()),
        })
    }

    /// Get or create the named child module.
    pub fn child(self: &Arc<Self>, name: Symbol) -> Arc<ModuleData> {
        let mut children = self.children.write();
        children
            .entry(name)
            .or_insert_with(|| {
                Arc::new(ModuleData {
                    name,
                    parent: Some(self.clone()),
                    uuid: None,
                    sandbox: self.sandbox,
                    bindings: RwLock::new(BTreeMap::new()),
                    children: RwLock::new(BTreeMap::new()),
                })
            })
            .clone()
    }

    pub fn get_child(&self, name: Symbol) -> Option<Arc<ModuleData>> {
        self.children.read().get(&name).cloned()
    }

    pub fn parent(&self) -> Option<&Arc<ModuleData>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn set_binding(&self, name: Symbol, value: Value) {
        self.bindings.write().insert(name, value);
    }

    pub fn get_binding(&self, name: Symbol) -> Option<Value> {
        self.bindings.read().get(&name).cloned()
    }

    /// Names from the root down to this module, root excluded.
    pub fn path_from_root(self: &Arc<Self>) -> (Arc<ModuleData>, Vec<Symbol>) {
        let mut names = Vec::new();
        let mut cur = self.clone();
        while let Some(p) = cur.parent.clone() {
            names.push(cur.name);
            cur = p;
        }
        names.reverse();
        (cur, names)
    }

    /// Dotted path for diagnostics.
    pub fn full_name(&self) -> String {
        match &self.parent {
            None => self.name.as_str().to_string(),
            Some(p) => format!("{}.{}", p.full_name(), self.name),
        }
    }
}
