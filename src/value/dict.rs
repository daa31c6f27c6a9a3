//! Dictionaries with a per-instance hashing discipline.
//!
//! `Hashed` dictionaries compare keys structurally, `Identity` dictionaries
//! by object identity. Entries are kept as an association list in insertion
//! order: keys are dynamic values whose discipline varies per dictionary, so
//! there is no single total hash to build a table over, and the codec itself
//! only ever iterates and rebuilds.

use crate::value::defs::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictKind {
    /// Keys compared by structural equality.
    Hashed,
    /// Keys compared by object identity.
    Identity,
}

pub struct DictData {
    pub kind: DictKind,
    pub entries: Vec<(Value, Value)>,
}

impl DictData {
    pub fn new(kind: DictKind) -> DictData {
        DictData {
            kind,
            entries: Vec::new(),
        }
    }

    fn key_matches(&self, a: &Value, b: &Value) -> bool {
        match self.kind {
            DictKind::Hashed => a.deep_eq(b),
            DictKind::Identity => a.egal(b),
        }
    }

    /// Insert or replace under this dictionary's key discipline.
    pub fn insert(&mut self, key: Value, value: Value) {
        for entry in &mut self.entries {
            if {
                let k = &entry.0;
                match self.kind {
                    DictKind::Hashed => k.deep_eq(&key),
                    DictKind::Identity => k.egal(&key),
                }
            } {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| self.key_matches(k, key))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn hashed_replaces_structurally_equal_keys() {
        let mut d = DictData::new(DictKind::Hashed);
        d.insert(Value::string("k"), Value::Int64(1));
        d.insert(Value::string("k"), Value::Int64(2));
        assert_eq!(d.len(), 1);
        assert!(d.get(&Value::string("k")).unwrap().deep_eq(&Value::Int64(2)));
    }

    #[test]
    fn identity_keeps_distinct_allocations() {
        let mut d = DictData::new(DictKind::Identity);
        let a = Value::Str(Arc::new(String::from("k")));
        let b = Value::Str(Arc::new(String::from("k")));
        d.insert(a.clone(), Value::Int64(1));
        d.insert(b, Value::Int64(2));
        assert_eq!(d.len(), 2);
        assert!(d.get(&a).unwrap().deep_eq(&Value::Int64(1)));
    }
}
