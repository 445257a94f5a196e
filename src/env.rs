//! Typed variable environment with single-assignment binding

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BuilderError, Result};
use crate::hash::Hash;
use crate::signature::Signature;

/// Declared kind of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VarKind {
    Number,
    Text,
    Flag,
    Digest,
    Signature,
}

impl VarKind {
    pub fn name(self) -> &'static str {
        match self {
            VarKind::Number => "Number",
            VarKind::Text => "Text",
            VarKind::Flag => "Flag",
            VarKind::Digest => "Digest",
            VarKind::Signature => "Signature",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Number" => Some(VarKind::Number),
            "Text" => Some(VarKind::Text),
            "Flag" => Some(VarKind::Flag),
            "Digest" => Some(VarKind::Digest),
            "Signature" => Some(VarKind::Signature),
            _ => None,
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value a variable can be bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Number(i64),
    Text(String),
    Flag(bool),
    Digest(Hash),
    Signature(Signature),
}

impl Value {
    pub fn kind(&self) -> VarKind {
        match self {
            Value::Number(_) => VarKind::Number,
            Value::Text(_) => VarKind::Text,
            Value::Flag(_) => VarKind::Flag,
            Value::Digest(_) => VarKind::Digest,
            Value::Signature(_) => VarKind::Signature,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Flag(b) => write!(f, "{}", b),
            Value::Digest(h) => write!(f, "{}", h),
            Value::Signature(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Flag(b)
    }
}

impl From<Hash> for Value {
    fn from(h: Hash) -> Self {
        Value::Digest(h)
    }
}

impl From<Signature> for Value {
    fn from(s: Signature) -> Self {
        Value::Signature(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Slot {
    kind: VarKind,
    value: Option<Value>,
}

/// Named variables with declared kinds and optional bound values
///
/// Ordered by name so that listings and the textual form are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    slots: BTreeMap<String, Slot>,
}

impl Env {
    pub fn new() -> Self {
        Env::default()
    }

    /// Declare `name` with `kind`; redeclaring with the same kind is a no-op
    pub fn declare(&mut self, name: &str, kind: VarKind) -> Result<()> {
        if let Some(slot) = self.slots.get(name) {
            if slot.kind != kind {
                return Err(BuilderError::Declaration(format!(
                    "variable '{}' is already declared as {}, cannot redeclare as {}",
                    name, slot.kind, kind
                )));
            }
            return Ok(());
        }
        self.slots.insert(name.to_string(), Slot { kind, value: None });
        Ok(())
    }

    pub fn bind(&mut self, name: &str, value: Value) -> Result<()> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| BuilderError::Binding(format!("variable '{}' is not declared", name)))?;
        if slot.kind != value.kind() {
            return Err(BuilderError::Binding(format!(
                "variable '{}' is declared as {}, got a {} value",
                name,
                slot.kind,
                value.kind()
            )));
        }
        if slot.value.is_some() {
            return Err(BuilderError::Binding(format!("variable '{}' is already bound", name)));
        }
        slot.value = Some(value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| BuilderError::Binding(format!("variable '{}' is not declared", name)))?;
        slot.value
            .as_ref()
            .ok_or_else(|| BuilderError::Binding(format!("variable '{}' is not bound", name)))
    }

    pub fn kind(&self, name: &str) -> Option<VarKind> {
        self.slots.get(name).map(|s| s.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|s| s.value.is_some())
    }

    pub fn is_free(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|s| s.value.is_none())
    }

    /// Drop a declaration together with its binding
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.slots
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BuilderError::Declaration(format!("variable '{}' is not declared", name)))
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, VarKind)> + '_ {
        self.slots.iter().map(|(n, s)| (n.as_str(), s.kind))
    }

    pub fn free_variables(&self) -> impl Iterator<Item = (&str, VarKind)> + '_ {
        self.slots
            .iter()
            .filter(|(_, s)| s.value.is_none())
            .map(|(n, s)| (n.as_str(), s.kind))
    }

    pub fn bound_variables(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.slots
            .iter()
            .filter_map(|(n, s)| s.value.as_ref().map(|v| (n.as_str(), v)))
    }

    /// True when every declared variable is bound
    pub fn is_ready(&self) -> bool {
        self.slots.values().all(|s| s.value.is_some())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_bind() {
        let mut env = Env::new();
        env.declare("amount", VarKind::Number).unwrap();
        assert!(env.is_free("amount"));
        assert!(!env.is_ready());

        env.bind("amount", Value::Number(42)).unwrap();
        assert!(env.is_bound("amount"));
        assert_eq!(env.get("amount").unwrap(), &Value::Number(42));
        assert!(env.is_ready());
    }

    #[test]
    fn test_redeclare_same_kind_is_noop() {
        let mut env = Env::new();
        env.declare("x", VarKind::Text).unwrap();
        env.bind("x", "hello".into()).unwrap();
        env.declare("x", VarKind::Text).unwrap();
        assert!(env.is_bound("x"));
    }

    #[test]
    fn test_redeclare_different_kind_fails() {
        let mut env = Env::new();
        env.declare("x", VarKind::Text).unwrap();
        let err = env.declare("x", VarKind::Number).unwrap_err();
        assert!(matches!(err, BuilderError::Declaration(_)));
    }

    #[test]
    fn test_bind_errors() {
        let mut env = Env::new();
        assert!(matches!(env.bind("nope", Value::Flag(true)), Err(BuilderError::Binding(_))));

        env.declare("f", VarKind::Flag).unwrap();
        assert!(matches!(env.bind("f", Value::Number(1)), Err(BuilderError::Binding(_))));

        env.bind("f", Value::Flag(true)).unwrap();
        assert!(matches!(env.bind("f", Value::Flag(false)), Err(BuilderError::Binding(_))));
        assert_eq!(env.get("f").unwrap(), &Value::Flag(true));
    }

    #[test]
    fn test_listing_and_remove() {
        let mut env = Env::new();
        env.declare("b", VarKind::Number).unwrap();
        env.declare("a", VarKind::Flag).unwrap();
        env.bind("a", true.into()).unwrap();

        let free: Vec<_> = env.free_variables().map(|(n, _)| n).collect();
        assert_eq!(free, vec!["b"]);
        let all: Vec<_> = env.variables().map(|(n, _)| n).collect();
        assert_eq!(all, vec!["a", "b"]);

        env.remove("a").unwrap();
        assert!(!env.contains("a"));
        assert!(env.remove("a").is_err());
    }
}
