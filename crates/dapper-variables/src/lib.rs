//! Variable reference arena and DAP variable rendering for the Dapper debug
//! adapter.
//!
//! # Overview
//!
//! - [`Value`] - a language-agnostic debuggee value (scalars, lists, maps, refs)
//! - [`RenderedVariable`] - DAP-compatible variable representation
//! - [`VariableRenderer`] - trait for converting [`Value`] into [`RenderedVariable`]
//! - [`VariableArena`] - per-stop handle allocator for lazily-expandable values
//!
//! A backend reports [`Value`] trees; this crate never talks to the backend
//! directly, it only shapes and allocates references to what it is given.

mod arena;
mod renderer;

pub use arena::VariableArena;
pub use renderer::{DefaultVariableRenderer, RenderedVariable, VariableRenderer};

use serde::{Deserialize, Serialize};

/// A value reported by a backend, independent of the debuggee's language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,

    Bool(bool),

    /// String scalar value.
    Str(String),

    Float(f64),

    Int(i64),

    /// Ordered list/array/tuple.
    List(Vec<Value>),

    /// Ordered key-value mapping (dict/hash/object fields).
    Map(Vec<(String, Value)>),

    /// Reference/pointer to another value.
    Ref(Box<Value>),

    /// An instance of a class/type.
    Object {
        class: String,
        value: Box<Value>,
    },

    /// A callable (function/method/closure).
    Function {
        name: Option<String>,
    },

    /// A value whose full contents were elided because it was too large.
    Truncated {
        summary: String,
        total_count: Option<usize>,
    },

    /// An error surfaced while inspecting the value itself.
    Error(String),
}

impl Value {
    /// Returns true if this value can be expanded (has children).
    #[must_use]
    pub fn is_expandable(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_) | Value::Ref(_) | Value::Object { .. })
    }

    /// Returns the type name used for display in the DAP variables view.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Float(_) => "float",
            Value::Int(_) => "int",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Ref(_) => "ref",
            Value::Object { .. } => "object",
            Value::Function { .. } => "function",
            Value::Truncated { .. } => "...",
            Value::Error(_) => "error",
        }
    }

    /// Returns the number of child elements if applicable.
    #[must_use]
    pub fn child_count(&self) -> Option<usize> {
        match self {
            Value::List(elements) => Some(elements.len()),
            Value::Map(pairs) => Some(pairs.len()),
            Value::Truncated { total_count, .. } => *total_count,
            _ => None,
        }
    }

    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    #[must_use]
    pub fn list(elements: Vec<Value>) -> Self {
        Value::List(elements)
    }

    #[must_use]
    pub fn map(pairs: Vec<(String, Value)>) -> Self {
        Value::Map(pairs)
    }

    #[must_use]
    pub fn reference(value: Value) -> Self {
        Value::Ref(Box::new(value))
    }

    #[must_use]
    pub fn object(class: impl Into<String>, value: Value) -> Self {
        Value::Object { class: class.into(), value: Box::new(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_expandable() {
        assert!(!Value::Null.is_expandable());
        assert!(!Value::Str("test".to_string()).is_expandable());
        assert!(Value::List(vec![]).is_expandable());
        assert!(Value::Map(vec![]).is_expandable());
        assert!(Value::Ref(Box::new(Value::Null)).is_expandable());
    }

    #[test]
    fn value_type_name() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Str("test".to_string()).type_name(), "str");
        assert_eq!(Value::List(vec![]).type_name(), "list");
        assert_eq!(Value::Map(vec![]).type_name(), "map");
    }

    #[test]
    fn value_child_count() {
        assert_eq!(Value::Null.child_count(), None);
        assert_eq!(Value::List(vec![Value::Null, Value::Null]).child_count(), Some(2));
        assert_eq!(Value::Map(vec![("key".to_string(), Value::Null)]).child_count(), Some(1));
    }

    #[test]
    fn value_constructors() {
        let scalar = Value::str("hello");
        assert!(matches!(scalar, Value::Str(s) if s == "hello"));

        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(list, Value::List(a) if a.len() == 2));

        let map = Value::map(vec![("key".to_string(), Value::str("value"))]);
        assert!(matches!(map, Value::Map(h) if h.len() == 1));

        let reference = Value::reference(Value::Int(42));
        assert!(matches!(reference, Value::Ref(_)));

        let object = Value::object("MyClass", Value::Map(vec![]));
        assert!(matches!(object, Value::Object { class, .. } if class == "MyClass"));
    }
}
