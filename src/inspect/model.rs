// Object model seen by the inspector, and its binding to snippet values

use crate::eval::format::{callable_text, scalar_text};
use crate::eval::interp::Interpreter;
use crate::eval::value::{Property, Value, error_text};

/// Coarse classification driving the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Null,
    Scalar,
    /// Indexable, with a length
    Sequence,
    Structured,
    Callable,
}

/// A named member, with getters already evaluated
pub struct MemberSlot<V> {
    pub name: String,
    /// `Err` carries the message of a getter that threw
    pub value: Result<V, String>,
}

/// What the inspector needs from a value representation
pub trait ObjectModel {
    type Value: Clone;

    fn shape(&self, value: &Self::Value) -> Shape;

    /// Reference identity; `None` for values without one
    fn identity(&self, value: &Self::Value) -> Option<usize>;

    fn type_name(&self, value: &Self::Value) -> String;

    /// Short one-line rendering for a report entry
    fn render(&self, value: &Self::Value) -> String;

    fn len(&self, value: &Self::Value) -> usize;

    fn element(&self, value: &Self::Value, index: usize) -> Option<Self::Value>;

    /// Own named members of `holder`; getters run against `receiver`
    fn members(&self, holder: &Self::Value, receiver: &Self::Value) -> Vec<MemberSlot<Self::Value>>;

    /// Next prototype, or `None` once a built-in root is reached
    fn prototype(&self, value: &Self::Value) -> Option<Self::Value>;

    /// Declaration text of a callable
    fn callable_source(&self, value: &Self::Value) -> Option<String>;

    fn is_async(&self, value: &Self::Value) -> bool;
}

/// [`ObjectModel`] over the snippet language's values
pub struct ValueModel<'a> {
    interp: &'a Interpreter,
}

impl<'a> ValueModel<'a> {
    pub fn new(interp: &'a Interpreter) -> Self {
        Self { interp }
    }
}

impl ObjectModel for ValueModel<'_> {
    type Value = Value;

    fn shape(&self, value: &Value) -> Shape {
        match value {
            Value::Undefined | Value::Null => Shape::Null,
            Value::Bool(_) | Value::Number(_) | Value::Str(_) => Shape::Scalar,
            Value::Array(_) => Shape::Sequence,
            Value::Object(_) | Value::Promise(_) => Shape::Structured,
            Value::Function(_) => Shape::Callable,
        }
    }

    fn identity(&self, value: &Value) -> Option<usize> {
        value.identity()
    }

    fn type_name(&self, value: &Value) -> String {
        match value {
            Value::Array(_) => "array".to_string(),
            Value::Object(_) | Value::Promise(_) => value.class_name(),
            other => other.type_label().to_string(),
        }
    }

    fn render(&self, value: &Value) -> String {
        match value {
            Value::Array(items) => format!("Array({})", items.borrow().len()),
            Value::Object(obj) if obj.class.ends_with("Error") => format!("[{}]", error_text(obj)),
            Value::Object(obj) => format!("[{}]", obj.class),
            Value::Function(f) => callable_text(f),
            Value::Promise(_) => "Promise { <pending> }".to_string(),
            scalar => scalar_text(scalar),
        }
    }

    fn len(&self, value: &Value) -> usize {
        match value {
            Value::Array(items) => items.borrow().len(),
            _ => 0,
        }
    }

    fn element(&self, value: &Value, index: usize) -> Option<Value> {
        match value {
            Value::Array(items) => items.borrow().get(index).cloned(),
            _ => None,
        }
    }

    fn members(&self, holder: &Value, receiver: &Value) -> Vec<MemberSlot<Value>> {
        let Value::Object(obj) = holder else {
            return Vec::new();
        };
        // Snapshot first; getters may touch the same object
        let props: Vec<(String, Property)> = obj
            .props
            .borrow()
            .iter()
            .map(|(k, p)| (k.clone(), p.clone()))
            .collect();
        props
            .into_iter()
            .map(|(name, prop)| {
                let value = match prop {
                    Property::Data(v) => Ok(v),
                    Property::Accessor(getter) => self
                        .interp
                        .call_sync(&Value::Function(getter), receiver.clone(), Vec::new())
                        .map_err(|e| e.to_string()),
                };
                MemberSlot { name, value }
            })
            .collect()
    }

    fn prototype(&self, value: &Value) -> Option<Value> {
        let proto = value.as_object()?.prototype()?;
        if self.interp.is_builtin_proto(&proto) {
            None
        } else {
            Some(Value::Object(proto))
        }
    }

    fn callable_source(&self, value: &Value) -> Option<String> {
        match value {
            Value::Function(f) => Some(f.source()),
            _ => None,
        }
    }

    fn is_async(&self, value: &Value) -> bool {
        matches!(value, Value::Function(f) if f.is_async)
    }
}
