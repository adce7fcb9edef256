// Runtime values of the snippet language

use crate::eval::ast::FunctionDecl;
use crate::eval::error::EvalResult;
use crate::eval::interp::Interpreter;
use crate::eval::scope::Scope;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Host function: receives the interpreter, `this` and the arguments
pub type NativeFn = Rc<dyn Fn(Interpreter, Value, Vec<Value>) -> LocalBoxFuture<'static, EvalResult<Value>>>;

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    Object(Rc<Object>),
    Function(Rc<Function>),
    Promise(Rc<Promise>),
}

#[derive(Clone)]
pub enum Property {
    Data(Value),
    /// Getter-backed member, evaluated on every read
    Accessor(Rc<Function>),
}

pub struct Object {
    /// Type name shown by inspection, e.g. `Object` or `Error`
    pub class: String,
    pub props: RefCell<IndexMap<String, Property>>,
    pub proto: RefCell<Option<Rc<Object>>>,
}

impl Object {
    pub fn new(class: impl Into<String>, proto: Option<Rc<Object>>) -> Rc<Self> {
        Rc::new(Self {
            class: class.into(),
            props: RefCell::new(IndexMap::new()),
            proto: RefCell::new(proto),
        })
    }

    pub fn get_own(&self, key: &str) -> Option<Property> {
        self.props.borrow().get(key).cloned()
    }

    /// Own or inherited property
    pub fn lookup(&self, key: &str) -> Option<Property> {
        if let Some(prop) = self.get_own(key) {
            return Some(prop);
        }
        let mut current = self.proto.borrow().clone();
        let mut hops = 0;
        while let Some(obj) = current {
            if let Some(prop) = obj.get_own(key) {
                return Some(prop);
            }
            hops += 1;
            if hops > 64 {
                return None;
            }
            current = obj.proto.borrow().clone();
        }
        None
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.props.borrow_mut().insert(key.into(), Property::Data(value));
    }

    pub fn define_getter(&self, key: impl Into<String>, getter: Rc<Function>) {
        self.props.borrow_mut().insert(key.into(), Property::Accessor(getter));
    }

    pub fn keys(&self) -> Vec<String> {
        self.props.borrow().keys().cloned().collect()
    }

    pub fn prototype(&self) -> Option<Rc<Object>> {
        self.proto.borrow().clone()
    }
}

pub enum FunctionKind {
    /// Arrow functions see `this` through `scope`
    User {
        decl: Rc<FunctionDecl>,
        scope: Rc<Scope>,
    },
    Native {
        signature: String,
        call: NativeFn,
    },
}

pub struct Function {
    pub name: String,
    pub is_async: bool,
    pub kind: FunctionKind,
}

impl Function {
    pub fn native(name: &str, params: &str, is_async: bool, call: NativeFn) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            is_async,
            kind: FunctionKind::Native {
                signature: format!(
                    "{}function {}({}) {{ [native code] }}",
                    if is_async { "async " } else { "" },
                    name,
                    params
                ),
                call,
            },
        })
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, FunctionKind::Native { .. })
    }

    /// Declaration text, or the native signature
    pub fn source(&self) -> String {
        match &self.kind {
            FunctionKind::User { decl, .. } => decl.source.to_string(),
            FunctionKind::Native { signature, .. } => signature.clone(),
        }
    }
}

/// Deferred result of an async call; runs when first awaited
pub struct Promise {
    future: Shared<LocalBoxFuture<'static, EvalResult<Value>>>,
}

impl Promise {
    pub fn new(future: LocalBoxFuture<'static, EvalResult<Value>>) -> Rc<Self> {
        Rc::new(Self {
            future: future.shared(),
        })
    }

    pub async fn settle(&self) -> EvalResult<Value> {
        self.future.clone().await
    }

    /// The outcome, if some awaiter already drove it to completion
    pub fn peek(&self) -> Option<EvalResult<Value>> {
        self.future.peek().cloned()
    }
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn typeof_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Promise(_) => "object",
        }
    }

    /// `typeof`, with arrays and null told apart
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Array(_) => "array",
            other => other.typeof_name(),
        }
    }

    /// Constructor-style name used by inspection and dumps
    pub fn class_name(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Number(_) => "number".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Array(_) => "Array".to_string(),
            Value::Object(obj) => obj.class.clone(),
            Value::Function(_) => "Function".to_string(),
            Value::Promise(_) => "Promise".to_string(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Array(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion as used by `+`, `String()` and template joins
    pub fn to_display(&self) -> String {
        self.to_display_guarded(0)
    }

    fn to_display_guarded(&self, depth: usize) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) if depth < 8 => items
                .borrow()
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_display_guarded(depth + 1),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Array(_) => String::new(),
            Value::Object(obj) if obj.class.ends_with("Error") => error_text(obj),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(f) => f.source(),
            Value::Promise(_) => "[object Promise]".to_string(),
        }
    }

    pub fn as_object(&self) -> Option<&Rc<Object>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Reference identity for heap values
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(Rc::as_ptr(a) as *const () as usize),
            Value::Object(o) => Some(Rc::as_ptr(o) as *const () as usize),
            Value::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            Value::Promise(p) => Some(Rc::as_ptr(p) as *const () as usize),
            _ => None,
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Number(_), Value::Str(_))
            | (Value::Str(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                if self.identity().is_some() || other.identity().is_some() {
                    return self.to_display() == other.to_display();
                }
                self.to_number() == other.to_number()
            }
            (Value::Str(_), b) if b.identity().is_some() => self.to_display() == b.to_display(),
            (a, Value::Str(_)) if a.identity().is_some() => a.to_display() == other.to_display(),
            _ => self.strict_equals(other),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.as_str()))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Array(items) => write!(f, "Array({})", items.borrow().len()),
            Value::Object(obj) => write!(f, "{} {{..}}", obj.class),
            Value::Function(func) => write!(f, "[Function: {}]", func.name),
            Value::Promise(_) => write!(f, "Promise"),
        }
    }
}

/// Number formatting: integral values print without a fraction
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}

pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

/// `Name: message` for error objects
pub fn error_text(obj: &Object) -> String {
    let field = |key: &str| match obj.get_own(key) {
        Some(Property::Data(v)) if !v.is_nullish() => Some(v.to_display()),
        _ => None,
    };
    let name = field("name").unwrap_or_else(|| obj.class.clone());
    match field("message") {
        Some(message) if !message.is_empty() => format!("{}: {}", name, message),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(2.0), "2");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::Number(1.0).loose_equals(&Value::str("1")));
        assert!(Value::Bool(true).loose_equals(&Value::Number(1.0)));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));

        let a = Value::array(vec![]);
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&Value::array(vec![])));
    }

    #[test]
    fn test_labels() {
        assert_eq!(Value::Number(2.0).type_label(), "number");
        assert_eq!(Value::Null.type_label(), "null");
        assert_eq!(Value::array(vec![]).type_label(), "array");
        assert_eq!(Value::Null.typeof_name(), "object");
    }

    #[test]
    fn test_to_display() {
        let nested = Value::array(vec![Value::Number(1.0), Value::Null, Value::str("x")]);
        assert_eq!(nested.to_display(), "1,,x");
        assert_eq!(Value::str(" 42 ").to_number(), 42.0);
        assert!(Value::str("4x").to_number().is_nan());
    }
}
