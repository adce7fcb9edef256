// Error types for the snippet language

use crate::eval::value::Value;
use std::fmt;
use thiserror::Error;

/// Whether a compile failure should let the next stage try
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The text does not fit this stage's grammar
    Syntax,
    /// Anything else; stops the fallback chain
    Other,
}

/// Failure to turn snippet text into a program
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message} (line {line}, column {column})")]
pub struct CompileError {
    pub class: FailureClass,
    pub kind: &'static str,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl CompileError {
    pub fn syntax(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            class: FailureClass::Syntax,
            kind: "SyntaxError",
            message: message.into(),
            line,
            column,
        }
    }

    pub fn other(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Other,
            kind,
            message: message.into(),
            line: 0,
            column: 0,
        }
    }

    pub fn is_syntax(&self) -> bool {
        self.class == FailureClass::Syntax
    }
}

/// Kind used for thrown values that are not error objects
pub const UNCAUGHT: &str = "Uncaught";

/// Error raised while a program runs
#[derive(Debug, Clone)]
pub struct RuntimeError {
    /// Error category, e.g. `TypeError`
    pub kind: String,
    pub message: String,
    /// The thrown value, for `catch` bindings
    pub value: Value,
    /// Innermost frame first
    pub trace: Vec<String>,
}

impl RuntimeError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            value: Value::Undefined,
            trace: Vec::new(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new("ReferenceError", message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new("RangeError", message)
    }

    /// Error raised by an explicit `throw`
    pub fn thrown(kind: impl Into<String>, message: impl Into<String>, value: Value) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            value,
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == UNCAUGHT {
            write!(f, "Uncaught {}", self.message)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for interpreter operations
pub type EvalResult<T> = std::result::Result<T, RuntimeError>;
