// Code evaluator - a small dynamic snippet language run against live bindings

pub mod ast;
pub mod builtins;
pub mod error;
pub mod evaluator;
pub mod format;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod value;

pub use error::{CompileError, EvalResult, FailureClass, RuntimeError};
pub use evaluator::{Bindings, CodeEvaluator, EvalOutcome, Stage, compile};
pub use format::{callable_text, format_value, render_value};
pub use interp::{EvalLimits, Interpreter};
pub use value::{Function, Object, Value};
