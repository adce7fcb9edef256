// Code evaluator - staged compilation and a single run per snippet

use crate::eval::ast::{Expr, Stmt};
use crate::eval::error::CompileError;
use crate::eval::interp::{EvalLimits, Interpreter};
use crate::eval::parser::{is_identifier, parse_expression_unit, parse_statements_unit};
use crate::eval::scope::Scope;
use crate::eval::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Named values visible to a snippet, in declaration order
pub type Bindings = Vec<(String, Value)>;

/// Grammar a snippet is compiled against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// A single expression whose value is the result
    Expression,
    /// A statement sequence; the result is its `return` value
    Statements,
    /// A statement sequence inside an async body, so `await` is legal
    AsyncBlock,
}

impl Stage {
    /// Attempt order
    pub const ALL: [Stage; 3] = [Stage::Expression, Stage::Statements, Stage::AsyncBlock];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Expression => "expression",
            Stage::Statements => "statements",
            Stage::AsyncBlock => "async-block",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
enum UnitBody {
    Expression(Expr),
    Statements(Vec<Stmt>),
}

/// Snippet compiled by the first stage that accepted it
#[derive(Debug)]
pub struct CompiledUnit {
    pub stage: Stage,
    pub params: Vec<String>,
    body: UnitBody,
}

fn compile_stage(stage: Stage, snippet: &str) -> Result<UnitBody, CompileError> {
    match stage {
        Stage::Expression => parse_expression_unit(snippet).map(UnitBody::Expression),
        Stage::Statements => parse_statements_unit(snippet, false).map(UnitBody::Statements),
        Stage::AsyncBlock => parse_statements_unit(snippet, true).map(UnitBody::Statements),
    }
}

/// Compile `snippet` with `params` as the unit's named parameters
///
/// Syntax failures move on to the next stage; any other failure stops the
/// chain. When every stage fails, the last stage's error is returned.
pub fn compile(snippet: &str, params: &[String]) -> Result<CompiledUnit, CompileError> {
    let mut unique = HashSet::new();
    for name in params {
        if !is_identifier(name) || !unique.insert(name.as_str()) {
            return Err(CompileError::other(
                "BindingError",
                format!("invalid or duplicate binding name '{}'", name),
            ));
        }
    }

    let mut last_error = None;
    for stage in Stage::ALL {
        match compile_stage(stage, snippet) {
            Ok(body) => {
                debug!(stage = %stage, "snippet compiled");
                return Ok(CompiledUnit {
                    stage,
                    params: params.to_vec(),
                    body,
                });
            }
            Err(e) if e.is_syntax() => {
                debug!(stage = %stage, error = %e, "stage rejected snippet");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_error.unwrap_or_else(|| CompileError::syntax("no compile stage accepted the snippet", 1, 1)))
}

#[derive(Debug, Clone)]
pub enum EvalOutcome {
    Success {
        value: Value,
        /// `typeof` of the value, with `array` and `null` told apart
        result_type_label: String,
        elapsed_seconds: f64,
        stage: Stage,
        logs: Vec<String>,
    },
    Failure {
        error_message: String,
        error_trace: Vec<String>,
        elapsed_seconds: f64,
        /// `None` when no stage compiled
        stage: Option<Stage>,
        logs: Vec<String>,
    },
}

impl EvalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EvalOutcome::Success { .. })
    }

    pub fn elapsed_seconds(&self) -> f64 {
        match self {
            EvalOutcome::Success { elapsed_seconds, .. } | EvalOutcome::Failure { elapsed_seconds, .. } => {
                *elapsed_seconds
            }
        }
    }

    pub fn logs(&self) -> &[String] {
        match self {
            EvalOutcome::Success { logs, .. } | EvalOutcome::Failure { logs, .. } => logs,
        }
    }
}

/// Runs snippets; one interpreter per run
#[derive(Debug, Clone, Default)]
pub struct CodeEvaluator {
    limits: EvalLimits,
}

impl CodeEvaluator {
    pub fn new(limits: EvalLimits) -> Self {
        Self { limits }
    }

    /// Fresh interpreter for building bindings and running one snippet
    pub fn interpreter(&self) -> Interpreter {
        Interpreter::new(self.limits.clone())
    }

    /// Compile and run `snippet` once
    ///
    /// Only `bindings` and the built-in globals are in scope. A promise
    /// result is awaited before being reported.
    pub async fn run(&self, interp: &Interpreter, snippet: &str, bindings: Bindings) -> EvalOutcome {
        let started = Instant::now();
        let params: Vec<String> = bindings.iter().map(|(name, _)| name.clone()).collect();

        let unit = match compile(snippet, &params) {
            Ok(unit) => unit,
            Err(e) => {
                warn!(error = %e, "snippet failed to compile");
                let error_trace = if e.line > 0 {
                    vec![format!("at <anonymous> ({}:{})", e.line, e.column)]
                } else {
                    Vec::new()
                };
                return EvalOutcome::Failure {
                    error_message: e.to_string(),
                    error_trace,
                    elapsed_seconds: started.elapsed().as_secs_f64(),
                    stage: None,
                    logs: Vec::new(),
                };
            }
        };

        let scope = Scope::child(interp.globals());
        scope.declare("this", Value::Undefined, false);
        for (name, value) in bindings {
            scope.declare(&name, value, true);
        }

        let mut result = match &unit.body {
            UnitBody::Expression(expr) => interp.evaluate_expression(expr, &scope).await,
            UnitBody::Statements(body) => interp.execute_body(body, &scope).await,
        };
        if let Ok(Value::Promise(promise)) = &result {
            result = promise.settle().await;
        }

        let elapsed_seconds = started.elapsed().as_secs_f64();
        let logs = interp.logs();
        match result {
            Ok(value) => {
                info!(
                    stage = %unit.stage,
                    result_type = value.type_label(),
                    elapsed_ms = (elapsed_seconds * 1000.0) as u64,
                    "snippet evaluated"
                );
                EvalOutcome::Success {
                    result_type_label: value.type_label().to_string(),
                    value,
                    elapsed_seconds,
                    stage: unit.stage,
                    logs,
                }
            }
            Err(e) => {
                warn!(stage = %unit.stage, error = %e, trace = ?e.trace, "snippet raised");
                EvalOutcome::Failure {
                    error_message: e.to_string(),
                    error_trace: e.trace,
                    elapsed_seconds,
                    stage: Some(unit.stage),
                    logs,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::error::FailureClass;

    async fn run(snippet: &str, bindings: Bindings) -> EvalOutcome {
        let evaluator = CodeEvaluator::default();
        let interp = evaluator.interpreter();
        evaluator.run(&interp, snippet, bindings).await
    }

    #[tokio::test]
    async fn test_one_plus_one() {
        match run("1+1", Vec::new()).await {
            EvalOutcome::Success {
                value,
                result_type_label,
                stage,
                ..
            } => {
                assert!(matches!(value, Value::Number(n) if n == 2.0));
                assert_eq!(result_type_label, "number");
                assert_eq!(stage, Stage::Expression);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_statement_stage_uses_return_value() {
        let outcome = run("const xs = [1, 2, 3]\nreturn xs.map(x => x * 2)", Vec::new()).await;
        let EvalOutcome::Success { value, result_type_label, stage, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(stage, Stage::Statements);
        assert_eq!(result_type_label, "array");
        assert_eq!(value.to_display(), "2,4,6");

        let outcome = run("let a = 1", Vec::new()).await;
        assert!(matches!(outcome, EvalOutcome::Success { value: Value::Undefined, .. }));
    }

    #[tokio::test]
    async fn test_await_falls_through_to_async_block() {
        let outcome = run("await sleep(5); return 'done'", Vec::new()).await;
        let EvalOutcome::Success { value, stage, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(stage, Stage::AsyncBlock);
        assert_eq!(value.to_display(), "done");
    }

    #[tokio::test]
    async fn test_bindings_are_parameters() {
        let outcome = run("greeting + ' ' + name", vec![
            ("greeting".to_string(), Value::str("hello")),
            ("name".to_string(), Value::str("ops")),
        ])
        .await;
        assert!(matches!(outcome, EvalOutcome::Success { value: Value::Str(s), .. } if &*s == "hello ops"));

        // Nothing else leaks into scope
        let outcome = run("typeof interp", Vec::new()).await;
        assert!(matches!(outcome, EvalOutcome::Success { value: Value::Str(s), .. } if &*s == "undefined"));
    }

    #[tokio::test]
    async fn test_runtime_failure_is_not_retried() {
        let outcome = run("undefinedThing.x", Vec::new()).await;
        let EvalOutcome::Failure { error_message, error_trace, stage, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error_message, "ReferenceError: undefinedThing is not defined");
        assert_eq!(stage, Some(Stage::Expression));
        assert_eq!(error_trace, vec!["at <anonymous> (1:1)".to_string()]);
    }

    #[tokio::test]
    async fn test_compile_failure_reports_last_stage() {
        let outcome = run("let = ;", Vec::new()).await;
        let EvalOutcome::Failure { error_message, stage, .. } = outcome else {
            panic!("expected failure");
        };
        assert!(error_message.starts_with("SyntaxError"));
        assert_eq!(stage, None);
    }

    #[test]
    fn test_non_syntax_failure_stops_fallback() {
        let err = compile("1", &["bad-name".to_string()]).unwrap_err();
        assert_eq!(err.class, FailureClass::Other);

        let deep = format!("{}1{}", "[".repeat(100), "]".repeat(100));
        let err = compile(&deep, &[]).unwrap_err();
        assert_eq!(err.class, FailureClass::Other);
    }

    #[tokio::test]
    async fn test_console_logs_are_captured() {
        let outcome = run("console.log('n =', 3, {a: [1]}); return 1", Vec::new()).await;
        assert_eq!(outcome.logs(), ["n = 3 { a: [ 1 ] }".to_string()]);
    }

    #[tokio::test]
    async fn test_returned_promise_is_awaited() {
        let outcome = run("(async () => 7)()", Vec::new()).await;
        assert!(matches!(outcome, EvalOutcome::Success { value: Value::Number(n), .. } if n == 7.0));
    }
}
