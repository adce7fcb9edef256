// Named values handed to operator snippets

use crate::console::sink::ReplySink;
use crate::eval::builtins::{arg, async_fn, object, sync_fn};
use crate::eval::format::inline;
use crate::eval::{Bindings, Interpreter, RuntimeError, Value};
use crate::executor::{ExecutionRequest, ProcessExecutor, RunLimits};
use crate::history::HistoryLog;
use crate::settings::{SettingKey, ToolsConfiguration};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Everything a snippet may reach
pub struct BindingContext {
    pub executor: Arc<ProcessExecutor>,
    pub history: Arc<Mutex<HistoryLog>>,
    /// Snapshot taken when the request started
    pub config: ToolsConfiguration,
    pub working_root: PathBuf,
    /// Text of the request being handled
    pub event_text: String,
    /// Who sent it, e.g. the client address
    pub event_source: String,
    pub sink: Rc<dyn ReplySink>,
}

fn io_error(op: &str, path: &Path, e: std::io::Error) -> RuntimeError {
    RuntimeError::new("Error", format!("{} '{}': {}", op, path.display(), e))
}

/// Build the binding list; nothing else from the console is visible
pub fn build(interp: &Interpreter, ctx: BindingContext) -> Bindings {
    let root = Rc::new(ctx.working_root);
    vec![
        ("executor".to_string(), executor_binding(interp, ctx.executor, ctx.config.clone(), root.clone())),
        ("history".to_string(), history_binding(interp, ctx.history)),
        ("config".to_string(), config_binding(interp, ctx.config)),
        ("fs".to_string(), fs_binding(interp, root)),
        ("time".to_string(), time_binding(interp)),
        ("logger".to_string(), logger_binding(interp)),
        (
            "event".to_string(),
            object(
                interp,
                "Event",
                vec![
                    ("text", Value::str(&ctx.event_text)),
                    ("source", Value::str(&ctx.event_source)),
                ],
            ),
        ),
        ("reply".to_string(), reply_binding(ctx.sink)),
    ]
}

fn executor_binding(
    interp: &Interpreter,
    executor: Arc<ProcessExecutor>,
    config: ToolsConfiguration,
    root: Rc<PathBuf>,
) -> Value {
    let config = Rc::new(config);
    let run = async_fn("run", "command", move |interp, _, args| {
        let executor = executor.clone();
        let config = config.clone();
        let root = root.clone();
        async move {
            let command = arg(&args, 0).to_display();
            if command.trim().is_empty() {
                return Err(RuntimeError::type_error("executor.run needs a command"));
            }
            if !config.shell_enabled {
                return Err(RuntimeError::new("Error", "terminal commands are disabled"));
            }
            if let Some(needle) = config.denied_by(&command) {
                return Err(RuntimeError::new(
                    "Error",
                    format!("command contains denylisted text '{}'", needle),
                ));
            }

            let request = ExecutionRequest::terminal(command, root.as_path()).with_timeout_ms(config.timeout_ms);
            let result = executor.execute(&request, &RunLimits::from(&*config), None).await;
            Ok(object(
                &interp,
                "ExecutionResult",
                vec![
                    ("success", Value::Bool(result.success)),
                    (
                        "exitCode",
                        result.exit_code.map_or(Value::Null, |c| Value::Number(f64::from(c))),
                    ),
                    ("stdout", Value::str(&result.stdout)),
                    ("stderr", Value::str(&result.stderr)),
                    ("output", Value::str(&result.combined_output)),
                    ("timedOut", Value::Bool(result.timed_out)),
                ],
            ))
        }
    });
    object(interp, "ProcessExecutor", vec![("run", run)])
}

fn history_binding(interp: &Interpreter, history: Arc<Mutex<HistoryLog>>) -> Value {
    let list_history = history.clone();
    let list = async_fn("list", "limit", move |interp, _, args| {
        let history = list_history.clone();
        async move {
            let limit = match arg(&args, 0) {
                Value::Number(n) if n.is_finite() && n >= 0.0 => n as usize,
                _ => 10,
            };
            let entries = history.lock().await.get(limit, None);
            let items = entries
                .into_iter()
                .map(|entry| {
                    object(
                        &interp,
                        "HistoryEntry",
                        vec![
                            ("command", Value::str(&entry.command_text)),
                            ("kind", Value::str(entry.kind.as_str())),
                            (
                                "exitCode",
                                entry.exit_code.map_or(Value::Null, |c| Value::Number(f64::from(c))),
                            ),
                            ("timestamp", Value::str(&entry.timestamp.to_rfc3339())),
                        ],
                    )
                })
                .collect();
            Ok(Value::array(items))
        }
    });
    let clear = async_fn("clear", "", move |_, _, _| {
        let history = history.clone();
        async move {
            history.lock().await.clear();
            Ok(Value::Undefined)
        }
    });
    object(interp, "HistoryLog", vec![("list", list), ("clear", clear)])
}

fn config_binding(interp: &Interpreter, config: ToolsConfiguration) -> Value {
    let config = Rc::new(config);
    let get_config = config.clone();
    let get = sync_fn("get", "key", move |_, _, args| {
        let key = arg(args, 0).to_display();
        Ok(match key.parse::<SettingKey>() {
            Ok(key) => Value::str(&get_config.value_of(key)),
            Err(_) => Value::Undefined,
        })
    });
    let all = sync_fn("all", "", move |interp, _, _| {
        let fields = SettingKey::ALL
            .iter()
            .map(|key| (key.as_str(), Value::str(&config.value_of(*key))))
            .collect();
        Ok(object(interp, "Object", fields))
    });
    object(interp, "ToolsConfiguration", vec![("get", get), ("all", all)])
}

fn fs_binding(interp: &Interpreter, root: Rc<PathBuf>) -> Value {
    let resolve = move |value: Value| -> PathBuf {
        let path = PathBuf::from(value.to_display());
        if path.is_absolute() { path } else { root.join(path) }
    };
    let resolve = Rc::new(resolve);

    let r = resolve.clone();
    let read_file = async_fn("readFile", "path", move |_, _, args| {
        let path = r(arg(&args, 0));
        async move {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| io_error("readFile", &path, e))?;
            Ok(Value::str(&text))
        }
    });

    let r = resolve.clone();
    let write_file = async_fn("writeFile", "path, text", move |_, _, args| {
        let path = r(arg(&args, 0));
        let text = arg(&args, 1).to_display();
        async move {
            tokio::fs::write(&path, text)
                .await
                .map_err(|e| io_error("writeFile", &path, e))?;
            Ok(Value::Undefined)
        }
    });

    let r = resolve.clone();
    let exists = sync_fn("exists", "path", move |_, _, args| Ok(Value::Bool(r(arg(args, 0)).exists())));

    let r = resolve.clone();
    let mkdir = async_fn("mkdir", "path", move |_, _, args| {
        let path = r(arg(&args, 0));
        async move {
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| io_error("mkdir", &path, e))?;
            Ok(Value::Undefined)
        }
    });

    let r = resolve;
    let readdir = async_fn("readdir", "path", move |_, _, args| {
        let path = r(arg(&args, 0));
        async move {
            let mut dir = tokio::fs::read_dir(&path)
                .await
                .map_err(|e| io_error("readdir", &path, e))?;
            let mut names = Vec::new();
            while let Some(entry) = dir.next_entry().await.map_err(|e| io_error("readdir", &path, e))? {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            Ok(Value::array(names.iter().map(|n| Value::str(n)).collect()))
        }
    });

    object(
        interp,
        "FileSystem",
        vec![
            ("readFile", read_file),
            ("writeFile", write_file),
            ("exists", exists),
            ("mkdir", mkdir),
            ("readdir", readdir),
        ],
    )
}

fn time_binding(interp: &Interpreter) -> Value {
    object(
        interp,
        "Clock",
        vec![
            (
                "now",
                sync_fn("now", "", |_, _, _| Ok(Value::Number(Utc::now().timestamp_millis() as f64))),
            ),
            ("iso", sync_fn("iso", "", |_, _, _| Ok(Value::str(&Utc::now().to_rfc3339())))),
        ],
    )
}

fn log_line(interp: &Interpreter, args: &[Value]) -> String {
    args.iter()
        .map(|v| match v {
            Value::Str(s) => s.to_string(),
            other => inline(interp, other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn logger_binding(interp: &Interpreter) -> Value {
    object(
        interp,
        "Logger",
        vec![
            (
                "info",
                sync_fn("info", "...data", |interp, _, args| {
                    info!(target: "snippet", "{}", log_line(interp, args));
                    Ok(Value::Undefined)
                }),
            ),
            (
                "warn",
                sync_fn("warn", "...data", |interp, _, args| {
                    warn!(target: "snippet", "{}", log_line(interp, args));
                    Ok(Value::Undefined)
                }),
            ),
        ],
    )
}

fn reply_binding(sink: Rc<dyn ReplySink>) -> Value {
    async_fn("reply", "text", move |_, _, args| {
        let sink = sink.clone();
        let text = match arg(&args, 0) {
            Value::Str(s) => s.to_string(),
            other => other.to_display(),
        };
        async move {
            sink.send(&text).await;
            Ok(Value::Undefined)
        }
    })
}
