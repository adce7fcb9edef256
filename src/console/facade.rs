// Console facade - maps operator commands onto the components

use crate::comm::{UserRequest, UserResponse};
use crate::console::bindings::{self, BindingContext};
use crate::console::command::ConsoleCommand;
use crate::console::config::DaemonConfig;
use crate::console::error::{Result, ValidationError};
use crate::console::sink::{ChannelSink, ReplySink};
use crate::eval::{CodeEvaluator, EvalOutcome, render_value};
use crate::executor::{ExecutionRequest, ExecutorConfig, ProcessExecutor, RunLimits, render_result};
use crate::history::{CommandKind, HistoryEntry, HistoryLog};
use crate::inspect::{InspectOptions, Inspector, ValueModel, render_report};
use crate::output::{OutputManager, truncate};
use crate::settings::{SettingsStore, ToolsConfiguration};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

const HELP: &str = "\
Commands:
  run-terminal <command>       run shell text in the working root
  run-terminal-home <command>  run shell text in the home directory
  run-code <snippet>           evaluate a snippet
  inspect <snippet>            evaluate a snippet and list its structure
  history [terminal|code] [n]  show the last n entries (default 10)
  history clear                forget every entry
  config [show]                list settings
  config set <key> <value>     change one setting
  config reset                 restore defaults
  help                         this text

Snippet bindings: executor, history, config, fs, time, logger, event, reply";

/// Longest snippet text used as an inspection label
const LABEL_CHARS: usize = 40;

/// Check shell text before anything is spawned
pub fn validate_terminal(config: &ToolsConfiguration, command: &str) -> std::result::Result<(), ValidationError> {
    if command.trim().is_empty() {
        return Err(ValidationError::EmptyCommand);
    }
    if !config.shell_enabled {
        return Err(ValidationError::ShellDisabled);
    }
    if let Some(needle) = config.denied_by(command) {
        return Err(ValidationError::Denylisted(needle.to_string()));
    }
    Ok(())
}

/// The operator console
///
/// Owns the settings store and history log; everything is driven from a
/// single task, so snippets may hold `!Send` values while they run.
pub struct Console {
    settings: Mutex<SettingsStore>,
    history: Arc<Mutex<HistoryLog>>,
    executor: Arc<ProcessExecutor>,
    evaluator: CodeEvaluator,
    output: OutputManager,
    working_root: PathBuf,
    home_dir: PathBuf,
}

impl Console {
    pub fn new(daemon: &DaemonConfig) -> Self {
        let settings = SettingsStore::open(daemon.settings_path());
        let config = settings.get();
        let history = HistoryLog::open(daemon.history_path(), config.history_size);
        let executor = ProcessExecutor::new(ExecutorConfig {
            output_dir: daemon.output_dir(),
            ..ExecutorConfig::default()
        });
        let home_dir = dirs::home_dir().unwrap_or_else(|| daemon.working_root.clone());

        info!(
            home = %daemon.home.display(),
            working_root = %daemon.working_root.display(),
            history = history.len(),
            "console ready"
        );

        Self {
            settings: Mutex::new(settings),
            history: Arc::new(Mutex::new(history)),
            executor: Arc::new(executor),
            evaluator: CodeEvaluator::default(),
            output: OutputManager::new(daemon.output_dir()),
            working_root: daemon.working_root.clone(),
            home_dir,
        }
    }

    /// Working directory for `run-terminal-home`
    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = home_dir.into();
        self
    }

    pub async fn config(&self) -> ToolsConfiguration {
        self.settings.lock().await.get()
    }

    pub async fn history_entries(&self, limit: usize, kind: Option<CommandKind>) -> Vec<HistoryEntry> {
        self.history.lock().await.get(limit, kind)
    }

    /// Serve one request from the transport
    ///
    /// The sink is dropped before the reply is sent so the transport never
    /// sees progress after the response.
    pub async fn handle_user_request(&self, req: UserRequest) {
        let source = req.source_addr.to_string();
        let sink: Rc<dyn ReplySink> = Rc::new(ChannelSink::new(req.progress));
        let result = self.handle(&req.content, &source, sink).await;

        let response = match result {
            Ok(text) => UserResponse::new(text),
            Err(e) => {
                info!(client = %source, error = %e, "request rejected");
                UserResponse::error(e.to_string())
            }
        };
        if req.reply.send(response).is_err() {
            warn!(client = %source, "transport dropped before the reply");
        }
    }

    /// Parse `input`, run it and return the reply text
    pub async fn handle(&self, input: &str, source: &str, sink: Rc<dyn ReplySink>) -> Result<String> {
        let command = ConsoleCommand::parse(input)?;
        debug!(source, command = ?command, "dispatching");

        match command {
            ConsoleCommand::RunTerminal(text) => self.run_terminal(&text, &self.working_root, sink.as_ref()).await,
            ConsoleCommand::RunTerminalHome(text) => self.run_terminal(&text, &self.home_dir, sink.as_ref()).await,
            ConsoleCommand::RunCode(snippet) => Ok(self.run_code(&snippet, input, source, sink, false).await),
            ConsoleCommand::Inspect(snippet) => Ok(self.run_code(&snippet, input, source, sink, true).await),
            ConsoleCommand::History { kind, limit } => Ok(self.show_history(kind, limit).await),
            ConsoleCommand::HistoryClear => {
                self.history.lock().await.clear();
                Ok("History cleared".to_string())
            }
            ConsoleCommand::ConfigShow => Ok(self.settings.lock().await.render()),
            ConsoleCommand::ConfigSet { key, value } => {
                let mut settings = self.settings.lock().await;
                let key = settings.set(&key, &value)?;
                let config = settings.get();
                drop(settings);
                self.history.lock().await.set_capacity(config.history_size);
                Ok(format!("{} = {}", key, config.value_of(key)))
            }
            ConsoleCommand::ConfigReset => {
                let mut settings = self.settings.lock().await;
                settings.reset();
                let history_size = settings.get().history_size;
                drop(settings);
                self.history.lock().await.set_capacity(history_size);
                Ok("Settings restored to defaults".to_string())
            }
            ConsoleCommand::Help => Ok(HELP.to_string()),
        }
    }

    /// Validate, execute and record a shell command
    ///
    /// Rejected commands leave no trace in history.
    pub async fn run_terminal(&self, command: &str, cwd: &Path, sink: &dyn ReplySink) -> Result<String> {
        let config = self.settings.lock().await.get();
        validate_terminal(&config, command)?;

        let request = ExecutionRequest::terminal(command, cwd).with_timeout_ms(config.timeout_ms);
        let limits = RunLimits::from(&config);
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

        let executor = &self.executor;
        let (request_ref, limits_ref) = (&request, &limits);
        let execution = async move {
            let result = executor.execute(request_ref, limits_ref, Some(&progress_tx)).await;
            drop(progress_tx);
            result
        };
        let forward = async {
            while let Some(snapshot) = progress_rx.recv().await {
                sink.progress(&snapshot).await;
            }
        };
        let (result, ()) = tokio::join!(execution, forward);

        self.history
            .lock()
            .await
            .add(command, CommandKind::Terminal, result.exit_code);

        Ok(render_result(
            &result,
            command,
            config.max_output_length,
            config.spill_enabled,
            &self.output,
        ))
    }

    /// Evaluate a snippet (or inspect its value) and record it
    async fn run_code(&self, snippet: &str, event_text: &str, source: &str, sink: Rc<dyn ReplySink>, inspect: bool) -> String {
        let config = self.settings.lock().await.get();
        let interp = self.evaluator.interpreter();
        let bindings = bindings::build(
            &interp,
            BindingContext {
                executor: self.executor.clone(),
                history: self.history.clone(),
                config: config.clone(),
                working_root: self.working_root.clone(),
                event_text: event_text.to_string(),
                event_source: source.to_string(),
                sink,
            },
        );

        let run = self.evaluator.run(&interp, snippet, bindings);
        let outcome = match tokio::time::timeout(Duration::from_millis(config.timeout_ms), run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(timeout_ms = config.timeout_ms, "snippet timed out");
                EvalOutcome::Failure {
                    error_message: format!("Evaluation timed out after {} ms", config.timeout_ms),
                    error_trace: Vec::new(),
                    elapsed_seconds: config.timeout_ms as f64 / 1000.0,
                    stage: None,
                    logs: interp.logs(),
                }
            }
        };

        let exit_code = if outcome.is_success() { 0 } else { 1 };
        self.history.lock().await.add(snippet, CommandKind::Code, Some(exit_code));

        let cap = config.max_output_length;
        let spill = config.spill_enabled.then_some((&self.output, snippet));
        let mut lines: Vec<String> = outcome.logs().to_vec();
        match &outcome {
            EvalOutcome::Success {
                value,
                result_type_label,
                elapsed_seconds,
                ..
            } => {
                let body = if inspect {
                    let model = ValueModel::new(&interp);
                    let report = Inspector::new(&model, InspectOptions::from(&config)).inspect(value, &subject_label(snippet));
                    let text = render_report(&report);
                    let (mut visible, truncated) = truncate(&text, cap);
                    if truncated {
                        if let Some(path) = spill.and_then(|(output, command)| output.spill(command, &text)) {
                            visible.push_str(&format!("\nFull output saved to {}", path.display()));
                        }
                    }
                    visible
                } else {
                    render_value(&interp, value, cap, spill)
                };
                lines.push(body);
                lines.push(format!("[{}, {:.3}s]", result_type_label, elapsed_seconds));
            }
            EvalOutcome::Failure {
                error_message,
                elapsed_seconds,
                ..
            } => {
                lines.push(error_message.clone());
                lines.push(format!("[failed after {:.3}s]", elapsed_seconds));
            }
        }
        interp.release();
        lines.join("\n")
    }

    async fn show_history(&self, kind: Option<CommandKind>, limit: usize) -> String {
        let entries = self.history.lock().await.get(limit, kind);
        if entries.is_empty() {
            return "No history".to_string();
        }
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let exit = entry.exit_code.map_or("-".to_string(), |c| c.to_string());
                format!(
                    "{}. [{}] {}  (exit {}, {})",
                    i + 1,
                    entry.kind,
                    entry.command_text,
                    exit,
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// First line of the snippet, shortened, for report headers
fn subject_label(snippet: &str) -> String {
    let first = snippet.lines().next().unwrap_or("").trim();
    if first.chars().count() > LABEL_CHARS {
        format!("{}...", first.chars().take(LABEL_CHARS).collect::<String>())
    } else {
        first.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::error::ConsoleError;
    use crate::console::sink::NullSink;

    fn console(dir: &Path) -> Console {
        let mut daemon = DaemonConfig::with_home(dir.join("home"));
        daemon.working_root = dir.to_path_buf();
        Console::new(&daemon)
    }

    fn null() -> Rc<dyn ReplySink> {
        Rc::new(NullSink)
    }

    #[test]
    fn test_validate_terminal() {
        let config = ToolsConfiguration::default();
        assert_eq!(validate_terminal(&config, "  "), Err(ValidationError::EmptyCommand));
        assert!(matches!(
            validate_terminal(&config, "sudo rm -rf /"),
            Err(ValidationError::Denylisted(_))
        ));
        assert!(validate_terminal(&config, "echo hi").is_ok());

        let disabled = ToolsConfiguration {
            shell_enabled: false,
            ..ToolsConfiguration::default()
        };
        assert_eq!(validate_terminal(&disabled, "echo hi"), Err(ValidationError::ShellDisabled));
    }

    #[test]
    fn test_subject_label() {
        assert_eq!(subject_label("{a:1}\nmore"), "{a:1}");
        let long = "x".repeat(60);
        assert_eq!(subject_label(&long), format!("{}...", "x".repeat(LABEL_CHARS)));
    }

    #[tokio::test]
    async fn test_denylisted_command_leaves_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let console = console(dir.path());

        let err = console.handle("run-terminal sudo rm -rf /", "test", null()).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Validation(ValidationError::Denylisted(_))));
        assert!(console.history_entries(10, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_run_code_reply_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let console = console(dir.path());

        let reply = console.handle("run-code 1+1", "test", null()).await.unwrap();
        let lines: Vec<&str> = reply.lines().collect();
        assert_eq!(lines[0], "2");
        assert!(lines[1].starts_with("[number, "));

        let failed = console.handle("run-code missing.x", "test", null()).await.unwrap();
        assert!(failed.contains("missing is not defined"));
        assert!(failed.contains("[failed after"));

        let entries = console.history_entries(10, Some(CommandKind::Code)).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].command_text, "missing.x");
        assert_eq!(entries[0].exit_code, Some(1));
        assert_eq!(entries[1].exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_snippet_sees_event_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let console = console(dir.path());

        let reply = console
            .handle("run-code console.log('from', event.source); return typeof fs.readFile", "peer-1", null())
            .await
            .unwrap();
        assert!(reply.starts_with("from peer-1\nfunction\n[string, "));
    }

    #[tokio::test]
    async fn test_inspect_reply() {
        let dir = tempfile::tempdir().unwrap();
        let console = console(dir.path());

        let reply = console.handle("inspect {a:1,b:[1,2,3]}", "test", null()).await.unwrap();
        assert!(reply.starts_with("{a:1,b:[1,2,3]}: Object"));
        assert!(reply.contains("  b.length: number = 3\n"));
        assert!(reply.contains("  b[2]: number = 3  [element]"));
    }

    #[tokio::test]
    async fn test_config_set_resizes_history() {
        let dir = tempfile::tempdir().unwrap();
        let console = console(dir.path());

        for n in 0..3 {
            console.handle(&format!("run-code {}", n), "test", null()).await.unwrap();
        }
        assert_eq!(console.history_entries(10, None).await.len(), 3);

        let reply = console.handle("config set history_size 2", "test", null()).await.unwrap();
        assert_eq!(reply, "history_size = 2");
        let entries = console.history_entries(10, None).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].command_text, "2");

        assert!(console.handle("config set history_size lots", "test", null()).await.is_err());
        assert_eq!(console.config().await.history_size, 2);

        console.handle("config reset", "test", null()).await.unwrap();
        assert_eq!(console.config().await, ToolsConfiguration::default());
    }

    #[tokio::test]
    async fn test_history_listing_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let console = console(dir.path());

        assert_eq!(console.handle("history", "test", null()).await.unwrap(), "No history");
        console.handle("run-code 'a'", "test", null()).await.unwrap();
        let listing = console.handle("history code", "test", null()).await.unwrap();
        assert!(listing.starts_with("1. [code] 'a'  (exit 0, "));

        assert_eq!(console.handle("history clear", "test", null()).await.unwrap(), "History cleared");
        assert!(console.history_entries(10, None).await.is_empty());
    }
}
