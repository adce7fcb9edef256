// Data types for Executor module

use crate::history::CommandKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Exit code reported when a command is killed by the timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// A single command submitted for execution
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub command_text: String,
    pub kind: CommandKind,
    pub working_directory: PathBuf,
    pub timeout_ms: u64,
    pub environment_overrides: Vec<(String, String)>,
}

impl ExecutionRequest {
    pub fn terminal(command_text: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            command_text: command_text.into(),
            kind: CommandKind::Terminal,
            working_directory: working_directory.into(),
            timeout_ms: 300_000,
            environment_overrides: Vec::new(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_overrides.push((key.into(), value.into()));
        self
    }
}

/// Final outcome of a request, produced exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub request_id: Uuid,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Trimmed stdout followed by trimmed stderr
    pub combined_output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub timed_out: bool,
    pub long_running: bool,
    /// Output captured at each progress emission, oldest first
    #[serde(default)]
    pub chunks: Vec<String>,
    /// Bytes discarded once a stream hit the capture cap
    #[serde(default)]
    pub dropped_bytes: usize,
}

impl ExecutionResult {
    /// Text shown to the operator: stderr when present, otherwise stdout
    ///
    /// The choice does not depend on `success`; a zero exit with warnings on
    /// stderr still shows stderr.
    pub fn visible_output(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Transient progress of a running request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub request_id: Uuid,
    pub elapsed_ms: u64,
    pub partial_output: String,
}
