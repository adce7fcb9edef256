// History types

use super::error::HistoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of request produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Terminal,
    Code,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Terminal => "terminal",
            CommandKind::Code => "code",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "terminal" | "term" | "shell" => Ok(CommandKind::Terminal),
            "code" | "eval" => Ok(CommandKind::Code),
            other => Err(HistoryError::UnknownKind(other.to_string())),
        }
    }
}

/// One completed (or failed) request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command_text: String,
    pub kind: CommandKind,
    /// Exit code for terminal commands; 0/1 for code runs
    pub exit_code: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(command_text: impl Into<String>, kind: CommandKind, exit_code: Option<i32>) -> Self {
        Self {
            command_text: command_text.into(),
            kind,
            exit_code,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "[{}] [{}] (exit {}) {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            code,
            self.command_text
        )
    }
}
