// Console errors

use crate::history::HistoryError;
use crate::settings::SettingsError;
use thiserror::Error;

/// Rejections made before anything runs; shown to the operator as-is
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Rejected: command contains denylisted text '{0}'")]
    Denylisted(String),

    #[error("Terminal commands are disabled (shell_enabled = false)")]
    ShellDisabled,

    #[error("Unknown command '{0}'. Type 'help' for the command list")]
    UnknownCommand(String),

    #[error("Bad arguments: {0}")]
    BadArguments(String),
}

/// Console errors
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Settings(#[from] SettingsError),

    #[error("{0}")]
    History(#[from] HistoryError),
}

pub type Result<T> = std::result::Result<T, ConsoleError>;
