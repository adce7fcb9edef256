// Error types for Executor module

use thiserror::Error;

/// Executor error types
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to spawn '{0}': {1}")]
    SpawnFailed(String, String),

    #[error("Failed to wait for '{0}': {1}")]
    WaitFailed(String, String),

    #[error("Failed to capture output for '{0}': {1}")]
    OutputCaptureFailed(String, String),

    #[error("Executor is shutting down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
