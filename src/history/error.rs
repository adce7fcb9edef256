// History errors

use thiserror::Error;

/// History errors
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum HistoryError {
    #[error("Failed to load history: {0}")]
    LoadFailed(String),

    #[error("Failed to store history: {0}")]
    StoreFailed(String),

    #[error("Unknown command kind: {0}")]
    UnknownKind(String),
}
