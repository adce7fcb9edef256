// History module - bounded, persisted record of past invocations

pub mod error;
pub mod log;
pub mod types;

pub use error::HistoryError;
pub use log::HistoryLog;
pub use types::{CommandKind, HistoryEntry};
