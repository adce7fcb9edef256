// Executor module - out-of-process terminal command execution

pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod platform;
pub mod render;
pub mod runner;
pub mod types;

pub use classify::{is_long_running, is_source_control_inspection};
pub use config::{ExecutorConfig, RunLimits};
pub use context::ExecutionContext;
pub use error::{ExecutorError, Result};
pub use platform::PlatformInvocation;
pub use render::render_result;
pub use runner::{ProcessExecutor, ProgressSender};
pub use types::{ExecutionRequest, ExecutionResult, ProgressSnapshot, TIMEOUT_EXIT_CODE};
