// Executor configuration

use crate::executor::platform::PlatformInvocation;
use crate::settings::ToolsConfiguration;
use std::path::PathBuf;
use std::time::Duration;

/// Process-level executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How command text is handed to the platform interpreter
    pub platform: PlatformInvocation,
    /// Maximum number of children running at once
    pub max_concurrent: usize,
    /// Directory for spilled output
    pub output_dir: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            platform: PlatformInvocation::detect(),
            max_concurrent: 4,
            output_dir: std::env::temp_dir().join("opconsole-output"),
        }
    }
}

/// Per-request limits derived from the current settings
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Minimum gap between progress snapshots
    pub progress_interval: Duration,
    /// Keep every emitted chunk for a later spill
    pub save_chunks: bool,
    /// Capture at most this many bytes per stream
    pub max_buffer_bytes: usize,
    /// Characters of captured output carried by a snapshot
    pub snapshot_chars: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self::from(&ToolsConfiguration::default())
    }
}

impl From<&ToolsConfiguration> for RunLimits {
    fn from(config: &ToolsConfiguration) -> Self {
        Self {
            progress_interval: Duration::from_millis(config.progress_interval_ms),
            save_chunks: config.save_chunks,
            max_buffer_bytes: config.max_output_length.saturating_mul(64),
            snapshot_chars: config.max_output_length,
        }
    }
}
