// Daemon configuration, read once at startup

use std::path::PathBuf;
use tracing::warn;

/// Process-level settings for the console daemon
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Holds settings, history and spilled output
    pub home: PathBuf,
    pub listen_addr: String,
    pub listen_port: u16,
    /// Working directory for `run-terminal`
    pub working_root: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            home: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".opconsole"),
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 9710,
            working_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// Parse an environment variable, logging a warning if the value is present but invalid.
fn parse_env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => match v.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = name, value = %v, "Invalid env var value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

impl DaemonConfig {
    /// Load from environment variables (and a `.env` file if present)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = DaemonConfig::default();
        config.home = parse_env_var("OPCONSOLE_HOME", config.home);
        config.listen_addr = parse_env_var("OPCONSOLE_LISTEN_ADDR", config.listen_addr);
        config.listen_port = parse_env_var("OPCONSOLE_PORT", config.listen_port);
        config.working_root = parse_env_var("OPCONSOLE_WORKING_ROOT", config.working_root);
        config
    }

    /// Config rooted at `home`, for embedding and tests
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.home.join("settings.toml")
    }

    pub fn history_path(&self) -> PathBuf {
        self.home.join("history.json")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.home.join("output")
    }
}
