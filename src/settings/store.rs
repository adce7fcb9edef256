// Settings store - owns the configuration and persists every change

use super::config::{SettingKey, ToolsConfiguration};
use super::error::{Result, SettingsError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted key/value settings
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    config: ToolsConfiguration,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults when the file
    /// is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match Self::load(&path) {
            Ok(Some(config)) => {
                info!(path = %path.display(), "settings loaded");
                config
            }
            Ok(None) => {
                debug!(path = %path.display(), "settings file not found, using defaults");
                ToolsConfiguration::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings unreadable, using defaults");
                ToolsConfiguration::default()
            }
        };
        Self { path, config }
    }

    fn load(path: &Path) -> Result<Option<ToolsConfiguration>> {
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(path).map_err(|e| SettingsError::LoadFailed(e.to_string()))?;
        let config = toml::from_str(&content).map_err(|e| SettingsError::LoadFailed(e.to_string()))?;
        Ok(Some(config))
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> ToolsConfiguration {
        self.config.clone()
    }

    /// Update a single key and persist
    ///
    /// Invalid keys or values leave the configuration untouched.
    pub fn set(&mut self, key: &str, value: &str) -> Result<SettingKey> {
        let key: SettingKey = key.parse()?;
        let mut next = self.config.clone();
        next.apply(key, value)?;
        self.config = next;
        info!(key = %key, value = %self.config.value_of(key), "setting updated");
        self.persist_soft();
        Ok(key)
    }

    /// Restore defaults and persist
    pub fn reset(&mut self) {
        self.config = ToolsConfiguration::default();
        info!("settings reset to defaults");
        self.persist_soft();
    }

    /// Text listing of every key for `config show`
    pub fn render(&self) -> String {
        SettingKey::ALL
            .iter()
            .map(|key| format!("{} = {}", key, self.config.value_of(*key)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SettingsError::PersistFailed(e.to_string()))?;
        }
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| SettingsError::PersistFailed(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| SettingsError::PersistFailed(e.to_string()))?;
        debug!(path = %self.path.display(), "settings persisted");
        Ok(())
    }

    fn persist_soft(&self) {
        if let Err(e) = self.persist() {
            warn!(path = %self.path.display(), error = %e, "settings kept in memory only");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut store = SettingsStore::open(&path);
        store.set("timeout_ms", "1234").unwrap();
        store.set("denylist", "foo,bar").unwrap();
        assert!(path.exists());

        let reloaded = SettingsStore::open(&path);
        assert_eq!(reloaded.get().timeout_ms, 1234);
        assert_eq!(reloaded.get().denylist, vec!["foo", "bar"]);
    }

    #[test]
    fn test_invalid_set_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SettingsStore::open(dir.path().join("settings.toml"));

        assert!(store.set("history_size", "lots").is_err());
        assert!(store.set("colour", "blue").is_err());
        assert_eq!(store.get(), ToolsConfiguration::default());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut store = SettingsStore::open(&path);
        store.set("shell_enabled", "false").unwrap();

        store.reset();
        assert!(store.get().shell_enabled);
        assert!(SettingsStore::open(&path).get().shell_enabled);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "timeout_ms = [not valid").unwrap();

        let store = SettingsStore::open(&path);
        assert_eq!(store.get(), ToolsConfiguration::default());
    }

    #[test]
    fn test_unwritable_path_stays_usable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let mut store = SettingsStore::open(blocker.join("settings.toml"));
        store.set("max_output_length", "99").unwrap();
        assert_eq!(store.get().max_output_length, 99);
    }

    #[test]
    fn test_render_lists_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.toml"));
        let text = store.render();
        for key in SettingKey::ALL {
            assert!(text.contains(key.as_str()));
        }
    }
}
