// Tools configuration - every knob the console components read

use super::error::{Result, SettingsError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tunables for the executor, evaluator, inspector and history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfiguration {
    /// Kill a terminal command after this many milliseconds
    pub timeout_ms: u64,
    /// Maximum characters of any single reply
    pub max_output_length: usize,
    /// History capacity (oldest entries evicted beyond it)
    pub history_size: usize,
    /// Maximum traversal depth of the object inspector
    pub max_inspect_depth: usize,
    /// Maximum own members scanned per inspected node
    pub max_inspect_members: usize,
    /// Maximum array elements reported per inspected node
    pub max_array_elements: usize,
    /// Walk the prototype chain when inspecting
    pub include_inherited: bool,
    /// Minimum gap between two progress snapshots
    pub progress_interval_ms: u64,
    /// Keep every progress chunk so it can be spilled later
    pub save_chunks: bool,
    /// Write oversized output to a side file instead of dropping it
    pub spill_enabled: bool,
    /// Allow terminal commands at all
    pub shell_enabled: bool,
    /// Substrings that reject a terminal command before spawn
    pub denylist: Vec<String>,
}

impl Default for ToolsConfiguration {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            max_output_length: 4000,
            history_size: 100,
            max_inspect_depth: 4,
            max_inspect_members: 100,
            max_array_elements: 30,
            include_inherited: true,
            progress_interval_ms: 3000,
            save_chunks: true,
            spill_enabled: true,
            shell_enabled: true,
            denylist: ["rm -rf /", "mkfs", ":(){", "shutdown", "reboot", "sudo "]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Addressable configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    TimeoutMs,
    MaxOutputLength,
    HistorySize,
    MaxInspectDepth,
    MaxInspectMembers,
    MaxArrayElements,
    IncludeInherited,
    ProgressIntervalMs,
    SaveChunks,
    SpillEnabled,
    ShellEnabled,
    Denylist,
}

impl SettingKey {
    pub const ALL: [SettingKey; 12] = [
        SettingKey::TimeoutMs,
        SettingKey::MaxOutputLength,
        SettingKey::HistorySize,
        SettingKey::MaxInspectDepth,
        SettingKey::MaxInspectMembers,
        SettingKey::MaxArrayElements,
        SettingKey::IncludeInherited,
        SettingKey::ProgressIntervalMs,
        SettingKey::SaveChunks,
        SettingKey::SpillEnabled,
        SettingKey::ShellEnabled,
        SettingKey::Denylist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::TimeoutMs => "timeout_ms",
            SettingKey::MaxOutputLength => "max_output_length",
            SettingKey::HistorySize => "history_size",
            SettingKey::MaxInspectDepth => "max_inspect_depth",
            SettingKey::MaxInspectMembers => "max_inspect_members",
            SettingKey::MaxArrayElements => "max_array_elements",
            SettingKey::IncludeInherited => "include_inherited",
            SettingKey::ProgressIntervalMs => "progress_interval_ms",
            SettingKey::SaveChunks => "save_chunks",
            SettingKey::SpillEnabled => "spill_enabled",
            SettingKey::ShellEnabled => "shell_enabled",
            SettingKey::Denylist => "denylist",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

fn parse_number<T: FromStr>(key: SettingKey, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| SettingsError::InvalidValue(key.to_string(), raw.to_string()))
}

fn parse_positive(key: SettingKey, raw: &str) -> Result<usize> {
    let value: usize = parse_number(key, raw)?;
    if value == 0 {
        return Err(SettingsError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

fn parse_bool(key: SettingKey, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(SettingsError::InvalidValue(key.to_string(), raw.to_string())),
    }
}

impl ToolsConfiguration {
    /// Parse `raw` according to the type of `key` and store it
    pub fn apply(&mut self, key: SettingKey, raw: &str) -> Result<()> {
        match key {
            SettingKey::TimeoutMs => self.timeout_ms = parse_positive(key, raw)? as u64,
            SettingKey::MaxOutputLength => self.max_output_length = parse_positive(key, raw)?,
            SettingKey::HistorySize => self.history_size = parse_positive(key, raw)?,
            SettingKey::MaxInspectDepth => self.max_inspect_depth = parse_positive(key, raw)?,
            SettingKey::MaxInspectMembers => self.max_inspect_members = parse_positive(key, raw)?,
            SettingKey::MaxArrayElements => self.max_array_elements = parse_positive(key, raw)?,
            SettingKey::IncludeInherited => self.include_inherited = parse_bool(key, raw)?,
            SettingKey::ProgressIntervalMs => {
                self.progress_interval_ms = parse_positive(key, raw)? as u64
            }
            SettingKey::SaveChunks => self.save_chunks = parse_bool(key, raw)?,
            SettingKey::SpillEnabled => self.spill_enabled = parse_bool(key, raw)?,
            SettingKey::ShellEnabled => self.shell_enabled = parse_bool(key, raw)?,
            SettingKey::Denylist => {
                self.denylist = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
        }
        Ok(())
    }

    /// Render the current value of `key` as text
    pub fn value_of(&self, key: SettingKey) -> String {
        match key {
            SettingKey::TimeoutMs => self.timeout_ms.to_string(),
            SettingKey::MaxOutputLength => self.max_output_length.to_string(),
            SettingKey::HistorySize => self.history_size.to_string(),
            SettingKey::MaxInspectDepth => self.max_inspect_depth.to_string(),
            SettingKey::MaxInspectMembers => self.max_inspect_members.to_string(),
            SettingKey::MaxArrayElements => self.max_array_elements.to_string(),
            SettingKey::IncludeInherited => self.include_inherited.to_string(),
            SettingKey::ProgressIntervalMs => self.progress_interval_ms.to_string(),
            SettingKey::SaveChunks => self.save_chunks.to_string(),
            SettingKey::SpillEnabled => self.spill_enabled.to_string(),
            SettingKey::ShellEnabled => self.shell_enabled.to_string(),
            SettingKey::Denylist => self.denylist.join(", "),
        }
    }

    /// First denylisted substring contained in `command`, if any
    pub fn denied_by(&self, command: &str) -> Option<&str> {
        self.denylist
            .iter()
            .find(|needle| !needle.is_empty() && command.contains(needle.as_str()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_parsing_is_lenient() {
        assert_eq!("timeout_ms".parse::<SettingKey>().unwrap(), SettingKey::TimeoutMs);
        assert_eq!("Max-Output-Length".parse::<SettingKey>().unwrap(), SettingKey::MaxOutputLength);
        assert!(matches!(
            "nope".parse::<SettingKey>(),
            Err(SettingsError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_apply_typed_values() {
        let mut config = ToolsConfiguration::default();
        config.apply(SettingKey::TimeoutMs, "1500").unwrap();
        config.apply(SettingKey::ShellEnabled, "off").unwrap();
        config.apply(SettingKey::Denylist, "curl, wget ,").unwrap();

        assert_eq!(config.timeout_ms, 1500);
        assert!(!config.shell_enabled);
        assert_eq!(config.denylist, vec!["curl", "wget"]);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = ToolsConfiguration::default();
        assert!(config.apply(SettingKey::HistorySize, "many").is_err());
        assert!(config.apply(SettingKey::HistorySize, "0").is_err());
        assert!(config.apply(SettingKey::SaveChunks, "maybe").is_err());
        assert_eq!(config, ToolsConfiguration::default());
    }

    #[test]
    fn test_denylist_match() {
        let config = ToolsConfiguration::default();
        assert_eq!(config.denied_by("sudo rm -rf /"), Some("rm -rf /"));
        assert_eq!(config.denied_by("echo hello"), None);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ToolsConfiguration = toml::from_str("timeout_ms = 10").unwrap();
        assert_eq!(config.timeout_ms, 10);
        assert_eq!(config.history_size, 100);
    }
}
