// Settings module - typed, persisted tunables shared by every component

pub mod config;
pub mod error;
pub mod store;

pub use config::{SettingKey, ToolsConfiguration};
pub use error::{Result, SettingsError};
pub use store::SettingsStore;
