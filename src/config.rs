//! Persistent user settings for the command line front end.

use dirs_next as dirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::storage::FileStore;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CODE_AND_IRON_DATA_DIR";

/// Settings stored as JSON in the platform config directory.
///
/// Every field is `#[serde(default)]` so older or hand-written files with
/// missing entries still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where progress and templates are stored. Defaults to the platform
    /// data directory.
    pub data_dir: Option<PathBuf>,
    /// Answer every "same exercise?" prompt with this value instead of
    /// asking.
    pub auto_merge: Option<bool>,
}

impl Settings {
    const FILE: &'static str = "code_and_iron_settings.json";

    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(Self::FILE))
    }

    /// Load settings from the default location, falling back to defaults.
    pub fn load() -> Self {
        Self::path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        if let Ok(data) = std::fs::read_to_string(path) {
            match serde_json::from_str(&data) {
                Ok(cfg) => return cfg,
                Err(e) => log::warn!("Ignoring unreadable settings file {}: {e}", path.display()),
            }
        }
        Self::default()
    }

    pub fn save(&self) -> Result<()> {
        match Self::path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Directory for the key-value store: the environment override, then
    /// the configured directory, then the platform default.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir_with(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
    }

    fn data_dir_with(&self, env_override: Option<PathBuf>) -> Option<PathBuf> {
        env_override
            .or_else(|| self.data_dir.clone())
            .or_else(FileStore::default_dir)
    }
}
