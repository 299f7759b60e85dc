//! Lightweight persisted settings store.
//!
//! A small JSON file holding everything that is not the API key: the
//! remembered configuration directory, the last output directory, and a
//! mirror of the API key for installs that predate the key/value file.
//! Reads never fail (missing or unparsable content is just defaults) and
//! writes are best effort.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub remembered_config_dir: Option<PathBuf>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub last_output_directory: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the primary user-data directory.
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::data_dir()?.join("bizfinder").join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Settings {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, settings: &Settings) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(settings).unwrap_or_else(|_| "{}".to_string());
        std::fs::write(&self.path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_garbage_store_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        assert!(store.load().api_key.is_none());

        std::fs::write(store.path(), "not json {{{").unwrap();
        assert!(store.load().api_key.is_none());
    }

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
        let mut s = Settings::default();
        s.api_key = Some("k-123".into());
        s.remembered_config_dir = Some(dir.path().to_path_buf());
        store.save(&s).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.api_key.as_deref(), Some("k-123"));
        assert_eq!(loaded.remembered_config_dir.as_deref(), Some(dir.path()));
    }
}
