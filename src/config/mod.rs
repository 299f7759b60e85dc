//! Configuration location resolution and persistence.
//!
//! Installation methods differ wildly in which directories are actually
//! writable, and permission bits lie on some platforms, so writability is
//! established the only reliable way: by creating and deleting a marker
//! file. Candidates are a declarative ordered list probed by a pure
//! function; the first survivor becomes the active location for the rest of
//! the run and is remembered for the next one.

mod store;

pub use store::{Settings, SettingsStore};

use crate::error::{ProbeAttempt, SupervisorError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Name of the key/value configuration file inside the active directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

const PROBE_FILE_NAME: &str = ".write_test";

/// The directory currently selected for persisting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub writable: bool,
}

impl ConfigLocation {
    /// Path of the key/value configuration file inside this location.
    pub fn config_file(&self) -> PathBuf {
        self.path.join(CONFIG_FILE_NAME)
    }
}

/// Merged view over the key/value file and the settings store. The file is
/// authoritative for the API key; the store for everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigData {
    pub api_key: Option<String>,
    pub last_output_directory: Option<PathBuf>,
}

fn api_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // First-match extraction, deliberately not a full INI parser.
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*google_maps_api_key\s*=\s*(\S.*?)\s*$").expect("valid regex")
    })
}

/// Extract the API key from key/value file text. Content that does not
/// parse as key=value is "key absent", never an error, so a file can be
/// adopted gradually.
pub fn extract_api_key(text: &str) -> Option<String> {
    api_key_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Verify writability by creating and deleting a marker file. Permission
/// bits are not consulted; they are unreliable across platforms and
/// installation methods.
pub fn probe_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let marker = dir.join(PROBE_FILE_NAME);
    std::fs::write(&marker, b"probe")?;
    std::fs::remove_file(&marker)
}

/// Resolves and caches the active configuration location, and owns the
/// load/save paths for the small persistent configuration.
#[derive(Debug)]
pub struct ConfigLocator {
    candidates: Vec<PathBuf>,
    store: SettingsStore,
    active: Option<PathBuf>,
}

impl ConfigLocator {
    /// Locator over the standard candidate list: the remembered directory,
    /// the primary user-data directory, then a fallback under documents.
    pub fn new() -> Self {
        let store_path = SettingsStore::default_path()
            .unwrap_or_else(|| PathBuf::from(".bizfinder").join("settings.json"));
        let store = SettingsStore::new(store_path);
        let candidates = Self::standard_candidates(&store);
        Self {
            candidates,
            store,
            active: None,
        }
    }

    /// Locator over an explicit candidate list (tests, diagnostics).
    pub fn with_candidates(candidates: Vec<PathBuf>, store: SettingsStore) -> Self {
        Self {
            candidates,
            store,
            active: None,
        }
    }

    fn standard_candidates(store: &SettingsStore) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        let settings = store.load();
        if let Some(remembered) = settings.remembered_config_dir {
            candidates.push(remembered);
        }
        if let Some(data) = dirs::data_dir() {
            candidates.push(data.join("bizfinder"));
        }
        if let Some(docs) = dirs::document_dir() {
            candidates.push(docs.join("BizFinder"));
        }
        candidates.dedup();
        candidates
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Probe status for every candidate, for diagnostics output.
    pub fn probe_report(&self) -> Vec<(PathBuf, Result<(), String>)> {
        self.candidates
            .iter()
            .map(|dir| {
                let res = probe_writable(dir).map_err(|e| e.to_string());
                (dir.clone(), res)
            })
            .collect()
    }

    /// Select the active location, probing candidates in priority order.
    /// The selection is cached: later calls return the same location without
    /// re-probing as long as the directory still exists.
    pub fn resolve(&mut self) -> Result<ConfigLocation, SupervisorError> {
        if let Some(active) = &self.active {
            if active.is_dir() {
                return Ok(ConfigLocation {
                    path: active.clone(),
                    writable: true,
                });
            }
            // The active directory vanished mid-run; fall through to the
            // full candidate search rather than assume staleness.
            debug!(path = %active.display(), "active config directory disappeared, re-resolving");
            self.active = None;
        }

        let mut attempts = Vec::new();
        for dir in &self.candidates {
            match probe_writable(dir) {
                Ok(()) => {
                    debug!(path = %dir.display(), "selected active config directory");
                    self.active = Some(dir.clone());
                    self.remember(dir);
                    return Ok(ConfigLocation {
                        path: dir.clone(),
                        writable: true,
                    });
                }
                Err(e) => {
                    debug!(path = %dir.display(), error = %e, "config directory probe failed");
                    attempts.push(ProbeAttempt {
                        path: dir.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Err(SupervisorError::NoWritableLocation { attempts })
    }

    /// Persist the winning directory for the next run. Best effort: a store
    /// that cannot be written only costs a re-probe next time.
    fn remember(&self, dir: &Path) {
        let mut settings = self.store.load();
        if settings.remembered_config_dir.as_deref() != Some(dir) {
            settings.remembered_config_dir = Some(dir.to_path_buf());
            if let Err(e) = self.store.save(&settings) {
                debug!(error = %e, "could not persist remembered config directory");
            }
        }
    }

    /// Remember the last output directory in the settings store. Best
    /// effort, like [`Self::remember`].
    pub fn remember_output_directory(&self, dir: &Path) {
        let mut settings = self.store.load();
        if settings.last_output_directory.as_deref() != Some(dir) {
            settings.last_output_directory = Some(dir.to_path_buf());
            let _ = self.store.save(&settings);
        }
    }

    /// Merge the key/value file with the settings store. The file wins for
    /// the API key when both carry one; malformed file content is treated as
    /// "key absent", not a hard error.
    pub fn load(&mut self) -> Result<ConfigData, SupervisorError> {
        let location = self.resolve()?;
        let settings = self.store.load();
        let file_key = std::fs::read_to_string(location.config_file())
            .ok()
            .and_then(|text| extract_api_key(&text));
        Ok(ConfigData {
            api_key: file_key.or(settings.api_key),
            last_output_directory: settings.last_output_directory,
        })
    }

    /// Write the API key to the active location. If the write fails (a
    /// previously writable directory can turn read-only), the full candidate
    /// search is re-run once before giving up.
    pub fn save(&mut self, api_key: &str) -> Result<ConfigLocation, SupervisorError> {
        let location = self.resolve()?;
        match self.write_config_file(&location, api_key) {
            Ok(()) => Ok(location),
            Err(first_err) => {
                debug!(
                    path = %location.path.display(),
                    error = %first_err,
                    "config save failed, re-running candidate search"
                );
                self.active = None;
                let location = self.resolve()?;
                self.write_config_file(&location, api_key).map_err(|e| {
                    SupervisorError::NoWritableLocation {
                        attempts: vec![ProbeAttempt {
                            path: location.path.clone(),
                            reason: e.to_string(),
                        }],
                    }
                })?;
                Ok(location)
            }
        }
    }

    fn write_config_file(
        &self,
        location: &ConfigLocation,
        api_key: &str,
    ) -> std::io::Result<()> {
        let text = format!("[API]\ngoogle_maps_api_key = {}\n", api_key);
        std::fs::write(location.config_file(), text)?;
        // Mirror into the store so older installs that only read the store
        // keep working.
        let mut settings = self.store.load();
        settings.api_key = Some(api_key.to_string());
        let _ = self.store.save(&settings);
        Ok(())
    }

    /// The active config file path, requiring that the file actually exists.
    /// Used as the spawn precondition: no config, no worker.
    pub fn existing_config_file(&mut self) -> Result<PathBuf, SupervisorError> {
        let location = self.resolve()?;
        let file = location.config_file();
        if file.is_file() {
            Ok(file)
        } else {
            Err(SupervisorError::ConfigMissing)
        }
    }
}

impl Default for ConfigLocator {
    fn default() -> Self {
        Self::new()
    }
}
