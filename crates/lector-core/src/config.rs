//! Persisted user configuration.
//!
//! A single JSON document under the user-scoped data root holds every
//! configuration key. Loading fails soft: a missing file, an unreadable file,
//! or a corrupt value for one key never takes the other keys down with it.
//! Saving is atomic (temp file + rename), so a crash mid-write leaves the
//! previous document intact.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::paths::{self, PathError};

/// Where downloaded asset bundles are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStorageMode {
    /// Cache directory; the OS may reclaim it and the bundle re-downloads.
    Cache,
    /// Permanent data directory; survives cache cleanup.
    #[default]
    Permanent,
}

/// Durable key -> value configuration, outliving any single process run.
///
/// All fields are optional so documents written by older versions (or with
/// individually corrupt keys) still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedConfig {
    /// User-specified path to the external encoder binary.
    pub tool_override_path: Option<PathBuf>,
    /// User-specified path to the voice model bundle directory.
    pub asset_override_path: Option<PathBuf>,
    /// Directory of the most recent conversion output.
    pub last_output_directory: Option<PathBuf>,
    /// Storage mode for downloaded asset bundles.
    pub asset_storage_mode: AssetStorageMode,
}

/// Errors surfaced by `ConfigStore::save`. Loading never errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not resolve the config file location.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Writing the document failed.
    #[error("Failed to write config {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// File-backed store for `PersistedConfig`.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store backed by the default user-scoped location.
    pub fn open_default() -> Result<Self, ConfigError> {
        Ok(Self::at(paths::config_file_path()?))
    }

    /// Store backed by an explicit file path (tests, portable installs).
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, recovering each key independently.
    ///
    /// Never returns an error: anything unreadable degrades to the default
    /// for that key, with a warning.
    pub fn load(&self) -> PersistedConfig {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config file, using defaults");
                return PersistedConfig::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Config unreadable, using defaults");
                return PersistedConfig::default();
            }
        };

        let document: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Config corrupt, using defaults");
                return PersistedConfig::default();
            }
        };

        // Per-key recovery: one bad value must not invalidate the others.
        PersistedConfig {
            tool_override_path: field(&document, "tool_override_path"),
            asset_override_path: field(&document, "asset_override_path"),
            last_output_directory: field(&document, "last_output_directory"),
            asset_storage_mode: field::<AssetStorageMode>(&document, "asset_storage_mode")
                .unwrap_or_default(),
        }
    }

    /// Atomically persist the configuration.
    ///
    /// Writes to a sibling temp file and renames over the target, so the
    /// previous document survives any failure before the rename.
    pub fn save(&self, config: &PersistedConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            paths::ensure_directory(parent)?;
        }

        let serialized = serde_json::to_string_pretty(config).map_err(|e| ConfigError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serialized).map_err(|e| ConfigError::Write {
            path: tmp.clone(),
            reason: e.to_string(),
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| ConfigError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        debug!(path = %self.path.display(), "Config saved");
        Ok(())
    }
}

/// Extract one key from the document, falling back to `None` when the value
/// is missing or does not deserialize.
fn field<T: serde::de::DeserializeOwned>(document: &Value, key: &str) -> Option<T> {
    let value = document.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(key, error = %e, "Config key corrupt, using default for it");
            None
        }
    }
}
