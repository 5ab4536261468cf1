//! User-scoped path resolution for lector data.
//!
//! All persisted records (config, checkpoints, downloaded assets) live under
//! user-scoped directories that are independent of the install location, so a
//! reinstall never loses manual configuration or resume points.
//!
//! # Design
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - No interactive/terminal I/O - adapters handle user prompts separately
//! - `LECTOR_DATA_DIR` overrides everything, primarily for tests and
//!   sandboxed packaging

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable that overrides the data root.
pub const DATA_DIR_ENV: &str = "LECTOR_DATA_DIR";

/// Errors that can occur during path resolution and directory operations.
#[derive(Debug, Error)]
pub enum PathError {
    /// Could not determine the user's home directory.
    #[error("Cannot determine home directory")]
    NoHomeDir,

    /// Could not determine the system data directory.
    #[error("Cannot determine system data directory")]
    NoDataDir,

    /// Failed to create a directory.
    #[error("Failed to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// An empty path was provided.
    #[error("Path cannot be empty")]
    EmptyPath,
}

/// Root directory for application data (config, checkpoints).
///
/// Resolution order:
/// 1. `LECTOR_DATA_DIR` environment variable (highest priority)
/// 2. System data directory (e.g. `~/.local/share/lector`)
pub fn data_root() -> Result<PathBuf, PathError> {
    if let Ok(path) = env::var(DATA_DIR_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let data_dir = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
    Ok(data_dir.join("lector"))
}

/// Path to the persisted configuration record.
pub fn config_file_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("config.json"))
}

/// Directory holding one checkpoint record per job fingerprint.
pub fn checkpoints_dir() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("checkpoints"))
}

/// Directory for asset bundles stored permanently (survives cache cleanup).
pub fn asset_data_dir() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("models"))
}

/// Directory for asset bundles stored as cache (the OS may reclaim it).
///
/// Honors `LECTOR_DATA_DIR` so overridden environments stay self-contained.
pub fn asset_cache_dir() -> Result<PathBuf, PathError> {
    if let Ok(path) = env::var(DATA_DIR_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path).join("cache"));
        }
    }

    let cache_dir = dirs::cache_dir().ok_or(PathError::NoDataDir)?;
    Ok(cache_dir.join("lector"))
}

/// Create a directory (and parents) if it does not already exist.
pub fn ensure_directory(path: &Path) -> Result<(), PathError> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| PathError::CreateFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Normalize a user-provided path, expanding `~` and making it absolute.
pub fn normalize_user_path(raw: &str) -> Result<PathBuf, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }

    let expanded = if trimmed.starts_with("~/") || trimmed == "~" {
        let home = dirs::home_dir().ok_or(PathError::NoHomeDir)?;
        if trimmed == "~" {
            home
        } else {
            home.join(trimmed.trim_start_matches("~/"))
        }
    } else {
        PathBuf::from(trimmed)
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(env::current_dir().unwrap_or_default().join(expanded))
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_under_data_root() {
        let prev = env::var(DATA_DIR_ENV).ok();
        unsafe {
            env::set_var(DATA_DIR_ENV, "/tmp/lector-test-root");
        }
        let config = config_file_path().unwrap();
        assert_eq!(config, PathBuf::from("/tmp/lector-test-root/config.json"));
        let checkpoints = checkpoints_dir().unwrap();
        assert!(checkpoints.starts_with("/tmp/lector-test-root"));
        restore_env(DATA_DIR_ENV, prev);
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(matches!(normalize_user_path("   "), Err(PathError::EmptyPath)));
    }

    #[test]
    fn test_normalize_expands_tilde() {
        let normalized = normalize_user_path("~/bin/ffmpeg").unwrap();
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("bin/ffmpeg"));
    }

    fn restore_env(key: &str, previous: Option<String>) {
        if let Some(value) = previous {
            unsafe {
                env::set_var(key, value);
            }
        } else {
            unsafe {
                env::remove_var(key);
            }
        }
    }
}
