//! Fixed lists of well-known installation directories.

use std::path::{Path, PathBuf};

/// Directories where the encoder binary commonly lands outside PATH.
pub fn tool_dirs(home: &Path) -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin"),
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/opt/local/bin"),
            home.join(".local/bin"),
        ]
    }
    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from(r"C:\ffmpeg\bin"),
            PathBuf::from(r"C:\Program Files\ffmpeg\bin"),
            home.join(r"AppData\Local\Microsoft\WinGet\Links"),
        ]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/usr/bin"),
            PathBuf::from("/snap/bin"),
            home.join(".local/bin"),
        ]
    }
}

/// Directories where a voice model bundle may already exist: the lector
/// storage locations plus install paths used by earlier releases.
pub fn asset_dirs(home: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(data) = lector_core::paths::asset_data_dir() {
        dirs.push(data);
    }
    if let Ok(cache) = lector_core::paths::asset_cache_dir() {
        dirs.push(cache);
    }
    // Legacy location used before the storage-mode setting existed
    dirs.push(home.join(".local/share/reader"));
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_dirs_are_absolute() {
        let home = PathBuf::from("/home/tester");
        assert!(tool_dirs(&home).iter().all(|d| d.is_absolute()));
    }

    #[test]
    fn test_asset_dirs_include_legacy_location() {
        let home = PathBuf::from("/home/tester");
        let dirs = asset_dirs(&home);
        assert!(dirs.contains(&home.join(".local/share/reader")));
    }
}
