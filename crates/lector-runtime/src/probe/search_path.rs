//! Search-path strategies: standard PATH lookup and shell-profile-augmented
//! lookup.
//!
//! Desktop launchers often start the process without the user's interactive
//! shell environment, so a tool installed via a PATH line in `.zshrc` is
//! invisible to a plain lookup. `augmented_search_path` is a pure function
//! from (PATH snapshot, shell-profile contents) to an extended directory
//! list, keeping the strategy free of hidden global mutation.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Shell startup files scanned for supplementary PATH entries, relative to
/// the home directory.
pub const SHELL_PROFILE_FILES: &[&str] = &[".profile", ".bash_profile", ".bashrc", ".zshrc"];

/// Locate a binary on the given PATH snapshot.
pub fn find_on_path(binary_name: &str, path_var: Option<&OsString>) -> Option<PathBuf> {
    let paths = path_var.cloned()?;
    which::which_in(binary_name, Some(paths), env::current_dir().ok()?).ok()
}

/// Extract additional search directories from shell-profile contents.
///
/// Recognizes `PATH=...` and `export PATH=...` lines, expands `$HOME`/`~`
/// against `home`, drops `$PATH`/`${PATH}` self-references, and returns only
/// entries not already present in the current PATH snapshot, in first-seen
/// order.
pub fn augmented_search_path(
    path_var: Option<&OsString>,
    profile_contents: &[String],
    home: &Path,
) -> Vec<PathBuf> {
    let existing: Vec<PathBuf> = path_var
        .map(|raw| env::split_paths(raw).collect())
        .unwrap_or_default();

    let mut extra = Vec::new();
    for contents in profile_contents {
        for line in contents.lines() {
            let Some(assignment) = parse_path_assignment(line) else {
                continue;
            };
            for entry in assignment.split(':') {
                let entry = entry.trim().trim_matches('"').trim_matches('\'');
                if entry.is_empty() || entry == "$PATH" || entry == "${PATH}" {
                    continue;
                }
                let dir = expand_home(entry, home);
                if !dir.is_absolute() {
                    continue;
                }
                if !existing.contains(&dir) && !extra.contains(&dir) {
                    extra.push(dir);
                }
            }
        }
    }
    extra
}

/// Locate a binary in an explicit list of directories.
pub fn find_in_dirs(binary_name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(binary_name))
        .find(|candidate| candidate.is_file())
}

/// Pull the value out of a `PATH=` or `export PATH=` line, if it is one.
fn parse_path_assignment(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let without_export = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let value = without_export.strip_prefix("PATH=")?;
    // Skip commented lines
    if trimmed.starts_with('#') {
        return None;
    }
    Some(value)
}

fn expand_home(entry: &str, home: &Path) -> PathBuf {
    if let Some(rest) = entry.strip_prefix("$HOME/") {
        home.join(rest)
    } else if let Some(rest) = entry.strip_prefix("${HOME}/") {
        home.join(rest)
    } else if let Some(rest) = entry.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(entry)
    }
}
