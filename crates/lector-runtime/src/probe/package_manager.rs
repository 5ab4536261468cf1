//! Package-manager content query.
//!
//! Asks the platform package manager where it placed the binary, for hosts
//! where the install location never made it onto the process PATH.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

/// Query the platform package manager for the binary's installed location.
///
/// Returns `Ok(path)` when the query names an existing file, `Err(note)`
/// otherwise. The note goes into the probe diagnostics verbatim.
pub fn query_package_manager(binary_name: &str, package_name: &str) -> Result<PathBuf, String> {
    #[cfg(target_os = "macos")]
    {
        query_brew(binary_name, package_name)
    }
    #[cfg(target_os = "linux")]
    {
        query_dpkg(binary_name, package_name)
            .or_else(|dpkg_note| query_rpm(binary_name, package_name).map_err(|rpm_note| {
                format!("{dpkg_note}; {rpm_note}")
            }))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = (binary_name, package_name);
        Err("no package manager content query on this platform".to_string())
    }
}

#[cfg(target_os = "macos")]
fn query_brew(binary_name: &str, package_name: &str) -> Result<PathBuf, String> {
    let output = Command::new("brew")
        .args(["--prefix", package_name])
        .output()
        .map_err(|e| format!("brew not available: {e}"))?;
    if !output.status.success() {
        return Err(format!("brew does not know {package_name}"));
    }
    let prefix = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let candidate = PathBuf::from(prefix).join("bin").join(binary_name);
    if candidate.is_file() {
        debug!(path = %candidate.display(), "brew located binary");
        Ok(candidate)
    } else {
        Err(format!("brew prefix has no {binary_name}"))
    }
}

#[cfg(target_os = "linux")]
fn query_dpkg(binary_name: &str, package_name: &str) -> Result<PathBuf, String> {
    query_file_list("dpkg", &["-L", package_name], binary_name)
}

#[cfg(target_os = "linux")]
fn query_rpm(binary_name: &str, package_name: &str) -> Result<PathBuf, String> {
    query_file_list("rpm", &["-ql", package_name], binary_name)
}

/// Run a "list package contents" command and pick the installed binary out
/// of the file list.
#[cfg(target_os = "linux")]
fn query_file_list(manager: &str, args: &[&str], binary_name: &str) -> Result<PathBuf, String> {
    let output = Command::new(manager)
        .args(args)
        .output()
        .map_err(|e| format!("{manager} not available: {e}"))?;
    if !output.status.success() {
        return Err(format!("{manager} does not know the package"));
    }

    let suffix = format!("/{binary_name}");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| line.ends_with(&suffix) && line.contains("/bin/"))
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
        .inspect(|candidate| debug!(path = %candidate.display(), %manager, "Package manager located binary"))
        .ok_or_else(|| format!("{manager} lists the package but no installed {binary_name}"))
}
