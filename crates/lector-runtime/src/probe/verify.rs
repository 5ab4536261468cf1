//! Functional verification of probe candidates.
//!
//! Existence is never enough: a path is only accepted after a functional
//! check passes, so the wrong binary at a plausible location can never be
//! surfaced as satisfied.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use super::{AssetSpec, ToolSpec};

/// Run the tool's version/identity check at `path`.
///
/// Returns `Ok(())` when the binary executes successfully and its output
/// contains the expected marker; `Err` carries the failure note that goes
/// into the probe diagnostics.
pub fn verify_tool(path: &Path, spec: &ToolSpec) -> Result<(), String> {
    if !path.is_file() {
        return Err(format!("{} does not exist", path.display()));
    }

    let output = Command::new(path)
        .arg(spec.version_arg)
        .output()
        .map_err(|e| format!("failed to execute {}: {e}", path.display()))?;

    if !output.status.success() {
        return Err(format!(
            "{} {} exited with {}",
            path.display(),
            spec.version_arg,
            output.status
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stdout.contains(spec.version_marker) || stderr.contains(spec.version_marker) {
        debug!(path = %path.display(), "Tool verification passed");
        Ok(())
    } else {
        Err(format!(
            "{} did not identify itself as {}",
            path.display(),
            spec.version_marker
        ))
    }
}

/// Check that `dir` contains every required asset file, non-empty.
pub fn verify_asset(dir: &Path, spec: &AssetSpec) -> Result<(), String> {
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()));
    }

    for name in spec.required_files {
        let file = dir.join(name);
        match file.metadata() {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => return Err(format!("{} is empty", file.display())),
            Err(_) => return Err(format!("{} is missing", file.display())),
        }
    }

    debug!(dir = %dir.display(), "Asset bundle verification passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_verify_asset_requires_every_file() {
        let spec = AssetSpec::voice_models();
        let temp = tempdir().unwrap();

        let err = verify_asset(temp.path(), &spec).unwrap_err();
        assert!(err.contains("missing"));

        for name in spec.required_files {
            fs::write(temp.path().join(name), b"data").unwrap();
        }
        assert!(verify_asset(temp.path(), &spec).is_ok());
    }

    #[test]
    fn test_verify_asset_rejects_empty_files() {
        let spec = AssetSpec::voice_models();
        let temp = tempdir().unwrap();
        for name in spec.required_files {
            fs::write(temp.path().join(name), b"").unwrap();
        }
        assert!(verify_asset(temp.path(), &spec).unwrap_err().contains("empty"));
    }

    #[test]
    fn test_verify_tool_rejects_missing_path() {
        let spec = ToolSpec::ffmpeg();
        let err = verify_tool(Path::new("/nonexistent/ffmpeg"), &spec).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_tool_checks_identity_marker() {
        use std::os::unix::fs::PermissionsExt;

        let spec = ToolSpec::ffmpeg();
        let temp = tempdir().unwrap();

        let fake = temp.path().join("ffmpeg");
        fs::write(&fake, "#!/bin/sh\necho 'ffmpeg version 6.1'\n").unwrap();
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(verify_tool(&fake, &spec).is_ok());

        let imposter = temp.path().join("not-ffmpeg");
        fs::write(&imposter, "#!/bin/sh\necho 'something else'\n").unwrap();
        fs::set_permissions(&imposter, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(
            verify_tool(&imposter, &spec)
                .unwrap_err()
                .contains("did not identify")
        );
    }
}
