//! Probe strategy chain for locating external dependencies.
//!
//! Strategies run in a fixed priority order and the chain short-circuits on
//! the first candidate that passes functional verification. A candidate that
//! exists but fails verification is treated as not found and the chain
//! continues; the failure reason is retained so a missing dependency can be
//! reported with everything that was checked.
//!
//! The chain is a pure function of a `ProbeContext` snapshot — probing never
//! mutates process state, only inspects the filesystem and runs read-only
//! identity checks.

mod package_manager;
mod search_path;
mod verify;
mod well_known;

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use lector_core::deps::{DependencyKind, ProbeResult, ProbeStrategy, StrategyAttempt};
use lector_core::paths::normalize_user_path;

pub use search_path::{SHELL_PROFILE_FILES, augmented_search_path};
pub use verify::{verify_asset, verify_tool};

/// Static description of the external encoder the chain probes for.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    /// Binary name without platform suffix.
    pub binary_name: &'static str,
    /// Environment variable that overrides the binary path.
    pub env_override: &'static str,
    /// Package name for package-manager queries.
    pub package_name: &'static str,
    /// Argument for the version/identity check.
    pub version_arg: &'static str,
    /// Substring the identity check output must contain.
    pub version_marker: &'static str,
}

impl ToolSpec {
    /// The ffmpeg audio encoder.
    pub const fn ffmpeg() -> Self {
        Self {
            binary_name: "ffmpeg",
            env_override: "LECTOR_FFMPEG_PATH",
            package_name: "ffmpeg",
            version_arg: "-version",
            version_marker: "ffmpeg version",
        }
    }

    /// Binary filename including the platform suffix.
    pub fn binary_filename(&self) -> String {
        if cfg!(target_os = "windows") {
            format!("{}.exe", self.binary_name)
        } else {
            self.binary_name.to_string()
        }
    }
}

/// Static description of the voice model bundle the chain probes for.
#[derive(Debug, Clone, Copy)]
pub struct AssetSpec {
    /// Files that must all be present and non-empty in the bundle directory.
    pub required_files: &'static [&'static str],
    /// Environment variable that overrides the bundle directory.
    pub env_override: &'static str,
}

impl AssetSpec {
    /// The Kokoro voice model bundle.
    pub const fn voice_models() -> Self {
        Self {
            required_files: &["kokoro-v1.0.onnx", "voices-v1.0.bin"],
            env_override: "LECTOR_MODELS_DIR",
        }
    }
}

/// Immutable snapshot of everything the chain inspects.
///
/// Captured once per resolution so results are deterministic for a given
/// filesystem/environment state, and so tests can probe hermetically.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    /// The user's home directory.
    pub home: PathBuf,
    /// Value of `PATH` at capture time.
    pub path_var: Option<OsString>,
    /// Contents of the shell startup files that existed.
    pub shell_profiles: Vec<String>,
    /// Value of the tool override environment variable.
    pub tool_env_path: Option<String>,
    /// Value of the asset override environment variable.
    pub asset_env_path: Option<String>,
    /// Well-known directories checked for the tool.
    pub tool_well_known: Vec<PathBuf>,
    /// Well-known directories checked for the asset bundle.
    pub asset_well_known: Vec<PathBuf>,
    /// Whether the package manager may be queried (spawns a process).
    pub query_package_manager: bool,
}

impl ProbeContext {
    /// Capture the live process environment.
    pub fn from_environment(tool: &ToolSpec, asset: &AssetSpec) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let shell_profiles = SHELL_PROFILE_FILES
            .iter()
            .filter_map(|name| fs::read_to_string(home.join(name)).ok())
            .collect();

        Self {
            path_var: env::var_os("PATH"),
            shell_profiles,
            tool_env_path: env::var(tool.env_override).ok().filter(|v| !v.is_empty()),
            asset_env_path: env::var(asset.env_override).ok().filter(|v| !v.is_empty()),
            tool_well_known: well_known::tool_dirs(&home),
            asset_well_known: well_known::asset_dirs(&home),
            query_package_manager: true,
            home,
        }
    }
}

/// Run the tool chain: config override, env override, PATH, shell-profile
/// PATH, package manager, well-known directories.
pub fn probe_tool(
    spec: &ToolSpec,
    ctx: &ProbeContext,
    config_override: Option<&Path>,
) -> ProbeResult {
    let kind = DependencyKind::ExternalTool;
    let mut attempts = Vec::new();
    let mut misconfigured: Option<(PathBuf, String)> = None;

    // 1. Persisted user override (priority 0)
    match config_override {
        Some(path) => match verify_tool(path, spec) {
            Ok(()) => return hit(kind, ProbeStrategy::ConfigOverride, path.to_path_buf(), attempts),
            Err(note) => {
                if path.exists() && misconfigured.is_none() {
                    misconfigured = Some((path.to_path_buf(), note.clone()));
                }
                attempts.push(StrategyAttempt::new(ProbeStrategy::ConfigOverride, note));
            }
        },
        None => attempts.push(StrategyAttempt::new(
            ProbeStrategy::ConfigOverride,
            "no override configured",
        )),
    }

    // 2. Environment variable override
    match &ctx.tool_env_path {
        Some(raw) => match normalize_user_path(raw) {
            Ok(path) => match verify_tool(&path, spec) {
                Ok(()) => return hit(kind, ProbeStrategy::EnvOverride, path, attempts),
                Err(note) => {
                    if path.exists() && misconfigured.is_none() {
                        misconfigured = Some((path, note.clone()));
                    }
                    attempts.push(StrategyAttempt::new(ProbeStrategy::EnvOverride, note));
                }
            },
            Err(e) => attempts.push(StrategyAttempt::new(
                ProbeStrategy::EnvOverride,
                format!("{} is not a usable path: {e}", spec.env_override),
            )),
        },
        None => attempts.push(StrategyAttempt::new(
            ProbeStrategy::EnvOverride,
            format!("{} not set", spec.env_override),
        )),
    }

    // 3. Standard executable-search-path lookup
    match search_path::find_on_path(&spec.binary_filename(), ctx.path_var.as_ref()) {
        Some(path) => match verify_tool(&path, spec) {
            Ok(()) => return hit(kind, ProbeStrategy::SearchPath, path, attempts),
            Err(note) => attempts.push(StrategyAttempt::new(ProbeStrategy::SearchPath, note)),
        },
        None => attempts.push(StrategyAttempt::new(
            ProbeStrategy::SearchPath,
            format!("{} not on PATH", spec.binary_name),
        )),
    }

    // 4. Shell-profile-augmented search
    let extra_dirs =
        augmented_search_path(ctx.path_var.as_ref(), &ctx.shell_profiles, &ctx.home);
    if extra_dirs.is_empty() {
        attempts.push(StrategyAttempt::new(
            ProbeStrategy::ShellProfile,
            "no supplementary PATH entries in shell profiles",
        ));
    } else {
        match search_path::find_in_dirs(&spec.binary_filename(), &extra_dirs) {
            Some(path) => match verify_tool(&path, spec) {
                Ok(()) => return hit(kind, ProbeStrategy::ShellProfile, path, attempts),
                Err(note) => {
                    attempts.push(StrategyAttempt::new(ProbeStrategy::ShellProfile, note));
                }
            },
            None => attempts.push(StrategyAttempt::new(
                ProbeStrategy::ShellProfile,
                format!(
                    "{} not in {} shell-profile director{}",
                    spec.binary_name,
                    extra_dirs.len(),
                    if extra_dirs.len() == 1 { "y" } else { "ies" }
                ),
            )),
        }
    }

    // 5. Package-manager content query
    if ctx.query_package_manager {
        match package_manager::query_package_manager(&spec.binary_filename(), spec.package_name) {
            Ok(path) => match verify_tool(&path, spec) {
                Ok(()) => return hit(kind, ProbeStrategy::PackageManager, path, attempts),
                Err(note) => {
                    attempts.push(StrategyAttempt::new(ProbeStrategy::PackageManager, note));
                }
            },
            Err(note) => attempts.push(StrategyAttempt::new(ProbeStrategy::PackageManager, note)),
        }
    } else {
        attempts.push(StrategyAttempt::new(
            ProbeStrategy::PackageManager,
            "query disabled",
        ));
    }

    // 6. Well-known installation directories
    match search_path::find_in_dirs(&spec.binary_filename(), &ctx.tool_well_known) {
        Some(path) => match verify_tool(&path, spec) {
            Ok(()) => return hit(kind, ProbeStrategy::WellKnownDir, path, attempts),
            Err(note) => attempts.push(StrategyAttempt::new(ProbeStrategy::WellKnownDir, note)),
        },
        None => attempts.push(StrategyAttempt::new(
            ProbeStrategy::WellKnownDir,
            "no candidate in well-known directories",
        )),
    }

    debug!(kind = %kind, tried = attempts.len(), "No strategy produced a verified tool");
    let result = ProbeResult::missing(kind, attempts);
    match misconfigured {
        Some((path, detail)) => result.with_misconfigured(path, detail),
        None => result,
    }
}

/// Run the asset chain: config override, env override, well-known storage
/// locations. The remote-fetch strategy is driven separately by the
/// resolver, and only with explicit authorization.
pub fn probe_asset(
    spec: &AssetSpec,
    ctx: &ProbeContext,
    config_override: Option<&Path>,
) -> ProbeResult {
    let kind = DependencyKind::AssetBundle;
    let mut attempts = Vec::new();
    let mut misconfigured: Option<(PathBuf, String)> = None;

    match config_override {
        Some(dir) => match verify_asset(dir, spec) {
            Ok(()) => return hit(kind, ProbeStrategy::ConfigOverride, dir.to_path_buf(), attempts),
            Err(note) => {
                if dir.exists() && misconfigured.is_none() {
                    misconfigured = Some((dir.to_path_buf(), note.clone()));
                }
                attempts.push(StrategyAttempt::new(ProbeStrategy::ConfigOverride, note));
            }
        },
        None => attempts.push(StrategyAttempt::new(
            ProbeStrategy::ConfigOverride,
            "no override configured",
        )),
    }

    match &ctx.asset_env_path {
        Some(raw) => match normalize_user_path(raw) {
            Ok(dir) => match verify_asset(&dir, spec) {
                Ok(()) => return hit(kind, ProbeStrategy::EnvOverride, dir, attempts),
                Err(note) => {
                    if dir.exists() && misconfigured.is_none() {
                        misconfigured = Some((dir, note.clone()));
                    }
                    attempts.push(StrategyAttempt::new(ProbeStrategy::EnvOverride, note));
                }
            },
            Err(e) => attempts.push(StrategyAttempt::new(
                ProbeStrategy::EnvOverride,
                format!("{} is not a usable path: {e}", spec.env_override),
            )),
        },
        None => attempts.push(StrategyAttempt::new(
            ProbeStrategy::EnvOverride,
            format!("{} not set", spec.env_override),
        )),
    }

    for dir in &ctx.asset_well_known {
        match verify_asset(dir, spec) {
            Ok(()) => return hit(kind, ProbeStrategy::WellKnownDir, dir.clone(), attempts),
            Err(note) => attempts.push(StrategyAttempt::new(ProbeStrategy::WellKnownDir, note)),
        }
    }

    debug!(kind = %kind, tried = attempts.len(), "No strategy produced a verified asset bundle");
    let result = ProbeResult::missing(kind, attempts);
    match misconfigured {
        Some((path, detail)) => result.with_misconfigured(path, detail),
        None => result,
    }
}

fn hit(
    kind: DependencyKind,
    strategy: ProbeStrategy,
    path: PathBuf,
    attempts: Vec<StrategyAttempt>,
) -> ProbeResult {
    info!(kind = %kind, strategy = %strategy, path = %path.display(), "Dependency located");
    ProbeResult::found(kind, strategy, path, attempts)
}
