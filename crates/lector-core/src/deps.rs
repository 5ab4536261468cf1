//! Dependency resolution domain types.
//!
//! The runtime crate runs the actual probe strategies; these types describe
//! what was asked for, which strategies were tried, and what the caller can
//! do about a missing dependency.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of external dependency is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// The external audio encoder binary (ffmpeg).
    ExternalTool,
    /// The voice model asset bundle.
    AssetBundle,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExternalTool => f.write_str("external tool"),
            Self::AssetBundle => f.write_str("asset bundle"),
        }
    }
}

/// Identifier of one probe strategy, in chain priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStrategy {
    /// Persisted or runtime-supplied user override (priority 0).
    ConfigOverride,
    /// Environment variable override.
    EnvOverride,
    /// Standard executable-search-path lookup.
    SearchPath,
    /// Search path augmented with entries read from shell startup files.
    ShellProfile,
    /// Platform package manager content query.
    PackageManager,
    /// Fixed list of well-known installation directories.
    WellKnownDir,
    /// Remote fetch into the designated storage location.
    RemoteFetch,
}

impl fmt::Display for ProbeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConfigOverride => "config override",
            Self::EnvOverride => "environment override",
            Self::SearchPath => "search path",
            Self::ShellProfile => "shell profile search path",
            Self::PackageManager => "package manager query",
            Self::WellKnownDir => "well-known directories",
            Self::RemoteFetch => "remote fetch",
        };
        f.write_str(name)
    }
}

/// Record of one strategy that was tried and did not produce a verified hit.
///
/// Retained so a missing dependency can be reported with everything that was
/// checked, not just "not found".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    /// Which strategy was tried.
    pub strategy: ProbeStrategy,
    /// Why it did not succeed (path checked, command output, ...).
    pub note: String,
}

impl StrategyAttempt {
    /// Create a new attempt record.
    pub fn new(strategy: ProbeStrategy, note: impl Into<String>) -> Self {
        Self {
            strategy,
            note: note.into(),
        }
    }
}

/// Result of running the probe chain for one dependency kind.
///
/// Produced fresh on every resolution attempt; never persisted.
/// Invariant: `found` implies `verified` — a candidate that fails the
/// functional check is reported as not found, with the failure retained
/// in `attempts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// What was probed for.
    pub kind: DependencyKind,
    /// Whether a verified candidate was located.
    pub found: bool,
    /// The resolved path, when found.
    pub resolved_path: Option<PathBuf>,
    /// Which strategy produced the verified hit.
    pub source_strategy: Option<ProbeStrategy>,
    /// Whether the functional check passed (always true when `found`).
    pub verified: bool,
    /// Every strategy tried before (and including) failure, with reasons.
    pub attempts: Vec<StrategyAttempt>,
    /// Set when a user-supplied override existed on disk but failed the
    /// functional check; lets the caller say "this is not a valid X"
    /// instead of "X not found".
    pub misconfigured: Option<MisconfiguredOverride>,
}

/// Details of an override path that exists but failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconfiguredOverride {
    /// The override path that was checked.
    pub path: PathBuf,
    /// What the functional check reported.
    pub detail: String,
}

impl ProbeResult {
    /// A verified hit produced by `strategy` at `path`.
    pub fn found(
        kind: DependencyKind,
        strategy: ProbeStrategy,
        path: PathBuf,
        attempts: Vec<StrategyAttempt>,
    ) -> Self {
        Self {
            kind,
            found: true,
            resolved_path: Some(path),
            source_strategy: Some(strategy),
            verified: true,
            attempts,
            misconfigured: None,
        }
    }

    /// No strategy produced a verified candidate.
    pub fn missing(kind: DependencyKind, attempts: Vec<StrategyAttempt>) -> Self {
        Self {
            kind,
            found: false,
            resolved_path: None,
            source_strategy: None,
            verified: false,
            attempts,
            misconfigured: None,
        }
    }

    /// Mark this result as carrying a misconfigured user override.
    pub fn with_misconfigured(mut self, path: PathBuf, detail: impl Into<String>) -> Self {
        self.misconfigured = Some(MisconfiguredOverride {
            path,
            detail: detail.into(),
        });
        self
    }
}

/// Combined verdict for all dependency kinds, held for the duration of one
/// job and immutable once the job starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependencies {
    results: BTreeMap<DependencyKind, ProbeResult>,
}

impl ResolvedDependencies {
    /// Build the verdict from individual probe results.
    pub fn new(results: impl IntoIterator<Item = ProbeResult>) -> Self {
        Self {
            results: results.into_iter().map(|r| (r.kind, r)).collect(),
        }
    }

    /// Look up the result for one dependency kind.
    pub fn get(&self, kind: DependencyKind) -> Option<&ProbeResult> {
        self.results.get(&kind)
    }

    /// The resolved path for one kind, when found.
    pub fn path(&self, kind: DependencyKind) -> Option<&PathBuf> {
        self.results.get(&kind).and_then(|r| r.resolved_path.as_ref())
    }

    /// Whether every dependency kind was found and verified.
    pub fn is_satisfied(&self) -> bool {
        [DependencyKind::ExternalTool, DependencyKind::AssetBundle]
            .iter()
            .all(|kind| self.results.get(kind).is_some_and(|r| r.found && r.verified))
    }

    /// Actionable remedies for every unsatisfied dependency.
    pub fn remedies(&self) -> Vec<Remedy> {
        let mut remedies = Vec::new();
        for (kind, result) in &self.results {
            if result.found {
                continue;
            }
            remedies.push(Remedy::SpecifyManually { kind: *kind });
            if let Some(hint) = install_hint(*kind) {
                remedies.push(Remedy::InstallCommand {
                    kind: *kind,
                    command: hint,
                });
            }
            if *kind == DependencyKind::AssetBundle {
                remedies.push(Remedy::Download { kind: *kind });
            }
        }
        remedies
    }

    /// Collect the dependencies that are still missing, with diagnostics.
    pub fn missing(&self) -> Vec<&ProbeResult> {
        self.results.values().filter(|r| !r.found).collect()
    }
}

/// One user-actionable way to satisfy a missing dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Remedy {
    /// Authorize a download into the designated storage location.
    Download {
        /// Which dependency the download would satisfy.
        kind: DependencyKind,
    },
    /// Point the application at an existing installation manually.
    SpecifyManually {
        /// Which dependency needs a path.
        kind: DependencyKind,
    },
    /// Install via the platform package manager from a terminal.
    InstallCommand {
        /// Which dependency the command installs.
        kind: DependencyKind,
        /// The suggested shell command.
        command: String,
    },
}

/// Per-platform terminal command that installs the dependency, if one exists.
fn install_hint(kind: DependencyKind) -> Option<String> {
    match kind {
        DependencyKind::ExternalTool => {
            #[cfg(target_os = "macos")]
            {
                Some("brew install ffmpeg".to_string())
            }
            #[cfg(target_os = "windows")]
            {
                Some("winget install -e --id Gyan.FFmpeg".to_string())
            }
            #[cfg(not(any(target_os = "macos", target_os = "windows")))]
            {
                Some("sudo apt update && sudo apt install ffmpeg".to_string())
            }
        }
        DependencyKind::AssetBundle => None,
    }
}

/// Errors produced by the dependency resolver.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No strategy located a verified candidate.
    #[error("{kind} not found; strategies tried: {}", format_attempts(attempts))]
    Missing {
        /// Which dependency is missing.
        kind: DependencyKind,
        /// Every strategy tried, with its failure reason.
        attempts: Vec<StrategyAttempt>,
    },

    /// A user-specified override exists but failed the functional check.
    ///
    /// Distinct from `Missing` so the caller can say "this is not a valid
    /// encoder" instead of "encoder not found".
    #[error("{kind} override at {path} failed verification: {detail}")]
    Misconfigured {
        /// Which dependency the override was for.
        kind: DependencyKind,
        /// The override path that was checked.
        path: PathBuf,
        /// What the functional check reported.
        detail: String,
    },
}

fn format_attempts(attempts: &[StrategyAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.strategy, a.note))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found_result(kind: DependencyKind) -> ProbeResult {
        ProbeResult::found(
            kind,
            ProbeStrategy::SearchPath,
            PathBuf::from("/usr/bin/ffmpeg"),
            vec![],
        )
    }

    #[test]
    fn test_satisfied_requires_both_kinds() {
        let only_tool = ResolvedDependencies::new([found_result(DependencyKind::ExternalTool)]);
        assert!(!only_tool.is_satisfied());

        let both = ResolvedDependencies::new([
            found_result(DependencyKind::ExternalTool),
            found_result(DependencyKind::AssetBundle),
        ]);
        assert!(both.is_satisfied());
    }

    #[test]
    fn test_found_implies_verified() {
        let result = found_result(DependencyKind::ExternalTool);
        assert!(result.found && result.verified);

        let missing = ProbeResult::missing(
            DependencyKind::ExternalTool,
            vec![StrategyAttempt::new(ProbeStrategy::SearchPath, "not on PATH")],
        );
        assert!(!missing.found && !missing.verified);
    }

    #[test]
    fn test_remedies_for_missing_asset_include_download() {
        let deps = ResolvedDependencies::new([
            found_result(DependencyKind::ExternalTool),
            ProbeResult::missing(DependencyKind::AssetBundle, vec![]),
        ]);
        let remedies = deps.remedies();
        assert!(remedies.contains(&Remedy::Download {
            kind: DependencyKind::AssetBundle
        }));
        assert!(remedies.contains(&Remedy::SpecifyManually {
            kind: DependencyKind::AssetBundle
        }));
    }

    #[test]
    fn test_missing_error_lists_attempts() {
        let err = ResolveError::Missing {
            kind: DependencyKind::ExternalTool,
            attempts: vec![
                StrategyAttempt::new(ProbeStrategy::SearchPath, "not on PATH"),
                StrategyAttempt::new(ProbeStrategy::WellKnownDir, "no candidate existed"),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("search path: not on PATH"));
        assert!(message.contains("well-known directories"));
    }
}
