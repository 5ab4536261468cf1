//! Dependency resolver: runs the probe chain per dependency kind and merges
//! persisted user overrides.
//!
//! `resolve()` is deterministic for a given filesystem/environment/config
//! snapshot and performs no network access. The remote-fetch strategy runs
//! only through `resolve_with_download()`, which callers invoke on an
//! explicit user action; a successful fetch is written back to the config
//! store so future resolutions skip the network entirely.

use std::sync::Arc;

use tracing::{info, warn};

use lector_core::config::{AssetStorageMode, ConfigStore};
use lector_core::deps::{
    DependencyKind, ProbeResult, ProbeStrategy, ResolveError, ResolvedDependencies,
};

use crate::fetch::AssetFetcher;
use crate::probe::{self, AssetSpec, ProbeContext, ToolSpec};

/// Resolves the external tool and the asset bundle before a job may run.
pub struct DependencyResolver {
    tool: ToolSpec,
    asset: AssetSpec,
    config: Arc<ConfigStore>,
}

impl DependencyResolver {
    /// Resolver for the default dependency set (ffmpeg + voice models).
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            tool: ToolSpec::ffmpeg(),
            asset: AssetSpec::voice_models(),
            config,
        }
    }

    /// The tool being probed for.
    pub const fn tool_spec(&self) -> &ToolSpec {
        &self.tool
    }

    /// The asset bundle being probed for.
    pub const fn asset_spec(&self) -> &AssetSpec {
        &self.asset
    }

    /// Run the probe chains against the live environment. No network.
    pub fn resolve(&self) -> ResolvedDependencies {
        let ctx = ProbeContext::from_environment(&self.tool, &self.asset);
        self.resolve_in(&ctx)
    }

    /// Run the probe chains against an explicit snapshot (tests, dry runs).
    pub fn resolve_in(&self, ctx: &ProbeContext) -> ResolvedDependencies {
        let config = self.config.load();

        let tool = probe::probe_tool(&self.tool, ctx, config.tool_override_path.as_deref());
        let asset = probe::probe_asset(&self.asset, ctx, config.asset_override_path.as_deref());

        ResolvedDependencies::new([tool, asset])
    }

    /// Resolve, fetching the asset bundle remotely if it is missing.
    ///
    /// Only called on an explicit user authorization. The bundle lands in
    /// the directory selected by the persisted storage mode, and on success
    /// the location is persisted as the asset override so later resolutions
    /// are offline.
    pub async fn resolve_with_download(
        &self,
        fetcher: &dyn AssetFetcher,
        ctx: &ProbeContext,
    ) -> anyhow::Result<ResolvedDependencies> {
        let resolved = self.resolve_in(ctx);
        let asset_missing = resolved
            .get(DependencyKind::AssetBundle)
            .is_none_or(|r| !r.found);
        if !asset_missing {
            return Ok(resolved);
        }

        let config = self.config.load();
        let dest = match config.asset_storage_mode {
            AssetStorageMode::Cache => lector_core::paths::asset_cache_dir()?,
            AssetStorageMode::Permanent => lector_core::paths::asset_data_dir()?,
        };

        info!(dest = %dest.display(), "Fetching asset bundle (user authorized)");
        fetcher.fetch(&self.asset, &dest).await?;

        // Re-run the verification against the fetched location
        let verified = match probe::verify_asset(&dest, &self.asset) {
            Ok(()) => ProbeResult::found(
                DependencyKind::AssetBundle,
                ProbeStrategy::RemoteFetch,
                dest.clone(),
                Vec::new(),
            ),
            Err(note) => {
                warn!(dest = %dest.display(), note, "Fetched bundle failed verification");
                anyhow::bail!("downloaded asset bundle failed verification: {note}");
            }
        };

        // Persist so the next resolution skips the network step
        let mut updated = config;
        updated.asset_override_path = Some(dest);
        if let Err(e) = self.config.save(&updated) {
            warn!(error = %e, "Could not persist fetched asset location");
        }

        let tool = resolved
            .get(DependencyKind::ExternalTool)
            .cloned()
            .unwrap_or_else(|| ProbeResult::missing(DependencyKind::ExternalTool, Vec::new()));
        Ok(ResolvedDependencies::new([tool, verified]))
    }

    /// Map an unsatisfied resolution to the user-facing error, preferring
    /// the more actionable "misconfigured override" over "missing".
    pub fn gate_error(resolved: &ResolvedDependencies) -> Option<ResolveError> {
        for kind in [DependencyKind::ExternalTool, DependencyKind::AssetBundle] {
            let Some(result) = resolved.get(kind) else {
                continue;
            };
            if result.found {
                continue;
            }
            if let Some(flagged) = &result.misconfigured {
                return Some(ResolveError::Misconfigured {
                    kind,
                    path: flagged.path.clone(),
                    detail: flagged.detail.clone(),
                });
            }
            return Some(ResolveError::Missing {
                kind,
                attempts: result.attempts.clone(),
            });
        }
        None
    }
}
