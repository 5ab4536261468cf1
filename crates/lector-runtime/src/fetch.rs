//! Remote fetch of the voice model bundle.
//!
//! This is the final probe strategy and the only one with side effects.
//! It is never triggered automatically: the resolver invokes it only when
//! the caller explicitly authorizes the download (the user clicking
//! "Download" in the dependency dialog).

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::info;

use crate::probe::AssetSpec;

/// Release that hosts the voice model files.
const ASSET_RELEASE_BASE_URL: &str =
    "https://github.com/lector-app/lector-voices/releases/download/v1.0";

/// Port for fetching the asset bundle into a storage directory.
///
/// Abstracted so tests can substitute a local fake and so the GUI can swap
/// in a mirrored source without touching the resolver.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download every required file of `spec` into `dest_dir`.
    ///
    /// Must be atomic per file: a partially transferred file never lands
    /// under its final name.
    async fn fetch(&self, spec: &AssetSpec, dest_dir: &Path) -> Result<()>;
}

/// HTTP fetcher downloading from the release bucket.
pub struct HttpAssetFetcher {
    client: Client,
    base_url: String,
}

impl HttpAssetFetcher {
    /// Fetcher pointed at the default release location.
    pub fn new() -> Self {
        Self::with_base_url(ASSET_RELEASE_BASE_URL)
    }

    /// Fetcher pointed at an alternate base URL (mirrors, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for HttpAssetFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, spec: &AssetSpec, dest_dir: &Path) -> Result<()> {
        lector_core::paths::ensure_directory(dest_dir)
            .with_context(|| format!("creating {}", dest_dir.display()))?;

        for name in spec.required_files {
            let url = format!("{}/{name}", self.base_url);
            info!(%url, "Downloading asset file");

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("requesting {url}"))?;
            if !response.status().is_success() {
                bail!("download of {name} failed with HTTP {}", response.status());
            }

            // Stream into a temp file in the destination directory, then
            // rename: a crash mid-transfer never leaves a truncated file
            // under the final name.
            let mut tmp = tempfile::NamedTempFile::new_in(dest_dir)
                .with_context(|| format!("creating temp file in {}", dest_dir.display()))?;
            let mut stream = response.bytes_stream();
            let mut written: u64 = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.with_context(|| format!("reading body of {url}"))?;
                tmp.write_all(&chunk)
                    .with_context(|| format!("writing {name}"))?;
                written += chunk.len() as u64;
            }
            if written == 0 {
                bail!("download of {name} produced an empty file");
            }

            let final_path = dest_dir.join(name);
            tmp.persist(&final_path)
                .with_context(|| format!("moving {name} into place"))?;
            info!(path = %final_path.display(), bytes = written, "Asset file downloaded");
        }

        Ok(())
    }
}
