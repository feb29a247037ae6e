//! Service worker support.
//!
//! - [`load_service_worker_config`] - reads the optional JSON config while the
//!   pipeline runs
//! - [`PrecacheManifest`] - default generator, writes a precache manifest of
//!   the finished output

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use jwalk::WalkDir;
use serde::Serialize;
use serde_json::Value;
use sugar_path::SugarPath;
use tokio::task::JoinHandle;

use crate::log;
use crate::project::{ServiceWorkerGenerator, ServiceWorkerRequest};

/// Manifest file written into the output root.
pub const MANIFEST_FILE: &str = "precache-manifest.json";

/// Start reading the service-worker config file in the background.
///
/// Resolves to `None` when the file does not exist.
pub fn load_service_worker_config(path: PathBuf) -> JoinHandle<Result<Option<Value>>> {
    tokio::spawn(async move {
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let config = serde_json::from_str(&content)
            .with_context(|| format!("invalid service worker config {}", path.display()))?;
        Ok(Some(config))
    })
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    url: String,
    revision: String,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    bundled: bool,
    config: Option<&'a Value>,
    files: Vec<ManifestEntry>,
}

/// Lists every output file with a content hash for precaching.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecacheManifest;

#[async_trait]
impl ServiceWorkerGenerator for PrecacheManifest {
    async fn generate(&self, request: ServiceWorkerRequest) -> Result<()> {
        let root = request.output_root.clone();
        let files = tokio::task::spawn_blocking(move || manifest_entries(&root))
            .await
            .context("manifest walker panicked")??;

        let count = files.len();
        let manifest = Manifest {
            bundled: request.bundled,
            config: request.config.as_ref(),
            files,
        };
        let json = serde_json::to_string_pretty(&manifest)?;

        let dest = request.output_root.join(MANIFEST_FILE);
        tokio::fs::write(&dest, json)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;

        log!("sw"; "precached {} files", count);
        Ok(())
    }
}

fn manifest_entries(output_root: &Path) -> Result<Vec<ManifestEntry>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(output_root) {
        let entry =
            entry.with_context(|| format!("failed to walk {}", output_root.display()))?;
        let path = entry.path();
        let is_manifest = path.parent() == Some(output_root) && path.ends_with(MANIFEST_FILE);
        if entry.file_type().is_file() && !is_manifest {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let relative = path.relative(output_root);
            Ok(ManifestEntry {
                url: format!("/{}", relative.as_path().to_slash_lossy()),
                revision: hex::encode(blake3::hash(&bytes).as_bytes()),
            })
        })
        .collect()
}
