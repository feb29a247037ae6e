//! The project handle and its external collaborators.
//!
//! A [`Project`] bundles the resolved project layout with the pieces the core
//! only consumes through traits:
//!
//! - [`DependencyIndexProvider`] - fragment -> dependencies, resolved once per build
//! - a bundler, which is any [`Stage`]
//! - [`ServiceWorkerGenerator`] - runs after the output is on disk

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use sugar_path::SugarPath;

use crate::config::ProjectConfig;
use crate::log;
use crate::stream::Stage;

// =============================================================================
// Dependency index
// =============================================================================

/// Dependencies of each fragment, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyIndex {
    fragment_to_deps: FxHashMap<PathBuf, IndexSet<PathBuf>>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record dependencies of `fragment` (an absolute path), appending to any
    /// already known.
    pub fn insert<I, P>(&mut self, fragment: &Path, deps: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let key = fragment.normalize();
        self.fragment_to_deps
            .entry(key)
            .or_default()
            .extend(deps.into_iter().map(Into::into));
    }

    pub fn get(&self, fragment: &Path) -> Option<&IndexSet<PathBuf>> {
        self.fragment_to_deps.get(fragment)
    }

    pub fn len(&self) -> usize {
        self.fragment_to_deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragment_to_deps.is_empty()
    }
}

/// Source of the dependency index (the static analyzer).
#[async_trait]
pub trait DependencyIndexProvider: Send + Sync {
    async fn dependency_index(&self) -> Result<DependencyIndex>;
}

/// An index known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticIndex(pub DependencyIndex);

#[async_trait]
impl DependencyIndexProvider for StaticIndex {
    async fn dependency_index(&self) -> Result<DependencyIndex> {
        Ok(self.0.clone())
    }
}

/// An index read from a JSON file of the form `{ "fragment": ["dep", ...] }`.
///
/// Keys and local dependency paths may be root-relative. Dependencies with a
/// URL scheme are kept verbatim.
#[derive(Debug, Clone)]
pub struct JsonIndexFile {
    pub path: PathBuf,
    pub root: PathBuf,
}

impl JsonIndexFile {
    pub fn new(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: root.into(),
        }
    }

    fn parse(&self, content: &str) -> Result<DependencyIndex> {
        let raw: IndexMap<String, Vec<String>> = serde_json::from_str(content)
            .with_context(|| format!("invalid dependency index {}", self.path.display()))?;

        let mut index = DependencyIndex::new();
        for (fragment, deps) in raw {
            let fragment = Path::new(&fragment).absolutize_with(&self.root);
            let deps = deps.into_iter().map(|dep| {
                if has_scheme(&dep) {
                    PathBuf::from(dep)
                } else {
                    Path::new(&dep).absolutize_with(&self.root)
                }
            });
            index.insert(&fragment, deps);
        }
        Ok(index)
    }
}

#[async_trait]
impl DependencyIndexProvider for JsonIndexFile {
    async fn dependency_index(&self) -> Result<DependencyIndex> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let index = self.parse(&content)?;
        if index.is_empty() {
            log!("warn"; "dependency index {} lists no fragments", self.path.display());
        }
        Ok(index)
    }
}

/// Whether `value` parses as an absolute URL.
///
/// Single-letter schemes are Windows drive letters (`C:\`), not URLs.
pub(crate) fn has_scheme(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|url| url.scheme().len() > 1)
}

// =============================================================================
// Service worker
// =============================================================================

/// Everything a service-worker generator gets once the build is on disk.
#[derive(Debug, Clone)]
pub struct ServiceWorkerRequest {
    pub output_root: PathBuf,
    pub project: Arc<ProjectConfig>,
    /// Contents of the service-worker config file, if one was found.
    pub config: Option<serde_json::Value>,
    pub bundled: bool,
}

#[async_trait]
pub trait ServiceWorkerGenerator: Send + Sync {
    async fn generate(&self, request: ServiceWorkerRequest) -> Result<()>;
}

// =============================================================================
// Project
// =============================================================================

/// A project ready to build.
pub struct Project {
    pub config: Arc<ProjectConfig>,
    pub index: Arc<dyn DependencyIndexProvider>,
    pub bundler: Option<Box<dyn Stage>>,
    pub service_worker: Arc<dyn ServiceWorkerGenerator>,
}

impl Project {
    /// A project with the default precache-manifest generator and no bundler.
    pub fn new(config: ProjectConfig, index: impl DependencyIndexProvider + 'static) -> Self {
        Self {
            config: Arc::new(config),
            index: Arc::new(index),
            bundler: None,
            service_worker: Arc::new(crate::build::service_worker::PrecacheManifest),
        }
    }

    pub fn with_bundler(mut self, bundler: impl Stage) -> Self {
        self.bundler = Some(Box::new(bundler));
        self
    }
}
