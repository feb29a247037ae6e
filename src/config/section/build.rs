//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! output = "build"                          # Output directory (relative to project root)
//! bundle = false                            # Run the project's bundler stage
//! insert_prefetch_links = true              # Inject prefetch/import links
//! add_service_worker = false                # Generate a precache manifest
//! sw_precache_config = "sw-precache-config.json"
//! dependency_index = "dependency-index.json"
//!
//! [build.optimize.js]
//! enabled = true
//! options = { compress = true, mangle = true }
//!
//! [build.optimize.css]
//! enabled = true
//! options = { stripWhitespace = true }
//!
//! [build.optimize.html]
//! enabled = true
//! options = { collapseWhitespace = true, removeComments = true }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sugar_path::SugarPath;

use crate::optimize::OptimizerOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Output directory. Deleted at the start of every build.
    pub output: PathBuf,

    pub bundle: bool,

    pub insert_prefetch_links: bool,

    pub add_service_worker: bool,

    /// Service-worker config file, read while the build runs.
    pub sw_precache_config: PathBuf,

    /// JSON dependency index used for link injection.
    pub dependency_index: Option<PathBuf>,

    pub optimize: OptimizeConfig,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            output: "build".into(),
            bundle: false,
            insert_prefetch_links: false,
            add_service_worker: false,
            sw_precache_config: "sw-precache-config.json".into(),
            dependency_index: None,
            optimize: OptimizeConfig::default(),
        }
    }
}

impl BuildOptions {
    /// Resolve configured paths against the project root.
    pub fn resolve(&mut self, root: &Path) {
        self.output = self.output.absolutize_with(root);
        self.sw_precache_config = self.sw_precache_config.absolutize_with(root);
        self.dependency_index = self
            .dependency_index
            .as_ref()
            .map(|path| path.absolutize_with(root));
    }
}

/// `[build.optimize]`: one optimizer per file kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeConfig {
    pub js: OptimizerConfig,
    pub css: OptimizerConfig,
    pub html: OptimizerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub enabled: bool,
    /// Passed to the optimizer as-is.
    pub options: OptimizerOptions,
}

impl OptimizerConfig {
    /// Enable, overriding the given boolean options.
    pub fn enable(&mut self, options: &[(&str, bool)]) {
        self.enabled = true;
        for (key, value) in options {
            self.options
                .insert(key.to_string(), serde_json::Value::Bool(*value));
        }
    }
}
