//! `[project]` section configuration.
//!
//! Describes the project layout. Every path may be written relative to the
//! project root (the directory holding `kiln.toml`); all of them are resolved
//! to absolute, cleaned paths when the config is loaded.
//!
//! # Example
//!
//! ```toml
//! [project]
//! entrypoint = "index.html"          # Main document
//! shell = "src/app-shell.html"       # Always-loaded fragment
//! fragments = ["src/view-one.html"]  # Lazily loaded fragments
//! sources = ["src"]                  # Files or directories read as sources
//! dependencies = ["bower_components"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sugar_path::SugarPath;

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project root (internal use only, set when loading).
    #[serde(skip)]
    pub root: PathBuf,

    pub entrypoint: Option<PathBuf>,

    pub shell: Option<PathBuf>,

    pub fragments: Vec<PathBuf>,

    /// Source files or directories.
    pub sources: Vec<PathBuf>,

    /// Third-party dependency files or directories.
    pub dependencies: Vec<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            entrypoint: None,
            shell: None,
            fragments: Vec::new(),
            sources: vec![PathBuf::from("src")],
            dependencies: vec![PathBuf::from("bower_components")],
        }
    }
}

impl ProjectConfig {
    /// Shell followed by fragments, without duplicates or the entrypoint.
    pub fn all_fragments(&self) -> Vec<PathBuf> {
        let mut all: Vec<PathBuf> = Vec::with_capacity(self.fragments.len() + 1);
        for fragment in self.shell.iter().chain(&self.fragments) {
            if Some(fragment) != self.entrypoint.as_ref() && !all.contains(fragment) {
                all.push(fragment.clone());
            }
        }
        all
    }

    /// Whether `path` is the entrypoint or a fragment.
    pub fn is_entry_file(&self, path: &Path) -> bool {
        self.entrypoint.as_deref() == Some(path)
            || self.shell.as_deref() == Some(path)
            || self.fragments.iter().any(|f| f == path)
    }

    /// Everything read by the sources pipeline: configured sources plus the
    /// entrypoint, shell and fragments.
    pub fn source_entries(&self) -> Vec<PathBuf> {
        let mut entries = self.sources.clone();
        for path in self
            .entrypoint
            .iter()
            .chain(&self.shell)
            .chain(&self.fragments)
        {
            if !entries.contains(path) {
                entries.push(path.clone());
            }
        }
        entries
    }

    /// Set the root and resolve every configured path against it.
    pub fn resolve(&mut self, root: &Path) {
        let resolve = |path: &PathBuf| path.absolutize_with(root);

        self.root = root.to_path_buf();
        self.entrypoint = self.entrypoint.as_ref().map(resolve);
        self.shell = self.shell.as_ref().map(resolve);
        self.fragments = self.fragments.iter().map(resolve).collect();
        self.sources = self.sources.iter().map(resolve).collect();
        self.dependencies = self.dependencies.iter().map(resolve).collect();
    }

    /// Check resolved paths. Collects every problem into one error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for path in self
            .entrypoint
            .iter()
            .chain(&self.shell)
            .chain(&self.fragments)
        {
            if !path.starts_with(&self.root) {
                problems.push(format!(
                    "`{}` is outside the project root",
                    path.display()
                ));
            }
        }
        if self.shell.is_some() && self.shell == self.entrypoint {
            problems.push("`shell` and `entrypoint` must be different files".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems.join("; ")))
        }
    }
}
