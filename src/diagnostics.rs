//! Build warnings collection.
//!
//! Collects per-file degradations (optimizer failures, files without
//! dependency data, incomplete rejoins) during a build. Each warning is
//! logged when it is pushed and kept for the end-of-build summary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::log;

/// A recoverable, per-file problem. The file it names was still emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildWarning {
    /// Component that raised the warning (e.g. `uglify`, `prefetch`)
    pub source: String,
    /// File the warning is about
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {}",
            self.source,
            self.message,
            self.path.display()
        )
    }
}

/// Shared warnings collector for one build.
///
/// Cloning is cheap; all clones append to the same list.
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    items: Arc<Mutex<Vec<BuildWarning>>>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a warning.
    pub fn push(&self, source: impl Into<String>, path: &Path, message: impl Into<String>) {
        let warning = BuildWarning {
            source: source.into(),
            path: path.to_path_buf(),
            message: message.into(),
        };
        log!("warn"; "{}", warning);
        self.items.lock().push(warning);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Warnings that name `path`.
    #[cfg(test)]
    pub fn for_path(&self, path: &Path) -> Vec<BuildWarning> {
        self.items
            .lock()
            .iter()
            .filter(|w| w.path == path)
            .cloned()
            .collect()
    }

    /// Drain all collected warnings.
    pub fn drain(&self) -> Vec<BuildWarning> {
        std::mem::take(&mut *self.items.lock())
    }
}
