//! File system path normalization.
//!
//! Lexical `.`/`..` resolution and root joins go through `sugar_path`
//! (`normalize`, `absolutize_with`); this module adds the one helper that
//! touches the file system.

use std::path::{Path, PathBuf};

use sugar_path::SugarPath;

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`) and falls
/// back to a lexical absolutize against the current directory.
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.absolutize())
}
