//! In-memory files flowing through the pipeline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// A file in flight.
///
/// Owned by exactly one stage at a time; stages that rewrite a file mutate
/// it in place and hand it on. `contents == None` marks a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    /// Absolute, cleaned path. Unique within a pipeline.
    pub path: PathBuf,
    pub contents: Option<Vec<u8>>,
}

impl VirtualFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: Some(contents.into()),
        }
    }

    /// A directory placeholder (no contents).
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: None,
        }
    }

    /// Directory containing this file.
    pub fn dirname(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }

    /// Lowercased extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.extension().is_some_and(|e| e == ext)
    }

    /// Contents decoded as UTF-8. `None` for directories.
    pub fn text(&self) -> Result<Option<&str>> {
        match &self.contents {
            Some(bytes) => std::str::from_utf8(bytes)
                .map(Some)
                .with_context(|| format!("{} is not valid UTF-8", self.path.display())),
            None => Ok(None),
        }
    }

    pub fn set_text(&mut self, text: String) {
        self.contents = Some(text.into_bytes());
    }
}
