//! Output sink: writes files into the output directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{Emitter, Stage};
use crate::error::PipelineError;
use crate::file::VirtualFile;

/// Mirrors every file at its root-relative path under `output_dir`.
///
/// Written files are passed on so the pipeline tail can count them.
#[derive(Debug, Clone)]
pub struct OutputSink {
    root: PathBuf,
    output_dir: PathBuf,
}

impl OutputSink {
    pub fn new(root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_dir: output_dir.into(),
        }
    }

    fn destination(&self, path: &Path) -> Result<PathBuf> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| PipelineError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })?;
        Ok(self.output_dir.join(relative))
    }
}

#[async_trait]
impl Stage for OutputSink {
    fn name(&self) -> &str {
        "output"
    }

    async fn transform(&mut self, file: VirtualFile, out: &Emitter) -> Result<()> {
        let dest = self.destination(&file.path)?;

        match &file.contents {
            None => tokio::fs::create_dir_all(&dest)
                .await
                .with_context(|| format!("failed to create {}", dest.display()))?,
            Some(contents) => {
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                tokio::fs::write(&dest, contents)
                    .await
                    .with_context(|| format!("failed to write {}", dest.display()))?;
            }
        }

        out.emit(file).await
    }
}
