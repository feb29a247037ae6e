//! Fatal pipeline error kinds.
//!
//! Stages and the build orchestrator propagate `anyhow::Error`; these are the
//! named failures that abort a build. Per-file degradations are warnings
//! (see `diagnostics`), never errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An entrypoint or fragment expected in the prefetch buffer was never seen.
    #[error("`{}` is configured as an entrypoint or fragment but never reached the prefetch stage", .0.display())]
    MissingBufferedFile(PathBuf),

    #[error("failed to resolve the dependency index")]
    DependencyIndex(#[source] anyhow::Error),

    /// Downstream stage hung up while a file was being handed on.
    #[error("pipeline closed before `{}` could be emitted", .0.display())]
    Closed(PathBuf),

    #[error("`{}` is outside the project root `{}`", .path.display(), .root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("bundling was requested but the project has no bundler stage")]
    MissingBundler,
}
