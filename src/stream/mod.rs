//! Asynchronous file pipelines.
//!
//! A pipeline is a chain of stages wired together with bounded channels:
//!
//! ```text
//! source --> stage --> stage --> ... --> tail
//!   task      task      task              (drained by wait_for / collect)
//! ```
//!
//! Every stage runs as its own tokio task and receives files one at a time.
//! A stage may emit zero, one or many files per input, and gets a final
//! `flush` call once its input is exhausted. Returning `Err` from either is
//! fatal for the whole pipeline.
//!
//! - `sink` - writes files into the output directory
//! - `source` - reads files from disk

pub mod sink;
pub mod source;

use std::future::Future;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::file::VirtualFile;

pub use sink::OutputSink;
pub use source::read_files;

/// Capacity of the channel between two stages.
const CHANNEL_BUFFER: usize = 32;

// =============================================================================
// Stage
// =============================================================================

/// Handle a stage uses to pass files downstream.
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::Sender<VirtualFile>,
}

impl Emitter {
    fn new(tx: mpsc::Sender<VirtualFile>) -> Self {
        Self { tx }
    }

    /// Hand a file to the next stage, waiting while it is busy.
    pub async fn emit(&self, file: VirtualFile) -> Result<()> {
        self.tx
            .send(file)
            .await
            .map_err(|e| PipelineError::Closed(e.0.path).into())
    }
}

/// A file transform.
#[async_trait]
pub trait Stage: Send + 'static {
    /// Name used in error context and logs.
    fn name(&self) -> &str;

    /// Process one file. Emitting nothing consumes (or buffers) it.
    async fn transform(&mut self, file: VirtualFile, out: &Emitter) -> Result<()>;

    /// Called once after the last file.
    async fn flush(&mut self, _out: &Emitter) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Stage for Box<dyn Stage> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn transform(&mut self, file: VirtualFile, out: &Emitter) -> Result<()> {
        (**self).transform(file, out).await
    }

    async fn flush(&mut self, out: &Emitter) -> Result<()> {
        (**self).flush(out).await
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// A running chain of stages.
///
/// Stages start working as soon as they are piped; nothing is lost if the
/// tail is drained later, the bounded channels simply apply backpressure.
pub struct Pipeline {
    tail: mpsc::Receiver<VirtualFile>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl Pipeline {
    /// Start a pipeline whose source is a task writing into an [`Emitter`].
    pub fn spawn_source<F, Fut>(produce: F) -> Self
    where
        F: FnOnce(Emitter) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let task = tokio::spawn(produce(Emitter::new(tx)));
        Self {
            tail: rx,
            tasks: vec![task],
        }
    }

    /// Start a pipeline from files already in memory.
    pub fn from_files<I>(files: I) -> Self
    where
        I: IntoIterator<Item = VirtualFile>,
        I::IntoIter: Send + 'static,
    {
        let files = files.into_iter();
        Self::spawn_source(|out| async move {
            for file in files {
                out.emit(file).await?;
            }
            Ok(())
        })
    }

    /// Append a stage.
    pub fn pipe<S: Stage>(mut self, mut stage: S) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let mut input = self.tail;

        let task = tokio::spawn(async move {
            let out = Emitter::new(tx);
            while let Some(file) = input.recv().await {
                let path = file.path.clone();
                stage.transform(file, &out).await.with_context(|| {
                    format!("stage `{}` failed on {}", stage.name(), path.display())
                })?;
            }
            stage
                .flush(&out)
                .await
                .with_context(|| format!("stage `{}` failed to flush", stage.name()))
        });

        self.tasks.push(task);
        self.tail = rx;
        self
    }

    /// Append an ordered list of stages.
    pub fn pipe_all<I>(self, stages: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Stage>>,
    {
        stages.into_iter().fold(self, Pipeline::pipe)
    }

    /// Interleave two pipelines into one.
    ///
    /// Files are forwarded in arrival order. Order within each origin is
    /// kept; order across origins is not. The merged pipeline finishes when
    /// both inputs have.
    pub fn merge(self, other: Pipeline) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let mut left = self.tail;
        let mut right = other.tail;

        let task = tokio::spawn(async move {
            let out = Emitter::new(tx);
            let (mut left_open, mut right_open) = (true, true);
            while left_open || right_open {
                tokio::select! {
                    file = left.recv(), if left_open => match file {
                        Some(file) => out.emit(file).await?,
                        None => left_open = false,
                    },
                    file = right.recv(), if right_open => match file {
                        Some(file) => out.emit(file).await?,
                        None => right_open = false,
                    },
                }
            }
            Ok(())
        });

        let mut tasks = self.tasks;
        tasks.extend(other.tasks);
        tasks.push(task);
        Self { tail: rx, tasks }
    }

    /// Drain the pipeline to completion.
    ///
    /// Returns the number of files that came out of the last stage. Fails as
    /// soon as any stage fails, aborting the others.
    pub async fn wait_for(self) -> Result<usize> {
        let mut count = 0;
        self.drain(|_| count += 1).await?;
        Ok(count)
    }

    /// Drain the pipeline and keep every file that comes out of it.
    #[cfg(test)]
    pub async fn collect(self) -> Result<Vec<VirtualFile>> {
        let mut files = Vec::new();
        self.drain(|file| files.push(file)).await?;
        Ok(files)
    }

    async fn drain(self, mut on_file: impl FnMut(VirtualFile)) -> Result<()> {
        let Self { mut tail, tasks } = self;
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let mut pending: FuturesUnordered<_> = tasks.into_iter().collect();
        let mut open = true;

        let result = loop {
            tokio::select! {
                file = tail.recv(), if open => match file {
                    Some(file) => on_file(file),
                    None => open = false,
                },
                joined = pending.next(), if !pending.is_empty() => match joined {
                    Some(Ok(Ok(()))) | None => {}
                    Some(Ok(Err(e))) => break Err(e),
                    Some(Err(e)) => break Err(anyhow!("pipeline stage panicked: {e}")),
                },
                else => break Ok(()),
            }
        };

        if result.is_err() {
            aborts.iter().for_each(|handle| handle.abort());
        }
        result
    }
}
