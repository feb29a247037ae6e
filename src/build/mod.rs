//! Build orchestration.
//!
//! Build phases:
//! - **Clean** - delete the previous output directory
//! - **Read** - sources and dependencies, each split, optimized, rejoined
//! - **Merge** - both origins into one stream
//! - **Bundle** - optional, the project's bundler stage
//! - **Prefetch** - optional, link injection into entrypoint and fragments
//! - **Write** - every file lands in the output directory
//! - **Service worker** - optional, runs once the output is on disk

pub mod service_worker;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{BuildOptions, OptimizeConfig};
use crate::diagnostics::{BuildWarning, Warnings};
use crate::error::PipelineError;
use crate::html::split::html_splitter;
use crate::optimize::optimize_stages;
use crate::prefetch::PrefetchInjector;
use crate::project::{Project, ServiceWorkerRequest};
use crate::stream::{OutputSink, Pipeline, read_files};
use crate::utils::plural_count;
use crate::{debug, log};

use service_worker::load_service_worker_config;

/// Result of a finished build.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    /// Files that came out of the output sink, directories included.
    pub files_written: usize,
    pub warnings: Vec<BuildWarning>,
}

/// Run one full build of `project` into `options.output`.
pub async fn build(options: &BuildOptions, mut project: Project) -> Result<BuildSummary> {
    let warnings = Warnings::new();
    let config = project.config.clone();

    clean_output(&options.output).await?;

    log!("build"; "reading sources and dependencies");
    let sources = optimized(read_files(config.source_entries()), &options.optimize, &warnings);
    let dependencies = optimized(
        read_files(config.dependencies.clone()),
        &options.optimize,
        &warnings,
    );
    let mut pipeline = sources.merge(dependencies);

    if options.bundle {
        let bundler = project.bundler.take().ok_or(PipelineError::MissingBundler)?;
        debug!("build"; "bundling with `{}`", bundler.name());
        pipeline = pipeline.pipe(bundler);
    }

    if options.insert_prefetch_links {
        pipeline = pipeline.pipe(PrefetchInjector::new(
            config.clone(),
            project.index.clone(),
            &warnings,
        ));
    }

    pipeline = pipeline.pipe(OutputSink::new(&config.root, &options.output));

    let sw_config = options
        .add_service_worker
        .then(|| load_service_worker_config(options.sw_precache_config.clone()));

    let files_written = pipeline.wait_for().await?;
    log!(
        "build";
        "wrote {} to {}",
        plural_count(files_written, "file"),
        options.output.display()
    );

    if let Some(sw_config) = sw_config {
        let sw_config = sw_config
            .await
            .context("service worker config loader panicked")??;
        if sw_config.is_none() {
            debug!(
                "sw";
                "no config at {}, using defaults",
                options.sw_precache_config.display()
            );
        }

        project
            .service_worker
            .generate(ServiceWorkerRequest {
                output_root: options.output.clone(),
                project: config,
                config: sw_config,
                bundled: options.bundle,
            })
            .await
            .context("failed to generate service worker")?;
    }

    Ok(BuildSummary {
        files_written,
        warnings: warnings.drain(),
    })
}

/// Split inline blocks, run the optimizers, rejoin.
fn optimized(input: Pipeline, optimize: &OptimizeConfig, warnings: &Warnings) -> Pipeline {
    let (split, rejoin) = html_splitter(warnings);
    input
        .pipe(split)
        .pipe_all(optimize_stages(optimize, warnings))
        .pipe(rejoin)
}

async fn clean_output(output: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(output).await {
        Ok(()) => {
            debug!("build"; "removed {}", output.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| {
            format!("failed to remove output directory {}", output.display())
        }),
    }
}
