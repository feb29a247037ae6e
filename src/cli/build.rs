//! `kiln build`: load the project and run one build.

use anyhow::Result;

use crate::build::{BuildSummary, build};
use crate::config::KilnConfig;
use crate::log;
use crate::project::{JsonIndexFile, Project, StaticIndex};
use crate::utils::plural_count;

/// Build the project described by `config`.
pub async fn build_project(config: &KilnConfig) -> Result<BuildSummary> {
    let project_config = config.project.clone();
    let project = match &config.build.dependency_index {
        Some(path) => Project::new(project_config, JsonIndexFile::new(path, config.root())),
        None => {
            if config.build.insert_prefetch_links {
                log!("warn"; "no dependency index configured, prefetch links will not be inserted");
            }
            Project::new(project_config, StaticIndex::default())
        }
    };

    let summary = build(&config.build, project).await?;
    report(&summary);
    Ok(summary)
}

fn report(summary: &BuildSummary) {
    if summary.warnings.is_empty() {
        log!("done"; "{}", plural_count(summary.files_written, "file"));
    } else {
        log!(
            "done";
            "{} with {}",
            plural_count(summary.files_written, "file"),
            plural_count(summary.warnings.len(), "warning")
        );
    }
}
