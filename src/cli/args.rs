//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Kiln front-end build pipeline CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: kiln.toml)
    #[arg(short = 'C', long, default_value = "kiln.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the project into the output directory
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },
}

/// Build command arguments. Flags override `kiln.toml`.
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Output directory path (relative to project root)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Run the project's bundler stage
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub bundle: Option<bool>,

    /// Inject prefetch/import links computed from the dependency index
    #[arg(short = 'p', long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub insert_prefetch_links: Option<bool>,

    /// Generate a service-worker precache manifest after the build
    #[arg(short = 'w', long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub add_service_worker: Option<bool>,

    /// JSON dependency index (relative to project root)
    #[arg(short = 'i', long, value_hint = clap::ValueHint::FilePath)]
    pub dependency_index: Option<PathBuf>,

    /// Minify JavaScript
    #[arg(long)]
    pub js_minify: bool,

    /// Minify CSS (standalone and inline)
    #[arg(long)]
    pub css_minify: bool,

    /// Minify HTML
    #[arg(long)]
    pub html_minify: bool,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
