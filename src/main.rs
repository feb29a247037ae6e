//! Kiln - a front-end build pipeline for web projects.

mod build;
mod cli;
mod config;
mod diagnostics;
mod error;
mod file;
mod html;
mod logger;
mod optimize;
mod prefetch;
mod project;
mod stream;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::KilnConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = KilnConfig::load(&cli)?;

    match &cli.command {
        Commands::Build { .. } => cli::build::build_project(&config).await.map(|_| ()),
    }
}
