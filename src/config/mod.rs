//! Project configuration management for `kiln.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── build      # [build] and [build.optimize.*]
//! │   └── project    # [project]
//! ├── types/         # Utility types
//! │   └── error      # ConfigError
//! └── mod.rs         # KilnConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section              | Purpose                                        |
//! |----------------------|------------------------------------------------|
//! | `[project]`          | Entrypoint, shell, fragments, sources, deps    |
//! | `[build]`            | Output dir, bundle/prefetch/service worker     |
//! | `[build.optimize.*]` | Per-kind optimizer switches and options        |

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

// Re-export from section/
pub use section::{BuildOptions, OptimizeConfig, OptimizerConfig, ProjectConfig};

// Re-export from types/
pub use types::ConfigError;

use crate::{
    cli::{BuildArgs, Cli, Commands},
    log,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing kiln.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project layout
    #[serde(default)]
    pub project: ProjectConfig,

    /// Build settings
    #[serde(default)]
    pub build: BuildOptions,
}

impl KilnConfig {
    /// Load configuration from CLI arguments.
    ///
    /// Searches upward from cwd for the config file. The project root is the
    /// config file's parent directory.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = find_config_file(&cli.config).ok_or_else(|| {
            ConfigError::Io(
                cli.config.clone(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            )
        })?;

        let mut config = Self::from_path(&config_path)?;
        config.config_path = crate::utils::path::normalize_path(&config_path);
        config.apply_command_options(cli);
        config.finalize();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path, warning about unknown fields.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            log!("warn"; "ignoring unknown fields in {}: {}", path.display(), ignored.join(", "));
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    /// Project root directory.
    pub fn root(&self) -> &Path {
        &self.project.root
    }

    /// Resolve every configured path against the project root.
    fn finalize(&mut self) {
        let root = self
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let root = crate::utils::path::normalize_path(&root);

        self.project.resolve(&root);
        self.build.resolve(&root);
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply command-specific configuration options.
    fn apply_command_options(&mut self, cli: &Cli) {
        match &cli.command {
            Commands::Build { build_args } => self.apply_build_args(build_args),
        }
    }

    /// Apply build arguments from CLI. Paths are still root-relative here.
    fn apply_build_args(&mut self, args: &BuildArgs) {
        crate::logger::set_verbose(args.verbose);
        crate::logger::set_quiet(args.quiet);

        Self::update_option(&mut self.build.output, args.output.as_ref());
        Self::update_option(&mut self.build.bundle, args.bundle.as_ref());
        Self::update_option(
            &mut self.build.insert_prefetch_links,
            args.insert_prefetch_links.as_ref(),
        );
        Self::update_option(
            &mut self.build.add_service_worker,
            args.add_service_worker.as_ref(),
        );
        if let Some(index) = &args.dependency_index {
            self.build.dependency_index = Some(index.clone());
        }

        let optimize = &mut self.build.optimize;
        if args.js_minify {
            optimize.js.enable(&[]);
        }
        if args.css_minify {
            optimize.css.enable(&[("stripWhitespace", true)]);
        }
        if args.html_minify {
            optimize
                .html
                .enable(&[("collapseWhitespace", true), ("removeComments", true)]);
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate resolved configuration.
    pub fn validate(&self) -> Result<()> {
        self.project.validate()?;

        // The output directory is deleted before every build.
        if self.root().starts_with(&self.build.output) {
            return Err(ConfigError::Validation(format!(
                "output directory `{}` would delete the project root",
                self.build.output.display()
            ))
            .into());
        }

        // Output under an input would be read back in; an input under the
        // output would be deleted.
        let output = &self.build.output;
        let inputs = self.project.source_entries();
        if let Some(input) = inputs
            .iter()
            .chain(&self.project.dependencies)
            .find(|input| output.starts_with(input) || input.starts_with(output))
        {
            return Err(ConfigError::Validation(format!(
                "output directory `{}` overlaps input `{}`",
                output.display(),
                input.display()
            ))
            .into());
        }

        Ok(())
    }
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn finalized(content: &str, root: &Path) -> KilnConfig {
        let mut config = KilnConfig::from_str(content).unwrap();
        config.config_path = root.join("kiln.toml");
        config.finalize();
        config
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result = KilnConfig::from_str("[project\nentrypoint = \"index.html\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config() {
        let config = KilnConfig::from_str("").unwrap();
        assert_eq!(config.project.sources, [PathBuf::from("src")]);
        assert_eq!(config.build.output, PathBuf::from("build"));
        assert!(!config.build.insert_prefetch_links);
    }

    #[test]
    fn test_finalize_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let root = crate::utils::path::normalize_path(dir.path());
        let config = finalized(
            "[project]\nentrypoint = \"index.html\"\n[build]\noutput = \"dist\"\n",
            &root,
        );
        assert_eq!(config.root(), root);
        assert_eq!(config.project.entrypoint, Some(root.join("index.html")));
        assert_eq!(config.build.output, root.join("dist"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_output_must_not_contain_root() {
        let dir = TempDir::new().unwrap();
        let root = crate::utils::path::normalize_path(dir.path());
        let config = finalized("[build]\noutput = \".\"\n", &root);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_must_not_overlap_inputs() {
        let dir = TempDir::new().unwrap();
        let root = crate::utils::path::normalize_path(dir.path());

        let config = finalized("[project]\nsources = [\".\"]\n", &root);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overlaps input"));

        let config = finalized(
            "[project]\ndependencies = [\"build/vendor\"]\n[build]\noutput = \"build\"\n",
            &root,
        );
        assert!(config.validate().is_err());

        let config = finalized(
            "[project]\nsources = [\"src\"]\ndependencies = [\"bower_components\"]\n",
            &root,
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "kiln",
            "build",
            "--output",
            "out",
            "--insert-prefetch-links",
            "--css-minify",
            "--bundle=false",
        ]);
        let mut config = KilnConfig::from_str("[build]\nbundle = true\n").unwrap();
        config.apply_command_options(&cli);

        assert_eq!(config.build.output, PathBuf::from("out"));
        assert!(config.build.insert_prefetch_links);
        assert!(!config.build.bundle);
        assert!(config.build.optimize.css.enabled);
        assert!(!config.build.optimize.js.enabled);
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[project]\nentrypoint = \"index.html\"\n[unknown_section]\nfield = \"value\"";
        let (config, ignored) = KilnConfig::parse_with_ignored(content).unwrap();

        assert_eq!(config.project.entrypoint, Some(PathBuf::from("index.html")));
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }
}
