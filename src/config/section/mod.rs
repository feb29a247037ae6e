//! Configuration section definitions.
//!
//! Each module corresponds to a section in `kiln.toml`:
//!
//! | Module     | TOML Section   | Purpose                              |
//! |------------|----------------|--------------------------------------|
//! | `build`    | `[build]`      | Output, optional steps, optimizers   |
//! | `project`  | `[project]`    | Entrypoint, shell, fragments, inputs |

pub mod build;
pub mod project;

pub use build::{BuildOptions, OptimizeConfig, OptimizerConfig};
pub use project::ProjectConfig;
