//! Per-file-type optimization stages.
//!
//! Every variant is the same [`OptimizeStage`] driven by a different
//! [`Optimizer`] value:
//!
//! | Optimizer     | Files   | Runs when                 |
//! |---------------|---------|---------------------------|
//! | `uglify-js`   | `.js`   | always                    |
//! | `css-slam`    | `.css`  | `stripWhitespace` is set  |
//! | `css-slam`    | `.html` | `stripWhitespace` is set  |
//! | `html-minify` | `.html` | always                    |
//!
//! A failing optimizer never fails the build: its error (or panic) becomes a
//! warning and the original bytes pass through.

pub mod minify;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::{OptimizeConfig, OptimizerConfig};
use crate::debug;
use crate::diagnostics::Warnings;
use crate::file::VirtualFile;
use crate::stream::{Emitter, Stage};

/// Opaque per-optimizer options, as written in `kiln.toml`.
pub type OptimizerOptions = serde_json::Map<String, Value>;

/// Text-to-text optimizer function.
pub type OptimizeFn = fn(&str, &OptimizerOptions) -> Result<String>;

/// Truthiness of an option, read the way a JavaScript config would be.
pub(crate) fn flag(options: &OptimizerOptions, key: &str, default: bool) -> bool {
    match options.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) => false,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
        None => default,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Js,
    Css,
    Html,
}

impl FileKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::Css => "css",
            Self::Html => "html",
        }
    }
}

/// A named optimizer with its file kind and applicability guard.
#[derive(Clone, Copy)]
pub struct Optimizer {
    /// Name used in warnings.
    pub name: &'static str,
    pub kind: FileKind,
    /// Checked before every file; `false` passes it through untouched.
    pub applies: fn(&OptimizerOptions) -> bool,
    pub transform: OptimizeFn,
}

fn always(_: &OptimizerOptions) -> bool {
    true
}

fn strips_whitespace(options: &OptimizerOptions) -> bool {
    flag(options, "stripWhitespace", false)
}

fn uglify(source: &str, options: &OptimizerOptions) -> Result<String> {
    minify::minify_js(source, options).map(|output| output.code)
}

impl Optimizer {
    pub const JS: Self = Self {
        name: "uglify-js",
        kind: FileKind::Js,
        applies: always,
        transform: uglify,
    };

    pub const CSS: Self = Self {
        name: "css-slam",
        kind: FileKind::Css,
        applies: strips_whitespace,
        transform: minify::minify_css,
    };

    pub const INLINE_CSS: Self = Self {
        name: "css-slam",
        kind: FileKind::Html,
        applies: strips_whitespace,
        transform: minify::minify_inline_css,
    };

    pub const HTML: Self = Self {
        name: "html-minify",
        kind: FileKind::Html,
        applies: always,
        transform: minify::minify_html,
    };
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Stage
// =============================================================================

pub struct OptimizeStage {
    optimizer: Optimizer,
    options: OptimizerOptions,
    warnings: Warnings,
}

impl OptimizeStage {
    pub fn new(optimizer: Optimizer, options: OptimizerOptions, warnings: &Warnings) -> Self {
        Self {
            optimizer,
            options,
            warnings: warnings.clone(),
        }
    }

    fn optimize(&self, file: &mut VirtualFile) {
        if file.contents.is_none()
            || !file.has_extension(self.optimizer.kind.extension())
            || !(self.optimizer.applies)(&self.options)
        {
            return;
        }

        match self.run(file) {
            Ok(text) => file.set_text(text),
            Err(e) => {
                debug!("optimize"; "{} failed on {}: {:#}", self.optimizer.name, file.path.display(), e);
                self.warnings
                    .push(self.optimizer.name, &file.path, "unable to optimize");
            }
        }
    }

    /// Run the optimizer, turning a panic into an error.
    fn run(&self, file: &VirtualFile) -> Result<String> {
        let text = file.text()?.unwrap_or_default();
        let transform = self.optimizer.transform;
        let options = &self.options;

        panic::catch_unwind(AssertUnwindSafe(|| transform(text, options)))
            .unwrap_or_else(|payload| Err(anyhow!("optimizer panicked: {}", panic_message(&*payload))))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[async_trait]
impl Stage for OptimizeStage {
    fn name(&self) -> &str {
        self.optimizer.name
    }

    async fn transform(&mut self, mut file: VirtualFile, out: &Emitter) -> Result<()> {
        self.optimize(&mut file);
        out.emit(file).await
    }
}

/// Optimization stages for the enabled kinds, in order: JS, CSS, inline CSS,
/// HTML.
pub fn optimize_stages(config: &OptimizeConfig, warnings: &Warnings) -> Vec<Box<dyn Stage>> {
    let plan: [(Optimizer, &OptimizerConfig); 4] = [
        (Optimizer::JS, &config.js),
        (Optimizer::CSS, &config.css),
        (Optimizer::INLINE_CSS, &config.css),
        (Optimizer::HTML, &config.html),
    ];

    plan.into_iter()
        .filter(|(_, kind)| kind.enabled)
        .map(|(optimizer, kind)| {
            Box::new(OptimizeStage::new(optimizer, kind.options.clone(), warnings))
                as Box<dyn Stage>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Pipeline;
    use serde_json::json;
    use std::path::Path;

    fn options(value: Value) -> OptimizerOptions {
        value.as_object().cloned().unwrap_or_default()
    }

    fn failing(_: &str, _: &OptimizerOptions) -> Result<String> {
        anyhow::bail!("cannot parse")
    }

    fn panicking(_: &str, _: &OptimizerOptions) -> Result<String> {
        panic!("optimizer bug")
    }

    fn shout(source: &str, _: &OptimizerOptions) -> Result<String> {
        Ok(source.to_uppercase())
    }

    fn test_optimizer(transform: OptimizeFn) -> Optimizer {
        Optimizer {
            name: "test-opt",
            kind: FileKind::Js,
            applies: always,
            transform,
        }
    }

    async fn run_one(stage: OptimizeStage, file: VirtualFile) -> VirtualFile {
        let mut out = Pipeline::from_files([file]).pipe(stage).collect().await.unwrap();
        assert_eq!(out.len(), 1);
        out.remove(0)
    }

    #[tokio::test]
    async fn test_success_replaces_contents() {
        let warnings = Warnings::new();
        let stage = OptimizeStage::new(test_optimizer(shout), OptimizerOptions::new(), &warnings);
        let file = run_one(stage, VirtualFile::new("/proj/a.js", "abc")).await;
        assert_eq!(file.text().unwrap(), Some("ABC"));
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_error_passes_original_with_one_warning() {
        let warnings = Warnings::new();
        let stage = OptimizeStage::new(test_optimizer(failing), OptimizerOptions::new(), &warnings);
        let original = VirtualFile::new("/proj/broken.js", "function (");
        let file = run_one(stage, original.clone()).await;

        assert_eq!(file, original);
        let recorded = warnings.drain();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].source, "test-opt");
        assert_eq!(recorded[0].path, Path::new("/proj/broken.js"));
    }

    #[tokio::test]
    async fn test_panic_passes_original_with_one_warning() {
        let warnings = Warnings::new();
        let stage =
            OptimizeStage::new(test_optimizer(panicking), OptimizerOptions::new(), &warnings);
        let original = VirtualFile::new("/proj/a.js", "x");
        let file = run_one(stage, original.clone()).await;

        assert_eq!(file, original);
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_a_warning() {
        let warnings = Warnings::new();
        let stage = OptimizeStage::new(test_optimizer(shout), OptimizerOptions::new(), &warnings);
        let original = VirtualFile::new("/proj/a.js", vec![0xff, 0x00]);
        let file = run_one(stage, original.clone()).await;

        assert_eq!(file, original);
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_absent_contents_are_identity_for_every_variant() {
        let warnings = Warnings::new();
        let all = options(json!({ "stripWhitespace": true }));
        for optimizer in [
            Optimizer::JS,
            Optimizer::CSS,
            Optimizer::INLINE_CSS,
            Optimizer::HTML,
        ] {
            let path = format!("/proj/dir.{}", optimizer.kind.extension());
            let stage = OptimizeStage::new(optimizer, all.clone(), &warnings);
            let file = run_one(stage, VirtualFile::directory(&path)).await;
            assert_eq!(file, VirtualFile::directory(&path));
        }
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_css_stages_noop_without_strip_whitespace() {
        let warnings = Warnings::new();
        let css = VirtualFile::new("/proj/a.css", "a {\n  color: red;\n}\n");
        let html = VirtualFile::new("/proj/a.html", "<style>\n  a { color: red; }\n</style>");

        let file = run_one(
            OptimizeStage::new(Optimizer::CSS, OptimizerOptions::new(), &warnings),
            css.clone(),
        )
        .await;
        assert_eq!(file, css);

        let file = run_one(
            OptimizeStage::new(
                Optimizer::INLINE_CSS,
                options(json!({ "stripWhitespace": false })),
                &warnings,
            ),
            html.clone(),
        )
        .await;
        assert_eq!(file, html);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_css_stage_minifies_with_strip_whitespace() {
        let warnings = Warnings::new();
        let stage = OptimizeStage::new(
            Optimizer::CSS,
            options(json!({ "stripWhitespace": true })),
            &warnings,
        );
        let file = run_one(stage, VirtualFile::new("/proj/a.css", "a {\n  color: red;\n}\n")).await;
        assert_eq!(file.text().unwrap(), Some("a{color:red}"));
    }

    #[tokio::test]
    async fn test_other_kinds_pass_through() {
        let warnings = Warnings::new();
        let stage = OptimizeStage::new(test_optimizer(shout), OptimizerOptions::new(), &warnings);
        let file = run_one(stage, VirtualFile::new("/proj/a.css", "abc")).await;
        assert_eq!(file.text().unwrap(), Some("abc"));
    }

    #[test]
    fn test_optimize_stages_order() {
        let enabled = |opts: Value| OptimizerConfig {
            enabled: true,
            options: options(opts),
        };
        let config = OptimizeConfig {
            js: enabled(json!({})),
            css: enabled(json!({ "stripWhitespace": true })),
            html: OptimizerConfig::default(),
        };
        let stages = optimize_stages(&config, &Warnings::new());
        let names: Vec<_> = stages.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, ["uglify-js", "css-slam", "css-slam"]);
    }

    #[test]
    fn test_flag() {
        let opts = options(json!({ "a": true, "b": false, "c": 1, "d": null, "e": 0 }));
        assert!(flag(&opts, "a", false));
        assert!(!flag(&opts, "b", true));
        assert!(flag(&opts, "c", false));
        assert!(!flag(&opts, "d", true));
        assert!(!flag(&opts, "e", true));
        assert!(flag(&opts, "missing", true));
    }
}
