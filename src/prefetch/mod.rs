//! Prefetch and import link injection.
//!
//! The injector holds back the entrypoint and every fragment until the
//! stream ends, then resolves the dependency index once and rewrites them:
//!
//! ```text
//! Collecting ──(entrypoint/fragment)──> Buffered ──(end of input)──> Flushing ──> Emitted
//!      └──────────(any other file)─────────────────────────────────────────────────┘
//! ```
//!
//! - the entrypoint gets `<link rel="prefetch">` for each dependency of the
//!   shell, with root-absolute hrefs;
//! - each fragment gets `<link rel="import">` for its own dependencies, with
//!   hrefs relative to the fragment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use sugar_path::SugarPath;

use crate::config::ProjectConfig;
use crate::debug;
use crate::diagnostics::Warnings;
use crate::error::PipelineError;
use crate::file::VirtualFile;
use crate::html::{Document, link_tag};
use crate::project::{DependencyIndex, DependencyIndexProvider, has_scheme};
use crate::stream::{Emitter, Stage};

/// `rel` of an injected link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRel {
    Prefetch,
    Import,
}

impl LinkRel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prefetch => "prefetch",
            Self::Import => "import",
        }
    }
}

/// Compute the `href` for `dep` injected into a file living in `file_dir`.
///
/// Dependencies under `root` become relative to `file_dir`. Prefetch hrefs
/// are then made root-absolute; values that already carry a URL scheme are
/// left alone.
pub fn link_href(dep: &Path, file_dir: &Path, root: &Path, rel: LinkRel) -> String {
    let href = if dep.starts_with(root) {
        dep.relative(file_dir).as_path().to_slash_lossy().into_owned()
    } else {
        dep.to_string_lossy().into_owned()
    };

    match rel {
        LinkRel::Import => href,
        LinkRel::Prefetch if has_scheme(&href) => href,
        LinkRel::Prefetch => Path::new("/")
            .join(&href)
            .normalize()
            .as_path()
            .to_slash_lossy()
            .into_owned(),
    }
}

/// Append one link per dependency to the document's `<head>`.
///
/// The rest of the document is kept byte for byte.
pub fn pull_up_deps(
    file: &mut VirtualFile,
    deps: &IndexSet<PathBuf>,
    root: &Path,
    rel: LinkRel,
) -> Result<()> {
    let Some(text) = file.text()? else {
        return Ok(());
    };
    let file_dir = file.dirname();
    let links: String = deps
        .iter()
        .map(|dep| link_tag(rel.as_str(), &link_href(dep, file_dir, root, rel)))
        .collect();

    let html = Document::parse(text).append_to_head(&links);
    file.set_text(html);
    Ok(())
}

pub struct PrefetchInjector {
    config: Arc<ProjectConfig>,
    index: Arc<dyn DependencyIndexProvider>,
    warnings: Warnings,
    buffer: IndexMap<PathBuf, VirtualFile>,
}

impl PrefetchInjector {
    pub fn new(
        config: Arc<ProjectConfig>,
        index: Arc<dyn DependencyIndexProvider>,
        warnings: &Warnings,
    ) -> Self {
        Self {
            config,
            index,
            warnings: warnings.clone(),
            buffer: IndexMap::new(),
        }
    }

    fn take(&mut self, path: &Path) -> Result<VirtualFile> {
        self.buffer
            .shift_remove(path)
            .ok_or_else(|| PipelineError::MissingBufferedFile(path.to_path_buf()).into())
    }

    /// Inject the dependencies of `key` into `file`, or warn if it has none.
    fn inject(
        &self,
        file: &mut VirtualFile,
        index: &DependencyIndex,
        key: &Path,
        rel: LinkRel,
    ) -> Result<()> {
        let Some(deps) = index.get(key) else {
            self.warnings.push(
                "prefetch",
                &file.path,
                format!("no dependency data for {}, not rewritten:", key.display()),
            );
            return Ok(());
        };
        if deps.is_empty() {
            return Ok(());
        }

        debug!("prefetch"; "{} {} links into {}", deps.len(), rel.as_str(), file.path.display());
        pull_up_deps(file, deps, &self.config.root, rel)
            .with_context(|| format!("failed to inject links into {}", file.path.display()))
    }
}

#[async_trait]
impl Stage for PrefetchInjector {
    fn name(&self) -> &str {
        "prefetch"
    }

    async fn transform(&mut self, file: VirtualFile, out: &Emitter) -> Result<()> {
        if self.config.is_entry_file(&file.path) {
            let path = file.path.clone();
            if self.buffer.insert(path.clone(), file).is_some() {
                self.warnings
                    .push("prefetch", &path, "buffered twice, earlier copy replaced:");
            }
            return Ok(());
        }
        out.emit(file).await
    }

    async fn flush(&mut self, out: &Emitter) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let index = self
            .index
            .dependency_index()
            .await
            .map_err(PipelineError::DependencyIndex)?;
        debug!("prefetch"; "dependency index covers {} files", index.len());
        let config = Arc::clone(&self.config);

        if let (Some(entrypoint), Some(shell)) = (&config.entrypoint, &config.shell) {
            let mut file = self.take(entrypoint)?;
            self.inject(&mut file, &index, shell, LinkRel::Prefetch)?;
            out.emit(file).await?;
        }

        for fragment in config.all_fragments() {
            let mut file = self.take(&fragment)?;
            self.inject(&mut file, &index, &fragment, LinkRel::Import)?;
            out.emit(file).await?;
        }

        for (path, file) in std::mem::take(&mut self.buffer) {
            self.warnings
                .push("prefetch", &path, "buffered but not listed as a fragment, emitted unmodified:");
            out.emit(file).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::StaticIndex;
    use crate::stream::Pipeline;

    const PAGE: &str = "<!DOCTYPE html><html><head><title>x</title></head><body></body></html>";

    fn project(entrypoint: Option<&str>, shell: Option<&str>, fragments: &[&str]) -> ProjectConfig {
        ProjectConfig {
            root: PathBuf::from("/proj"),
            entrypoint: entrypoint.map(PathBuf::from),
            shell: shell.map(PathBuf::from),
            fragments: fragments.iter().map(PathBuf::from).collect(),
            ..ProjectConfig::default()
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl DependencyIndexProvider for FailingIndex {
        async fn dependency_index(&self) -> Result<DependencyIndex> {
            anyhow::bail!("analyzer crashed")
        }
    }

    async fn run(
        config: ProjectConfig,
        index: impl DependencyIndexProvider + 'static,
        files: Vec<VirtualFile>,
        warnings: &Warnings,
    ) -> Result<Vec<VirtualFile>> {
        let injector = PrefetchInjector::new(Arc::new(config), Arc::new(index), warnings);
        Pipeline::from_files(files).pipe(injector).collect().await
    }

    fn text(files: &[VirtualFile], path: &str) -> String {
        let file = files.iter().find(|f| f.path == Path::new(path)).unwrap();
        file.text().unwrap().unwrap().to_string()
    }

    #[test]
    fn test_link_href() {
        let root = Path::new("/proj");
        assert_eq!(
            link_href(Path::new("/proj/a.js"), root, root, LinkRel::Prefetch),
            "/a.js"
        );
        assert_eq!(
            link_href(Path::new("/proj/a.js"), Path::new("/proj/app"), root, LinkRel::Prefetch),
            "/a.js"
        );
        assert_eq!(
            link_href(Path::new("/proj/shared/y.js"), Path::new("/proj/pages"), root, LinkRel::Import),
            "../shared/y.js"
        );
        assert_eq!(
            link_href(Path::new("https://cdn.example/z.js"), root, root, LinkRel::Prefetch),
            "https://cdn.example/z.js"
        );
        assert_eq!(
            link_href(Path::new("/elsewhere/w.js"), root, root, LinkRel::Import),
            "/elsewhere/w.js"
        );
    }

    #[tokio::test]
    async fn test_entrypoint_gets_root_absolute_prefetch_links() {
        let mut index = DependencyIndex::new();
        index.insert(Path::new("/proj/shell.html"), ["/proj/a.js", "/proj/b.js"]);

        let warnings = Warnings::new();
        let out = run(
            project(Some("/proj/index.html"), Some("/proj/shell.html"), &[]),
            StaticIndex(index),
            vec![
                VirtualFile::new("/proj/index.html", PAGE),
                VirtualFile::new("/proj/shell.html", "<dom-module></dom-module>"),
                VirtualFile::new("/proj/a.js", "a()"),
            ],
            &warnings,
        )
        .await
        .unwrap();

        assert_eq!(out.len(), 3);
        // Unbuffered files pass first; the entrypoint leads the flush.
        assert_eq!(out[0].path, Path::new("/proj/a.js"));
        assert_eq!(out[1].path, Path::new("/proj/index.html"));
        assert_eq!(out[2].path, Path::new("/proj/shell.html"));

        let index_html = text(&out, "/proj/index.html");
        assert!(index_html.contains(
            "<title>x</title><link rel=\"prefetch\" href=\"/a.js\"><link rel=\"prefetch\" href=\"/b.js\"></head>"
        ));
        // The shell is a fragment too and imports its own dependencies.
        assert!(text(&out, "/proj/shell.html").contains("<link rel=\"import\" href=\"a.js\">"));
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_fragment_gets_relative_import_links() {
        let mut index = DependencyIndex::new();
        index.insert(Path::new("/proj/pages/x.html"), ["/proj/shared/y.js"]);

        let warnings = Warnings::new();
        let out = run(
            project(None, None, &["/proj/pages/x.html"]),
            StaticIndex(index),
            vec![VirtualFile::new("/proj/pages/x.html", PAGE)],
            &warnings,
        )
        .await
        .unwrap();

        assert_eq!(out.len(), 1);
        assert!(text(&out, "/proj/pages/x.html")
            .contains("<link rel=\"import\" href=\"../shared/y.js\"></head>"));
    }

    #[tokio::test]
    async fn test_fragment_markup_is_kept_byte_for_byte() {
        const FRAGMENT: &str = "<link rel=\"import\" href=\"../lib/lib.html\">\n\
<dom-module id=\"x-page\"><template><ul><li>a<li>b</ul><p>1 < 2</template>\
<script>for (var i = 0; i<n; i++) { if (a < b) f(); }</script></dom-module>";
        let mut index = DependencyIndex::new();
        index.insert(Path::new("/proj/pages/x.html"), ["/proj/shared/y.js"]);

        let warnings = Warnings::new();
        let out = run(
            project(None, None, &["/proj/pages/x.html"]),
            StaticIndex(index),
            vec![VirtualFile::new("/proj/pages/x.html", FRAGMENT)],
            &warnings,
        )
        .await
        .unwrap();

        let (head, body) = FRAGMENT.split_once('\n').unwrap();
        assert_eq!(
            text(&out, "/proj/pages/x.html"),
            format!(
                "<html><head>{head}\n<link rel=\"import\" href=\"../shared/y.js\"></head>{body}</html>"
            )
        );
    }

    #[tokio::test]
    async fn test_entry_file_buffered_twice_warns() {
        let warnings = Warnings::new();
        let out = run(
            project(None, None, &["/proj/a.html"]),
            StaticIndex::default(),
            vec![
                VirtualFile::new("/proj/a.html", "<p>first</p>"),
                VirtualFile::new("/proj/a.html", "<p>second</p>"),
            ],
            &warnings,
        )
        .await
        .unwrap();

        assert_eq!(out, [VirtualFile::new("/proj/a.html", "<p>second</p>")]);
        // Duplicate plus the missing index entry.
        let for_file = warnings.for_path(Path::new("/proj/a.html"));
        assert_eq!(for_file.len(), 2);
        assert!(for_file[0].message.contains("buffered twice"));
    }

    #[tokio::test]
    async fn test_fragments_emitted_in_configured_order() {
        let warnings = Warnings::new();
        let out = run(
            project(None, Some("/proj/c.html"), &["/proj/b.html", "/proj/a.html"]),
            StaticIndex::default(),
            vec![
                VirtualFile::new("/proj/a.html", PAGE),
                VirtualFile::new("/proj/b.html", PAGE),
                VirtualFile::new("/proj/c.html", PAGE),
            ],
            &warnings,
        )
        .await
        .unwrap();

        let paths: Vec<_> = out.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            [
                PathBuf::from("/proj/c.html"),
                PathBuf::from("/proj/b.html"),
                PathBuf::from("/proj/a.html"),
            ]
        );
        // One warning per file without index data.
        assert_eq!(warnings.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_index_entry_is_one_warning_and_unchanged() {
        let mut index = DependencyIndex::new();
        index.insert(Path::new("/proj/other.html"), ["/proj/a.js"]);

        let warnings = Warnings::new();
        let original = VirtualFile::new("/proj/lazy.html", PAGE);
        let out = run(
            project(None, None, &["/proj/lazy.html"]),
            StaticIndex(index),
            vec![original.clone()],
            &warnings,
        )
        .await
        .unwrap();

        assert_eq!(out, [original]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings.for_path(Path::new("/proj/lazy.html")).len(), 1);
    }

    #[tokio::test]
    async fn test_entrypoint_without_shell_is_leftover() {
        let warnings = Warnings::new();
        let original = VirtualFile::new("/proj/index.html", PAGE);
        let out = run(
            project(Some("/proj/index.html"), None, &[]),
            StaticIndex::default(),
            vec![original.clone()],
            &warnings,
        )
        .await
        .unwrap();

        assert_eq!(out, [original]);
        assert_eq!(warnings.for_path(Path::new("/proj/index.html")).len(), 1);
    }

    #[tokio::test]
    async fn test_missing_buffered_file_is_fatal() {
        let warnings = Warnings::new();
        let err = run(
            project(None, None, &["/proj/a.html", "/proj/never.html"]),
            StaticIndex::default(),
            vec![VirtualFile::new("/proj/a.html", PAGE)],
            &warnings,
        )
        .await
        .unwrap_err();

        let missing = err
            .chain()
            .find_map(|e| e.downcast_ref::<PipelineError>());
        assert!(matches!(missing, Some(PipelineError::MissingBufferedFile(p)) if p == Path::new("/proj/never.html")));
    }

    #[tokio::test]
    async fn test_index_failure_is_fatal() {
        let warnings = Warnings::new();
        let err = run(
            project(None, None, &["/proj/a.html"]),
            FailingIndex,
            vec![VirtualFile::new("/proj/a.html", PAGE)],
            &warnings,
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("analyzer crashed"));
    }

    #[tokio::test]
    async fn test_empty_buffer_never_resolves_index() {
        let warnings = Warnings::new();
        let out = run(
            project(Some("/proj/index.html"), None, &[]),
            FailingIndex,
            vec![VirtualFile::new("/proj/a.js", "a()")],
            &warnings,
        )
        .await
        .unwrap();
        assert_eq!(out.len(), 1);
    }
}
