//! Inline block extraction.
//!
//! The splitter pulls every inline `<script>` and `<style>` out of an HTML
//! file into its own virtual child file, so the JS and CSS optimizers see
//! them as ordinary files. The rejoiner later puts the (optimized) contents
//! back into the same blocks.
//!
//! ```text
//! index.html ──split──> index.html            (blocks emptied)
//!                       index.html_script_0.js
//!                       index.html_style_1.css
//!            ──optimize──> ... ──rejoin──> index.html (blocks filled)
//! ```
//!
//! Blocks inside `<template>` are left in place; their styles are handled by
//! the inline CSS optimizer instead.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Document, StartTag, splice};
use crate::diagnostics::Warnings;
use crate::file::VirtualFile;
use crate::stream::{Emitter, Stage};
use crate::utils::html::is_javascript_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Script,
    Style,
}

impl BlockKind {
    fn of(tag: &StartTag) -> Option<Self> {
        match tag.name.as_str() {
            "script" if !tag.has_attr("src") && is_javascript_type(tag.attr("type")) => {
                Some(Self::Script)
            }
            "style" => Some(Self::Style),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Script => "js",
            Self::Style => "css",
        }
    }
}

/// Extractable blocks in document order, with their content ranges.
fn inline_blocks(doc: &Document) -> Vec<(BlockKind, Range<usize>)> {
    doc.raw_text_blocks()
        .into_iter()
        .filter(|block| !block.in_template)
        .filter_map(|block| Some((BlockKind::of(&block.tag)?, block.content)))
        .collect()
}

fn child_path(parent: &Path, kind: BlockKind, index: usize) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}_{}.{}",
        parent.display(),
        kind.label(),
        index,
        kind.extension()
    ))
}

/// Parents that were split, and which parent each child belongs to.
#[derive(Debug, Default)]
struct Registry {
    parents: FxHashMap<PathBuf, usize>,
    children: FxHashMap<PathBuf, (PathBuf, usize)>,
}

/// Create a connected splitter/rejoiner pair.
pub fn html_splitter(warnings: &Warnings) -> (HtmlSplit, HtmlRejoin) {
    let registry = Arc::new(Mutex::new(Registry::default()));
    (
        HtmlSplit {
            registry: Arc::clone(&registry),
        },
        HtmlRejoin {
            registry,
            warnings: warnings.clone(),
            pending: FxHashMap::default(),
        },
    )
}

pub struct HtmlSplit {
    registry: Arc<Mutex<Registry>>,
}

impl HtmlSplit {
    /// Returns the emptied parent and its children, or `None` if there is
    /// nothing to extract.
    fn split(file: &VirtualFile) -> Option<(String, Vec<VirtualFile>)> {
        let text = file.text().ok().flatten()?;
        let doc = Document::parse(text);
        let blocks = inline_blocks(&doc);
        if blocks.is_empty() {
            return None;
        }

        let children = blocks
            .iter()
            .enumerate()
            .map(|(index, (kind, range))| {
                VirtualFile::new(
                    child_path(&file.path, *kind, index),
                    doc.text(range.clone()),
                )
            })
            .collect();
        let emptied = blocks
            .into_iter()
            .map(|(_, range)| (range, String::new()))
            .collect();
        Some((splice(text, emptied), children))
    }
}

#[async_trait]
impl Stage for HtmlSplit {
    fn name(&self) -> &str {
        "html-split"
    }

    async fn transform(&mut self, mut file: VirtualFile, out: &Emitter) -> Result<()> {
        if !file.has_extension("html") {
            return out.emit(file).await;
        }
        let Some((parent, children)) = Self::split(&file) else {
            return out.emit(file).await;
        };

        {
            let mut registry = self.registry.lock();
            registry.parents.insert(file.path.clone(), children.len());
            for (index, child) in children.iter().enumerate() {
                registry
                    .children
                    .insert(child.path.clone(), (file.path.clone(), index));
            }
        }

        file.set_text(parent);
        out.emit(file).await?;
        for child in children {
            out.emit(child).await?;
        }
        Ok(())
    }
}

/// A split parent waiting for its parts.
#[derive(Debug)]
struct Pending {
    parent: Option<VirtualFile>,
    parts: Vec<Option<String>>,
}

impl Pending {
    fn new(parts: usize) -> Self {
        Self {
            parent: None,
            parts: vec![None; parts],
        }
    }

    fn is_complete(&self) -> bool {
        self.parent.is_some() && self.parts.iter().all(Option::is_some)
    }
}

pub struct HtmlRejoin {
    registry: Arc<Mutex<Registry>>,
    warnings: Warnings,
    pending: FxHashMap<PathBuf, Pending>,
}

impl HtmlRejoin {
    fn pending_for(&mut self, parent: &Path) -> Option<&mut Pending> {
        let parts = *self.registry.lock().parents.get(parent)?;
        Some(
            self.pending
                .entry(parent.to_path_buf())
                .or_insert_with(|| Pending::new(parts)),
        )
    }

    async fn try_complete(&mut self, parent: &Path, out: &Emitter) -> Result<()> {
        if !self.pending.get(parent).is_some_and(Pending::is_complete) {
            return Ok(());
        }
        let Some(Pending {
            parent: Some(mut file),
            parts,
        }) = self.pending.remove(parent)
        else {
            return Ok(());
        };
        let parts: Vec<String> = parts.into_iter().flatten().collect();

        match rejoin(&file, parts) {
            Ok(text) => file.set_text(text),
            Err(e) => self.warnings.push(
                "html-rejoin",
                &file.path,
                format!("unable to restore inline blocks ({e}) in"),
            ),
        }

        {
            let mut registry = self.registry.lock();
            registry.parents.remove(parent);
            registry.children.retain(|_, (owner, _)| owner != parent);
        }
        out.emit(file).await
    }
}

fn rejoin(file: &VirtualFile, parts: Vec<String>) -> Result<String> {
    let text = file.text()?.unwrap_or_default();
    let blocks = inline_blocks(&Document::parse(text));
    anyhow::ensure!(
        blocks.len() == parts.len(),
        "found {} inline blocks, expected {}",
        blocks.len(),
        parts.len()
    );

    let edits = blocks
        .into_iter()
        .zip(parts)
        .map(|((_, range), part)| (range, part))
        .collect();
    Ok(splice(text, edits))
}

#[async_trait]
impl Stage for HtmlRejoin {
    fn name(&self) -> &str {
        "html-rejoin"
    }

    async fn transform(&mut self, file: VirtualFile, out: &Emitter) -> Result<()> {
        let child = self.registry.lock().children.get(&file.path).cloned();

        if let Some((parent, index)) = child {
            let text = String::from_utf8_lossy(file.contents.as_deref().unwrap_or_default())
                .into_owned();
            if let Some(pending) = self.pending_for(&parent)
                && let Some(slot) = pending.parts.get_mut(index)
            {
                *slot = Some(text);
            }
            return self.try_complete(&parent, out).await;
        }

        let path = file.path.clone();
        match self.pending_for(&path) {
            Some(pending) => {
                pending.parent = Some(file);
                self.try_complete(&path, out).await
            }
            None => out.emit(file).await,
        }
    }

    async fn flush(&mut self, out: &Emitter) -> Result<()> {
        let mut leftovers: Vec<_> = self.pending.drain().collect();
        leftovers.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, pending) in leftovers {
            match pending.parent {
                Some(file) => {
                    self.warnings
                        .push("html-rejoin", &path, "missing inline blocks, emitting as split");
                    out.emit(file).await?;
                }
                None => self
                    .warnings
                    .push("html-rejoin", &path, "inline blocks arrived without their file"),
            }
        }
        Ok(())
    }
}
