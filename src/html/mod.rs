//! HTML documents edited in place.
//!
//! A [`Document`] is the token stream of its source. Nothing is re-serialized:
//! every edit is a byte-range replacement on the original text, so scripts,
//! text and attribute order outside the edited ranges come out exactly as
//! they went in. Start-tag attributes are read with `tl`.
//!
//! - `token` - tokenizer with raw text handling
//! - `split` - inline `<script>`/`<style>` extraction and reassembly

pub mod split;
pub mod token;

use std::ops::Range;

use crate::utils::html::{escape_attr, is_metadata_element, is_raw_text_element};

use token::{Token, TokenKind, tokenize};

/// A parsed start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    /// Lowercase tag name.
    pub name: String,
    /// Lowercase attribute names with their raw values.
    pub attrs: Vec<(String, Option<String>)>,
}

impl StartTag {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(key, _)| key == name)
    }
}

/// Contents of a raw text element such as `<script>` or `<style>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub tag: StartTag,
    /// Byte range of the contents; empty and at the tag end when there are none.
    pub content: Range<usize>,
    /// Inside a `<template>`, where the block is inert.
    pub in_template: bool,
}

#[derive(Debug, Clone)]
pub struct Document<'a> {
    source: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Document<'a> {
    pub fn parse(source: &'a str) -> Self {
        Self {
            source,
            tokens: tokenize(source),
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn text(&self, span: Range<usize>) -> &'a str {
        &self.source[span]
    }

    /// Attributes of a start tag token.
    pub fn start_tag(&self, token: &Token) -> Option<StartTag> {
        let TokenKind::StartTag { name, .. } = &token.kind else {
            return None;
        };
        Some(StartTag {
            name: name.clone(),
            attrs: parse_attrs(&self.source[token.span.clone()]),
        })
    }

    /// Every raw text element in document order.
    pub fn raw_text_blocks(&self) -> Vec<RawBlock> {
        let mut blocks = Vec::new();
        let mut template_depth = 0usize;
        let mut tokens = self.tokens.iter().peekable();

        while let Some(token) = tokens.next() {
            match &token.kind {
                TokenKind::StartTag {
                    name,
                    self_closing: false,
                } if name == "template" => template_depth += 1,
                TokenKind::EndTag { name } if name == "template" => {
                    template_depth = template_depth.saturating_sub(1);
                }
                TokenKind::StartTag { name, .. } if is_raw_text_element(name) => {
                    let Some(tag) = self.start_tag(token) else {
                        continue;
                    };
                    let content = match tokens.peek() {
                        Some(next) if next.kind == TokenKind::RawText => {
                            let span = next.span.clone();
                            tokens.next();
                            span
                        }
                        _ => token.span.end..token.span.end,
                    };
                    blocks.push(RawBlock {
                        tag,
                        content,
                        in_template: template_depth > 0,
                    });
                }
                _ => {}
            }
        }
        blocks
    }

    /// Insert `markup` at the end of `<head>`.
    ///
    /// Where the source has no `<head>` (or no `<html>`), they are added
    /// around the run of leading metadata, the way a parser would imply them.
    pub fn append_to_head(&self, markup: &str) -> String {
        if let Some(end) = self.tokens.iter().find(|t| t.is_end("head")) {
            let at = end.span.start;
            return splice(self.source, vec![(at..at, markup.to_string())]);
        }

        if let Some(i) = self.tokens.iter().position(|t| t.is_start("head")) {
            let at = self.head_content_end(i + 1);
            return splice(self.source, vec![(at..at, markup.to_string())]);
        }

        let html = self.tokens.iter().position(|t| t.is_start("html"));
        let run = html
            .or_else(|| {
                self.tokens
                    .iter()
                    .position(|t| t.kind == TokenKind::Doctype)
            })
            .map_or(0, |i| i + 1);
        let run_start = run
            .checked_sub(1)
            .map_or(0, |i| self.tokens[i].span.end);
        let run_end = self.head_content_end(run);

        let mut edits = Vec::with_capacity(3);
        let open = if html.is_some() { "<head>" } else { "<html><head>" };
        edits.push((run_start..run_start, open.to_string()));
        edits.push((run_end..run_end, format!("{markup}</head>")));
        if html.is_none() {
            let end = self.source.len();
            edits.push((end..end, "</html>".to_string()));
        }
        splice(self.source, edits)
    }

    /// Where the head implied from token `from` onward stops.
    fn head_content_end(&self, from: usize) -> usize {
        let mut template_depth = 0usize;

        for token in &self.tokens[from..] {
            let belongs = match &token.kind {
                TokenKind::Text => {
                    template_depth > 0 || self.text(token.span.clone()).trim().is_empty()
                }
                TokenKind::Comment | TokenKind::Doctype | TokenKind::RawText => true,
                TokenKind::StartTag { name, self_closing } => {
                    if name == "template" && !self_closing {
                        template_depth += 1;
                    }
                    template_depth > 0 || is_metadata_element(name)
                }
                TokenKind::EndTag { name } => {
                    let inside = template_depth > 0;
                    if name == "template" {
                        template_depth = template_depth.saturating_sub(1);
                    }
                    inside || is_metadata_element(name)
                }
            };
            if !belongs {
                return token.span.start;
            }
        }
        self.source.len()
    }
}

/// Apply byte-range replacements to `source`.
///
/// Edits at the same position keep their order; overlapping edits are
/// clipped to the end of the previous one.
pub fn splice(source: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(source.len());
    let mut pos = 0;
    for (range, replacement) in edits {
        let start = range.start.max(pos);
        out.push_str(&source[pos..start]);
        out.push_str(&replacement);
        pos = range.end.max(start);
    }
    out.push_str(&source[pos..]);
    out
}

/// `<link rel="..." href="...">` with escaped values.
pub fn link_tag(rel: &str, href: &str) -> String {
    format!(
        "<link rel=\"{}\" href=\"{}\">",
        escape_attr(rel),
        escape_attr(href)
    )
}

/// Attributes of a single start tag, parsed with `tl`.
fn parse_attrs(tag_source: &str) -> Vec<(String, Option<String>)> {
    let Ok(dom) = tl::parse(tag_source, tl::ParserOptions::default()) else {
        return Vec::new();
    };
    let parser = dom.parser();

    dom.children()
        .first()
        .and_then(|handle| handle.get(parser))
        .and_then(tl::Node::as_tag)
        .map(|tag| {
            tag.attributes()
                .iter()
                .map(|(key, value)| {
                    let key: &str = key.as_ref();
                    (key.to_ascii_lowercase(), value.map(|v| v.into_owned()))
                })
                .collect()
        })
        .unwrap_or_default()
}
