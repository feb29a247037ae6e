//! Default optimizer functions.
//!
//! Uses oxc for JavaScript and lightningcss for CSS. Markup is minified
//! token by token, so raw text and attributes are never rewritten.

use anyhow::{Result, anyhow, bail};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use super::{OptimizerOptions, flag};
use crate::html::token::TokenKind;
use crate::html::{Document, splice};
use crate::utils::html::{is_metadata_element, is_whitespace_sensitive};

/// Result of a JavaScript minification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinifyOutput {
    pub code: String,
}

/// Minify JavaScript source code.
///
/// Options: `mangle` and `compress` (both default to `true`). Sources are
/// parsed as classic scripts, so top-level names are never mangled.
pub fn minify_js(source: &str, options: &OptimizerOptions) -> Result<MinifyOutput> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs().with_script(true)).parse();
    if let Some(error) = ret.errors.first() {
        bail!("{error}");
    }

    let mut program = ret.program;
    let minifier_options = MinifierOptions {
        mangle: flag(options, "mangle", true).then(MangleOptions::default),
        compress: flag(options, "compress", true).then(CompressOptions::smallest),
    };
    let ret = Minifier::new(minifier_options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;

    Ok(MinifyOutput { code })
}

/// Minify a stylesheet.
pub fn minify_css(source: &str, _options: &OptimizerOptions) -> Result<String> {
    let stylesheet =
        StyleSheet::parse(source, ParserOptions::default()).map_err(|e| anyhow!("{e}"))?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("{e}"))?;
    Ok(result.code)
}

/// Minify every `<style>` block of a document, including those in templates.
///
/// Markup without style blocks is returned untouched.
pub fn minify_inline_css(source: &str, options: &OptimizerOptions) -> Result<String> {
    let doc = Document::parse(source);
    let edits = doc
        .raw_text_blocks()
        .into_iter()
        .filter(|block| block.tag.name == "style")
        .map(|block| {
            let css = minify_css(doc.text(block.content.clone()), options)?;
            Ok::<_, anyhow::Error>((block.content, css))
        })
        .collect::<Result<Vec<_>>>()?;

    if edits.is_empty() {
        return Ok(source.to_string());
    }
    Ok(splice(source, edits))
}

/// Minify markup.
///
/// Options: `collapseWhitespace` squeezes whitespace runs in text to one
/// space (never inside `pre`, `textarea`, `script` or `style`) and drops
/// whitespace-only text outside `<body>` content.
/// `removeComments` drops comments except conditional ones.
pub fn minify_html(source: &str, options: &OptimizerOptions) -> Result<String> {
    let remove_comments = flag(options, "removeComments", false);
    let mut space = Whitespace {
        collapse: flag(options, "collapseWhitespace", false),
        preserve: 0,
        in_body: false,
    };
    if !space.collapse && !remove_comments {
        return Ok(source.to_string());
    }

    let doc = Document::parse(source);
    let mut out = String::with_capacity(source.len());
    // Text is held back so runs split by a removed comment collapse together.
    let mut text = String::new();

    for token in doc.tokens() {
        let raw = doc.text(token.span.clone());
        match &token.kind {
            TokenKind::Text => {
                text.push_str(raw);
                continue;
            }
            TokenKind::Comment if remove_comments && !is_conditional_comment(raw) => continue,
            _ => {}
        }

        space.flush(&mut text, &mut out);
        match &token.kind {
            TokenKind::StartTag { name, .. } => space.enter(name),
            TokenKind::EndTag { name } => space.leave(name),
            _ => {}
        }
        out.push_str(raw);
    }
    space.flush(&mut text, &mut out);

    Ok(out)
}

/// Whitespace handling state while walking tokens.
#[derive(Debug)]
struct Whitespace {
    collapse: bool,
    /// Open whitespace-sensitive elements.
    preserve: usize,
    in_body: bool,
}

impl Whitespace {
    fn enter(&mut self, tag: &str) {
        if is_whitespace_sensitive(tag) {
            self.preserve += 1;
        }
        if !matches!(tag, "html" | "head") && !is_metadata_element(tag) {
            self.in_body = true;
        }
    }

    fn leave(&mut self, tag: &str) {
        if is_whitespace_sensitive(tag) {
            self.preserve = self.preserve.saturating_sub(1);
        }
        if tag == "body" {
            self.in_body = false;
        }
    }

    fn flush(&self, text: &mut String, out: &mut String) {
        if text.is_empty() {
            return;
        }
        if !self.collapse || self.preserve > 0 {
            out.push_str(text);
        } else if self.in_body || !text.trim().is_empty() {
            out.push_str(&collapse_whitespace(text));
        }
        text.clear();
    }
}

fn is_conditional_comment(comment: &str) -> bool {
    comment.starts_with("<!--[if") || comment.starts_with("<![endif")
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts(value: serde_json::Value) -> OptimizerOptions {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_minify_js() {
        let source = "function  add(a, b) {\n  return a + b;\n}\n";
        let out = minify_js(source, &opts(json!({}))).unwrap();
        assert!(out.code.len() < source.len());
        assert!(out.code.contains("function add"));
    }

    #[test]
    fn test_minify_js_rejects_syntax_error() {
        assert!(minify_js("function (", &opts(json!({}))).is_err());
    }

    #[test]
    fn test_minify_css() {
        let out = minify_css("a {\n  color: red;\n}\n", &opts(json!({}))).unwrap();
        assert_eq!(out, "a{color:red}");
    }

    #[test]
    fn test_minify_inline_css() {
        let source = "<dom-module><template><style>\n  :host { display: block; }\n</style></template></dom-module>";
        let out = minify_inline_css(source, &opts(json!({}))).unwrap();
        assert_eq!(
            out,
            "<dom-module><template><style>:host{display:block}</style></template></dom-module>"
        );
    }

    #[test]
    fn test_minify_inline_css_without_styles_is_identity() {
        let source = "<p>  spaced  </p>";
        assert_eq!(minify_inline_css(source, &opts(json!({}))).unwrap(), source);
    }

    #[test]
    fn test_minify_html_collapse_and_comments() {
        let source = "<html>\n  <head>\n    <title>t</title>\n  </head>\n  <body>\n    <!-- note -->\n    <p>a   b</p>\n    <pre>  keep\n  this</pre>\n  </body>\n</html>";
        let out = minify_html(
            source,
            &opts(json!({ "collapseWhitespace": true, "removeComments": true })),
        )
        .unwrap();
        assert_eq!(
            out,
            "<html><head><title>t</title></head><body> <p>a b</p> <pre>  keep\n  this</pre> </body></html>"
        );
    }

    #[test]
    fn test_minify_html_keeps_scripts_and_text_with_less_than() {
        let source = "<body><script>if (a < b)  f();</script>\n<p>1 <  2</p>\
                      <ul><li>a<li>b</ul></body>";
        let out = minify_html(source, &opts(json!({ "collapseWhitespace": true }))).unwrap();
        assert_eq!(
            out,
            "<body><script>if (a < b)  f();</script> <p>1 < 2</p><ul><li>a<li>b</ul></body>"
        );
    }

    #[test]
    fn test_minify_html_keeps_conditional_comments() {
        let source = "<!--[if IE]><p>old</p><![endif]--><!-- x --><p>a</p>";
        let out = minify_html(source, &opts(json!({ "removeComments": true }))).unwrap();
        assert_eq!(out, "<!--[if IE]><p>old</p><![endif]--><p>a</p>");
    }

    #[test]
    fn test_minify_html_defaults_keep_markup() {
        let source = "<p>a   b</p><!-- c -->";
        assert_eq!(minify_html(source, &opts(json!({}))).unwrap(), source);
    }
}
