//! Markup tokenizer.
//!
//! Splits a document into spans without building a tree. Contents of raw
//! text elements (`script`, `style`, `textarea`, `title`, ...) run to the
//! matching end tag as one token, and a `<` that does not open a tag,
//! comment or declaration is text, following the HTML tokenizer states.
//! Token spans cover the source exactly, so edits can splice the original
//! bytes and leave everything else untouched.

use std::ops::Range;

use crate::utils::html::is_raw_text_element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Doctype,
    /// `<!-- -->`, or a bogus comment such as `<?xml ?>` or `<![endif]>`.
    Comment,
    StartTag {
        /// Lowercase tag name.
        name: String,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text,
    /// Contents of a raw text element.
    RawText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range in the source.
    pub span: Range<usize>,
}

impl Token {
    pub fn is_start(&self, tag: &str) -> bool {
        matches!(&self.kind, TokenKind::StartTag { name, .. } if name == tag)
    }

    pub fn is_end(&self, tag: &str) -> bool {
        matches!(&self.kind, TokenKind::EndTag { name } if name == tag)
    }
}

/// Tokenize `source`. Never fails: anything unrecognized is text.
pub fn tokenize(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let Some((kind, end)) = markup_at(source, pos) else {
            pos += 1;
            continue;
        };

        push_text(&mut tokens, text_start..pos);
        // The self-closing flag is ignored on raw text elements.
        let raw_text = match &kind {
            TokenKind::StartTag { name, .. } if is_raw_text_element(name) => Some(name.clone()),
            _ => None,
        };
        tokens.push(Token {
            kind,
            span: pos..end,
        });
        pos = end;

        if let Some(name) = raw_text {
            let close = find_end_tag(source, pos, &name).unwrap_or(source.len());
            if close > pos {
                tokens.push(Token {
                    kind: TokenKind::RawText,
                    span: pos..close,
                });
            }
            pos = close;
        }
        text_start = pos;
    }

    push_text(&mut tokens, text_start..source.len());
    tokens
}

fn push_text(tokens: &mut Vec<Token>, span: Range<usize>) {
    if !span.is_empty() {
        tokens.push(Token {
            kind: TokenKind::Text,
            span,
        });
    }
}

/// Recognize markup starting at the `<` at `pos`.
fn markup_at(source: &str, pos: usize) -> Option<(TokenKind, usize)> {
    let rest = &source.as_bytes()[pos..];

    if rest.starts_with(b"<!--") {
        let body = pos + 4;
        let end = if rest[4..].starts_with(b">") {
            body + 1
        } else if rest[4..].starts_with(b"->") {
            body + 2
        } else {
            source[body..].find("-->").map_or(source.len(), |i| body + i + 3)
        };
        return Some((TokenKind::Comment, end));
    }

    match *rest.get(1)? {
        b'!' | b'?' => {
            let end = source[pos..].find('>').map_or(source.len(), |i| pos + i + 1);
            let kind = if rest
                .get(..9)
                .is_some_and(|head| head.eq_ignore_ascii_case(b"<!doctype"))
            {
                TokenKind::Doctype
            } else {
                TokenKind::Comment
            };
            Some((kind, end))
        }
        b'/' if rest.get(2).is_some_and(u8::is_ascii_alphabetic) => {
            let (name, after) = tag_name(source, pos + 2);
            let (end, _) = tag_end(source, after);
            Some((TokenKind::EndTag { name }, end))
        }
        c if c.is_ascii_alphabetic() => {
            let (name, after) = tag_name(source, pos + 1);
            let (end, self_closing) = tag_end(source, after);
            Some((TokenKind::StartTag { name, self_closing }, end))
        }
        _ => None,
    }
}

fn tag_name(source: &str, start: usize) -> (String, usize) {
    let bytes = source.as_bytes();
    let end = bytes[start..]
        .iter()
        .position(|b| b.is_ascii_whitespace() || matches!(b, b'/' | b'>'))
        .map_or(bytes.len(), |i| start + i);
    (source[start..end].to_ascii_lowercase(), end)
}

/// Find the `>` closing a tag, skipping quoted attribute values.
///
/// Returns the index after it and whether the tag ended with `/>`.
fn tag_end(source: &str, start: usize) -> (usize, bool) {
    let bytes = source.as_bytes();
    let mut quote = None;
    // Last byte outside quotes that is not whitespace.
    let mut prev = b' ';

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
                prev = b;
            }
            continue;
        }
        match b {
            b'"' | b'\'' if prev == b'=' => quote = Some(b),
            b'>' => return (i + 1, prev == b'/'),
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            prev = b;
        }
    }
    (bytes.len(), false)
}

/// Start of the end tag `</name` closing a raw text element.
fn find_end_tag(source: &str, from: usize, name: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut at = from;

    while let Some(offset) = source[at..].find("</") {
        let open = at + offset;
        let name_end = open + 2 + name.len();
        let name_matches = bytes
            .get(open + 2..name_end)
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()));
        let terminated = bytes
            .get(name_end)
            .is_none_or(|b| b.is_ascii_whitespace() || matches!(b, b'/' | b'>'));
        if name_matches && terminated {
            return Some(open);
        }
        at = open + 2;
    }
    None
}
