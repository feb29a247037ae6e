//! HTML utility functions.
//!
//! Provides common HTML classification and escaping helpers:
//! - `escape_attr()` - attribute value escaping
//! - `is_raw_text_element()` - elements whose contents are never markup
//! - `is_metadata_element()` - elements that belong in `<head>`
//! - `is_javascript_type()` - `<script type>` values that hold JavaScript

use std::borrow::Cow;

// =============================================================================
// HTML Escaping
// =============================================================================

/// Characters that require escaping in attribute values.
const ESCAPE_CHARS: [char; 5] = ['<', '>', '&', '"', '\''];

/// Get the HTML entity for a special character.
#[inline]
fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '&' => Some("&amp;"),
        '"' => Some("&quot;"),
        '\'' => Some("&#39;"),
        _ => None,
    }
}

/// Escape HTML attribute values.
///
/// Uses `Cow` to avoid allocation when no escaping is needed.
#[inline]
pub fn escape_attr(s: &str) -> Cow<'_, str> {
    if !s.contains(ESCAPE_CHARS) {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match escape_char(c) {
            Some(entity) => result.push_str(entity),
            None => result.push(c),
        }
    }
    Cow::Owned(result)
}

// =============================================================================
// Element Classification
// =============================================================================

/// Check if tag is a raw text or escapable raw text element.
///
/// Its contents run to the matching end tag and are never parsed as markup,
/// so `<` inside a script or a title is plain text.
#[inline]
pub fn is_raw_text_element(tag: &str) -> bool {
    matches!(
        tag,
        "script" | "style" | "textarea" | "title" | "xmp" | "iframe" | "noembed" | "noframes"
    )
}

/// Check if whitespace inside the element is significant.
#[inline]
pub fn is_whitespace_sensitive(tag: &str) -> bool {
    matches!(tag, "pre" | "textarea") || is_raw_text_element(tag)
}

/// Check if tag is metadata content that an HTML parser places in `<head>`.
#[inline]
pub fn is_metadata_element(tag: &str) -> bool {
    matches!(
        tag,
        "base" | "link" | "meta" | "noscript" | "script" | "style" | "template" | "title"
    )
}

/// Check if a `<script type>` value denotes JavaScript.
///
/// A missing type is JavaScript; so are the legacy MIME types and `module`.
pub fn is_javascript_type(script_type: Option<&str>) -> bool {
    let Some(ty) = script_type else {
        return true;
    };
    matches!(
        ty.trim().to_ascii_lowercase().as_str(),
        "" | "module"
            | "text/javascript"
            | "application/javascript"
            | "application/ecmascript"
            | "text/ecmascript"
    )
}
