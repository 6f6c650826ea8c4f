//! Text normalization.
//!
//! Produces a single clean text stream: paragraphs separated by exactly one
//! [`PARAGRAPH_SEPARATOR`], words inside a paragraph separated by exactly
//! one space, no control or zero-width characters.

use crate::error::ParseError;
use crate::extract;
use crate::models::DocumentKind;

pub const PARAGRAPH_SEPARATOR: char = '\n';

/// Extract and normalize a document in one step.
pub fn normalize_document(bytes: &[u8], kind: Option<DocumentKind>) -> Result<String, ParseError> {
    let kind = kind.ok_or_else(|| ParseError::UnsupportedKind("unknown extension".to_string()))?;
    let raw = extract::extract_text(bytes, kind)?;
    Ok(normalize_text(&raw))
}

pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for paragraph in raw.split(is_paragraph_break) {
        let cleaned = clean_paragraph(paragraph);
        if cleaned.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(PARAGRAPH_SEPARATOR);
        }
        out.push_str(&cleaned);
    }
    out
}

fn is_paragraph_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}' | '\u{000B}' | '\u{000C}')
}

/// Characters that render as nothing and must not split or join words.
fn is_invisible(c: char) -> bool {
    c.is_control() || matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}')
}

fn clean_paragraph(paragraph: &str) -> String {
    let mut out = String::with_capacity(paragraph.len());
    let mut pending_space = false;
    for c in paragraph.chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else if is_invisible(c) {
            continue;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_nbsp() {
        assert_eq!(
            normalize_text("  Speaker\u{00A0}1:\t hello   there  "),
            "Speaker 1: hello there"
        );
    }

    #[test]
    fn paragraph_breaks_become_one_separator() {
        assert_eq!(
            normalize_text("first\r\n\r\n\n   \nsecond\u{2029}third"),
            "first\nsecond\nthird"
        );
    }

    #[test]
    fn strips_control_and_zero_width() {
        assert_eq!(normalize_text("a\u{0007}b\u{200B}c \u{FEFF}d"), "abc d");
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert_eq!(normalize_text(" \n\t\r\n \u{00A0}"), "");
    }

    #[test]
    fn unknown_kind_is_parse_error() {
        let err = normalize_document(b"%PDF-1.4", None).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedKind(_)));
    }

    #[test]
    fn plain_text_document() {
        let text = normalize_document(b"Hello\n\n  world ", Some(DocumentKind::PlainText)).unwrap();
        assert_eq!(text, "Hello\nworld");
    }
}
