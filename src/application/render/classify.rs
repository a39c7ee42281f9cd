//! Content classification.
//!
//! A kind declared by solution metadata is authoritative. Without one, the
//! raw fragment is inspected structurally: math delimiters, LaTeX commands,
//! and how much prose surrounds the formulas.

use serde::Serialize;

use crate::domain::ContentKind;

/// Alphanumeric characters outside `$…$` needed before a fragment counts as
/// prose with embedded math rather than a lone formula.
const MIN_PROSE_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KindSource {
    Metadata,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ContentKind,
    pub source: KindSource,
}

pub fn classify(raw: &str, declared: Option<ContentKind>) -> Classification {
    match declared {
        Some(kind) => Classification {
            kind,
            source: KindSource::Metadata,
        },
        None => Classification {
            kind: detect(raw),
            source: KindSource::Heuristic,
        },
    }
}

/// Structural detection, ignoring any metadata.
pub fn detect(raw: &str) -> ContentKind {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ContentKind::Text;
    }

    // An unmatched `$` ("costs $5") stays in the prose.
    let segments = split_segments(trimmed);
    if !segments.iter().any(Segment::is_math) {
        return if looks_like_latex(trimmed) {
            ContentKind::PureLatex
        } else {
            ContentKind::Text
        };
    }

    let prose_chars: usize = segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Prose(text) => Some(text.chars().filter(|c| c.is_alphanumeric()).count()),
            _ => None,
        })
        .sum();

    if prose_chars >= MIN_PROSE_CHARS {
        ContentKind::MixedContent
    } else {
        ContentKind::InlineMath
    }
}

/// Piece of a fragment split on `$` delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Prose(&'a str),
    /// Body of `$…$`.
    Inline(&'a str),
    /// Body of `$$…$$`.
    Display(&'a str),
}

impl Segment<'_> {
    pub(crate) fn is_math(&self) -> bool {
        !matches!(self, Segment::Prose(_))
    }
}

/// Split on unescaped `$` / `$$`. A delimiter that is never closed is
/// literal text, so the rest of the fragment becomes prose.
pub(crate) fn split_segments(raw: &str) -> Vec<Segment<'_>> {
    let bytes = raw.as_bytes();
    let mut segments = Vec::new();
    let mut prose_start = 0;
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            b'$' => {
                let display = bytes.get(index + 1) == Some(&b'$');
                let width = if display { 2 } else { 1 };
                let body_start = index + width;
                let Some(close) = find_closing(bytes, body_start, display) else {
                    break;
                };
                if prose_start < index {
                    segments.push(Segment::Prose(&raw[prose_start..index]));
                }
                let body = &raw[body_start..close];
                segments.push(if display {
                    Segment::Display(body)
                } else {
                    Segment::Inline(body)
                });
                index = close + width;
                prose_start = index;
            }
            _ => index += 1,
        }
    }

    if prose_start < bytes.len() {
        segments.push(Segment::Prose(&raw[prose_start..]));
    }
    segments
}

fn find_closing(bytes: &[u8], from: usize, display: bool) -> Option<usize> {
    let mut index = from;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            b'$' if !display => return Some(index),
            b'$' if bytes.get(index + 1) == Some(&b'$') => return Some(index),
            _ => index += 1,
        }
    }
    None
}

fn looks_like_latex(source: &str) -> bool {
    braces_balanced(source) && (has_command(source) || source.contains("^{") || source.contains("_{"))
}

fn has_command(source: &str) -> bool {
    source
        .as_bytes()
        .windows(2)
        .any(|pair| pair[0] == b'\\' && pair[1].is_ascii_alphabetic())
}

fn braces_balanced(source: &str) -> bool {
    let bytes = source.as_bytes();
    let mut depth: usize = 0;
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => {
                index += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' => match depth.checked_sub(1) {
                Some(next) => depth = next,
                None => return false,
            },
            _ => {}
        }
        index += 1;
    }
    depth == 0
}
