//! Compact annotation format for word diffs.
//!
//! An annotation is a list of segments joined by [`DELIMITER`]. A segment is
//! one token, prefixed with `+` when it was added, `-` when it was removed,
//! and left bare when it is unchanged context. Backslash escapes keep token
//! text from colliding with the delimiter or with the tag characters:
//!
//! - `\\` is a literal backslash
//! - `\s` is the delimiter character
//! - `\+` and `\-` are a literal leading `+` or `-`

use serde::{Deserialize, Serialize};

use super::DiffLine;
use crate::{Error, Result};

/// Two ASCII record separators. Never produced by scraped article text, and
/// escaped when it is.
pub const DELIMITER: &str = "\u{1e}\u{1e}";

const SEPARATOR: char = '\u{1e}';
const ESCAPE: char = '\\';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentTag {
    Added,
    Removed,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub tag: SegmentTag,
    pub text: String,
}

impl Segment {
    fn new(tag: SegmentTag, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }
}

fn escape(token: &str) -> String {
    let mut out = String::with_capacity(token.len() + 1);
    if token.starts_with('+') || token.starts_with('-') {
        out.push(ESCAPE);
    }
    for c in token.chars() {
        match c {
            ESCAPE => out.push_str("\\\\"),
            SEPARATOR => out.push_str("\\s"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(ESCAPE) => out.push(ESCAPE),
            Some('s') => out.push(SEPARATOR),
            Some(c @ ('+' | '-')) => out.push(c),
            Some(other) => {
                return Err(Error::Annotation(format!("unknown escape \\{}", other)));
            }
            None => return Err(Error::Annotation("dangling escape".to_string())),
        }
    }
    Ok(out)
}

/// Encodes the content lines of a unified diff. File and hunk headers are
/// dropped; a diff without content encodes to an empty string.
pub fn encode(lines: &[DiffLine]) -> String {
    let segments: Vec<String> = lines
        .iter()
        .filter_map(|line| match line {
            DiffLine::Added(t) => Some(format!("+{}", escape(t))),
            DiffLine::Removed(t) => Some(format!("-{}", escape(t))),
            DiffLine::Context(t) => Some(escape(t)),
            DiffLine::FileHeader { .. } | DiffLine::HunkHeader { .. } => None,
        })
        .collect();
    segments.join(DELIMITER)
}

/// Builds the annotation for a changed field: a full-context word diff so the
/// annotation alone is enough to rebuild both versions.
pub fn annotate(previous: &str, current: &str) -> String {
    encode(&super::unified(previous, current, usize::MAX))
}

pub fn decode(encoded: &str) -> Result<Vec<Segment>> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    encoded
        .split(DELIMITER)
        .map(|raw| {
            let segment = if let Some(rest) = raw.strip_prefix('+') {
                Segment::new(SegmentTag::Added, unescape(rest)?)
            } else if let Some(rest) = raw.strip_prefix('-') {
                Segment::new(SegmentTag::Removed, unescape(rest)?)
            } else {
                Segment::new(SegmentTag::Context, unescape(raw)?)
            };
            if segment.text.is_empty() {
                return Err(Error::Annotation("empty segment".to_string()));
            }
            Ok(segment)
        })
        .collect()
}

/// Segments shown on the "before" side: removals and context.
pub fn previous_panel(encoded: &str) -> Result<Vec<Segment>> {
    Ok(decode(encoded)?
        .into_iter()
        .filter(|s| s.tag != SegmentTag::Added)
        .collect())
}

/// Segments shown on the "after" side: additions and context.
pub fn current_panel(encoded: &str) -> Result<Vec<Segment>> {
    Ok(decode(encoded)?
        .into_iter()
        .filter(|s| s.tag != SegmentTag::Removed)
        .collect())
}

fn join(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rebuilds the previous text, with tokens joined by single spaces.
pub fn reconstruct_previous(encoded: &str) -> Result<String> {
    Ok(join(&previous_panel(encoded)?))
}

/// Rebuilds the current text, with tokens joined by single spaces.
pub fn reconstruct_current(encoded: &str) -> Result<String> {
    Ok(join(&current_panel(encoded)?))
}
