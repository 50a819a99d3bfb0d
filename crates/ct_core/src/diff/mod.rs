//! Word-level diffing of article text.
//!
//! Texts are split on whitespace and compared token by token with a longest
//! common subsequence edit script. The script can be rendered as classic
//! unified-diff lines, which is also what the annotation encoder consumes.

pub mod encoding;

use std::fmt;

use tracing::debug;

pub use encoding::{annotate, decode, encode, Segment, SegmentTag, DELIMITER};

pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit<'a> {
    Equal(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

impl Edit<'_> {
    fn is_change(&self) -> bool {
        !matches!(self, Edit::Equal(_))
    }

    fn in_previous(&self) -> bool {
        !matches!(self, Edit::Added(_))
    }

    fn in_current(&self) -> bool {
        !matches!(self, Edit::Removed(_))
    }
}

/// Computes a minimal edit script turning `previous` into `current`.
///
/// Inside a changed region removals come before additions.
pub fn edit_script<'a>(previous: &[&'a str], current: &[&'a str]) -> Vec<Edit<'a>> {
    edit_script_with_budget(previous, current, MAX_LCS_CELLS)
}

/// Upper bound on LCS table cells (64 MB of u32). Larger changed regions are
/// reported as one removal followed by one addition.
const MAX_LCS_CELLS: usize = 16_000_000;

fn edit_script_with_budget<'a>(
    previous: &[&'a str],
    current: &[&'a str],
    budget: usize,
) -> Vec<Edit<'a>> {
    let prefix = previous
        .iter()
        .zip(current)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = previous[prefix..]
        .iter()
        .rev()
        .zip(current[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old = &previous[prefix..previous.len() - suffix];
    let new = &current[prefix..current.len() - suffix];

    let mut script = Vec::with_capacity(prefix + old.len() + new.len() + suffix);
    script.extend(previous[..prefix].iter().map(|t| Edit::Equal(*t)));

    let width = new.len() + 1;
    let cells = (old.len() + 1).saturating_mul(width);
    if cells > budget {
        debug!("Changed region spans {} cells, skipping alignment", cells);
        script.extend(old.iter().map(|t| Edit::Removed(*t)));
        script.extend(new.iter().map(|t| Edit::Added(*t)));
        script.extend(previous[previous.len() - suffix..].iter().map(|t| Edit::Equal(*t)));
        return script;
    }

    // lcs[i * width + j] is the LCS length of old[i..] and new[j..]
    let mut lcs = vec![0u32; (old.len() + 1) * width];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i * width + j] = if old[i] == new[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            script.push(Edit::Equal(old[i]));
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            script.push(Edit::Removed(old[i]));
            i += 1;
        } else {
            script.push(Edit::Added(new[j]));
            j += 1;
        }
    }
    script.extend(old[i..].iter().map(|t| Edit::Removed(*t)));
    script.extend(new[j..].iter().map(|t| Edit::Added(*t)));

    script.extend(previous[previous.len() - suffix..].iter().map(|t| Edit::Equal(*t)));
    script
}

/// One line of a unified diff over tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    FileHeader { marker: char, label: String },
    HunkHeader { previous: (usize, usize), current: (usize, usize) },
    Context(String),
    Removed(String),
    Added(String),
}

impl DiffLine {
    pub fn is_header(&self) -> bool {
        matches!(self, DiffLine::FileHeader { .. } | DiffLine::HunkHeader { .. })
    }
}

fn format_range(start: usize, len: usize) -> String {
    let beginning = start + 1;
    match len {
        0 => format!("{},0", beginning - 1),
        1 => beginning.to_string(),
        _ => format!("{},{}", beginning, len),
    }
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffLine::FileHeader { marker, label } => {
                let m = marker.to_string().repeat(3);
                write!(f, "{} {}", m, label)
            }
            DiffLine::HunkHeader { previous, current } => write!(
                f,
                "@@ -{} +{} @@",
                format_range(previous.0, previous.1),
                format_range(current.0, current.1)
            ),
            DiffLine::Context(token) => write!(f, " {}", token),
            DiffLine::Removed(token) => write!(f, "-{}", token),
            DiffLine::Added(token) => write!(f, "+{}", token),
        }
    }
}

/// Renders the token diff of two texts as unified-diff lines with `context`
/// unchanged tokens around each change. Identical texts render to nothing.
pub fn unified(previous: &str, current: &str, context: usize) -> Vec<DiffLine> {
    let old = tokenize(previous);
    let new = tokenize(current);
    let script = edit_script(&old, &new);

    let changes: Vec<usize> = script
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_change())
        .map(|(k, _)| k)
        .collect();
    let Some(&first) = changes.first() else {
        return Vec::new();
    };

    // Token offsets into each side at every script position.
    let mut offsets = Vec::with_capacity(script.len() + 1);
    let (mut o, mut n) = (0, 0);
    for edit in &script {
        offsets.push((o, n));
        o += usize::from(edit.in_previous());
        n += usize::from(edit.in_current());
    }
    offsets.push((o, n));

    let mut groups = Vec::new();
    let (mut start, mut end) = (first, first);
    for &k in &changes[1..] {
        if k - end - 1 > context.saturating_mul(2) {
            groups.push((start, end));
            start = k;
        }
        end = k;
    }
    groups.push((start, end));

    let mut lines = vec![
        DiffLine::FileHeader { marker: '-', label: "previous".to_string() },
        DiffLine::FileHeader { marker: '+', label: "current".to_string() },
    ];
    for (first_change, last_change) in groups {
        let lo = first_change.saturating_sub(context);
        let hi = last_change.saturating_add(context).saturating_add(1).min(script.len());
        let (old_lo, new_lo) = offsets[lo];
        let (old_hi, new_hi) = offsets[hi];
        lines.push(DiffLine::HunkHeader {
            previous: (old_lo, old_hi - old_lo),
            current: (new_lo, new_hi - new_lo),
        });
        lines.extend(script[lo..hi].iter().map(|edit| match *edit {
            Edit::Equal(t) => DiffLine::Context(t.to_string()),
            Edit::Removed(t) => DiffLine::Removed(t.to_string()),
            Edit::Added(t) => DiffLine::Added(t.to_string()),
        }));
    }
    lines
}
