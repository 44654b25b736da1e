//! Built-in three-way text merge.
//!
//! Both sides are diffed against the common base (line-wise, via
//! `similar`), the change hunks are laid over the base, and
//! non-overlapping changes combine cleanly. Overlapping changes that
//! differ produce conflict markers in either `merge` or `diff3` style
//! (`merge.conflictstyle`). Binary inputs never reach this module; the
//! merge planner stages them as conflicts directly.

use similar::{DiffOp, TextDiff};

use crate::config::ConflictStyle;

/// A merged result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Merged bytes (with markers when not clean).
    pub content: Vec<u8>,
    /// `true` when no conflict markers were emitted.
    pub clean: bool,
}

/// One side's rewrite of a base region.
#[derive(Clone, Debug)]
struct Hunk {
    base_start: usize,
    base_end: usize,
    replacement: Vec<String>,
}

fn script(base: &str, side: &str) -> Vec<Hunk> {
    let diff = TextDiff::from_lines(base, side);
    let side_lines: Vec<&str> = side.split_inclusive('\n').collect();
    let mut hunks: Vec<Hunk> = Vec::new();
    for op in diff.ops() {
        let (base_range, side_range) = (op.old_range(), op.new_range());
        match op {
            DiffOp::Equal { .. } => {}
            _ => {
                let replacement = side_lines[side_range]
                    .iter()
                    .map(|&line| line.to_owned())
                    .collect();
                hunks.push(Hunk {
                    base_start: base_range.start,
                    base_end: base_range.end,
                    replacement,
                });
            }
        }
    }
    hunks
}

/// Merge `ours` and `theirs` against `base`.
#[must_use]
pub fn merge(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    ours_label: &str,
    theirs_label: &str,
    style: ConflictStyle,
) -> MergeOutcome {
    let base_text = String::from_utf8_lossy(base).into_owned();
    let ours_text = String::from_utf8_lossy(ours).into_owned();
    let theirs_text = String::from_utf8_lossy(theirs).into_owned();

    let base_lines: Vec<&str> = base_text.split_inclusive('\n').collect();
    let ours_hunks = script(&base_text, &ours_text);
    let theirs_hunks = script(&base_text, &theirs_text);

    let mut out = String::new();
    let mut clean = true;
    let mut pos = 0usize;
    let (mut i, mut j) = (0usize, 0usize);

    while i < ours_hunks.len() || j < theirs_hunks.len() {
        let next_ours = ours_hunks.get(i);
        let next_theirs = theirs_hunks.get(j);
        // Pick the earlier hunk; detect overlap with the other side.
        let (take_ours, start) = match (next_ours, next_theirs) {
            (Some(a), Some(b)) => {
                if a.base_start <= b.base_start {
                    (true, a.base_start)
                } else {
                    (false, b.base_start)
                }
            }
            (Some(a), None) => (true, a.base_start),
            (None, Some(b)) => (false, b.base_start),
            (None, None) => break,
        };
        // Copy untouched base lines up to the hunk.
        for line in &base_lines[pos..start.min(base_lines.len())] {
            out.push_str(line);
        }
        pos = start;

        // Gather the overlapping cluster: grow the base window while
        // either side has a hunk intersecting it.
        let mut end = start;
        let mut ours_cluster: Vec<&Hunk> = Vec::new();
        let mut theirs_cluster: Vec<&Hunk> = Vec::new();
        loop {
            let mut grew = false;
            while let Some(h) = ours_hunks.get(i) {
                if h.base_start <= end {
                    end = end.max(h.base_end);
                    ours_cluster.push(h);
                    i += 1;
                    grew = true;
                } else {
                    break;
                }
            }
            while let Some(h) = theirs_hunks.get(j) {
                if h.base_start <= end {
                    end = end.max(h.base_end);
                    theirs_cluster.push(h);
                    j += 1;
                    grew = true;
                } else {
                    break;
                }
            }
            if !grew {
                break;
            }
        }

        let ours_region = apply_cluster(&base_lines, start, end, &ours_cluster);
        let theirs_region = apply_cluster(&base_lines, start, end, &theirs_cluster);

        if ours_cluster.is_empty() || (take_ours && theirs_cluster.is_empty()) {
            // Only one side touched the window.
            let only = if ours_cluster.is_empty() {
                &theirs_region
            } else {
                &ours_region
            };
            out.push_str(only);
        } else if theirs_cluster.is_empty() {
            out.push_str(&ours_region);
        } else if ours_region == theirs_region {
            // Both sides made the identical change.
            out.push_str(&ours_region);
        } else {
            clean = false;
            out.push_str(&format!("<<<<<<< {ours_label}\n"));
            push_region(&mut out, &ours_region);
            if style == ConflictStyle::Diff3 {
                out.push_str("||||||| base\n");
                let base_region: String = base_lines[start..end.min(base_lines.len())].concat();
                push_region(&mut out, &base_region);
            }
            out.push_str("=======\n");
            push_region(&mut out, &theirs_region);
            out.push_str(&format!(">>>>>>> {theirs_label}\n"));
        }
        pos = end;
    }
    for line in &base_lines[pos.min(base_lines.len())..] {
        out.push_str(line);
    }

    MergeOutcome {
        content: out.into_bytes(),
        clean,
    }
}

/// Rebuild `[start, end)` of the base with a side's hunks applied.
fn apply_cluster(base_lines: &[&str], start: usize, end: usize, cluster: &[&Hunk]) -> String {
    let mut out = String::new();
    let mut pos = start;
    for hunk in cluster {
        for line in &base_lines[pos.min(base_lines.len())..hunk.base_start.min(base_lines.len())] {
            out.push_str(line);
        }
        for line in &hunk.replacement {
            out.push_str(line);
        }
        pos = hunk.base_end;
    }
    for line in &base_lines[pos.min(base_lines.len())..end.min(base_lines.len())] {
        out.push_str(line);
    }
    out
}

/// Append a region, guaranteeing it ends with a newline so markers stay
/// on their own lines.
fn push_region(out: &mut String, region: &str) {
    out.push_str(region);
    if !region.is_empty() && !region.ends_with('\n') {
        out.push('\n');
    }
}
