//! Tree-level three-way merge.
//!
//! Given the base, ours, and theirs trees, every path is classified:
//! changes on one side win, identical changes collapse, and both-sides
//! changes go through the text merge (mode and content resolved
//! independently, so a mode flip on one side combines with a content
//! edit on the other without conflict). Binary content and add/add or
//! modify/delete shapes conflict immediately.
//!
//! The caller (the merge command) turns conflicts into stage-1/2/3 index
//! entries, marker files, and MERGE_HEAD/MERGE_MSG state.

use grit_odb::{FileMode, ObjectKind, Oid};

use crate::callbacks::Callbacks;
use crate::config::ConflictStyle;
use crate::errors::Result;
use crate::filters::is_binary;
use crate::repo::Repository;
use crate::revwalk;
use crate::text_merge;
use crate::walk::{TreeSource, walk};

/// How a merge of two commits can proceed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeAnalysis {
    /// Theirs is already reachable from ours.
    UpToDate,
    /// Ours is an ancestor of theirs: move the ref, no new commit.
    FastForward,
    /// Histories diverged from `base` (`None` for unrelated histories).
    Diverged {
        /// Best common ancestor.
        base: Option<Oid>,
    },
}

/// Classify the relationship between `ours` and `theirs`.
pub fn analyze(repo: &Repository, ours: Oid, theirs: Oid) -> Result<MergeAnalysis> {
    if ours == theirs || revwalk::is_descendant(repo, theirs, ours)? {
        return Ok(MergeAnalysis::UpToDate);
    }
    if revwalk::is_descendant(repo, ours, theirs)? {
        return Ok(MergeAnalysis::FastForward);
    }
    Ok(MergeAnalysis::Diverged {
        base: revwalk::merge_base(repo, ours, theirs)?,
    })
}

/// One side of an unresolved path.
pub type Side = Option<(Oid, u32)>;

/// A path the merge could not resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeConflictEntry {
    /// The path.
    pub path: String,
    /// Base side (stage 1).
    pub base: Side,
    /// Our side (stage 2).
    pub ours: Side,
    /// Their side (stage 3).
    pub theirs: Side,
    /// Marker-bearing content to materialize, when the conflict came
    /// from the text merge.
    pub markers: Option<Vec<u8>>,
}

/// The outcome of merging three trees.
#[derive(Clone, Debug, Default)]
pub struct TreeMergeOutcome {
    /// Cleanly merged `(path, mode, oid)` entries.
    pub entries: Vec<(String, FileMode, Oid)>,
    /// Unresolved paths.
    pub conflicts: Vec<MergeConflictEntry>,
}

impl TreeMergeOutcome {
    /// Whether every path resolved.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

const BASE_SLOT: usize = 0;
const OURS_SLOT: usize = 1;
const THEIRS_SLOT: usize = 2;

/// Merge `ours` and `theirs` against `base` (an empty tree when the
/// histories are unrelated).
pub fn merge_trees(
    repo: &Repository,
    base: Oid,
    ours: Oid,
    theirs: Oid,
    ours_label: &str,
    theirs_label: &str,
    style: ConflictStyle,
    callbacks: &mut Callbacks,
) -> Result<TreeMergeOutcome> {
    let items = walk(
        repo,
        &[
            TreeSource::Tree(base),
            TreeSource::Tree(ours),
            TreeSource::Tree(theirs),
        ],
    )?;
    let mut outcome = TreeMergeOutcome::default();

    for item in &items {
        let path = item.path.clone();
        let base_entry = item
            .entry(BASE_SLOT)
            .map(|e| Ok::<_, crate::errors::Error>((e.oid(repo)?, e.mode())))
            .transpose()?;
        let ours_entry = item
            .entry(OURS_SLOT)
            .map(|e| Ok::<_, crate::errors::Error>((e.oid(repo)?, e.mode())))
            .transpose()?;
        let theirs_entry = item
            .entry(THEIRS_SLOT)
            .map(|e| Ok::<_, crate::errors::Error>((e.oid(repo)?, e.mode())))
            .transpose()?;

        fn push(outcome: &mut TreeMergeOutcome, path: &str, (oid, mode): (Oid, u32)) {
            let mode = FileMode::from_u32(mode).unwrap_or(FileMode::Regular);
            outcome.entries.push((path.to_owned(), mode, oid));
        }

        match (base_entry, ours_entry, theirs_entry) {
            // Untouched or same on both sides.
            (_, Some(o), Some(t)) if o == t => push(&mut outcome, &path, o),
            (Some(b), Some(o), Some(t)) => {
                if o == b {
                    push(&mut outcome, &path, t);
                } else if t == b {
                    push(&mut outcome, &path, o);
                } else {
                    merge_both_changed(
                        repo,
                        &mut outcome,
                        &path,
                        b,
                        o,
                        t,
                        ours_label,
                        theirs_label,
                        style,
                        callbacks,
                    )?;
                }
            }
            // Added on one side only.
            (None, Some(o), None) => push(&mut outcome, &path, o),
            (None, None, Some(t)) => push(&mut outcome, &path, t),
            // Added on both sides.
            (None, Some(o), Some(t)) => {
                // o != t here (the equal case matched above).
                outcome.conflicts.push(MergeConflictEntry {
                    path,
                    base: None,
                    ours: Some(o),
                    theirs: Some(t),
                    markers: None,
                });
            }
            // Deleted on both sides.
            (Some(_), None, None) => {}
            // Deleted on one side.
            (Some(b), Some(o), None) => {
                if o == b {
                    // They deleted an unchanged file: accept the delete.
                } else {
                    outcome.conflicts.push(MergeConflictEntry {
                        path,
                        base: Some(b),
                        ours: Some(o),
                        theirs: None,
                        markers: None,
                    });
                }
            }
            (Some(b), None, Some(t)) => {
                if t == b {
                    // We deleted an unchanged file: keep it deleted.
                } else {
                    outcome.conflicts.push(MergeConflictEntry {
                        path,
                        base: Some(b),
                        ours: None,
                        theirs: Some(t),
                        markers: None,
                    });
                }
            }
            (None, None, None) => {}
        }
    }
    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn merge_both_changed(
    repo: &Repository,
    outcome: &mut TreeMergeOutcome,
    path: &str,
    base: (Oid, u32),
    ours: (Oid, u32),
    theirs: (Oid, u32),
    ours_label: &str,
    theirs_label: &str,
    style: ConflictStyle,
    callbacks: &mut Callbacks,
) -> Result<()> {
    // Modes resolve independently of content: a flip on one side wins.
    let merged_mode = if ours.1 == base.1 {
        theirs.1
    } else if theirs.1 == base.1 || ours.1 == theirs.1 {
        ours.1
    } else {
        // Both flipped to different modes.
        outcome.conflicts.push(MergeConflictEntry {
            path: path.to_owned(),
            base: Some(base),
            ours: Some(ours),
            theirs: Some(theirs),
            markers: None,
        });
        return Ok(());
    };
    let merged_mode = FileMode::from_u32(merged_mode).unwrap_or(FileMode::Regular);

    // Content: same blob on both sides (mode-only divergence) is clean.
    if ours.0 == theirs.0 {
        outcome.entries.push((path.to_owned(), merged_mode, ours.0));
        return Ok(());
    }
    if ours.0 == base.0 {
        outcome.entries.push((path.to_owned(), merged_mode, theirs.0));
        return Ok(());
    }
    if theirs.0 == base.0 {
        outcome.entries.push((path.to_owned(), merged_mode, ours.0));
        return Ok(());
    }

    let base_content = repo.read_blob(&base.0)?;
    let ours_content = repo.read_blob(&ours.0)?;
    let theirs_content = repo.read_blob(&theirs.0)?;

    // A custom merge driver gets the first look.
    if let Some(driven) =
        callbacks.merge_driver(&base_content, &ours_content, &theirs_content, path)
    {
        if driven.clean {
            let oid = repo.write_object(ObjectKind::Blob, &driven.merged)?;
            outcome.entries.push((path.to_owned(), merged_mode, oid));
        } else {
            outcome.conflicts.push(MergeConflictEntry {
                path: path.to_owned(),
                base: Some(base),
                ours: Some(ours),
                theirs: Some(theirs),
                markers: Some(driven.merged),
            });
        }
        return Ok(());
    }

    if is_binary(&base_content) || is_binary(&ours_content) || is_binary(&theirs_content) {
        outcome.conflicts.push(MergeConflictEntry {
            path: path.to_owned(),
            base: Some(base),
            ours: Some(ours),
            theirs: Some(theirs),
            markers: None,
        });
        return Ok(());
    }

    let merged = text_merge::merge(
        &base_content,
        &ours_content,
        &theirs_content,
        ours_label,
        theirs_label,
        style,
    );
    if merged.clean {
        let oid = repo.write_object(ObjectKind::Blob, &merged.content)?;
        outcome.entries.push((path.to_owned(), merged_mode, oid));
    } else {
        outcome.conflicts.push(MergeConflictEntry {
            path: path.to_owned(),
            base: Some(base),
            ours: Some(ours),
            theirs: Some(theirs),
            markers: Some(merged.content),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{InitOptions, Repository};
    use grit_store::MemoryBackend;

    fn repo() -> Repository {
        Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks()
    }

    fn tree_of(repo: &Repository, files: &[(&str, &str, FileMode)]) -> Oid {
        let entries: Vec<(String, FileMode, Oid)> = files
            .iter()
            .map(|(path, content, mode)| {
                let oid = repo
                    .write_object(ObjectKind::Blob, content.as_bytes())
                    .unwrap();
                ((*path).to_owned(), *mode, oid)
            })
            .collect();
        repo.build_tree(&entries).unwrap()
    }

    fn run(
        repo: &Repository,
        base: Oid,
        ours: Oid,
        theirs: Oid,
    ) -> TreeMergeOutcome {
        merge_trees(
            repo,
            base,
            ours,
            theirs,
            "ours",
            "theirs",
            ConflictStyle::Merge,
            &mut Callbacks::new(),
        )
        .unwrap()
    }

    #[test]
    fn one_side_changes_win() {
        let repo = repo();
        let base = tree_of(&repo, &[("f", "base\n", FileMode::Regular)]);
        let ours = tree_of(&repo, &[("f", "changed\n", FileMode::Regular)]);
        let outcome = run(&repo, base, ours, base);
        assert!(outcome.is_clean());
        let blob = repo.read_blob(&outcome.entries[0].2).unwrap();
        assert_eq!(blob, b"changed\n");
    }

    #[test]
    fn mode_change_one_side_content_other_combines() {
        let repo = repo();
        let base = tree_of(&repo, &[("a.txt", "original\n", FileMode::Regular)]);
        let ours = tree_of(&repo, &[("a.txt", "modified\n", FileMode::Regular)]);
        let theirs = tree_of(&repo, &[("a.txt", "original\n", FileMode::Executable)]);
        let outcome = run(&repo, base, ours, theirs);
        assert!(outcome.is_clean());
        let (path, mode, oid) = &outcome.entries[0];
        assert_eq!(path, "a.txt");
        assert_eq!(*mode, FileMode::Executable);
        assert_eq!(repo.read_blob(oid).unwrap(), b"modified\n");
    }

    #[test]
    fn text_merge_combines_distant_edits() {
        let repo = repo();
        let base = tree_of(&repo, &[("f", "1\n2\n3\n4\n5\n", FileMode::Regular)]);
        let ours = tree_of(&repo, &[("f", "ONE\n2\n3\n4\n5\n", FileMode::Regular)]);
        let theirs = tree_of(&repo, &[("f", "1\n2\n3\n4\nFIVE\n", FileMode::Regular)]);
        let outcome = run(&repo, base, ours, theirs);
        assert!(outcome.is_clean());
        assert_eq!(
            repo.read_blob(&outcome.entries[0].2).unwrap(),
            b"ONE\n2\n3\n4\nFIVE\n"
        );
    }

    #[test]
    fn overlapping_edits_conflict_with_sides() {
        let repo = repo();
        let base = tree_of(&repo, &[("f", "line\n", FileMode::Regular)]);
        let ours = tree_of(&repo, &[("f", "ours\n", FileMode::Regular)]);
        let theirs = tree_of(&repo, &[("f", "theirs\n", FileMode::Regular)]);
        let outcome = run(&repo, base, ours, theirs);
        assert_eq!(outcome.conflicts.len(), 1);
        let conflict = &outcome.conflicts[0];
        assert!(conflict.base.is_some() && conflict.ours.is_some() && conflict.theirs.is_some());
        let markers = conflict.markers.as_ref().unwrap();
        let text = String::from_utf8_lossy(markers);
        assert!(text.contains("<<<<<<< ours"));
        assert!(text.contains(">>>>>>> theirs"));
    }

    #[test]
    fn modify_delete_conflicts() {
        let repo = repo();
        let base = tree_of(&repo, &[("f", "base\n", FileMode::Regular)]);
        let ours = tree_of(&repo, &[("f", "edited\n", FileMode::Regular)]);
        let theirs = repo.build_tree(&[]).unwrap();
        let outcome = run(&repo, base, ours, theirs);
        assert_eq!(outcome.conflicts.len(), 1);
        assert!(outcome.conflicts[0].theirs.is_none());
    }

    #[test]
    fn delete_of_unchanged_file_applies() {
        let repo = repo();
        let base = tree_of(&repo, &[("f", "same\n", FileMode::Regular)]);
        let ours = base;
        let theirs = repo.build_tree(&[]).unwrap();
        let outcome = run(&repo, base, ours, theirs);
        assert!(outcome.is_clean());
        assert!(outcome.entries.is_empty());
    }

    #[test]
    fn add_add_different_content_conflicts() {
        let repo = repo();
        let base = repo.build_tree(&[]).unwrap();
        let ours = tree_of(&repo, &[("new", "a\n", FileMode::Regular)]);
        let theirs = tree_of(&repo, &[("new", "b\n", FileMode::Regular)]);
        let outcome = run(&repo, base, ours, theirs);
        assert_eq!(outcome.conflicts.len(), 1);
        assert!(outcome.conflicts[0].base.is_none());
    }

    #[test]
    fn binary_conflict_has_no_markers() {
        let repo = repo();
        let base = tree_of(&repo, &[("bin", "a\0b", FileMode::Regular)]);
        let ours = tree_of(&repo, &[("bin", "a\0c", FileMode::Regular)]);
        let theirs = tree_of(&repo, &[("bin", "a\0d", FileMode::Regular)]);
        let outcome = run(&repo, base, ours, theirs);
        assert_eq!(outcome.conflicts.len(), 1);
        assert!(outcome.conflicts[0].markers.is_none());
    }
}
