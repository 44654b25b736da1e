//! `status`: classify paths across HEAD, the index, and the working
//! tree.

use grit_odb::Oid;
use grit_store::Backend as _;

use crate::errors::Result;
use crate::ignore::IgnoreRules;
use crate::refs;
use crate::repo::Repository;
use crate::walk::{TreeSource, WalkItem, normalize_path, walk};

/// The status of one path. Variants with `Unstaged` describe working-tree
/// changes not yet in the index (git's `*`-prefixed statuses).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
    /// Not present anywhere.
    Absent,
    /// Tracked and identical in HEAD, index, and working tree.
    Unmodified,
    /// In the working tree only, not ignored.
    Untracked,
    /// In the working tree only and matched by ignore rules.
    Ignored,
    /// New file staged; working tree matches the stage.
    Added,
    /// New file staged; working tree has further edits.
    AddedUnstaged,
    /// Change staged; working tree matches the stage.
    Modified,
    /// Working tree differs from the stage (whether or not a change is
    /// also staged).
    ModifiedUnstaged,
    /// Deletion staged and the file is gone.
    Deleted,
    /// File missing from the working tree but still tracked. A tracked
    /// file that is missing *and* ignored also reports this (deletion
    /// wins over ignore status, one consistent rule).
    DeletedUnstaged,
}

/// Status of a single path.
pub fn status(repo: &Repository, path: &str) -> Result<FileState> {
    let caller = "grit.status";
    let path = normalize_path(path).map_err(|e| e.with_caller(caller))?;
    let all = status_entries(repo).map_err(|e| e.with_caller(caller))?;
    Ok(all
        .into_iter()
        .find(|(p, _)| *p == path)
        .map_or(FileState::Absent, |(_, state)| state))
}

/// Status of every path known to HEAD, the index, or the working tree.
/// Unmodified paths are included; callers filter as needed.
pub fn status_list(repo: &Repository) -> Result<Vec<(String, FileState)>> {
    status_entries(repo).map_err(|e| e.with_caller("grit.statusList"))
}

fn status_entries(repo: &Repository) -> Result<Vec<(String, FileState)>> {
    let head_tree = match refs::resolve_opt(repo, "HEAD")? {
        Some(head) => repo.read_commit(&head)?.tree,
        None => repo.build_tree(&[])?,
    };
    let ignore = IgnoreRules::load(repo);
    let items = walk(
        repo,
        &[
            TreeSource::Tree(head_tree),
            TreeSource::Stage,
            TreeSource::Workdir,
        ],
    )?;
    let mut out = Vec::with_capacity(items.len());
    for item in &items {
        let state = classify(repo, item, &ignore)?;
        out.push((item.path.clone(), state));
    }
    Ok(out)
}

const HEAD_SLOT: usize = 0;
const STAGE_SLOT: usize = 1;
const WORKDIR_SLOT: usize = 2;

fn classify(repo: &Repository, item: &WalkItem, ignore: &IgnoreRules) -> Result<FileState> {
    let head = item.entry(HEAD_SLOT);
    let stage = item.entry(STAGE_SLOT);
    let workdir = item.entry(WORKDIR_SLOT);

    // Stat short-circuit: identical cached stat means the workdir copy
    // equals the stage without hashing.
    let workdir_matches_stage = match (workdir, stage) {
        (Some(w), Some(s)) => {
            let stat_match = match (w.stat(), s.stat()) {
                (Some(ws), Some(ss)) => {
                    ss.mtime != 0 && ws.mtime == ss.mtime && ws.size == ss.size
                }
                _ => false,
            };
            stat_match || w.oid(repo)? == s.oid(repo)?
        }
        _ => false,
    };

    let oid_of = |entry: Option<&crate::walk::SourceEntry>| -> Result<Option<Oid>> {
        entry.map(|e| e.oid(repo)).transpose()
    };

    Ok(match (head, stage, workdir) {
        (None, None, Some(_)) => {
            if ignore.is_ignored(&item.path, false) {
                FileState::Ignored
            } else {
                FileState::Untracked
            }
        }
        (None, Some(_), Some(_)) => {
            if workdir_matches_stage {
                FileState::Added
            } else {
                FileState::AddedUnstaged
            }
        }
        (None, Some(_), None) => FileState::DeletedUnstaged,
        (Some(_), None, None) => FileState::Deleted,
        (Some(_), None, Some(_)) => {
            // Deletion staged but the file reappeared (or was never
            // removed).
            FileState::ModifiedUnstaged
        }
        (Some(h), Some(s), Some(_)) => {
            let staged_change = oid_of(Some(h))? != oid_of(Some(s))?;
            if !workdir_matches_stage {
                FileState::ModifiedUnstaged
            } else if staged_change {
                FileState::Modified
            } else {
                FileState::Unmodified
            }
        }
        (Some(_), Some(_), None) => FileState::DeletedUnstaged,
        (None, None, None) => FileState::Absent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Callbacks;
    use crate::ops::{CommitParams, add, commit};
    use crate::repo::InitOptions;
    use grit_store::MemoryBackend;

    fn repo() -> Repository {
        let repo = Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks();
        repo.update_config(|c| {
            c.set("user.name", "T")?;
            c.set("user.email", "t@e.c")
        })
        .unwrap();
        repo
    }

    fn commit_all(repo: &Repository, files: &[(&str, &str)]) {
        for (path, content) in files {
            repo.backend()
                .write_workdir_file(path, content.as_bytes(), false)
                .unwrap();
            add(repo, &[path]).unwrap();
        }
        commit(
            repo,
            &CommitParams {
                message: "snapshot",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();
    }

    #[test]
    fn untracked_vs_ignored() {
        let repo = repo();
        repo.backend()
            .write_workdir_file(".gitignore", b"*.log\n", false)
            .unwrap();
        repo.backend().write_workdir_file("new.txt", b"n", false).unwrap();
        repo.backend().write_workdir_file("debug.log", b"l", false).unwrap();
        assert_eq!(status(&repo, "new.txt").unwrap(), FileState::Untracked);
        assert_eq!(status(&repo, "debug.log").unwrap(), FileState::Ignored);
    }

    #[test]
    fn lifecycle_states() {
        let repo = repo();
        commit_all(&repo, &[("f.txt", "one")]);
        assert_eq!(status(&repo, "f.txt").unwrap(), FileState::Unmodified);

        // Unstaged edit.
        repo.backend().write_workdir_file("f.txt", b"two", false).unwrap();
        assert_eq!(status(&repo, "f.txt").unwrap(), FileState::ModifiedUnstaged);

        // Staged edit.
        add(&repo, &["f.txt"]).unwrap();
        assert_eq!(status(&repo, "f.txt").unwrap(), FileState::Modified);

        // Missing from workdir.
        repo.backend().delete_workdir_file("f.txt").unwrap();
        assert_eq!(status(&repo, "f.txt").unwrap(), FileState::DeletedUnstaged);
    }

    #[test]
    fn added_states() {
        let repo = repo();
        repo.backend().write_workdir_file("new", b"a", false).unwrap();
        add(&repo, &["new"]).unwrap();
        assert_eq!(status(&repo, "new").unwrap(), FileState::Added);
        repo.backend().write_workdir_file("new", b"ab", false).unwrap();
        assert_eq!(status(&repo, "new").unwrap(), FileState::AddedUnstaged);
    }

    #[test]
    fn tracked_missing_but_ignored_reports_deleted() {
        let repo = repo();
        commit_all(&repo, &[("build.log", "x")]);
        repo.backend()
            .write_workdir_file(".gitignore", b"*.log\n", false)
            .unwrap();
        repo.backend().delete_workdir_file("build.log").unwrap();
        // Deletion wins over ignore status.
        assert_eq!(
            status(&repo, "build.log").unwrap(),
            FileState::DeletedUnstaged
        );
    }

    #[test]
    fn absent_path() {
        let repo = repo();
        assert_eq!(status(&repo, "nothing").unwrap(), FileState::Absent);
    }
}
