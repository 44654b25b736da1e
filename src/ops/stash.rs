//! Stash commands.
//!
//! A stash entry is a commit whose tree snapshots the tracked working
//! state, parented on the HEAD it was taken from, recorded at
//! `refs/stash` with one reflog entry per stash (`stash@{0}` is the
//! newest, i.e. the last reflog line).

use grit_odb::{Commit, FileMode, Object, Oid};
use grit_store::Backend as _;

use crate::callbacks::Callbacks;
use crate::checkout;
use crate::errors::{Error, ErrorKind, Result};
use crate::merge::merge_trees;
use crate::refs::{self, UpdateOptions};
use crate::repo::Repository;

const STASH_REF: &str = "refs/stash";

/// Stash tracked working-tree changes and reset to HEAD.
pub fn stash_push(repo: &Repository, message: Option<&str>) -> Result<Oid> {
    let caller = "grit.stashPush";
    let inner = || -> Result<Oid> {
        let head = refs::resolve(repo, "HEAD")?;
        let head_tree = repo.read_commit(&head)?.tree;

        // Snapshot: tracked paths with their current working content.
        let index = repo.index()?;
        let mut entries: Vec<(String, FileMode, Oid)> = Vec::new();
        let mut dirty = false;
        for entry in index.entries().iter().filter(|e| e.stage == 0) {
            match repo.backend().read_workdir_file(&entry.path)? {
                Some(raw) => {
                    let cleaned = crate::filters::clean(repo, &entry.path, &raw)?;
                    let oid = repo.write_object(grit_odb::ObjectKind::Blob, &cleaned)?;
                    if oid != entry.oid {
                        dirty = true;
                    }
                    entries.push((
                        entry.path.clone(),
                        FileMode::from_u32(entry.mode).unwrap_or(FileMode::Regular),
                        oid,
                    ));
                }
                None => dirty = true, // Deleted locally: absent from the snapshot.
            }
        }
        let snapshot_tree = repo.build_tree(&entries)?;
        if !dirty && snapshot_tree == head_tree {
            return Err(Error::new(ErrorKind::NotFound {
                kind: "local changes",
                id: "nothing to stash".to_owned(),
            }));
        }

        let author = repo.signature(None, None)?;
        let branch = refs::current_branch(repo)?
            .and_then(|b| b.strip_prefix("refs/heads/").map(ToOwned::to_owned))
            .unwrap_or_else(|| "HEAD".to_owned());
        let message = match message {
            Some(m) => format!("On {branch}: {m}"),
            None => {
                let summary = repo.read_commit(&head)?.summary().to_owned();
                format!("WIP on {branch}: {summary}")
            }
        };
        let stash_commit = Commit {
            tree: snapshot_tree,
            parents: vec![head],
            author: author.clone(),
            committer: author,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: format!("{message}\n"),
        };
        let oid = repo.write_parsed(&Object::Commit(stash_commit))?;
        refs::update(
            repo,
            STASH_REF,
            oid,
            &UpdateOptions {
                message: &message,
                suppress_reflog: true,
                ..UpdateOptions::default()
            },
        )?;
        // The stash ref logs unconditionally; stash identity lives in
        // the reflog.
        let line = format!(
            "{} {} {}\t{message}",
            refs::read_reflog(repo, STASH_REF)?
                .last()
                .map_or_else(|| repo.zero_oid().to_hex(), |e| e.new.to_hex()),
            oid.to_hex(),
            repo.signature(None, None)?.to_header_value()
        );
        repo.backend().append_reflog(STASH_REF, &line)?;

        // Reset the working tree to HEAD.
        let options = checkout::CheckoutOptions {
            force: true,
            ..checkout::CheckoutOptions::default()
        };
        let plan = checkout::plan(repo, Some(snapshot_tree), head_tree, &options)?;
        checkout::execute(repo, &plan, &options)?;
        Ok(oid)
    };
    inner().map_err(|e| e.with_caller(caller))
}

/// Stash messages, newest first (`stash@{0}` first).
pub fn stash_list(repo: &Repository) -> Result<Vec<String>> {
    let mut entries = refs::read_reflog(repo, STASH_REF)
        .map_err(|e| e.with_caller("grit.stashList"))?;
    entries.reverse();
    Ok(entries.into_iter().map(|e| e.message).collect())
}

fn stash_commit_at(repo: &Repository, position: usize) -> Result<Oid> {
    let entries = refs::read_reflog(repo, STASH_REF)?;
    if position >= entries.len() {
        return Err(Error::new(ErrorKind::NotFound {
            kind: "stash",
            id: format!("stash@{{{position}}}"),
        }));
    }
    Ok(entries[entries.len() - 1 - position].new)
}

/// Re-apply a stash onto the current HEAD, keeping the entry.
pub fn stash_apply(repo: &Repository, position: usize) -> Result<()> {
    let caller = "grit.stashApply";
    let inner = || -> Result<()> {
        let stash_oid = stash_commit_at(repo, position)?;
        let stash = repo.read_commit(&stash_oid)?;
        let base_tree = match stash.parents.first() {
            Some(parent) => repo.read_commit(parent)?.tree,
            None => repo.build_tree(&[])?,
        };
        let head = refs::resolve(repo, "HEAD")?;
        let head_tree = repo.read_commit(&head)?.tree;

        let outcome = merge_trees(
            repo,
            base_tree,
            head_tree,
            stash.tree,
            "Updated upstream",
            "Stashed changes",
            repo.config().conflict_style(),
            &mut Callbacks::new(),
        )?;
        let mut index = (*repo.index()?).clone();
        for (path, mode, oid) in &outcome.entries {
            let changed = index.get(path, 0).is_none_or(|e| e.oid != *oid);
            if changed {
                let content = repo.read_blob(oid)?;
                let content = crate::filters::smudge(repo, path, &content)?;
                repo.backend().write_workdir_file(
                    path,
                    &content,
                    *mode == FileMode::Executable,
                )?;
            }
            let stat = repo.backend().stat_workdir(path)?.unwrap_or_default();
            index.insert(path, *oid, mode.as_u32(), stat);
        }
        let mut conflict_paths = Vec::new();
        for conflict in &outcome.conflicts {
            conflict_paths.push(conflict.path.clone());
            index.stage_conflict(&conflict.path, conflict.base, conflict.ours, conflict.theirs);
            if let Some(markers) = &conflict.markers {
                repo.backend().write_workdir_file(&conflict.path, markers, false)?;
            }
        }
        repo.write_index(&index)?;
        if conflict_paths.is_empty() {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::MergeConflict {
                paths: conflict_paths,
            }))
        }
    };
    inner().map_err(|e| e.with_caller(caller))
}

/// Remove a stash entry without applying it.
pub fn stash_drop(repo: &Repository, position: usize) -> Result<()> {
    let caller = "grit.stashDrop";
    let inner = || -> Result<()> {
        let entries = refs::read_reflog(repo, STASH_REF)?;
        if position >= entries.len() {
            return Err(Error::new(ErrorKind::NotFound {
                kind: "stash",
                id: format!("stash@{{{position}}}"),
            }));
        }
        let keep: Vec<_> = entries
            .iter()
            .enumerate()
            .filter(|(i, _)| entries.len() - 1 - i != position)
            .map(|(_, e)| e)
            .collect();
        repo.backend().delete_reflog(STASH_REF)?;
        if let Some(newest) = keep.last() {
            for entry in &keep {
                let line = format!(
                    "{} {} {}\t{}",
                    entry.old.to_hex(),
                    entry.new.to_hex(),
                    entry.committer.to_header_value(),
                    entry.message
                );
                repo.backend().append_reflog(STASH_REF, &line)?;
            }
            refs::update(
                repo,
                STASH_REF,
                newest.new,
                &UpdateOptions {
                    suppress_reflog: true,
                    ..UpdateOptions::default()
                },
            )?;
        } else {
            refs::delete(repo, STASH_REF)?;
        }
        Ok(())
    };
    inner().map_err(|e| e.with_caller(caller))
}

/// Apply then drop `stash@{position}`.
pub fn stash_pop(repo: &Repository, position: usize) -> Result<()> {
    stash_apply(repo, position)?;
    stash_drop(repo, position).map_err(|e| e.with_caller("grit.stashPop"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{CommitParams, add, commit};
    use crate::repo::InitOptions;
    use grit_store::MemoryBackend;

    fn repo_with_commit() -> Repository {
        let repo = Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks();
        repo.update_config(|c| {
            c.set("user.name", "T")?;
            c.set("user.email", "t@e.c")
        })
        .unwrap();
        repo.backend().write_workdir_file("f.txt", b"base\n", false).unwrap();
        add(&repo, &["f.txt"]).unwrap();
        commit(
            &repo,
            &CommitParams {
                message: "base",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();
        repo
    }

    #[test]
    fn push_resets_worktree_and_apply_restores() {
        let repo = repo_with_commit();
        repo.backend()
            .write_workdir_file("f.txt", b"work in progress\n", false)
            .unwrap();
        stash_push(&repo, Some("wip")).unwrap();
        assert_eq!(
            repo.backend().read_workdir_file("f.txt").unwrap(),
            Some(b"base\n".to_vec())
        );
        assert_eq!(stash_list(&repo).unwrap().len(), 1);

        stash_apply(&repo, 0).unwrap();
        assert_eq!(
            repo.backend().read_workdir_file("f.txt").unwrap(),
            Some(b"work in progress\n".to_vec())
        );
        // Apply keeps the entry; pop would drop it.
        assert_eq!(stash_list(&repo).unwrap().len(), 1);
    }

    #[test]
    fn pop_drops_entry() {
        let repo = repo_with_commit();
        repo.backend()
            .write_workdir_file("f.txt", b"change\n", false)
            .unwrap();
        stash_push(&repo, None).unwrap();
        stash_pop(&repo, 0).unwrap();
        assert!(stash_list(&repo).unwrap().is_empty());
        assert!(refs::resolve_opt(&repo, STASH_REF).unwrap().is_none());
    }

    #[test]
    fn nothing_to_stash_errors() {
        let repo = repo_with_commit();
        assert!(stash_push(&repo, None).is_err());
    }

    #[test]
    fn drop_middle_entry_keeps_others() {
        let repo = repo_with_commit();
        for content in [b"one\n".as_slice(), b"two\n", b"three\n"] {
            repo.backend().write_workdir_file("f.txt", content, false).unwrap();
            stash_push(&repo, Some(std::str::from_utf8(content).unwrap().trim())).unwrap();
        }
        assert_eq!(stash_list(&repo).unwrap().len(), 3);
        // stash@{1} is "two".
        stash_drop(&repo, 1).unwrap();
        let remaining = stash_list(&repo).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining[0].contains("three"));
        assert!(remaining[1].contains("one"));
    }
}
