//! `cherry-pick`: replay one commit onto HEAD.

use grit_odb::{Commit, FileMode, Object, Oid};
use grit_store::Backend as _;

use crate::callbacks::Callbacks;
use crate::errors::{Error, ErrorKind, Result};
use crate::merge::merge_trees;
use crate::refs::{self, UpdateOptions};
use crate::repo::Repository;

/// Apply the changes of `rev` (relative to its first parent) onto HEAD
/// and commit with the original message. On conflict,
/// CHERRY_PICK_HEAD and the conflict stages are recorded and the error
/// carries the paths.
pub fn cherry_pick(repo: &Repository, rev: &str, callbacks: &mut Callbacks) -> Result<Oid> {
    let caller = "grit.cherryPick";
    cherry_pick_inner(repo, rev, callbacks).map_err(|e| e.with_caller(caller))
}

fn cherry_pick_inner(repo: &Repository, rev: &str, callbacks: &mut Callbacks) -> Result<Oid> {
    let picked_oid = refs::resolve(repo, rev)?;
    let picked = repo.read_commit(&picked_oid)?;
    let head = refs::resolve(repo, "HEAD")?;
    let head_tree = repo.read_commit(&head)?.tree;

    // The change being replayed is picked-vs-its-first-parent.
    let base_tree = match picked.parents.first() {
        Some(parent) => repo.read_commit(parent)?.tree,
        None => repo.build_tree(&[])?,
    };

    let outcome = merge_trees(
        repo,
        base_tree,
        head_tree,
        picked.tree,
        "HEAD",
        rev,
        repo.config().conflict_style(),
        callbacks,
    )?;

    if !outcome.is_clean() {
        repo.backend()
            .write_state_file("CHERRY_PICK_HEAD", format!("{picked_oid}\n").as_bytes())?;
        repo.backend()
            .write_state_file("MERGE_MSG", picked.message.as_bytes())?;
        let mut index = (*repo.index()?).clone();
        let mut paths = Vec::new();
        for conflict in &outcome.conflicts {
            paths.push(conflict.path.clone());
            index.stage_conflict(&conflict.path, conflict.base, conflict.ours, conflict.theirs);
            if let Some(markers) = &conflict.markers {
                repo.backend()
                    .write_workdir_file(&conflict.path, markers, false)?;
            }
        }
        repo.write_index(&index)?;
        return Err(Error::new(ErrorKind::MergeConflict { paths }));
    }

    let tree = repo.build_tree(&outcome.entries)?;
    let committer = repo.signature(None, None)?;
    let commit = Commit {
        tree,
        parents: vec![head],
        // The original author survives a cherry-pick; the committer is
        // whoever replays it.
        author: picked.author.clone(),
        committer,
        gpgsig: None,
        extra_headers: Vec::new(),
        message: picked.message.clone(),
    };
    let new_oid = repo.write_parsed(&Object::Commit(commit))?;

    // Materialize the new snapshot.
    if repo.has_workdir() {
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
        repo.write_index(&index)?;
    }

    refs::update(
        repo,
        "HEAD",
        new_oid,
        &UpdateOptions {
            message: &format!("cherry-pick: {}", picked.summary()),
            ..UpdateOptions::default()
        },
    )?;
    Ok(new_oid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{CheckoutParams, CommitParams, add, checkout, commit, create_branch};
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

    fn commit_file(repo: &Repository, path: &str, content: &str, message: &str) -> Oid {
        repo.backend()
            .write_workdir_file(path, content.as_bytes(), false)
            .unwrap();
        add(repo, &[path]).unwrap();
        commit(
            repo,
            &CommitParams {
                message,
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap()
    }

    #[test]
    fn replays_change_with_original_message() {
        let repo = repo();
        commit_file(&repo, "shared", "base\n", "base");
        create_branch(&repo, "side", None).unwrap();
        checkout(
            &repo,
            &CheckoutParams {
                rev: "side",
                ..CheckoutParams::default()
            },
        )
        .unwrap();
        let picked = commit_file(&repo, "extra", "from side\n", "add extra file");
        checkout(
            &repo,
            &CheckoutParams {
                rev: "master",
                ..CheckoutParams::default()
            },
        )
        .unwrap();

        let new_oid = cherry_pick(&repo, &picked.to_hex(), &mut Callbacks::new()).unwrap();
        assert_ne!(new_oid, picked);
        let new_commit = repo.read_commit(&new_oid).unwrap();
        assert_eq!(new_commit.message, "add extra file\n");
        assert_eq!(
            repo.backend().read_workdir_file("extra").unwrap(),
            Some(b"from side\n".to_vec())
        );
    }

    #[test]
    fn conflict_records_cherry_pick_head() {
        let repo = repo();
        commit_file(&repo, "f", "base\n", "base");
        create_branch(&repo, "side", None).unwrap();
        checkout(
            &repo,
            &CheckoutParams {
                rev: "side",
                ..CheckoutParams::default()
            },
        )
        .unwrap();
        let picked = commit_file(&repo, "f", "side version\n", "side edit");
        checkout(
            &repo,
            &CheckoutParams {
                rev: "master",
                ..CheckoutParams::default()
            },
        )
        .unwrap();
        commit_file(&repo, "f", "master version\n", "master edit");

        let err = cherry_pick(&repo, &picked.to_hex(), &mut Callbacks::new()).unwrap_err();
        assert_eq!(err.code(), "MergeConflict");
        let state = repo
            .backend()
            .read_state_file("CHERRY_PICK_HEAD")
            .unwrap()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&state).trim(), picked.to_hex());
        assert!(repo.index().unwrap().has_conflicts());
    }
}
