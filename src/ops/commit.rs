//! `commit`: snapshot the index.

use grit_odb::{Commit, FileMode, Object, Oid};

use grit_store::Backend as _;
use crate::callbacks::Callbacks;
use crate::errors::{Error, ErrorKind, Result};
use crate::refs::{self, UpdateOptions};
use crate::repo::Repository;

/// Parameters for [`commit`].
#[derive(Debug, Default)]
pub struct CommitParams<'a> {
    /// Commit message.
    pub message: &'a str,
    /// Author name override (`user.name` otherwise).
    pub author_name: Option<&'a str>,
    /// Author email override (`user.email` otherwise).
    pub author_email: Option<&'a str>,
    /// Sign the commit via the `on_sign` callback.
    pub sign: bool,
}

/// Create a commit from the current index, advance HEAD's branch, and
/// finish any in-progress merge.
pub fn commit(
    repo: &Repository,
    params: &CommitParams<'_>,
    callbacks: &mut Callbacks,
) -> Result<Oid> {
    let caller = "grit.commit";
    commit_inner(repo, params, callbacks).map_err(|e| e.with_caller(caller))
}

fn commit_inner(
    repo: &Repository,
    params: &CommitParams<'_>,
    callbacks: &mut Callbacks,
) -> Result<Oid> {
    if params.message.is_empty() {
        return Err(Error::new(ErrorKind::MissingParameter { name: "message" }));
    }
    let index = repo.index()?;
    if index.has_conflicts() {
        return Err(Error::new(ErrorKind::MergeConflict {
            paths: index.conflicted_paths(),
        }));
    }

    // pre-commit gate.
    let outcome = repo.hooks().run(repo.backend(), "pre-commit", &[], b"")?;
    if !outcome.success() {
        return Err(Error::new(ErrorKind::Protocol {
            detail: format!("pre-commit hook declined: {}", outcome.stderr.trim()),
        }));
    }

    let entries: Vec<(String, FileMode, Oid)> = index
        .stage0_entries()
        .into_iter()
        .map(|(path, oid, mode)| {
            (
                path,
                FileMode::from_u32(mode).unwrap_or(FileMode::Regular),
                oid,
            )
        })
        .collect();
    let tree = repo.build_tree(&entries)?;

    let mut parents = Vec::new();
    if let Some(head) = refs::resolve_opt(repo, "HEAD")? {
        parents.push(head);
    }
    // A merge in progress contributes MERGE_HEAD as the second parent.
    let merging = repo.backend().read_state_file("MERGE_HEAD")?;
    if let Some(data) = &merging {
        for line in String::from_utf8_lossy(data).lines() {
            if let Ok(oid) = Oid::from_hex(line.trim()) {
                parents.push(oid);
            }
        }
    }

    let author = repo.signature(params.author_name, params.author_email)?;
    let mut commit = Commit {
        tree,
        parents,
        author: author.clone(),
        committer: author,
        gpgsig: None,
        extra_headers: Vec::new(),
        message: ensure_trailing_newline(params.message),
    };

    // commit-msg hook can veto (it gets the message on stdin here; the
    // file-path contract needs a real filesystem).
    let outcome = repo
        .hooks()
        .run(repo.backend(), "commit-msg", &[], commit.message.as_bytes())?;
    if !outcome.success() {
        return Err(Error::new(ErrorKind::Protocol {
            detail: format!("commit-msg hook declined: {}", outcome.stderr.trim()),
        }));
    }

    if params.sign && callbacks.has_signer() {
        let payload = Object::Commit(commit.clone()).serialize();
        if let Some(signature) = callbacks.sign(&payload)? {
            commit.gpgsig = Some(signature);
        }
    }

    let oid = repo.write_parsed(&Object::Commit(commit))?;
    refs::update(
        repo,
        "HEAD",
        oid,
        &UpdateOptions {
            message: &format!("commit: {}", first_line(params.message)),
            ..UpdateOptions::default()
        },
    )?;

    // Completing a merge clears its state files.
    if merging.is_some() {
        repo.backend().delete_state_file("MERGE_HEAD")?;
        repo.backend().delete_state_file("MERGE_MSG")?;
    }
    repo.backend().delete_state_file("CHERRY_PICK_HEAD")?;

    let _ = repo.hooks().run(repo.backend(), "post-commit", &[], b"");
    Ok(oid)
}

fn ensure_trailing_newline(message: &str) -> String {
    if message.ends_with('\n') {
        message.to_owned()
    } else {
        format!("{message}\n")
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::add;
    use crate::repo::InitOptions;
    use grit_store::{Backend as _, MemoryBackend};

    fn repo() -> Repository {
        let repo = Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks();
        repo.update_config(|c| {
            c.set("user.name", "Test")?;
            c.set("user.email", "test@example.com")
        })
        .unwrap();
        repo
    }

    #[test]
    fn init_add_commit_roundtrip() {
        let repo = repo();
        repo.backend().write_workdir_file("a.txt", b"hi", false).unwrap();
        add(&repo, &["a.txt"]).unwrap();
        let oid = commit(
            &repo,
            &CommitParams {
                message: "c1",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();

        // HEAD resolves to the new commit.
        assert_eq!(refs::resolve(&repo, "HEAD").unwrap(), oid);
        let commit_obj = repo.read_commit(&oid).unwrap();
        assert!(commit_obj.parents.is_empty());
        assert_eq!(commit_obj.message, "c1\n");

        // The tree holds exactly a.txt at 100644 with the right bytes.
        let tree = repo.read_tree(&commit_obj.tree).unwrap();
        assert_eq!(tree.entries.len(), 1);
        assert_eq!(tree.entries[0].name.to_string(), "a.txt");
        assert_eq!(tree.entries[0].mode, FileMode::Regular);
        assert_eq!(repo.read_blob(&tree.entries[0].oid).unwrap(), b"hi");
    }

    #[test]
    fn second_commit_has_parent() {
        let repo = repo();
        repo.backend().write_workdir_file("a", b"1", false).unwrap();
        add(&repo, &["a"]).unwrap();
        let first = commit(
            &repo,
            &CommitParams {
                message: "one",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();
        repo.backend().write_workdir_file("a", b"2", false).unwrap();
        add(&repo, &["a"]).unwrap();
        let second = commit(
            &repo,
            &CommitParams {
                message: "two",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();
        assert_eq!(repo.read_commit(&second).unwrap().parents, vec![first]);
    }

    #[test]
    fn conflicted_index_refuses() {
        let repo = repo();
        let oid = repo
            .write_object(grit_odb::ObjectKind::Blob, b"side")
            .unwrap();
        let mut index = (*repo.index().unwrap()).clone();
        index.stage_conflict("f", None, Some((oid, 0o100_644)), Some((oid, 0o100_644)));
        repo.write_index(&index).unwrap();
        let err = commit(
            &repo,
            &CommitParams {
                message: "nope",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "MergeConflict");
    }

    #[test]
    fn merge_head_becomes_second_parent_and_clears() {
        let repo = repo();
        repo.backend().write_workdir_file("a", b"1", false).unwrap();
        add(&repo, &["a"]).unwrap();
        let first = commit(
            &repo,
            &CommitParams {
                message: "one",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();
        // Fake an in-progress merge onto a second root.
        repo.backend().write_workdir_file("b", b"2", false).unwrap();
        add(&repo, &["b"]).unwrap();
        repo.backend()
            .write_state_file("MERGE_HEAD", format!("{first}\n").as_bytes())
            .unwrap();
        let merged = commit(
            &repo,
            &CommitParams {
                message: "merge",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();
        let obj = repo.read_commit(&merged).unwrap();
        assert_eq!(obj.parents.len(), 2);
        assert_eq!(obj.parents[1], first);
        assert!(repo.backend().read_state_file("MERGE_HEAD").unwrap().is_none());
    }

    #[test]
    fn missing_message_is_missing_parameter() {
        let repo = repo();
        let err = commit(&repo, &CommitParams::default(), &mut Callbacks::new()).unwrap_err();
        assert_eq!(err.code(), "MissingParameter");
        assert_eq!(err.caller(), "grit.commit");
    }
}
