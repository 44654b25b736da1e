//! The `checkout` command: move HEAD and the working tree together.

use grit_store::Backend as _;

use crate::callbacks::AbortSignal;
use crate::checkout::{CheckoutOptions, execute, plan};
use crate::errors::Result;
use crate::refs::{self, UpdateOptions};
use crate::repo::Repository;

/// Parameters for [`checkout`].
#[derive(Debug, Default)]
pub struct CheckoutParams<'a> {
    /// Branch, tag, or revision to check out.
    pub rev: &'a str,
    /// Overwrite local modifications.
    pub force: bool,
    /// Abort token.
    pub abort: AbortSignal,
}

/// Check out a revision: plan the tree transition, apply it, then move
/// HEAD (symbolically for branches, detached otherwise).
pub fn checkout(repo: &Repository, params: &CheckoutParams<'_>) -> Result<()> {
    let caller = "grit.checkout";
    checkout_inner(repo, params).map_err(|e| e.with_caller(caller))
}

fn checkout_inner(repo: &Repository, params: &CheckoutParams<'_>) -> Result<()> {
    let target_commit = refs::resolve(repo, params.rev)?;
    let target_tree = repo.read_commit(&target_commit)?.tree;
    let from_tree = match refs::resolve_opt(repo, "HEAD")? {
        Some(head) => Some(repo.read_commit(&head)?.tree),
        None => None,
    };

    let options = CheckoutOptions {
        force: params.force,
        abort: params.abort.clone(),
    };
    let plan = plan(repo, from_tree, target_tree, &options)?;
    execute(repo, &plan, &options)?;

    // HEAD: symbolic when the rev names a branch, detached otherwise.
    let previous = refs::current_branch(repo)?
        .unwrap_or_else(|| "HEAD".to_owned());
    let branch_ref = refs::expand_name(repo, params.rev)?
        .filter(|full| full.starts_with("refs/heads/"));
    let message = format!("checkout: moving from {previous} to {}", params.rev);
    match branch_ref {
        Some(full) => refs::write_symbolic(repo, "HEAD", &full, &message)?,
        None => {
            repo.backend()
                .write_ref_raw("HEAD", &target_commit.to_hex(), None)?;
            let old = refs::resolve_opt(repo, &previous)?.unwrap_or_else(|| repo.zero_oid());
            let line = format!(
                "{} {} {}\t{message}",
                old.to_hex(),
                target_commit.to_hex(),
                repo.signature(None, None)
                    .map(|s| s.to_header_value())
                    .unwrap_or_else(|_| "grit <grit@localhost> 0 +0000".to_owned()),
            );
            repo.backend().append_reflog("HEAD", &line)?;
        }
    }

    let _ = repo.hooks().run(
        repo.backend(),
        "post-checkout",
        &[&target_commit.to_hex(), &target_commit.to_hex(), "1"],
        b"",
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Callbacks;
    use crate::ops::{CommitParams, add, commit, create_branch};
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

    fn commit_file(repo: &Repository, path: &str, content: &str, message: &str) -> grit_odb::Oid {
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
    fn switch_between_branches_updates_tree_and_head() {
        let repo = repo();
        commit_file(&repo, "f.txt", "base", "base");
        create_branch(&repo, "feature", None).unwrap();
        commit_file(&repo, "f.txt", "on master", "master change");

        checkout(
            &repo,
            &CheckoutParams {
                rev: "feature",
                ..CheckoutParams::default()
            },
        )
        .unwrap();
        assert_eq!(
            repo.backend().read_workdir_file("f.txt").unwrap(),
            Some(b"base".to_vec())
        );
        assert_eq!(
            refs::current_branch(&repo).unwrap().as_deref(),
            Some("refs/heads/feature")
        );

        // A reflog entry landed on HEAD.
        let log = refs::read_reflog(&repo, "HEAD").unwrap();
        assert!(log.iter().any(|e| e.message.contains("checkout: moving")));
    }

    #[test]
    fn detached_checkout_writes_oid_head() {
        let repo = repo();
        let first = commit_file(&repo, "f.txt", "one", "one");
        commit_file(&repo, "f.txt", "two", "two");
        checkout(
            &repo,
            &CheckoutParams {
                rev: &first.to_hex(),
                ..CheckoutParams::default()
            },
        )
        .unwrap();
        assert_eq!(refs::current_branch(&repo).unwrap(), None);
        assert_eq!(refs::resolve(&repo, "HEAD").unwrap(), first);
        assert_eq!(
            repo.backend().read_workdir_file("f.txt").unwrap(),
            Some(b"one".to_vec())
        );
    }
}
