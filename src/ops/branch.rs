//! Branch commands.

use grit_odb::Oid;

use crate::errors::{Error, ErrorKind, Result};
use crate::refs::{self, UpdateOptions};
use crate::repo::Repository;

/// Create a branch at `start` (HEAD when `None`).
pub fn create_branch(repo: &Repository, name: &str, start: Option<&str>) -> Result<Oid> {
    let caller = "grit.branch";
    let full = format!("refs/heads/{name}");
    refs::validate_name(&full).map_err(|e| e.with_caller(caller))?;
    if refs::resolve_opt(repo, &full).map_err(|e| e.with_caller(caller))?.is_some() {
        return Err(Error::new(ErrorKind::AlreadyExists {
            kind: "branch",
            name: name.to_owned(),
        })
        .with_caller(caller));
    }
    let target = refs::resolve(repo, start.unwrap_or("HEAD")).map_err(|e| e.with_caller(caller))?;
    refs::update(
        repo,
        &full,
        target,
        &UpdateOptions {
            message: &format!("branch: Created from {}", start.unwrap_or("HEAD")),
            ..UpdateOptions::default()
        },
    )
    .map_err(|e| e.with_caller(caller))?;
    Ok(target)
}

/// Delete a branch. Refuses to delete the checked-out branch.
pub fn delete_branch(repo: &Repository, name: &str) -> Result<()> {
    let caller = "grit.deleteBranch";
    let full = format!("refs/heads/{name}");
    if refs::resolve_opt(repo, &full).map_err(|e| e.with_caller(caller))?.is_none() {
        return Err(Error::new(ErrorKind::NotFound {
            kind: "branch",
            id: name.to_owned(),
        })
        .with_caller(caller));
    }
    if refs::current_branch(repo).map_err(|e| e.with_caller(caller))? == Some(full.clone()) {
        return Err(Error::new(ErrorKind::AlreadyExists {
            kind: "checked-out branch",
            name: name.to_owned(),
        })
        .with_caller(caller));
    }
    refs::delete(repo, &full).map_err(|e| e.with_caller(caller))
}

/// Rename a branch, moving its reflog association and HEAD if needed.
pub fn rename_branch(repo: &Repository, from: &str, to: &str) -> Result<()> {
    let caller = "grit.renameBranch";
    let from_full = format!("refs/heads/{from}");
    let to_full = format!("refs/heads/{to}");
    refs::validate_name(&to_full).map_err(|e| e.with_caller(caller))?;
    let target = refs::resolve(repo, &from_full).map_err(|e| e.with_caller(caller))?;
    if refs::resolve_opt(repo, &to_full).map_err(|e| e.with_caller(caller))?.is_some() {
        return Err(Error::new(ErrorKind::AlreadyExists {
            kind: "branch",
            name: to.to_owned(),
        })
        .with_caller(caller));
    }
    refs::update(
        repo,
        &to_full,
        target,
        &UpdateOptions {
            message: &format!("branch: renamed {from_full} to {to_full}"),
            ..UpdateOptions::default()
        },
    )
    .map_err(|e| e.with_caller(caller))?;
    let head_was_here =
        refs::current_branch(repo).map_err(|e| e.with_caller(caller))? == Some(from_full.clone());
    refs::delete(repo, &from_full).map_err(|e| e.with_caller(caller))?;
    if head_was_here {
        refs::write_symbolic(repo, "HEAD", &to_full, "").map_err(|e| e.with_caller(caller))?;
    }
    Ok(())
}

/// Branch names (short form), sorted.
pub fn list_branches(repo: &Repository, remote: Option<&str>) -> Result<Vec<String>> {
    let caller = "grit.listBranches";
    let prefix = match remote {
        Some(remote) => format!("refs/remotes/{remote}/"),
        None => "refs/heads/".to_owned(),
    };
    let listed = refs::list(repo, &prefix).map_err(|e| e.with_caller(caller))?;
    Ok(listed
        .into_iter()
        .filter_map(|(name, _)| name.strip_prefix(&prefix).map(ToOwned::to_owned))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Callbacks;
    use crate::ops::{add, commit, CommitParams};
    use crate::repo::InitOptions;
    use grit_store::{Backend as _, MemoryBackend};

    fn repo_with_commit() -> Repository {
        let repo = Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks();
        repo.update_config(|c| {
            c.set("user.name", "T")?;
            c.set("user.email", "t@e.c")
        })
        .unwrap();
        repo.backend().write_workdir_file("f", b"x", false).unwrap();
        add(&repo, &["f"]).unwrap();
        commit(
            &repo,
            &CommitParams {
                message: "init",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();
        repo
    }

    #[test]
    fn create_list_delete() {
        let repo = repo_with_commit();
        create_branch(&repo, "topic", None).unwrap();
        assert_eq!(
            list_branches(&repo, None).unwrap(),
            vec!["master".to_owned(), "topic".to_owned()]
        );
        delete_branch(&repo, "topic").unwrap();
        assert_eq!(list_branches(&repo, None).unwrap(), vec!["master".to_owned()]);
    }

    #[test]
    fn duplicate_create_is_already_exists() {
        let repo = repo_with_commit();
        create_branch(&repo, "topic", None).unwrap();
        let err = create_branch(&repo, "topic", None).unwrap_err();
        assert_eq!(err.code(), "AlreadyExists");
    }

    #[test]
    fn cannot_delete_current_branch() {
        let repo = repo_with_commit();
        assert!(delete_branch(&repo, "master").is_err());
    }

    #[test]
    fn rename_moves_head() {
        let repo = repo_with_commit();
        rename_branch(&repo, "master", "main").unwrap();
        assert_eq!(
            refs::current_branch(&repo).unwrap().as_deref(),
            Some("refs/heads/main")
        );
        assert_eq!(list_branches(&repo, None).unwrap(), vec!["main".to_owned()]);
    }

    #[test]
    fn invalid_name_rejected() {
        let repo = repo_with_commit();
        let err = create_branch(&repo, "bad name", None).unwrap_err();
        assert_eq!(err.code(), "InvalidRefName");
    }
}
