//! Plumbing commands: small building blocks exposed directly.

use grit_odb::{ObjectKind, Oid};

use crate::errors::{Error, ErrorKind, Result};
use crate::refs::{self, ReflogEntry, UpdateOptions};
use crate::repo::Repository;
use crate::revwalk;

/// Resolve a ref name, short name, or hex (prefix) to an OID.
pub fn resolve_ref(repo: &Repository, name: &str) -> Result<Oid> {
    refs::resolve(repo, name).map_err(|e| e.with_caller("grit.resolveRef"))
}

/// Expand a short hex prefix to the unique full OID.
pub fn expand_oid(repo: &Repository, prefix: &str) -> Result<Oid> {
    repo.expand_oid(prefix).map_err(|e| e.with_caller("grit.expandOid"))
}

/// Point a ref at an OID (with CAS when `expected_old` is given).
pub fn update_ref(
    repo: &Repository,
    name: &str,
    value: Oid,
    expected_old: Option<Option<Oid>>,
    message: &str,
) -> Result<()> {
    refs::update(
        repo,
        name,
        value,
        &UpdateOptions {
            expected_old,
            message,
            ..UpdateOptions::default()
        },
    )
    .map_err(|e| e.with_caller("grit.updateRef"))
}

/// A ref's reflog, oldest first.
pub fn read_reflog(repo: &Repository, name: &str) -> Result<Vec<ReflogEntry>> {
    refs::read_reflog(repo, name).map_err(|e| e.with_caller("grit.readReflog"))
}

/// Store a blob, returning its OID.
pub fn write_blob(repo: &Repository, data: &[u8]) -> Result<Oid> {
    repo.write_object(ObjectKind::Blob, data)
        .map_err(|e| e.with_caller("grit.writeBlob"))
}

/// Read a blob at `path` within the tree of `rev`.
pub fn read_blob_at(repo: &Repository, rev: &str, path: &str) -> Result<Vec<u8>> {
    let caller = "grit.readBlob";
    let inner = || -> Result<Vec<u8>> {
        let commit = refs::resolve(repo, rev)?;
        let tree = repo.read_commit(&commit)?.tree;
        let (_, oid) = repo.tree_lookup(&tree, path)?.ok_or_else(|| {
            Error::new(ErrorKind::NotFound {
                kind: "file",
                id: format!("{path} at {rev}"),
            })
        })?;
        repo.read_blob(&oid)
    };
    inner().map_err(|e| e.with_caller(caller))
}

/// Stage-0 paths in the index (what `ls-files` prints).
pub fn list_files(repo: &Repository, rev: Option<&str>) -> Result<Vec<String>> {
    let caller = "grit.listFiles";
    let inner = || -> Result<Vec<String>> {
        match rev {
            Some(rev) => {
                let commit = refs::resolve(repo, rev)?;
                let tree = repo.read_commit(&commit)?.tree;
                Ok(repo
                    .flatten_tree(&tree)?
                    .into_iter()
                    .map(|(path, _, _)| path)
                    .collect())
            }
            None => Ok(repo
                .index()?
                .entries()
                .iter()
                .filter(|e| e.stage == 0)
                .map(|e| e.path.clone())
                .collect()),
        }
    };
    inner().map_err(|e| e.with_caller(caller))
}

/// Whether `ancestor` is an ancestor of `descendant`.
pub fn is_descendant(repo: &Repository, ancestor: &str, descendant: &str) -> Result<bool> {
    let caller = "grit.isDescendent";
    let inner = || -> Result<bool> {
        let ancestor = refs::resolve(repo, ancestor)?;
        let descendant = refs::resolve(repo, descendant)?;
        revwalk::is_descendant(repo, ancestor, descendant)
    };
    inner().map_err(|e| e.with_caller(caller))
}

/// Best common ancestor of two revisions.
pub fn merge_base(repo: &Repository, a: &str, b: &str) -> Result<Option<Oid>> {
    let caller = "grit.findMergeBase";
    let inner = || -> Result<Option<Oid>> {
        let a = refs::resolve(repo, a)?;
        let b = refs::resolve(repo, b)?;
        revwalk::merge_base(repo, a, b)
    };
    inner().map_err(|e| e.with_caller(caller))
}

/// A configuration value through the cascade.
pub fn config_get(repo: &Repository, key: &str) -> Result<Option<String>> {
    Ok(repo.config().get(key).map(ToOwned::to_owned))
}

/// Set a repository-local configuration value.
pub fn config_set(repo: &Repository, key: &str, value: &str) -> Result<()> {
    repo.update_config(|config| config.set(key, value))
        .map_err(|e| e.with_caller("grit.setConfig"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Callbacks;
    use crate::ops::{CommitParams, add, commit};
    use crate::repo::InitOptions;
    use grit_store::{Backend as _, MemoryBackend};

    fn repo_with_commit() -> (Repository, Oid) {
        let repo = Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks();
        repo.update_config(|c| {
            c.set("user.name", "T")?;
            c.set("user.email", "t@e.c")
        })
        .unwrap();
        repo.backend()
            .write_workdir_file("dir/file.txt", b"payload", false)
            .unwrap();
        add(&repo, &["dir/file.txt"]).unwrap();
        let head = commit(
            &repo,
            &CommitParams {
                message: "init",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();
        (repo, head)
    }

    #[test]
    fn resolve_and_expand() {
        let (repo, head) = repo_with_commit();
        assert_eq!(resolve_ref(&repo, "HEAD").unwrap(), head);
        assert_eq!(resolve_ref(&repo, "master").unwrap(), head);
        assert_eq!(expand_oid(&repo, &head.to_hex()[..10]).unwrap(), head);
    }

    #[test]
    fn read_blob_at_path() {
        let (repo, _) = repo_with_commit();
        assert_eq!(
            read_blob_at(&repo, "HEAD", "dir/file.txt").unwrap(),
            b"payload"
        );
        assert_eq!(
            read_blob_at(&repo, "HEAD", "missing").unwrap_err().code(),
            "NotFound"
        );
    }

    #[test]
    fn list_files_from_index_and_tree() {
        let (repo, _) = repo_with_commit();
        assert_eq!(list_files(&repo, None).unwrap(), vec!["dir/file.txt".to_owned()]);
        assert_eq!(
            list_files(&repo, Some("HEAD")).unwrap(),
            vec!["dir/file.txt".to_owned()]
        );
    }

    #[test]
    fn config_roundtrip() {
        let (repo, _) = repo_with_commit();
        config_set(&repo, "custom.section.key", "value").unwrap();
        assert_eq!(
            config_get(&repo, "custom.section.key").unwrap().as_deref(),
            Some("value")
        );
    }

    #[test]
    fn update_ref_cas_errors_surface() {
        let (repo, head) = repo_with_commit();
        let err = update_ref(
            &repo,
            "refs/heads/other",
            head,
            Some(Some(head)),
            "should fail",
        )
        .unwrap_err();
        assert_eq!(err.code(), "RefMismatch");
        assert_eq!(err.caller(), "grit.updateRef");
    }
}
