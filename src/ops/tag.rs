//! Tag commands: lightweight and annotated.

use grit_odb::{Object, Oid, Tag};

use crate::callbacks::Callbacks;
use crate::errors::{Error, ErrorKind, Result};
use crate::refs::{self, UpdateOptions};
use crate::repo::Repository;

/// Create a lightweight tag pointing at `target` (HEAD when `None`).
pub fn tag(repo: &Repository, name: &str, target: Option<&str>) -> Result<()> {
    let caller = "grit.tag";
    let full = format!("refs/tags/{name}");
    refs::validate_name(&full).map_err(|e| e.with_caller(caller))?;
    if refs::resolve_opt(repo, &full).map_err(|e| e.with_caller(caller))?.is_some() {
        return Err(Error::new(ErrorKind::AlreadyExists {
            kind: "tag",
            name: name.to_owned(),
        })
        .with_caller(caller));
    }
    let oid = refs::resolve(repo, target.unwrap_or("HEAD")).map_err(|e| e.with_caller(caller))?;
    refs::update(
        repo,
        &full,
        oid,
        &UpdateOptions {
            suppress_reflog: true,
            ..UpdateOptions::default()
        },
    )
    .map_err(|e| e.with_caller(caller))
}

/// Create an annotated tag object and its ref.
pub fn annotated_tag(
    repo: &Repository,
    name: &str,
    message: &str,
    target: Option<&str>,
    sign: bool,
    callbacks: &mut Callbacks,
) -> Result<Oid> {
    let caller = "grit.annotatedTag";
    let full = format!("refs/tags/{name}");
    refs::validate_name(&full).map_err(|e| e.with_caller(caller))?;
    if refs::resolve_opt(repo, &full).map_err(|e| e.with_caller(caller))?.is_some() {
        return Err(Error::new(ErrorKind::AlreadyExists {
            kind: "tag",
            name: name.to_owned(),
        })
        .with_caller(caller));
    }
    let target_oid =
        refs::resolve(repo, target.unwrap_or("HEAD")).map_err(|e| e.with_caller(caller))?;
    let (target_kind, _) = repo.read_object(&target_oid).map_err(|e| e.with_caller(caller))?;
    let tagger = repo.signature(None, None).map_err(|e| e.with_caller(caller))?;
    let mut tag_obj = Tag {
        object: target_oid,
        target_kind,
        name: name.to_owned(),
        tagger: Some(tagger),
        gpgsig: None,
        message: if message.ends_with('\n') {
            message.to_owned()
        } else {
            format!("{message}\n")
        },
    };
    if sign && callbacks.has_signer() {
        let payload = Object::Tag(tag_obj.clone()).serialize();
        if let Some(signature) = callbacks.sign(&payload).map_err(|e| e.with_caller(caller))? {
            tag_obj.gpgsig = Some(signature);
        }
    }
    let oid = repo
        .write_parsed(&Object::Tag(tag_obj))
        .map_err(|e| e.with_caller(caller))?;
    refs::update(
        repo,
        &full,
        oid,
        &UpdateOptions {
            suppress_reflog: true,
            ..UpdateOptions::default()
        },
    )
    .map_err(|e| e.with_caller(caller))?;
    Ok(oid)
}

/// Delete a tag ref (the object stays until GC, which grit leaves to
/// the host).
pub fn delete_tag(repo: &Repository, name: &str) -> Result<()> {
    let caller = "grit.deleteTag";
    let full = format!("refs/tags/{name}");
    if refs::resolve_opt(repo, &full).map_err(|e| e.with_caller(caller))?.is_none() {
        return Err(Error::new(ErrorKind::NotFound {
            kind: "tag",
            id: name.to_owned(),
        })
        .with_caller(caller));
    }
    refs::delete(repo, &full).map_err(|e| e.with_caller(caller))
}

/// Tag names (short form), sorted.
pub fn list_tags(repo: &Repository) -> Result<Vec<String>> {
    let caller = "grit.listTags";
    let listed = refs::list(repo, "refs/tags/").map_err(|e| e.with_caller(caller))?;
    Ok(listed
        .into_iter()
        .filter_map(|(name, _)| name.strip_prefix("refs/tags/").map(ToOwned::to_owned))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{CommitParams, add, commit};
    use crate::repo::InitOptions;
    use grit_odb::ObjectKind;
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
        repo.backend().write_workdir_file("f", b"x", false).unwrap();
        add(&repo, &["f"]).unwrap();
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
    fn lightweight_tag_points_at_commit() {
        let (repo, head) = repo_with_commit();
        tag(&repo, "v1", None).unwrap();
        assert_eq!(refs::resolve(&repo, "refs/tags/v1").unwrap(), head);
        assert_eq!(list_tags(&repo).unwrap(), vec!["v1".to_owned()]);
    }

    #[test]
    fn annotated_tag_wraps_commit() {
        let (repo, head) = repo_with_commit();
        let tag_oid =
            annotated_tag(&repo, "v2", "release two", None, false, &mut Callbacks::new()).unwrap();
        let (kind, _) = repo.read_object(&tag_oid).unwrap();
        assert_eq!(kind, ObjectKind::Tag);
        let parsed = repo.read_tag(&tag_oid).unwrap();
        assert_eq!(parsed.object, head);
        assert_eq!(parsed.message, "release two\n");
        // Resolving the ref peels through read_commit.
        assert_eq!(repo.read_commit(&tag_oid).unwrap().message, "init\n");
    }

    #[test]
    fn duplicate_tag_rejected_then_deletable() {
        let (repo, _) = repo_with_commit();
        tag(&repo, "v1", None).unwrap();
        assert_eq!(tag(&repo, "v1", None).unwrap_err().code(), "AlreadyExists");
        delete_tag(&repo, "v1").unwrap();
        assert!(list_tags(&repo).unwrap().is_empty());
        assert_eq!(delete_tag(&repo, "v1").unwrap_err().code(), "NotFound");
    }
}
