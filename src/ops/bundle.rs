//! Bundle commands: create a bundle from local refs, import one.

use grit_odb::{Bundle, Oid, PackFile, pack, pack_index};
use grit_store::Backend as _;

use crate::errors::{Error, ErrorKind, Result};
use crate::refs::{self, UpdateOptions};
use crate::repo::Repository;
use crate::revwalk;

/// Create a v2 bundle carrying `ref_names` and every object reachable
/// from them.
pub fn create_bundle(repo: &Repository, ref_names: &[&str]) -> Result<Vec<u8>> {
    let caller = "grit.bundle";
    let inner = || -> Result<Vec<u8>> {
        if ref_names.is_empty() {
            return Err(Error::new(ErrorKind::MissingParameter { name: "refs" }));
        }
        let mut refs_out = Vec::new();
        let mut tips = Vec::new();
        for name in ref_names {
            let full = refs::expand_name(repo, name)?.ok_or_else(|| {
                Error::new(ErrorKind::NotFound {
                    kind: "ref",
                    id: (*name).to_owned(),
                })
            })?;
            let oid = refs::resolve(repo, &full)?;
            refs_out.push((oid, full));
            tips.push(oid);
        }
        let commits = revwalk::commits_between(repo, &tips, &[])?;
        let objects = revwalk::objects_for_commits(repo, &commits, &[])?;
        let (pack_bytes, _) = pack::write_pack(repo.hash(), &objects)?;
        let bundle = Bundle {
            version: 2,
            capabilities: Vec::new(),
            prerequisites: Vec::new(),
            refs: refs_out,
            pack: pack_bytes,
        };
        Ok(bundle.serialize())
    };
    inner().map_err(|e| e.with_caller(caller))
}

/// Import a bundle: ingest its pack and create `refs/bundles/...` style
/// refs under the given prefix (or the bundle's own names when `None`).
pub fn unbundle(
    repo: &Repository,
    data: &[u8],
    prefix: Option<&str>,
) -> Result<Vec<(String, Oid)>> {
    let caller = "grit.unbundle";
    let inner = || -> Result<Vec<(String, Oid)>> {
        let bundle = Bundle::parse(data)?;
        for (oid, _) in &bundle.prerequisites {
            if !repo.has_object(oid)? {
                return Err(Error::new(ErrorKind::NotFound {
                    kind: "object",
                    id: format!("bundle prerequisite {oid}"),
                }));
            }
        }
        let pack = PackFile::parse(bundle.pack.clone(), repo.hash())?;
        let mut lookup = |oid: &Oid| repo.read_object_opt(oid).ok().flatten();
        let (index, _) = pack_index::index_pack(&pack, repo.hash(), &mut lookup)?;
        let name = format!("pack-{}", pack.checksum().to_hex());
        repo.backend().write_pack(&name, pack.bytes())?;
        repo.backend().write_pack_index(&name, &index.serialize())?;

        let mut imported = Vec::new();
        for (oid, refname) in &bundle.refs {
            let target = match prefix {
                Some(prefix) => {
                    let short = refname.strip_prefix("refs/heads/").unwrap_or(refname);
                    format!("{}/{short}", prefix.trim_end_matches('/'))
                }
                None => refname.clone(),
            };
            refs::update(
                repo,
                &target,
                *oid,
                &UpdateOptions {
                    message: "unbundle",
                    ..UpdateOptions::default()
                },
            )?;
            imported.push((target, *oid));
        }
        Ok(imported)
    };
    inner().map_err(|e| e.with_caller(caller))
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
        repo.backend().write_workdir_file("f", b"bundled", false).unwrap();
        add(&repo, &["f"]).unwrap();
        let head = commit(
            &repo,
            &CommitParams {
                message: "for bundle",
                ..CommitParams::default()
            },
            &mut Callbacks::new(),
        )
        .unwrap();
        (repo, head)
    }

    #[test]
    fn bundle_roundtrip_between_repositories() {
        let (source, head) = repo_with_commit();
        let bytes = create_bundle(&source, &["master"]).unwrap();

        let target = Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks();
        let imported = unbundle(&target, &bytes, Some("refs/bundles")).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].0, "refs/bundles/master");
        assert_eq!(imported[0].1, head);
        // The full snapshot crossed over.
        let commit = target.read_commit(&head).unwrap();
        let (_, blob) = target.tree_lookup(&commit.tree, "f").unwrap().unwrap();
        assert_eq!(target.read_blob(&blob).unwrap(), b"bundled");
    }

    #[test]
    fn unbundle_refuses_missing_prerequisites() {
        let (source, head) = repo_with_commit();
        let mut bundle = Bundle::parse(&create_bundle(&source, &["master"]).unwrap()).unwrap();
        bundle.prerequisites = vec![(head, "requires history".into())];
        // Target repo lacks the prerequisite commit entirely.
        let target = Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks();
        let err = unbundle(&target, &bundle.serialize(), None).unwrap_err();
        assert_eq!(err.code(), "NotFound");
    }
}
