//! `add` and `remove`: stage working-tree content.

use grit_odb::ObjectKind;

use grit_store::Backend as _;
use crate::errors::{Error, ErrorKind, Result};
use crate::filters;
use crate::repo::Repository;
use crate::walk::normalize_path;

/// Stage files. Directories stage their contents recursively. Failures
/// accumulate: everything stageable is staged, then a single
/// `MultipleErrors` reports the rest.
pub fn add(repo: &Repository, paths: &[&str]) -> Result<()> {
    let caller = "grit.add";
    if paths.is_empty() {
        return Err(Error::new(ErrorKind::MissingParameter { name: "filepath" })
            .with_caller(caller));
    }
    let mut index = (*repo.index().map_err(|e| e.with_caller(caller))?).clone();
    let mut errors = Vec::new();
    let listing = repo
        .backend()
        .list_workdir()
        .map_err(|e| Error::from(e).with_caller(caller))?;
    for raw in paths {
        let path = match normalize_path(raw) {
            Ok(path) => path,
            Err(e) => {
                errors.push(e.with_caller(caller));
                continue;
            }
        };
        // A directory argument covers everything under it.
        let targets: Vec<String> = listing
            .iter()
            .filter(|entry| {
                entry.path == path || entry.path.starts_with(&format!("{path}/"))
            })
            .map(|entry| entry.path.clone())
            .collect();
        if targets.is_empty() {
            errors.push(
                Error::new(ErrorKind::NotFound {
                    kind: "file",
                    id: path.clone(),
                })
                .with_caller(caller),
            );
            continue;
        }
        for target in targets {
            match stage_one(repo, &mut index, &target) {
                Ok(()) => {}
                Err(e) => errors.push(e.with_caller(caller)),
            }
        }
    }
    repo.write_index(&index).map_err(|e| e.with_caller(caller))?;
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(Error::new(ErrorKind::MultipleErrors { errors }).with_caller(caller)),
    }
}

fn stage_one(repo: &Repository, index: &mut crate::index::Index, path: &str) -> Result<()> {
    let raw = repo
        .backend()
        .read_workdir_file(path)?
        .ok_or_else(|| {
            Error::new(ErrorKind::NotFound {
                kind: "file",
                id: path.to_owned(),
            })
        })?;
    let cleaned = filters::clean(repo, path, &raw)?;
    let oid = repo.write_object(ObjectKind::Blob, &cleaned)?;
    let stat = repo.backend().stat_workdir(path)?.unwrap_or_default();
    let mode = match stat.mode & 0o170_000 {
        0o120_000 => 0o120_000,
        _ if stat.mode & 0o111 != 0 && repo.config().filemode() => 0o100_755,
        _ => 0o100_644,
    };
    index.remove(path); // Clears conflict stages when re-adding.
    index.insert(path, oid, mode, stat);
    Ok(())
}

/// Unstage (and optionally delete) files.
pub fn remove(repo: &Repository, paths: &[&str], keep_workdir: bool) -> Result<()> {
    let caller = "grit.remove";
    if paths.is_empty() {
        return Err(Error::new(ErrorKind::MissingParameter { name: "filepath" })
            .with_caller(caller));
    }
    let mut index = (*repo.index().map_err(|e| e.with_caller(caller))?).clone();
    for raw in paths {
        let path = normalize_path(raw).map_err(|e| e.with_caller(caller))?;
        index.remove(&path);
        if !keep_workdir {
            repo.backend()
                .delete_workdir_file(&path)
                .map_err(|e| Error::from(e).with_caller(caller))?;
        }
    }
    repo.write_index(&index).map_err(|e| e.with_caller(caller))
}
