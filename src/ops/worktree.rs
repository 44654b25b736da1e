//! Worktree record commands.
//!
//! grit manages the records under `worktrees/<name>/`; materializing a
//! linked working tree's files is the host's job (it has its own
//! backend rooted at the new path).

use std::path::{Path, PathBuf};

use grit_store::{Backend as _, WorktreeRecord};

use crate::errors::{Error, ErrorKind, Result};
use crate::refs;
use crate::repo::Repository;

/// Register a linked worktree at `path`, pointing at `rev`.
pub fn worktree_add(repo: &Repository, name: &str, path: &Path, rev: &str) -> Result<WorktreeRecord> {
    let caller = "grit.worktreeAdd";
    let inner = || -> Result<WorktreeRecord> {
        if repo.backend().read_worktree(name)?.is_some() {
            return Err(Error::new(ErrorKind::AlreadyExists {
                kind: "worktree",
                name: name.to_owned(),
            }));
        }
        let head = match refs::expand_name(repo, rev)? {
            Some(full) if full.starts_with("refs/heads/") => format!("ref: {full}"),
            _ => refs::resolve(repo, rev)?.to_hex(),
        };
        let record = WorktreeRecord {
            name: name.to_owned(),
            path: PathBuf::from(path),
            head,
            locked: None,
        };
        repo.backend().write_worktree(&record)?;
        Ok(record)
    };
    inner().map_err(|e| e.with_caller(caller))
}

/// All linked worktree records.
pub fn worktree_list(repo: &Repository) -> Result<Vec<WorktreeRecord>> {
    repo.backend()
        .list_worktrees()
        .map_err(|e| Error::from(e).with_caller("grit.worktreeList"))
}

/// Remove records whose working tree no longer exists. Locked records
/// survive. Returns the pruned names.
pub fn worktree_prune(repo: &Repository) -> Result<Vec<String>> {
    let caller = "grit.worktreePrune";
    let inner = || -> Result<Vec<String>> {
        let mut pruned = Vec::new();
        for record in repo.backend().list_worktrees()? {
            if record.locked.is_some() {
                continue;
            }
            if !record.path.exists() {
                repo.backend().delete_worktree(&record.name)?;
                pruned.push(record.name);
            }
        }
        Ok(pruned)
    };
    inner().map_err(|e| e.with_caller(caller))
}
