//! `log`: commit history of a ref.

use grit_odb::{Commit, Oid};

use crate::errors::Result;
use crate::refs;
use crate::repo::Repository;
use crate::revwalk::RevWalk;

/// Commits reachable from `rev` (HEAD when `None`), newest first,
/// bounded by `depth` when given.
pub fn log(repo: &Repository, rev: Option<&str>, depth: Option<usize>) -> Result<Vec<(Oid, Commit)>> {
    let caller = "grit.log";
    let inner = || -> Result<Vec<(Oid, Commit)>> {
        let start = refs::resolve(repo, rev.unwrap_or("HEAD"))?;
        let mut walk = RevWalk::new(repo)?;
        walk.push(start)?;
        let mut out = Vec::new();
        for item in walk {
            out.push(item?);
            if depth.is_some_and(|d| out.len() >= d) {
                break;
            }
        }
        Ok(out)
    };
    inner().map_err(|e| e.with_caller(caller))
}
