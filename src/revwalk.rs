//! Commit graph traversal.
//!
//! A date-ordered walk (newest committer time first) with hide sets,
//! plus the graph predicates built on it: merge bases, ancestry checks,
//! and the object enumeration used by the pack writer and push/fetch
//! negotiation. Commits in the shallow set have their parents treated as
//! absent, so walks terminate cleanly in shallow clones.

use std::collections::{BTreeSet, BinaryHeap, HashSet};

use grit_odb::{Commit, ObjectKind, Oid};

use crate::errors::Result;
use crate::repo::Repository;

/// A date-ordered commit iterator.
pub struct RevWalk<'r> {
    repo: &'r Repository,
    queue: BinaryHeap<(i64, Oid)>,
    queued: HashSet<Oid>,
    hidden: HashSet<Oid>,
    shallow: BTreeSet<Oid>,
}

impl<'r> RevWalk<'r> {
    /// A walk over `repo`'s commit graph.
    pub fn new(repo: &'r Repository) -> Result<Self> {
        Ok(Self {
            repo,
            queue: BinaryHeap::new(),
            queued: HashSet::new(),
            hidden: HashSet::new(),
            shallow: repo.shallow()?,
        })
    }

    /// Add a starting commit.
    pub fn push(&mut self, oid: Oid) -> Result<()> {
        if self.queued.insert(oid) {
            let commit = self.repo.read_commit(&oid)?;
            self.queue.push((commit.committer.timestamp, oid));
        }
        Ok(())
    }

    /// Hide everything reachable from `oid` (inclusive). Unknown commits
    /// are ignored, so haves from a foreign advertisement are safe.
    pub fn hide(&mut self, oid: Oid) -> Result<()> {
        let mut stack = vec![oid];
        while let Some(current) = stack.pop() {
            if !self.hidden.insert(current) {
                continue;
            }
            if self.shallow.contains(&current) {
                continue;
            }
            if let Ok(commit) = self.repo.read_commit(&current) {
                stack.extend(commit.parents);
            }
        }
        Ok(())
    }

    fn next_inner(&mut self) -> Result<Option<(Oid, Commit)>> {
        while let Some((_, oid)) = self.queue.pop() {
            let commit = self.repo.read_commit(&oid)?;
            if !self.shallow.contains(&oid) {
                for parent in &commit.parents {
                    if !self.queued.contains(parent) && self.repo.has_object(parent)? {
                        self.queued.insert(*parent);
                        let parent_commit = self.repo.read_commit(parent)?;
                        self.queue.push((parent_commit.committer.timestamp, *parent));
                    }
                }
            }
            if !self.hidden.contains(&oid) {
                return Ok(Some((oid, commit)));
            }
        }
        Ok(None)
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<(Oid, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_inner().transpose()
    }
}

/// All commits reachable from `start` (inclusive), up to `cap` entries.
pub fn reachable_commits(repo: &Repository, starts: &[Oid], cap: usize) -> Result<Vec<Oid>> {
    let mut walk = RevWalk::new(repo)?;
    for start in starts {
        if repo.has_object(start)? {
            walk.push(*start)?;
        }
    }
    let mut out = Vec::new();
    for item in walk {
        let (oid, _) = item?;
        out.push(oid);
        if out.len() >= cap {
            break;
        }
    }
    Ok(out)
}

/// Whether `ancestor` is reachable from `descendant` (a fast-forward
/// check; equal OIDs count as descent).
pub fn is_descendant(repo: &Repository, ancestor: Oid, descendant: Oid) -> Result<bool> {
    if ancestor == descendant {
        return Ok(true);
    }
    let mut walk = RevWalk::new(repo)?;
    walk.push(descendant)?;
    for item in walk {
        let (oid, _) = item?;
        if oid == ancestor {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Best common ancestor of `a` and `b` (first found in date order).
pub fn merge_base(repo: &Repository, a: Oid, b: Oid) -> Result<Option<Oid>> {
    let mut ancestors = HashSet::new();
    let mut walk = RevWalk::new(repo)?;
    walk.push(a)?;
    for item in walk {
        ancestors.insert(item?.0);
    }
    let mut walk = RevWalk::new(repo)?;
    walk.push(b)?;
    for item in walk {
        let (oid, _) = item?;
        if ancestors.contains(&oid) {
            return Ok(Some(oid));
        }
    }
    Ok(None)
}

/// Commits reachable from `wants` but not from `haves`, newest first.
pub fn commits_between(repo: &Repository, wants: &[Oid], haves: &[Oid]) -> Result<Vec<Oid>> {
    let mut walk = RevWalk::new(repo)?;
    for want in wants {
        walk.push(*want)?;
    }
    for have in haves {
        if repo.has_object(have)? {
            walk.hide(*have)?;
        }
    }
    let mut out = Vec::new();
    for item in walk {
        out.push(item?.0);
    }
    Ok(out)
}

/// Enumerate the objects (commits plus their snapshots) needed to
/// transmit `commits`, excluding everything in the snapshots of
/// `excluded_tips`. Ordered commits-first, the order the pack writer
/// expects.
pub fn objects_for_commits(
    repo: &Repository,
    commits: &[Oid],
    excluded_tips: &[Oid],
) -> Result<Vec<(Oid, ObjectKind, Vec<u8>)>> {
    let mut excluded: HashSet<Oid> = HashSet::new();
    for tip in excluded_tips {
        if !repo.has_object(tip)? {
            continue;
        }
        let commit = repo.read_commit(tip)?;
        collect_tree(repo, &commit.tree, &mut excluded)?;
    }
    let mut seen: HashSet<Oid> = HashSet::new();
    let mut out = Vec::new();
    let mut trees: Vec<Oid> = Vec::new();
    for oid in commits {
        if !seen.insert(*oid) {
            continue;
        }
        let (kind, payload) = repo.read_object(oid)?;
        let commit = repo.read_commit(oid)?;
        out.push((*oid, kind, payload));
        trees.push(commit.tree);
    }
    for tree in trees {
        let mut objects = HashSet::new();
        collect_tree(repo, &tree, &mut objects)?;
        let mut ordered: Vec<Oid> = objects.into_iter().collect();
        ordered.sort();
        for oid in ordered {
            if excluded.contains(&oid) || !seen.insert(oid) {
                continue;
            }
            let (kind, payload) = repo.read_object(&oid)?;
            out.push((oid, kind, payload));
        }
    }
    Ok(out)
}

fn collect_tree(repo: &Repository, tree: &Oid, out: &mut HashSet<Oid>) -> Result<()> {
    if !out.insert(*tree) {
        return Ok(());
    }
    let parsed = repo.read_tree(tree)?;
    for entry in &parsed.entries {
        match entry.mode {
            grit_odb::FileMode::Tree => collect_tree(repo, &entry.oid, out)?,
            grit_odb::FileMode::Gitlink => {} // Submodule commits live elsewhere.
            _ => {
                out.insert(entry.oid);
            }
        }
    }
    Ok(())
}
