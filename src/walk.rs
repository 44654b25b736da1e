//! The three-tree walker.
//!
//! Checkout, merge, and status all compare the same three kinds of
//! sources: the working tree, the stage (index), and committed trees.
//! [`walk`] takes an ordered set of [`TreeSource`]s and yields one
//! [`WalkItem`] per path appearing in any source, sorted, each with an
//! optional per-source entry. Entry OIDs and content for the working
//! tree are computed lazily — hashing every workdir file would make
//! status quadratic-feeling on big trees — and memoized per walk.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use grit_odb::{FileMode, ObjectKind, Oid, object};
use grit_store::FileStat;

use grit_store::Backend as _;
use crate::errors::{Error, ErrorKind, Result};
use crate::filters;
use crate::repo::Repository;

/// What to walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeSource {
    /// The working tree, filtered through clean (autocrlf, LFS).
    Workdir,
    /// Stage-0 index entries.
    Stage,
    /// A committed tree.
    Tree(Oid),
}

enum Origin {
    Workdir { stat: FileStat },
    Stage { oid: Oid, mode: u32, stat: FileStat },
    Tree { oid: Oid, mode: FileMode },
}

/// One source's view of a path.
pub struct SourceEntry {
    origin: Origin,
    path: String,
    lazy_oid: OnceCell<Oid>,
}

impl SourceEntry {
    /// Unix mode bits for the entry.
    #[must_use]
    pub fn mode(&self) -> u32 {
        match &self.origin {
            Origin::Workdir { stat } => normalize_workdir_mode(stat.mode),
            Origin::Stage { mode, .. } => *mode,
            Origin::Tree { mode, .. } => mode.as_u32(),
        }
    }

    /// Stat information, where the source has one.
    #[must_use]
    pub fn stat(&self) -> Option<&FileStat> {
        match &self.origin {
            Origin::Workdir { stat } | Origin::Stage { stat, .. } => Some(stat),
            Origin::Tree { .. } => None,
        }
    }

    /// The object id. For workdir entries this hashes the filtered
    /// content on first access and memoizes.
    pub fn oid(&self, repo: &Repository) -> Result<Oid> {
        match &self.origin {
            Origin::Stage { oid, .. } | Origin::Tree { oid, .. } => Ok(*oid),
            Origin::Workdir { .. } => {
                if let Some(oid) = self.lazy_oid.get() {
                    return Ok(*oid);
                }
                let content = self.content(repo)?;
                let oid = object::hash_object(repo.hash(), ObjectKind::Blob, &content);
                Ok(*self.lazy_oid.get_or_init(|| oid))
            }
        }
    }

    /// The content as it would be stored (clean-filtered for workdir).
    pub fn content(&self, repo: &Repository) -> Result<Vec<u8>> {
        match &self.origin {
            Origin::Stage { oid, .. } | Origin::Tree { oid, .. } => repo.read_blob(oid),
            Origin::Workdir { .. } => {
                let raw = repo
                    .backend()
                    .read_workdir_file(&self.path)?
                    .ok_or_else(|| {
                        Error::new(ErrorKind::NotFound {
                            kind: "file",
                            id: self.path.clone(),
                        })
                    })?;
                filters::clean(repo, &self.path, &raw)
            }
        }
    }
}

/// A path with its per-source entries (parallel to the walk's sources).
pub struct WalkItem {
    /// Path relative to the worktree root.
    pub path: String,
    /// One slot per source, `None` where the path is absent.
    pub entries: Vec<Option<SourceEntry>>,
}

impl WalkItem {
    /// The entry for source slot `i`.
    #[must_use]
    pub fn entry(&self, i: usize) -> Option<&SourceEntry> {
        self.entries.get(i).and_then(Option::as_ref)
    }
}

/// Walk the union of paths across `sources`. Every path appearing in at
/// least one source is visited exactly once, in sorted path order (which
/// equals depth-first pre-order over the flattened trees).
pub fn walk(repo: &Repository, sources: &[TreeSource]) -> Result<Vec<WalkItem>> {
    let mut by_path: BTreeMap<String, Vec<Option<SourceEntry>>> = BTreeMap::new();
    let slot = |by_path: &mut BTreeMap<String, Vec<Option<SourceEntry>>>,
                path: &str,
                count: usize|
     -> usize {
        by_path
            .entry(path.to_owned())
            .or_insert_with(|| (0..count).map(|_| None).collect());
        count
    };
    let count = sources.len();
    for (i, source) in sources.iter().enumerate() {
        match source {
            TreeSource::Workdir => {
                for entry in repo.backend().list_workdir()? {
                    if entry.is_dir {
                        continue;
                    }
                    let Some(stat) = repo.backend().stat_workdir(&entry.path)? else {
                        continue;
                    };
                    slot(&mut by_path, &entry.path, count);
                    if let Some(slots) = by_path.get_mut(&entry.path) {
                        slots[i] = Some(SourceEntry {
                            origin: Origin::Workdir { stat },
                            path: entry.path.clone(),
                            lazy_oid: OnceCell::new(),
                        });
                    }
                }
            }
            TreeSource::Stage => {
                let index = repo.index()?;
                for entry in index.entries().iter().filter(|e| e.stage == 0) {
                    slot(&mut by_path, &entry.path, count);
                    if let Some(slots) = by_path.get_mut(&entry.path) {
                        slots[i] = Some(SourceEntry {
                            origin: Origin::Stage {
                                oid: entry.oid,
                                mode: entry.mode,
                                stat: entry.stat,
                            },
                            path: entry.path.clone(),
                            lazy_oid: OnceCell::new(),
                        });
                    }
                }
            }
            TreeSource::Tree(root) => {
                for (path, mode, oid) in repo.flatten_tree(root)? {
                    slot(&mut by_path, &path, count);
                    if let Some(slots) = by_path.get_mut(&path) {
                        slots[i] = Some(SourceEntry {
                            origin: Origin::Tree { oid, mode },
                            path: path.clone(),
                            lazy_oid: OnceCell::new(),
                        });
                    }
                }
            }
        }
    }
    Ok(by_path
        .into_iter()
        .map(|(path, entries)| WalkItem { path, entries })
        .collect())
}

/// Validate and normalize a user-supplied repository-relative path.
///
/// Accepts `./`-prefixed paths (stripped); rejects absolute paths,
/// trailing slashes, empty paths, and `..` traversal, naming the
/// violated rule.
pub fn normalize_path(path: &str) -> Result<String> {
    let reject = |reason: &'static str| {
        Err(Error::new(ErrorKind::InvalidFilepath {
            reason,
            path: path.to_owned(),
        }))
    };
    if path.is_empty() {
        return reject("empty");
    }
    if path.starts_with('/') {
        return reject("leading-slash");
    }
    let trimmed = path.strip_prefix("./").unwrap_or(path);
    if trimmed.ends_with('/') {
        return reject("trailing-slash");
    }
    if trimmed.is_empty() {
        return reject("empty");
    }
    for segment in trimmed.split('/') {
        match segment {
            "" => return reject("double-slash"),
            "." => return reject("dot-segment"),
            ".." => return reject("dot-dot-segment"),
            ".git" => return reject("git-directory"),
            _ => {}
        }
    }
    Ok(trimmed.to_owned())
}

/// Collapse raw workdir modes to the four values git records, honoring
/// only the exec bit.
fn normalize_workdir_mode(mode: u32) -> u32 {
    match mode & 0o170_000 {
        0o120_000 => 0o120_000,
        0o160_000 => 0o160_000,
        _ => {
            if mode & 0o111 != 0 {
                0o100_755
            } else {
                0o100_644
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{InitOptions, Repository};
    use grit_store::MemoryBackend;

    fn repo() -> Repository {
        Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks()
    }

    #[test]
    fn union_of_sources_visited_once() {
        let repo = repo();
        // Workdir: a.txt, b.txt. Tree: b.txt, c.txt.
        repo.backend().write_workdir_file("a.txt", b"a", false).unwrap();
        repo.backend().write_workdir_file("b.txt", b"b", false).unwrap();
        let b = repo.write_object(ObjectKind::Blob, b"b").unwrap();
        let c = repo.write_object(ObjectKind::Blob, b"c").unwrap();
        let tree = repo
            .build_tree(&[
                ("b.txt".to_owned(), FileMode::Regular, b),
                ("c.txt".to_owned(), FileMode::Regular, c),
            ])
            .unwrap();
        let items = walk(&repo, &[TreeSource::Workdir, TreeSource::Tree(tree)]).unwrap();
        let paths: Vec<&str> = items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt"]);
        assert!(items[0].entry(0).is_some() && items[0].entry(1).is_none());
        assert!(items[1].entry(0).is_some() && items[1].entry(1).is_some());
        assert!(items[2].entry(0).is_none() && items[2].entry(1).is_some());
    }

    #[test]
    fn workdir_oid_matches_blob_hash() {
        let repo = repo();
        repo.backend()
            .write_workdir_file("f.txt", b"content", false)
            .unwrap();
        let items = walk(&repo, &[TreeSource::Workdir]).unwrap();
        let entry = items[0].entry(0).unwrap();
        let expected = repo.write_object(ObjectKind::Blob, b"content").unwrap();
        assert_eq!(entry.oid(&repo).unwrap(), expected);
        // Memoized: second call returns the same value.
        assert_eq!(entry.oid(&repo).unwrap(), expected);
    }

    #[test]
    fn workdir_oid_respects_autocrlf() {
        let repo = repo();
        repo.update_config(|c| c.set("core.autocrlf", "true")).unwrap();
        repo.backend()
            .write_workdir_file("a.txt", b"Hello\r\nagain", false)
            .unwrap();
        let items = walk(&repo, &[TreeSource::Workdir]).unwrap();
        let entry = items[0].entry(0).unwrap();
        // Pinned blob OID for "Hello\nagain" after CRLF stripping.
        assert_eq!(
            entry.oid(&repo).unwrap().to_hex(),
            "e855bd8b67cc7ee321e4dec1b9e5b17e13aec8e1"
        );
        assert_eq!(entry.content(&repo).unwrap(), b"Hello\nagain");

        repo.update_config(|c| c.set("core.autocrlf", "false")).unwrap();
        let items = walk(&repo, &[TreeSource::Workdir]).unwrap();
        let entry = items[0].entry(0).unwrap();
        assert_eq!(
            entry.oid(&repo).unwrap().to_hex(),
            "8d4f7af538be6af26291dc33eb1fde39b558dbea"
        );
        assert_eq!(entry.content(&repo).unwrap(), b"Hello\r\nagain");
    }

    #[test]
    fn stage_entries_surface_mode_and_oid() {
        let repo = repo();
        let oid = repo.write_object(ObjectKind::Blob, b"staged").unwrap();
        let mut index = (*repo.index().unwrap()).clone();
        index.insert("s.txt", oid, 0o100_755, grit_store::FileStat::default());
        repo.write_index(&index).unwrap();
        let items = walk(&repo, &[TreeSource::Stage]).unwrap();
        let entry = items[0].entry(0).unwrap();
        assert_eq!(entry.oid(&repo).unwrap(), oid);
        assert_eq!(entry.mode(), 0o100_755);
    }

    #[test]
    fn normalize_path_rules() {
        assert_eq!(normalize_path("./src/lib.rs").unwrap(), "src/lib.rs");
        for (path, reason) in [
            ("/abs", "leading-slash"),
            ("dir/", "trailing-slash"),
            ("a//b", "double-slash"),
            ("a/../b", "dot-dot-segment"),
            ("a/./b", "dot-segment"),
            (".git/config", "git-directory"),
            ("", "empty"),
        ] {
            let err = normalize_path(path).unwrap_err();
            match err.into_kind() {
                ErrorKind::InvalidFilepath { reason: got, .. } => assert_eq!(got, reason),
                other => panic!("expected InvalidFilepath, got {other:?}"),
            }
        }
    }
}
