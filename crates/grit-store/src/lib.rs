//! Storage backends for grit.
//!
//! This crate defines the [`Backend`] trait — the single seam between the
//! grit core and persistence. Everything the core reads or writes (refs,
//! objects, packs, the index, reflogs, state files, hooks, LFS objects,
//! worktree records, and working-tree files) goes through this trait, so
//! the core never touches the filesystem directly and tests can run
//! entirely in memory.
//!
//! Two implementations ship:
//!
//! - [`FsBackend`] — the native git directory layout (`HEAD`, `refs/`,
//!   `objects/`, `logs/`, ...), byte-compatible with stock git.
//! - [`MemoryBackend`] — an embedded indexed store over sorted maps, for
//!   tests and hosts without a filesystem.
//!
//! # Atomicity
//!
//! All mutating operations are atomic: the filesystem backend stages into
//! a temp file and renames, the memory backend swaps under a lock. A
//! failed write leaves no externally visible change. Every mutation bumps
//! the backend's generation counter, which the repository handle uses to
//! invalidate parsed caches.

use std::collections::BTreeMap;
use std::path::PathBuf;

use grit_odb::Oid;

pub mod fs;
pub mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by [`Backend`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The named thing does not exist. Distinct from I/O failure.
    #[error("not found: {what}")]
    NotFound {
        /// Human-readable description of what was missing.
        what: String,
    },

    /// A compare-and-set ref update found a different current value.
    #[error("ref `{name}` changed: expected {expected:?}, found {actual:?}")]
    RefMismatch {
        /// The ref that could not be updated.
        name: String,
        /// Value the caller expected.
        expected: Option<String>,
        /// Value actually present.
        actual: Option<String>,
    },

    /// An object write collided with different bytes under the same id.
    #[error("object {oid} already exists with different content")]
    ObjectHashMismatch {
        /// The colliding object id.
        oid: Oid,
    },

    /// An underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes violated an internal invariant.
    #[error("store corrupt: {detail}")]
    Corrupt {
        /// What was wrong.
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Filesystem-style metadata for a working-tree entry, as recorded in the
/// index and compared during status walks. Fields a backend cannot supply
/// (e.g. inode numbers in memory) are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileStat {
    /// Change time, seconds part.
    pub ctime: u32,
    /// Change time, nanoseconds part.
    pub ctime_nsec: u32,
    /// Modification time, seconds part.
    pub mtime: u32,
    /// Modification time, nanoseconds part.
    pub mtime_nsec: u32,
    /// Device number.
    pub dev: u32,
    /// Inode number.
    pub ino: u32,
    /// Unix mode bits.
    pub mode: u32,
    /// Owner uid.
    pub uid: u32,
    /// Owner gid.
    pub gid: u32,
    /// File size in bytes.
    pub size: u32,
}

/// A linked-worktree record (`worktrees/<name>/`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorktreeRecord {
    /// Worktree name.
    pub name: String,
    /// Absolute path of the checked-out tree.
    pub path: PathBuf,
    /// Raw HEAD content for the worktree (`ref: ...` or hex).
    pub head: String,
    /// Lock reason when the worktree is locked.
    pub locked: Option<String>,
}

/// A directory listing entry from the working tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkdirEntry {
    /// Path relative to the worktree root, `/`-separated.
    pub path: String,
    /// `true` if the entry is a directory.
    pub is_dir: bool,
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// The storage capability set grit programs against.
///
/// Object-safe: the repository handle holds a `Box<dyn Backend>`. Method
/// groups mirror the on-disk areas of a git directory. Raw ref values are
/// exchanged as strings — either 40/64-char hex or a `ref: <target>`
/// symbolic pointer; interpretation lives in the core's ref store.
pub trait Backend: Send {
    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create the skeleton of an empty repository (directories, HEAD,
    /// config). Idempotent.
    fn initialize(&self, default_branch: &str) -> Result<(), StoreError>;

    /// Monotonic counter bumped by every mutation; caches compare this to
    /// decide whether parsed views are still valid.
    fn generation(&self) -> u64;

    // -----------------------------------------------------------------------
    // Refs (raw values; loose files only — packed-refs is its own blob)
    // -----------------------------------------------------------------------

    /// Read a loose ref's raw content (trimmed). `None` if absent.
    fn read_ref_raw(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Atomically write a loose ref's raw content.
    ///
    /// When `expected_old` is `Some`, the write is compare-and-set against
    /// the current *loose-or-packed* value: `Some(None)` asserts the ref
    /// must not exist, `Some(Some(v))` asserts its current raw value is
    /// `v`. Mismatch fails with [`StoreError::RefMismatch`] and writes
    /// nothing.
    fn write_ref_raw(
        &self,
        name: &str,
        value: &str,
        expected_old: Option<Option<&str>>,
    ) -> Result<(), StoreError>;

    /// Delete a loose ref. No-op if absent.
    fn delete_ref_raw(&self, name: &str) -> Result<(), StoreError>;

    /// List loose refs under a prefix (e.g. `refs/heads/`), full names,
    /// sorted.
    fn list_refs(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// The `packed-refs` file, if present.
    fn read_packed_refs(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically replace the `packed-refs` file.
    fn write_packed_refs(&self, data: &[u8]) -> Result<(), StoreError>;

    // -----------------------------------------------------------------------
    // Objects (loose and packed, as opaque bytes)
    // -----------------------------------------------------------------------

    /// Read a loose object's deflated bytes.
    fn read_loose_object(&self, oid: &Oid) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a loose object. Writing the same id with identical bytes is a
    /// no-op; identical id with different bytes is
    /// [`StoreError::ObjectHashMismatch`].
    fn write_loose_object(&self, oid: &Oid, deflated: &[u8]) -> Result<(), StoreError>;

    /// Whether a loose object exists.
    fn has_loose_object(&self, oid: &Oid) -> Result<bool, StoreError>;

    /// Hex suffixes of loose objects in one fan-out bucket (`two_hex`).
    fn list_loose_prefix(&self, two_hex: &str) -> Result<Vec<String>, StoreError>;

    /// Names of packfiles (`pack-<hex>`), without extension.
    fn list_packs(&self) -> Result<Vec<String>, StoreError>;

    /// Read a packfile by name.
    fn read_pack(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Read a pack index by pack name, if it exists.
    fn read_pack_index(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a packfile.
    fn write_pack(&self, name: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Store a pack index.
    fn write_pack_index(&self, name: &str, data: &[u8]) -> Result<(), StoreError>;

    // -----------------------------------------------------------------------
    // Index (dircache, opaque bytes)
    // -----------------------------------------------------------------------

    /// Read the serialized index.
    fn read_index(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically replace the index.
    fn write_index(&self, data: &[u8]) -> Result<(), StoreError>;

    /// Whether an index file exists.
    fn has_index(&self) -> Result<bool, StoreError>;

    // -----------------------------------------------------------------------
    // Reflogs
    // -----------------------------------------------------------------------

    /// Append one formatted reflog line (no trailing newline required).
    fn append_reflog(&self, refname: &str, line: &str) -> Result<(), StoreError>;

    /// Read a reflog's raw bytes (oldest entry first). `None` if absent.
    fn read_reflog(&self, refname: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Names of refs that have reflogs.
    fn list_reflogs(&self) -> Result<Vec<String>, StoreError>;

    /// Remove a reflog (branch deletion).
    fn delete_reflog(&self, refname: &str) -> Result<(), StoreError>;

    // -----------------------------------------------------------------------
    // State files (MERGE_HEAD, ORIG_HEAD, shallow, config, ...)
    // -----------------------------------------------------------------------

    /// Read a top-level state file (`MERGE_HEAD`, `config`, `shallow`, ...).
    fn read_state_file(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically write a state file.
    fn write_state_file(&self, name: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Delete a state file. No-op if absent.
    fn delete_state_file(&self, name: &str) -> Result<(), StoreError>;

    /// List existing state files from a candidate set.
    fn list_state_files(&self, candidates: &[&str]) -> Result<Vec<String>, StoreError>;

    // -----------------------------------------------------------------------
    // Hooks, export marker, LFS
    // -----------------------------------------------------------------------

    /// Path of an executable hook, if the backend hosts hooks on disk.
    fn hook_path(&self, name: &str) -> Result<Option<PathBuf>, StoreError>;

    /// Whether `git-daemon-export-ok` is set.
    fn export_ok(&self) -> Result<bool, StoreError>;

    /// Set or clear the export marker.
    fn set_export_ok(&self, allowed: bool) -> Result<(), StoreError>;

    /// Read an LFS object by its sha256 hex id.
    fn read_lfs_object(&self, sha256: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store an LFS object.
    fn write_lfs_object(&self, sha256: &str, data: &[u8]) -> Result<(), StoreError>;

    // -----------------------------------------------------------------------
    // Worktree records
    // -----------------------------------------------------------------------

    /// List linked worktree records.
    fn list_worktrees(&self) -> Result<Vec<WorktreeRecord>, StoreError>;

    /// Read one worktree record.
    fn read_worktree(&self, name: &str) -> Result<Option<WorktreeRecord>, StoreError>;

    /// Create or update a worktree record.
    fn write_worktree(&self, record: &WorktreeRecord) -> Result<(), StoreError>;

    /// Remove a worktree record.
    fn delete_worktree(&self, name: &str) -> Result<(), StoreError>;

    // -----------------------------------------------------------------------
    // Working tree
    // -----------------------------------------------------------------------

    /// `true` if this backend has a working tree at all (bare repositories
    /// and bare memory stores do not).
    fn has_workdir(&self) -> bool;

    /// Read a working-tree file. `None` if absent.
    fn read_workdir_file(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a working-tree file, creating parent directories. `executable`
    /// sets the exec bit where the backend supports modes.
    fn write_workdir_file(
        &self,
        path: &str,
        data: &[u8],
        executable: bool,
    ) -> Result<(), StoreError>;

    /// Create a symlink (or a plain file with the target as content when
    /// `core.symlinks` is off — the caller decides which).
    fn write_workdir_symlink(&self, path: &str, target: &str) -> Result<(), StoreError>;

    /// Delete a working-tree file, pruning now-empty parent directories.
    fn delete_workdir_file(&self, path: &str) -> Result<(), StoreError>;

    /// Recursively list the working tree (files only), sorted by path.
    /// Never descends into the git directory.
    fn list_workdir(&self) -> Result<Vec<WorkdirEntry>, StoreError>;

    /// Stat a working-tree entry.
    fn stat_workdir(&self, path: &str) -> Result<Option<FileStat>, StoreError>;
}

// ---------------------------------------------------------------------------
// packed-refs helpers (shared by both backends' CAS reads)
// ---------------------------------------------------------------------------

/// Parse a `packed-refs` blob into `name -> hex` (ignoring peel lines).
///
/// Lives here so backends can honor loose-over-packed precedence inside
/// compare-and-set without depending on the core crate.
#[must_use]
pub fn parse_packed_refs(data: &[u8]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in data.split(|&b| b == b'\n') {
        if line.is_empty() || line[0] == b'#' || line[0] == b'^' {
            continue;
        }
        let text = String::from_utf8_lossy(line);
        if let Some((hex, name)) = text.split_once(' ') {
            out.insert(name.trim().to_owned(), hex.trim().to_owned());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_refs_parse_skips_comments_and_peels() {
        let data = b"# pack-refs with: peeled fully-peeled sorted\n\
aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa refs/heads/main\n\
bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb refs/tags/v1\n\
^cccccccccccccccccccccccccccccccccccccccc\n";
        let parsed = parse_packed_refs(data);
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed.get("refs/heads/main").map(String::as_str),
            Some("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
        assert!(!parsed.contains_key("^cccccccccccccccccccccccccccccccccccccccc"));
    }
}
