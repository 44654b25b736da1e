//! The dircache (index).
//!
//! On-disk layout: `DIRC` magic, version (2), entry count, entries in
//! path order (62 fixed bytes + path, NUL-padded to an 8-byte boundary),
//! optional extensions, and a trailing hash over everything before it.
//! Version 3 entries carry two extra flag bytes when the extended bit is
//! set; both versions parse, version 2 is written unless an entry needs
//! extended flags.
//!
//! Structural validation runs on every load: an empty file, a bad magic,
//! or a checksum mismatch each produce the matching `IndexCorrupt`
//! detail.

use grit_odb::{HashKind, Hasher, Oid};
use grit_store::FileStat;

use crate::errors::{Error, ErrorKind, Result};

const MAGIC: &[u8; 4] = b"DIRC";

const FLAG_ASSUME_VALID: u16 = 0x8000;
const FLAG_EXTENDED: u16 = 0x4000;
const STAGE_SHIFT: u16 = 12;
const NAME_MASK: u16 = 0x0fff;

const EXT_SKIP_WORKTREE: u16 = 0x4000;
const EXT_INTENT_TO_ADD: u16 = 0x2000;

/// One index entry: a path at a stage with its blob and stat snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Path relative to the worktree root, `/`-separated.
    pub path: String,
    /// Blob (or gitlink commit) id.
    pub oid: Oid,
    /// Unix mode (`0o100644`, `0o100755`, `0o120000`, `0o160000`).
    pub mode: u32,
    /// Conflict stage: 0 normal, 1 base, 2 ours, 3 theirs.
    pub stage: u8,
    /// Cached stat used for change detection.
    pub stat: FileStat,
    /// `assume-valid` bit.
    pub assume_valid: bool,
    /// `skip-worktree` bit (sparse checkout).
    pub skip_worktree: bool,
    /// `intent-to-add` bit.
    pub intent_to_add: bool,
}

impl IndexEntry {
    fn new(path: &str, oid: Oid, mode: u32, stage: u8, stat: FileStat) -> Self {
        Self {
            path: path.to_owned(),
            oid,
            mode,
            stage,
            stat,
            assume_valid: false,
            skip_worktree: false,
            intent_to_add: false,
        }
    }

    fn needs_extended(&self) -> bool {
        self.skip_worktree || self.intent_to_add
    }
}

/// The parsed index: entries strictly ordered by `(path, stage)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    /// The entries, ordered.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The entry at `(path, stage)`.
    #[must_use]
    pub fn get(&self, path: &str, stage: u8) -> Option<&IndexEntry> {
        self.entries
            .iter()
            .find(|e| e.path == path && e.stage == stage)
    }

    /// All stages present for a path.
    #[must_use]
    pub fn stages(&self, path: &str) -> Vec<&IndexEntry> {
        self.entries.iter().filter(|e| e.path == path).collect()
    }

    /// Whether any conflict stages (1–3) exist.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.stage != 0)
    }

    /// Paths with conflict stages, deduplicated, in order.
    #[must_use]
    pub fn conflicted_paths(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.stage != 0) {
            if out.last() != Some(&entry.path) {
                out.push(entry.path.clone());
            }
        }
        out
    }

    /// Insert or replace the `(path, stage 0)` entry, keeping order.
    pub fn insert(&mut self, path: &str, oid: Oid, mode: u32, stat: FileStat) {
        self.insert_stage(path, oid, mode, 0, stat);
    }

    /// Insert or replace an entry at an explicit stage.
    pub fn insert_stage(&mut self, path: &str, oid: Oid, mode: u32, stage: u8, stat: FileStat) {
        let entry = IndexEntry::new(path, oid, mode, stage, stat);
        match self
            .entries
            .binary_search_by(|e| (e.path.as_str(), e.stage).cmp(&(path, stage)))
        {
            Ok(at) => self.entries[at] = entry,
            Err(at) => self.entries.insert(at, entry),
        }
    }

    /// Remove every stage of a path. No-op when absent.
    pub fn remove(&mut self, path: &str) {
        self.entries.retain(|e| e.path != path);
    }

    /// Record a conflict: stages 1/2/3 replace stage 0. A `None` side is
    /// absent (add/add and modify/delete conflicts).
    pub fn stage_conflict(
        &mut self,
        path: &str,
        base: Option<(Oid, u32)>,
        ours: Option<(Oid, u32)>,
        theirs: Option<(Oid, u32)>,
    ) {
        self.remove(path);
        for (stage, side) in [(1u8, base), (2, ours), (3, theirs)] {
            if let Some((oid, mode)) = side {
                self.insert_stage(path, oid, mode, stage, FileStat::default());
            }
        }
    }

    /// Collapse a conflict back to a single stage-0 entry.
    pub fn resolve_conflict(&mut self, path: &str, oid: Oid, mode: u32, stat: FileStat) {
        self.remove(path);
        self.insert(path, oid, mode, stat);
    }

    /// Set or clear the `skip-worktree` bit on a stage-0 entry.
    pub fn mark_skip_worktree(&mut self, path: &str, value: bool) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.path == path && e.stage == 0)
        {
            entry.skip_worktree = value;
        }
    }

    /// Stage-0 `(path, oid, mode)` triples (the tree the next commit
    /// snapshots).
    #[must_use]
    pub fn stage0_entries(&self) -> Vec<(String, Oid, u32)> {
        self.entries
            .iter()
            .filter(|e| e.stage == 0)
            .map(|e| (e.path.clone(), e.oid, e.mode))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Codec
    // -----------------------------------------------------------------------

    /// Parse index bytes, validating magic, structure, and the trailing
    /// checksum.
    pub fn parse(data: &[u8], hash: HashKind) -> Result<Self> {
        let corrupt = |detail: &str| {
            Error::new(ErrorKind::IndexCorrupt {
                detail: detail.to_owned(),
            })
        };
        if data.is_empty() {
            return Err(corrupt("empty"));
        }
        let raw_len = hash.raw_len();
        if data.len() < 12 + raw_len {
            return Err(corrupt("truncated"));
        }
        if &data[..4] != MAGIC {
            return Err(corrupt("magic"));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != 2 && version != 3 {
            return Err(corrupt(&format!("unsupported version {version}")));
        }
        let body_end = data.len() - raw_len;
        let mut hasher = Hasher::new(hash);
        hasher.update(&data[..body_end]);
        if hasher.finalize().as_raw() != &data[body_end..] {
            return Err(corrupt("checksum"));
        }

        let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;
        let mut entries = Vec::with_capacity(count);
        let mut pos = 12;
        for _ in 0..count {
            let entry_start = pos;
            if pos + 62 + raw_len - 20 > body_end {
                return Err(corrupt("entry truncated"));
            }
            let mut words = [0u32; 10];
            for word in &mut words {
                *word = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
                pos += 4;
            }
            let oid = Oid::from_raw(hash, &data[pos..pos + raw_len]);
            pos += raw_len;
            let flags = u16::from_be_bytes([data[pos], data[pos + 1]]);
            pos += 2;
            let mut skip_worktree = false;
            let mut intent_to_add = false;
            if flags & FLAG_EXTENDED != 0 {
                if version < 3 {
                    return Err(corrupt("extended flags in a version 2 index"));
                }
                let extended = u16::from_be_bytes([data[pos], data[pos + 1]]);
                pos += 2;
                skip_worktree = extended & EXT_SKIP_WORKTREE != 0;
                intent_to_add = extended & EXT_INTENT_TO_ADD != 0;
            }
            let name_len = (flags & NAME_MASK) as usize;
            let path_bytes = if name_len < NAME_MASK as usize {
                let slice = data
                    .get(pos..pos + name_len)
                    .ok_or_else(|| corrupt("path truncated"))?;
                pos += name_len;
                slice
            } else {
                // Long path: NUL-terminated.
                let end = data[pos..body_end]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| corrupt("unterminated long path"))?;
                let slice = &data[pos..pos + end];
                pos += end;
                slice
            };
            let path = String::from_utf8_lossy(path_bytes).into_owned();
            // Pad (including at least one NUL) to an 8-byte boundary of
            // the whole entry.
            let entry_len = pos - entry_start;
            let padded = (entry_len / 8 + 1) * 8;
            pos = entry_start + padded;
            if pos > body_end {
                return Err(corrupt("entry padding past checksum"));
            }

            let stat = FileStat {
                ctime: words[0],
                ctime_nsec: words[1],
                mtime: words[2],
                mtime_nsec: words[3],
                dev: words[4],
                ino: words[5],
                mode: words[6],
                uid: words[7],
                gid: words[8],
                size: words[9],
            };
            entries.push(IndexEntry {
                path,
                oid,
                mode: words[6],
                stage: ((flags >> STAGE_SHIFT) & 0x3) as u8,
                stat,
                assume_valid: flags & FLAG_ASSUME_VALID != 0,
                skip_worktree,
                intent_to_add,
            });
        }

        // Entries must be strictly ordered and unique by (path, stage).
        for pair in entries.windows(2) {
            if (pair[0].path.as_str(), pair[0].stage) >= (pair[1].path.as_str(), pair[1].stage) {
                return Err(corrupt("entries out of order"));
            }
        }
        Ok(Self { entries })
    }

    /// Serialize deterministically; the same entries always produce the
    /// same bytes.
    #[must_use]
    pub fn serialize(&self, hash: HashKind) -> Vec<u8> {
        let version: u32 = if self.entries.iter().any(IndexEntry::needs_extended) {
            3
        } else {
            2
        };
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&version.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            let entry_start = out.len();
            let stat = &entry.stat;
            for word in [
                stat.ctime,
                stat.ctime_nsec,
                stat.mtime,
                stat.mtime_nsec,
                stat.dev,
                stat.ino,
                entry.mode,
                stat.uid,
                stat.gid,
                stat.size,
            ] {
                out.extend_from_slice(&word.to_be_bytes());
            }
            out.extend_from_slice(entry.oid.as_raw());
            let name_len = entry.path.len().min(NAME_MASK as usize) as u16;
            let mut flags = name_len | (u16::from(entry.stage) << STAGE_SHIFT);
            if entry.assume_valid {
                flags |= FLAG_ASSUME_VALID;
            }
            if entry.needs_extended() {
                flags |= FLAG_EXTENDED;
            }
            out.extend_from_slice(&flags.to_be_bytes());
            if entry.needs_extended() {
                let mut extended = 0u16;
                if entry.skip_worktree {
                    extended |= EXT_SKIP_WORKTREE;
                }
                if entry.intent_to_add {
                    extended |= EXT_INTENT_TO_ADD;
                }
                out.extend_from_slice(&extended.to_be_bytes());
            }
            out.extend_from_slice(entry.path.as_bytes());
            let entry_len = out.len() - entry_start;
            let padded = (entry_len / 8 + 1) * 8;
            out.resize(entry_start + padded, 0);
        }
        let mut hasher = Hasher::new(hash);
        hasher.update(&out);
        let sum = hasher.finalize();
        out.extend_from_slice(sum.as_raw());
        out
    }
}
