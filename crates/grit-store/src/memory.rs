//! Embedded in-memory backend.
//!
//! An indexed key-value rendition of the git directory: sorted maps per
//! area behind one mutex. Used by the test suite and by hosts that embed
//! repositories without a filesystem (the "indexed store" backend).
//!
//! Working-tree stats are synthesized: a write counter stands in for
//! mtime/inode so change detection behaves like a real filesystem.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use grit_odb::Oid;

use crate::{Backend, FileStat, StoreError, WorkdirEntry, WorktreeRecord, parse_packed_refs};

#[derive(Clone)]
struct MemFile {
    data: Vec<u8>,
    executable: bool,
    symlink: bool,
    /// Write-counter value at last modification; doubles as mtime and ino.
    version: u32,
}

#[derive(Default)]
struct Inner {
    refs: BTreeMap<String, String>,
    packed_refs: Option<Vec<u8>>,
    loose: BTreeMap<String, Vec<u8>>,
    packs: BTreeMap<String, Vec<u8>>,
    pack_indexes: BTreeMap<String, Vec<u8>>,
    index: Option<Vec<u8>>,
    reflogs: BTreeMap<String, Vec<u8>>,
    state: BTreeMap<String, Vec<u8>>,
    lfs: BTreeMap<String, Vec<u8>>,
    worktrees: BTreeMap<String, WorktreeRecord>,
    workdir: Option<BTreeMap<String, MemFile>>,
    export_ok: bool,
    generation: u64,
    write_counter: u32,
}

/// In-memory storage backend.
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// A backend with a (virtual) working tree.
    #[must_use]
    pub fn new() -> Self {
        let inner = Inner {
            workdir: Some(BTreeMap::new()),
            ..Inner::default()
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// A bare backend: object/ref storage only.
    #[must_use]
    pub fn bare() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a previous holder panicked mid-mutation;
        // continuing would expose torn state.
        #[allow(clippy::unwrap_used)]
        self.inner.lock().unwrap()
    }
}

impl Backend for MemoryBackend {
    fn initialize(&self, default_branch: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner
            .refs
            .entry("HEAD".to_owned())
            .or_insert_with(|| format!("ref: refs/heads/{default_branch}"));
        inner.state.entry("config".to_owned()).or_default();
        inner.generation += 1;
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn read_ref_raw(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().refs.get(name).cloned())
    }

    fn write_ref_raw(
        &self,
        name: &str,
        value: &str,
        expected_old: Option<Option<&str>>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(expected) = expected_old {
            let actual = inner.refs.get(name).cloned().or_else(|| {
                inner
                    .packed_refs
                    .as_deref()
                    .and_then(|data| parse_packed_refs(data).get(name).cloned())
            });
            if actual.as_deref() != expected {
                return Err(StoreError::RefMismatch {
                    name: name.to_owned(),
                    expected: expected.map(ToOwned::to_owned),
                    actual,
                });
            }
        }
        inner.refs.insert(name.to_owned(), value.to_owned());
        inner.generation += 1;
        Ok(())
    }

    fn delete_ref_raw(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.refs.remove(name);
        inner.generation += 1;
        Ok(())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .refs
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn read_packed_refs(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().packed_refs.clone())
    }

    fn write_packed_refs(&self, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.packed_refs = Some(data.to_vec());
        inner.generation += 1;
        Ok(())
    }

    fn read_loose_object(&self, oid: &Oid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().loose.get(&oid.to_hex()).cloned())
    }

    fn write_loose_object(&self, oid: &Oid, deflated: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.loose.get(&oid.to_hex()) {
            if existing == deflated {
                return Ok(());
            }
            return Err(StoreError::ObjectHashMismatch { oid: *oid });
        }
        inner.loose.insert(oid.to_hex(), deflated.to_vec());
        inner.generation += 1;
        Ok(())
    }

    fn has_loose_object(&self, oid: &Oid) -> Result<bool, StoreError> {
        Ok(self.lock().loose.contains_key(&oid.to_hex()))
    }

    fn list_loose_prefix(&self, two_hex: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .loose
            .keys()
            .filter_map(|hex| hex.strip_prefix(two_hex))
            .map(ToOwned::to_owned)
            .collect())
    }

    fn list_packs(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().packs.keys().cloned().collect())
    }

    fn read_pack(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.lock()
            .packs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                what: format!("packfile {name}"),
            })
    }

    fn read_pack_index(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().pack_indexes.get(name).cloned())
    }

    fn write_pack(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.packs.insert(name.to_owned(), data.to_vec());
        inner.generation += 1;
        Ok(())
    }

    fn write_pack_index(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.pack_indexes.insert(name.to_owned(), data.to_vec());
        inner.generation += 1;
        Ok(())
    }

    fn read_index(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().index.clone())
    }

    fn write_index(&self, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.index = Some(data.to_vec());
        inner.generation += 1;
        Ok(())
    }

    fn has_index(&self) -> Result<bool, StoreError> {
        Ok(self.lock().index.is_some())
    }

    fn append_reflog(&self, refname: &str, line: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let log = inner.reflogs.entry(refname.to_owned()).or_default();
        log.extend_from_slice(line.trim_end_matches('\n').as_bytes());
        log.push(b'\n');
        inner.generation += 1;
        Ok(())
    }

    fn read_reflog(&self, refname: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().reflogs.get(refname).cloned())
    }

    fn list_reflogs(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().reflogs.keys().cloned().collect())
    }

    fn delete_reflog(&self, refname: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.reflogs.remove(refname);
        inner.generation += 1;
        Ok(())
    }

    fn read_state_file(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().state.get(name).cloned())
    }

    fn write_state_file(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.state.insert(name.to_owned(), data.to_vec());
        inner.generation += 1;
        Ok(())
    }

    fn delete_state_file(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.state.remove(name);
        inner.generation += 1;
        Ok(())
    }

    fn list_state_files(&self, candidates: &[&str]) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        Ok(candidates
            .iter()
            .filter(|name| inner.state.contains_key(**name))
            .map(|&name| name.to_owned())
            .collect())
    }

    fn hook_path(&self, _name: &str) -> Result<Option<PathBuf>, StoreError> {
        // No process-spawnable hooks in memory; embedders install a
        // HookRunner instead.
        Ok(None)
    }

    fn export_ok(&self) -> Result<bool, StoreError> {
        Ok(self.lock().export_ok)
    }

    fn set_export_ok(&self, allowed: bool) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.export_ok = allowed;
        inner.generation += 1;
        Ok(())
    }

    fn read_lfs_object(&self, sha256: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().lfs.get(sha256).cloned())
    }

    fn write_lfs_object(&self, sha256: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.lfs.insert(sha256.to_owned(), data.to_vec());
        inner.generation += 1;
        Ok(())
    }

    fn list_worktrees(&self) -> Result<Vec<WorktreeRecord>, StoreError> {
        Ok(self.lock().worktrees.values().cloned().collect())
    }

    fn read_worktree(&self, name: &str) -> Result<Option<WorktreeRecord>, StoreError> {
        Ok(self.lock().worktrees.get(name).cloned())
    }

    fn write_worktree(&self, record: &WorktreeRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.worktrees.insert(record.name.clone(), record.clone());
        inner.generation += 1;
        Ok(())
    }

    fn delete_worktree(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.worktrees.remove(name);
        inner.generation += 1;
        Ok(())
    }

    fn has_workdir(&self) -> bool {
        self.lock().workdir.is_some()
    }

    fn read_workdir_file(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.lock();
        let Some(workdir) = &inner.workdir else {
            return Err(bare_workdir());
        };
        Ok(workdir.get(path).map(|f| f.data.clone()))
    }

    fn write_workdir_file(
        &self,
        path: &str,
        data: &[u8],
        executable: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.write_counter += 1;
        let version = inner.write_counter;
        let Some(workdir) = &mut inner.workdir else {
            return Err(bare_workdir());
        };
        workdir.insert(
            path.to_owned(),
            MemFile {
                data: data.to_vec(),
                executable,
                symlink: false,
                version,
            },
        );
        Ok(())
    }

    fn write_workdir_symlink(&self, path: &str, target: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.write_counter += 1;
        let version = inner.write_counter;
        let Some(workdir) = &mut inner.workdir else {
            return Err(bare_workdir());
        };
        workdir.insert(
            path.to_owned(),
            MemFile {
                data: target.as_bytes().to_vec(),
                executable: false,
                symlink: true,
                version,
            },
        );
        Ok(())
    }

    fn delete_workdir_file(&self, path: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let Some(workdir) = &mut inner.workdir else {
            return Err(bare_workdir());
        };
        workdir.remove(path);
        Ok(())
    }

    fn list_workdir(&self) -> Result<Vec<WorkdirEntry>, StoreError> {
        let inner = self.lock();
        let Some(workdir) = &inner.workdir else {
            return Err(bare_workdir());
        };
        Ok(workdir
            .keys()
            .map(|path| WorkdirEntry {
                path: path.clone(),
                is_dir: false,
            })
            .collect())
    }

    fn stat_workdir(&self, path: &str) -> Result<Option<FileStat>, StoreError> {
        let inner = self.lock();
        let Some(workdir) = &inner.workdir else {
            return Err(bare_workdir());
        };
        Ok(workdir.get(path).map(|f| {
            let mode = if f.symlink {
                0o120_000
            } else if f.executable {
                0o100_755
            } else {
                0o100_644
            };
            FileStat {
                mtime: f.version,
                ctime: f.version,
                ino: f.version,
                mode,
                size: f.data.len() as u32,
                ..FileStat::default()
            }
        }))
    }
}

fn bare_workdir() -> StoreError {
    StoreError::NotFound {
        what: "working tree (store is bare)".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_odb::{HashKind, ObjectKind, object::hash_object};

    #[test]
    fn initialize_sets_unborn_head() {
        let backend = MemoryBackend::new();
        backend.initialize("main").unwrap();
        assert_eq!(
            backend.read_ref_raw("HEAD").unwrap().as_deref(),
            Some("ref: refs/heads/main")
        );
    }

    #[test]
    fn object_write_is_idempotent() {
        let backend = MemoryBackend::new();
        let oid = hash_object(HashKind::Sha1, ObjectKind::Blob, b"x");
        backend.write_loose_object(&oid, b"bytes").unwrap();
        backend.write_loose_object(&oid, b"bytes").unwrap();
        assert!(backend.write_loose_object(&oid, b"other").is_err());
    }

    #[test]
    fn cas_asserts_absence() {
        let backend = MemoryBackend::new();
        backend
            .write_ref_raw("refs/heads/x", &"a".repeat(40), Some(None))
            .unwrap();
        // Second create-if-absent must fail.
        assert!(matches!(
            backend.write_ref_raw("refs/heads/x", &"b".repeat(40), Some(None)),
            Err(StoreError::RefMismatch { .. })
        ));
    }

    #[test]
    fn workdir_versions_advance() {
        let backend = MemoryBackend::new();
        backend.write_workdir_file("f", b"one", false).unwrap();
        let first = backend.stat_workdir("f").unwrap().unwrap();
        backend.write_workdir_file("f", b"two!", false).unwrap();
        let second = backend.stat_workdir("f").unwrap().unwrap();
        assert!(second.mtime > first.mtime);
        assert_eq!(second.size, 4);
    }

    #[test]
    fn bare_store_rejects_workdir_ops() {
        let backend = MemoryBackend::bare();
        assert!(!backend.has_workdir());
        assert!(backend.read_workdir_file("f").is_err());
    }

    #[test]
    fn state_files_listed_from_candidates() {
        let backend = MemoryBackend::new();
        backend.write_state_file("MERGE_HEAD", b"abc").unwrap();
        let present = backend
            .list_state_files(&["MERGE_HEAD", "ORIG_HEAD"])
            .unwrap();
        assert_eq!(present, vec!["MERGE_HEAD".to_owned()]);
    }
}
