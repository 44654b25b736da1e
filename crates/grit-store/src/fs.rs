//! Filesystem backend: the native git directory layout.
//!
//! Layout written and read here is byte-compatible with stock git:
//! `HEAD`, `config`, `packed-refs`, `refs/**`, `objects/xx/yyyy...`,
//! `objects/pack/pack-<hex>.{pack,idx}`, `logs/**`, `index`, `shallow`,
//! state files at the top level, `hooks/<name>`, `worktrees/<name>/`,
//! `lfs/objects/ab/cd/<sha256>`.
//!
//! Mutations stage into a temp file in the destination directory and
//! rename into place, so readers never observe a half-written file.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use grit_odb::Oid;
use tempfile::NamedTempFile;

use crate::{
    Backend, FileStat, StoreError, WorkdirEntry, WorktreeRecord, parse_packed_refs,
};

/// Storage backend over a real git directory (and optional working tree).
pub struct FsBackend {
    gitdir: PathBuf,
    workdir: Option<PathBuf>,
    generation: AtomicU64,
}

impl FsBackend {
    /// Open a backend over `gitdir`, with `workdir` for non-bare
    /// repositories.
    #[must_use]
    pub fn new(gitdir: impl Into<PathBuf>, workdir: Option<PathBuf>) -> Self {
        Self {
            gitdir: gitdir.into(),
            workdir,
            generation: AtomicU64::new(0),
        }
    }

    /// The git directory this backend serves.
    #[must_use]
    pub fn gitdir(&self) -> &Path {
        &self.gitdir
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn workdir_root(&self) -> Result<&Path, StoreError> {
        self.workdir.as_deref().ok_or_else(|| StoreError::NotFound {
            what: "working tree (repository is bare)".into(),
        })
    }

    /// Temp-and-rename write within the target's directory.
    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let dir = path.parent().ok_or_else(|| StoreError::Corrupt {
            detail: format!("path without parent: {}", path.display()),
        })?;
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn loose_path(&self, oid: &Oid) -> PathBuf {
        let (dir, file) = grit_odb::loose::split_path(oid);
        self.gitdir.join("objects").join(dir).join(file)
    }

    /// Current raw value of a ref, loose taking precedence over packed.
    fn current_ref_value(&self, name: &str) -> Result<Option<String>, StoreError> {
        if let Some(loose) = self.read_ref_raw(name)? {
            return Ok(Some(loose));
        }
        if let Some(packed) = self.read_packed_refs()? {
            return Ok(parse_packed_refs(&packed).get(name).cloned());
        }
        Ok(None)
    }

    fn collect_refs(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut Vec<String>,
    ) -> Result<(), StoreError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".lock") {
                continue;
            }
            let full = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            if entry.file_type()?.is_dir() {
                self.collect_refs(&entry.path(), &full, out)?;
            } else {
                out.push(full);
            }
        }
        Ok(())
    }
}

impl Backend for FsBackend {
    fn initialize(&self, default_branch: &str) -> Result<(), StoreError> {
        tracing::debug!(gitdir = %self.gitdir.display(), "initializing repository layout");
        for sub in [
            "objects/info",
            "objects/pack",
            "refs/heads",
            "refs/tags",
            "hooks",
            "info",
        ] {
            fs::create_dir_all(self.gitdir.join(sub))?;
        }
        let head = self.gitdir.join("HEAD");
        if !head.exists() {
            self.atomic_write(&head, format!("ref: refs/heads/{default_branch}\n").as_bytes())?;
        }
        let config = self.gitdir.join("config");
        if !config.exists() {
            self.atomic_write(&config, b"")?;
        }
        self.bump();
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn read_ref_raw(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(Self::read_optional(&self.gitdir.join(name))?
            .map(|data| String::from_utf8_lossy(&data).trim().to_owned()))
    }

    fn write_ref_raw(
        &self,
        name: &str,
        value: &str,
        expected_old: Option<Option<&str>>,
    ) -> Result<(), StoreError> {
        if let Some(expected) = expected_old {
            let actual = self.current_ref_value(name)?;
            if actual.as_deref() != expected {
                return Err(StoreError::RefMismatch {
                    name: name.to_owned(),
                    expected: expected.map(ToOwned::to_owned),
                    actual,
                });
            }
        }
        self.atomic_write(&self.gitdir.join(name), format!("{value}\n").as_bytes())?;
        self.bump();
        Ok(())
    }

    fn delete_ref_raw(&self, name: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.gitdir.join(name)) {
            Ok(()) => {
                self.bump();
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let trimmed = prefix.trim_end_matches('/');
        let mut out = Vec::new();
        self.collect_refs(&self.gitdir.join(trimmed), trimmed, &mut out)?;
        out.sort();
        Ok(out)
    }

    fn read_packed_refs(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Self::read_optional(&self.gitdir.join("packed-refs"))
    }

    fn write_packed_refs(&self, data: &[u8]) -> Result<(), StoreError> {
        self.atomic_write(&self.gitdir.join("packed-refs"), data)?;
        self.bump();
        Ok(())
    }

    fn read_loose_object(&self, oid: &Oid) -> Result<Option<Vec<u8>>, StoreError> {
        Self::read_optional(&self.loose_path(oid))
    }

    fn write_loose_object(&self, oid: &Oid, deflated: &[u8]) -> Result<(), StoreError> {
        let path = self.loose_path(oid);
        if let Some(existing) = Self::read_optional(&path)? {
            // The address is the hash: equal content is a no-op, unequal
            // content means the store is lying about an id.
            if existing == deflated {
                return Ok(());
            }
            return Err(StoreError::ObjectHashMismatch { oid: *oid });
        }
        self.atomic_write(&path, deflated)?;
        self.bump();
        Ok(())
    }

    fn has_loose_object(&self, oid: &Oid) -> Result<bool, StoreError> {
        Ok(self.loose_path(oid).exists())
    }

    fn list_loose_prefix(&self, two_hex: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.gitdir.join("objects").join(two_hex);
        let mut out = Vec::new();
        match fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    out.push(entry?.file_name().to_string_lossy().into_owned());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        out.sort();
        Ok(out)
    }

    fn list_packs(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.gitdir.join("objects/pack");
        let mut out = Vec::new();
        match fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    let name = entry?.file_name().to_string_lossy().into_owned();
                    if let Some(stem) = name.strip_suffix(".pack") {
                        out.push(stem.to_owned());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        out.sort();
        Ok(out)
    }

    fn read_pack(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.gitdir.join("objects/pack").join(format!("{name}.pack"));
        Self::read_optional(&path)?.ok_or_else(|| StoreError::NotFound {
            what: format!("packfile {name}"),
        })
    }

    fn read_pack_index(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Self::read_optional(&self.gitdir.join("objects/pack").join(format!("{name}.idx")))
    }

    fn write_pack(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        self.atomic_write(
            &self.gitdir.join("objects/pack").join(format!("{name}.pack")),
            data,
        )?;
        self.bump();
        Ok(())
    }

    fn write_pack_index(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        self.atomic_write(
            &self.gitdir.join("objects/pack").join(format!("{name}.idx")),
            data,
        )?;
        self.bump();
        Ok(())
    }

    fn read_index(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Self::read_optional(&self.gitdir.join("index"))
    }

    fn write_index(&self, data: &[u8]) -> Result<(), StoreError> {
        self.atomic_write(&self.gitdir.join("index"), data)?;
        self.bump();
        Ok(())
    }

    fn has_index(&self) -> Result<bool, StoreError> {
        Ok(self.gitdir.join("index").exists())
    }

    fn append_reflog(&self, refname: &str, line: &str) -> Result<(), StoreError> {
        let path = self.gitdir.join("logs").join(refname);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.trim_end_matches('\n').as_bytes())?;
        file.write_all(b"\n")?;
        self.bump();
        Ok(())
    }

    fn read_reflog(&self, refname: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Self::read_optional(&self.gitdir.join("logs").join(refname))
    }

    fn list_reflogs(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        let root = self.gitdir.join("logs");
        if root.join("HEAD").is_file() {
            out.push("HEAD".to_owned());
        }
        self.collect_logs(&root.join("refs"), "refs", &mut out)?;
        out.sort();
        Ok(out)
    }

    fn delete_reflog(&self, refname: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.gitdir.join("logs").join(refname)) {
            Ok(()) => {
                self.bump();
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_state_file(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Self::read_optional(&self.gitdir.join(name))
    }

    fn write_state_file(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        self.atomic_write(&self.gitdir.join(name), data)?;
        self.bump();
        Ok(())
    }

    fn delete_state_file(&self, name: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.gitdir.join(name)) {
            Ok(()) => {
                self.bump();
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_state_files(&self, candidates: &[&str]) -> Result<Vec<String>, StoreError> {
        Ok(candidates
            .iter()
            .filter(|name| self.gitdir.join(name).is_file())
            .map(|&name| name.to_owned())
            .collect())
    }

    fn hook_path(&self, name: &str) -> Result<Option<PathBuf>, StoreError> {
        let path = self.gitdir.join("hooks").join(name);
        if !path.is_file() {
            return Ok(None);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            let mode = fs::metadata(&path)?.permissions().mode();
            if mode & 0o111 == 0 {
                return Ok(None);
            }
        }
        Ok(Some(path))
    }

    fn export_ok(&self) -> Result<bool, StoreError> {
        Ok(self.gitdir.join("git-daemon-export-ok").exists())
    }

    fn set_export_ok(&self, allowed: bool) -> Result<(), StoreError> {
        let path = self.gitdir.join("git-daemon-export-ok");
        if allowed {
            self.atomic_write(&path, b"")?;
        } else if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        self.bump();
        Ok(())
    }

    fn read_lfs_object(&self, sha256: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Self::read_optional(&self.lfs_path(sha256))
    }

    fn write_lfs_object(&self, sha256: &str, data: &[u8]) -> Result<(), StoreError> {
        self.atomic_write(&self.lfs_path(sha256), data)?;
        self.bump();
        Ok(())
    }

    fn list_worktrees(&self) -> Result<Vec<WorktreeRecord>, StoreError> {
        let dir = self.gitdir.join("worktrees");
        let mut out = Vec::new();
        match fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    let name = entry?.file_name().to_string_lossy().into_owned();
                    if let Some(record) = self.read_worktree(&name)? {
                        out.push(record);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn read_worktree(&self, name: &str) -> Result<Option<WorktreeRecord>, StoreError> {
        let dir = self.gitdir.join("worktrees").join(name);
        let Some(gitdir_line) = Self::read_optional(&dir.join("gitdir"))? else {
            return Ok(None);
        };
        let head = Self::read_optional(&dir.join("HEAD"))?
            .map(|d| String::from_utf8_lossy(&d).trim().to_owned())
            .unwrap_or_default();
        let locked = Self::read_optional(&dir.join("locked"))?
            .map(|d| String::from_utf8_lossy(&d).trim().to_owned());
        // `gitdir` stores `<worktree>/.git`; the worktree path is its parent.
        let gitdir_path = PathBuf::from(String::from_utf8_lossy(&gitdir_line).trim());
        let path = gitdir_path
            .parent()
            .map_or_else(|| gitdir_path.clone(), Path::to_path_buf);
        Ok(Some(WorktreeRecord {
            name: name.to_owned(),
            path,
            head,
            locked,
        }))
    }

    fn write_worktree(&self, record: &WorktreeRecord) -> Result<(), StoreError> {
        let dir = self.gitdir.join("worktrees").join(&record.name);
        fs::create_dir_all(&dir)?;
        let gitdir_line = format!("{}/.git\n", record.path.display());
        self.atomic_write(&dir.join("gitdir"), gitdir_line.as_bytes())?;
        self.atomic_write(&dir.join("HEAD"), format!("{}\n", record.head).as_bytes())?;
        match &record.locked {
            Some(reason) => self.atomic_write(&dir.join("locked"), reason.as_bytes())?,
            None => {
                if let Err(e) = fs::remove_file(dir.join("locked")) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(e.into());
                    }
                }
            }
        }
        self.bump();
        Ok(())
    }

    fn delete_worktree(&self, name: &str) -> Result<(), StoreError> {
        let dir = self.gitdir.join("worktrees").join(name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                self.bump();
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn has_workdir(&self) -> bool {
        self.workdir.is_some()
    }

    fn read_workdir_file(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let full = self.workdir_root()?.join(path);
        if full.is_symlink() {
            let target = fs::read_link(&full)?;
            return Ok(Some(target.to_string_lossy().into_owned().into_bytes()));
        }
        Self::read_optional(&full)
    }

    fn write_workdir_file(
        &self,
        path: &str,
        data: &[u8],
        executable: bool,
    ) -> Result<(), StoreError> {
        let full = self.workdir_root()?.join(path);
        if let Some(dir) = full.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&full, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            let mode = if executable { 0o755 } else { 0o644 };
            fs::set_permissions(&full, fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        let _ = executable;
        Ok(())
    }

    fn write_workdir_symlink(&self, path: &str, target: &str) -> Result<(), StoreError> {
        let full = self.workdir_root()?.join(path);
        if let Some(dir) = full.parent() {
            fs::create_dir_all(dir)?;
        }
        if let Err(e) = fs::remove_file(&full) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, &full)?;
        #[cfg(not(unix))]
        fs::write(&full, target.as_bytes())?;
        Ok(())
    }

    fn delete_workdir_file(&self, path: &str) -> Result<(), StoreError> {
        let root = self.workdir_root()?.to_path_buf();
        let full = root.join(path);
        match fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        // Prune empty parents up to the worktree root.
        let mut dir = full.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d == root || fs::remove_dir(&d).is_err() {
                break;
            }
            dir = d.parent().map(Path::to_path_buf);
        }
        Ok(())
    }

    fn list_workdir(&self) -> Result<Vec<WorkdirEntry>, StoreError> {
        let root = self.workdir_root()?.to_path_buf();
        let mut out = Vec::new();
        self.walk_workdir(&root, "", &mut out)?;
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn stat_workdir(&self, path: &str) -> Result<Option<FileStat>, StoreError> {
        let full = self.workdir_root()?.join(path);
        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(stat_from_metadata(&meta)))
    }
}

impl FsBackend {
    fn lfs_path(&self, sha256: &str) -> PathBuf {
        let (a, b) = (sha256.get(..2).unwrap_or("xx"), sha256.get(2..4).unwrap_or("xx"));
        self.gitdir.join("lfs/objects").join(a).join(b).join(sha256)
    }

    fn collect_logs(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut Vec<String>,
    ) -> Result<(), StoreError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let full = format!("{prefix}/{name}");
            if entry.file_type()?.is_dir() {
                self.collect_logs(&entry.path(), &full, out)?;
            } else {
                out.push(full);
            }
        }
        Ok(())
    }

    fn walk_workdir(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut Vec<WorkdirEntry>,
    ) -> Result<(), StoreError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            let path = entry.path();
            if path == self.gitdir || name == ".git" {
                continue;
            }
            if entry.file_type()?.is_dir() {
                self.walk_workdir(&path, &rel, out)?;
            } else {
                out.push(WorkdirEntry {
                    path: rel,
                    is_dir: false,
                });
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn stat_from_metadata(meta: &fs::Metadata) -> FileStat {
    use std::os::unix::fs::MetadataExt as _;
    FileStat {
        ctime: meta.ctime().max(0) as u32,
        ctime_nsec: meta.ctime_nsec().max(0) as u32,
        mtime: meta.mtime().max(0) as u32,
        mtime_nsec: meta.mtime_nsec().max(0) as u32,
        dev: meta.dev() as u32,
        ino: meta.ino() as u32,
        mode: meta.mode(),
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.len() as u32,
    }
}

#[cfg(not(unix))]
fn stat_from_metadata(meta: &fs::Metadata) -> FileStat {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as u32);
    FileStat {
        mtime,
        size: meta.len() as u32,
        mode: 0o100_644,
        ..FileStat::default()
    }
}
