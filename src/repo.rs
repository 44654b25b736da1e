//! The repository handle.
//!
//! [`Repository`] owns the storage backend, the configuration cascade,
//! and the per-gitdir cache of parsed structures (pack indexes, loaded
//! packs, packed-refs, the dircache). Reads go through the cache; every
//! backend mutation bumps the backend's generation counter and the cache
//! revalidates by comparing generations, so structures parsed before a
//! write are never served after it.
//!
//! Concurrency model: one handle is single-threaded cooperative; handles
//! are `Send` but not `Sync`. Hosts wanting parallelism open one handle
//! per thread.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use grit_odb::{
    Commit, FileMode, HashKind, Object, ObjectKind, Oid, PackFile, PackIndex, Signature, Tag,
    Tree, loose, object,
};
use grit_store::Backend;

use crate::config::{ConfigCascade, GitConfig};
use crate::errors::{Error, ErrorKind, Result};
use crate::hooks::{HookRunner, NoopHookRunner, ProcessHookRunner};
use crate::index::Index;

/// Options for creating a repository.
#[derive(Clone, Debug)]
pub struct InitOptions {
    /// Initial branch name HEAD points at.
    pub default_branch: String,
    /// Bare repository (no working tree).
    pub bare: bool,
    /// Object hash algorithm.
    pub hash: HashKind,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            default_branch: "master".to_owned(),
            bare: false,
            hash: HashKind::Sha1,
        }
    }
}

#[derive(Default)]
struct Caches {
    generation: u64,
    primed: bool,
    config: Option<Arc<GitConfig>>,
    packed_refs: Option<Arc<std::collections::BTreeMap<String, String>>>,
    packs: HashMap<String, Arc<PackFile>>,
    pack_indexes: HashMap<String, Arc<PackIndex>>,
    index: Option<Arc<Index>>,
}

/// An open repository.
pub struct Repository {
    backend: Box<dyn Backend>,
    hash: HashKind,
    hook_runner: Box<dyn HookRunner>,
    /// Lower-precedence config layers supplied by the host (system,
    /// global), below the repository's own `config` file.
    host_config: Vec<GitConfig>,
    cache: RefCell<Caches>,
}

impl Repository {
    /// Open an existing repository over a backend.
    pub fn open(backend: Box<dyn Backend>) -> Result<Self> {
        let mut repo = Self {
            backend,
            hash: HashKind::Sha1,
            hook_runner: Box::new(ProcessHookRunner),
            host_config: Vec::new(),
            cache: RefCell::new(Caches::default()),
        };
        let config = repo.config();
        if let Some(version) = config.get_int("core.repositoryformatversion") {
            if version != 0 && version != 1 {
                return Err(Error::new(ErrorKind::ObjectCorrupt {
                    detail: format!("unsupported repositoryformatversion {version}"),
                }));
            }
        }
        if let Some(format) = config.get("extensions.objectformat") {
            repo.hash = HashKind::from_name(format).ok_or_else(|| {
                Error::new(ErrorKind::ObjectCorrupt {
                    detail: format!("unknown object format {format:?}"),
                })
            })?;
        }
        Ok(repo)
    }

    /// Initialize a fresh repository and open it.
    pub fn init(backend: Box<dyn Backend>, options: &InitOptions) -> Result<Self> {
        backend.initialize(&options.default_branch)?;
        let mut config = GitConfig::parse(
            &backend.read_state_file("config")?.unwrap_or_default(),
        );
        config.set(
            "core.repositoryformatversion",
            if options.hash == HashKind::Sha256 { "1" } else { "0" },
        )?;
        config.set("core.filemode", "true")?;
        config.set("core.bare", if options.bare { "true" } else { "false" })?;
        config.set("core.logallrefupdates", "true")?;
        if options.hash == HashKind::Sha256 {
            config.set("extensions.objectformat", "sha256")?;
        }
        backend.write_state_file("config", &config.serialize())?;
        Self::open(backend)
    }

    /// Replace the hook runner (tests, embedders without processes).
    #[must_use]
    pub fn with_hook_runner(mut self, runner: Box<dyn HookRunner>) -> Self {
        self.hook_runner = runner;
        self
    }

    /// Disable process hooks entirely.
    #[must_use]
    pub fn without_hooks(self) -> Self {
        self.with_hook_runner(Box::new(NoopHookRunner))
    }

    /// Install host-level config layers (system, then global).
    #[must_use]
    pub fn with_host_config(mut self, layers: Vec<GitConfig>) -> Self {
        self.host_config = layers;
        self.cache.borrow_mut().config = None;
        self
    }

    /// The storage backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// The hook runner.
    #[must_use]
    pub fn hooks(&self) -> &dyn HookRunner {
        self.hook_runner.as_ref()
    }

    /// The repository's object hash algorithm.
    #[must_use]
    pub const fn hash(&self) -> HashKind {
        self.hash
    }

    /// The zero OID in this repository's width.
    #[must_use]
    pub const fn zero_oid(&self) -> Oid {
        self.hash.zero()
    }

    /// Drop caches when the backend has mutated since they were filled.
    fn revalidate(&self) {
        let generation = self.backend.generation();
        let mut cache = self.cache.borrow_mut();
        if !cache.primed || cache.generation != generation {
            *cache = Caches {
                generation,
                primed: true,
                ..Caches::default()
            };
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// The merged configuration view (host layers + repository config).
    #[must_use]
    pub fn config(&self) -> Arc<GitConfig> {
        self.revalidate();
        if let Some(config) = &self.cache.borrow().config {
            return Arc::clone(config);
        }
        let local = GitConfig::parse(
            &self
                .backend
                .read_state_file("config")
                .ok()
                .flatten()
                .unwrap_or_default(),
        );
        let mut layers = self.host_config.clone();
        layers.push(local);
        let merged = Arc::new(ConfigCascade::new(layers).merged());
        self.cache.borrow_mut().config = Some(Arc::clone(&merged));
        merged
    }

    /// Mutate the repository-local config file.
    pub fn update_config(&self, mutate: impl FnOnce(&mut GitConfig) -> Result<()>) -> Result<()> {
        let mut local = GitConfig::parse(
            &self.backend.read_state_file("config")?.unwrap_or_default(),
        );
        mutate(&mut local)?;
        self.backend.write_state_file("config", &local.serialize())?;
        Ok(())
    }

    /// Whether this repository has a working tree.
    #[must_use]
    pub fn has_workdir(&self) -> bool {
        self.backend.has_workdir() && !self.config().bare()
    }

    // -----------------------------------------------------------------------
    // Object database
    // -----------------------------------------------------------------------

    /// Whether `oid` exists, loose or packed.
    pub fn has_object(&self, oid: &Oid) -> Result<bool> {
        Ok(self.read_object_opt(oid)?.is_some())
    }

    /// Read an object's kind and payload. Packs are probed first, then
    /// the loose store.
    pub fn read_object_opt(&self, oid: &Oid) -> Result<Option<(ObjectKind, Vec<u8>)>> {
        self.revalidate();
        for name in self.backend.list_packs()? {
            let Some(index) = self.pack_index(&name)? else {
                continue;
            };
            if let Some(offset) = index.lookup(oid) {
                let pack = self.pack_file(&name)?;
                let mut cache = HashMap::new();
                let mut lookup = |base: &Oid| -> Option<(ObjectKind, Vec<u8>)> {
                    self.read_object_opt(base).ok().flatten()
                };
                let (kind, payload) = pack.resolve_at(offset, &mut lookup, &mut cache)?;
                return Ok(Some((kind, payload)));
            }
        }
        match self.backend.read_loose_object(oid)? {
            Some(deflated) => {
                let (kind, payload) = loose::decode(&deflated)?;
                Ok(Some((kind, payload)))
            }
            None => Ok(None),
        }
    }

    /// Read an object or fail with `NotFound`.
    pub fn read_object(&self, oid: &Oid) -> Result<(ObjectKind, Vec<u8>)> {
        self.read_object_opt(oid)?.ok_or_else(|| {
            Error::new(ErrorKind::NotFound {
                kind: "object",
                id: oid.to_hex(),
            })
        })
    }

    /// Read and parse an object.
    pub fn read_parsed(&self, oid: &Oid) -> Result<Object> {
        let (kind, payload) = self.read_object(oid)?;
        Ok(Object::parse(kind, &payload, self.hash)?)
    }

    /// Read a commit, peeling annotated tags along the way.
    pub fn read_commit(&self, oid: &Oid) -> Result<Commit> {
        match self.read_parsed(oid)? {
            Object::Commit(commit) => Ok(commit),
            Object::Tag(tag) => self.read_commit(&tag.object),
            other => Err(Error::new(ErrorKind::ObjectType {
                expected: ObjectKind::Commit,
                actual: other.kind(),
            })),
        }
    }

    /// Read a tree.
    pub fn read_tree(&self, oid: &Oid) -> Result<Tree> {
        match self.read_parsed(oid)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(Error::new(ErrorKind::ObjectType {
                expected: ObjectKind::Tree,
                actual: other.kind(),
            })),
        }
    }

    /// Read a blob's bytes.
    pub fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>> {
        let (kind, payload) = self.read_object(oid)?;
        if kind != ObjectKind::Blob {
            return Err(Error::new(ErrorKind::ObjectType {
                expected: ObjectKind::Blob,
                actual: kind,
            }));
        }
        Ok(payload)
    }

    /// Read an annotated tag.
    pub fn read_tag(&self, oid: &Oid) -> Result<Tag> {
        match self.read_parsed(oid)? {
            Object::Tag(tag) => Ok(tag),
            other => Err(Error::new(ErrorKind::ObjectType {
                expected: ObjectKind::Tag,
                actual: other.kind(),
            })),
        }
    }

    /// Write an object (loose) and return its id. Idempotent.
    pub fn write_object(&self, kind: ObjectKind, payload: &[u8]) -> Result<Oid> {
        let oid = object::hash_object(self.hash, kind, payload);
        if self.backend.has_loose_object(&oid)? {
            return Ok(oid);
        }
        let deflated = loose::encode(kind, payload)?;
        self.backend.write_loose_object(&oid, &deflated)?;
        Ok(oid)
    }

    /// Write a parsed object.
    pub fn write_parsed(&self, object: &Object) -> Result<Oid> {
        self.write_object(object.kind(), &object.serialize())
    }

    /// Expand a unique hex prefix to a full OID.
    pub fn expand_oid(&self, prefix: &str) -> Result<Oid> {
        if prefix.len() >= self.hash.hex_len() {
            return Oid::from_hex(prefix).map_err(|e| {
                Error::new(ErrorKind::NotFound {
                    kind: "object",
                    id: e.to_string(),
                })
            });
        }
        if prefix.len() < 4 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::new(ErrorKind::NotFound {
                kind: "object",
                id: prefix.to_owned(),
            }));
        }
        let mut matches: BTreeSet<Oid> = BTreeSet::new();
        let bucket = &prefix[..2];
        for rest in self.backend.list_loose_prefix(bucket)? {
            let hex = format!("{bucket}{rest}");
            if hex.starts_with(prefix) {
                if let Ok(oid) = Oid::from_hex(&hex) {
                    matches.insert(oid);
                }
            }
        }
        for name in self.backend.list_packs()? {
            if let Some(index) = self.pack_index(&name)? {
                matches.extend(index.prefix_matches(prefix));
            }
        }
        match matches.len() {
            1 => Ok(matches.into_iter().next().unwrap_or_else(|| self.zero_oid())),
            0 => Err(Error::new(ErrorKind::NotFound {
                kind: "object",
                id: prefix.to_owned(),
            })),
            _ => Err(Error::new(ErrorKind::NotFound {
                kind: "object",
                id: format!("{prefix} (ambiguous)"),
            })),
        }
    }

    fn pack_index(&self, name: &str) -> Result<Option<Arc<PackIndex>>> {
        if let Some(hit) = self.cache.borrow().pack_indexes.get(name) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(bytes) = self.backend.read_pack_index(name)? else {
            return Ok(None);
        };
        let index = Arc::new(PackIndex::parse(&bytes, self.hash)?);
        self.cache
            .borrow_mut()
            .pack_indexes
            .insert(name.to_owned(), Arc::clone(&index));
        Ok(Some(index))
    }

    fn pack_file(&self, name: &str) -> Result<Arc<PackFile>> {
        if let Some(hit) = self.cache.borrow().packs.get(name) {
            return Ok(Arc::clone(hit));
        }
        let bytes = self.backend.read_pack(name)?;
        let pack = Arc::new(PackFile::parse(bytes, self.hash)?);
        self.cache
            .borrow_mut()
            .packs
            .insert(name.to_owned(), Arc::clone(&pack));
        Ok(pack)
    }

    /// All object ids present in packs (for reachability and pack
    /// writing).
    pub fn packed_oids(&self) -> Result<Vec<Oid>> {
        let mut out = Vec::new();
        for name in self.backend.list_packs()? {
            if let Some(index) = self.pack_index(&name)? {
                out.extend_from_slice(index.oids());
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // packed-refs view
    // -----------------------------------------------------------------------

    /// The parsed `packed-refs` map (cached).
    pub fn packed_refs(&self) -> Result<Arc<std::collections::BTreeMap<String, String>>> {
        self.revalidate();
        if let Some(hit) = &self.cache.borrow().packed_refs {
            return Ok(Arc::clone(hit));
        }
        let map = Arc::new(
            self.backend
                .read_packed_refs()?
                .map(|data| grit_store::parse_packed_refs(&data))
                .unwrap_or_default(),
        );
        self.cache.borrow_mut().packed_refs = Some(Arc::clone(&map));
        Ok(map)
    }

    // -----------------------------------------------------------------------
    // Index view
    // -----------------------------------------------------------------------

    /// The parsed dircache (cached; empty index when the file is absent).
    pub fn index(&self) -> Result<Arc<Index>> {
        self.revalidate();
        if let Some(hit) = &self.cache.borrow().index {
            return Ok(Arc::clone(hit));
        }
        let index = match self.backend.read_index()? {
            Some(bytes) => Index::parse(&bytes, self.hash)?,
            None => Index::default(),
        };
        let index = Arc::new(index);
        self.cache.borrow_mut().index = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Serialize and store the dircache.
    pub fn write_index(&self, index: &Index) -> Result<()> {
        self.backend.write_index(&index.serialize(self.hash))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shallow set
    // -----------------------------------------------------------------------

    /// Commits whose parents are intentionally absent.
    pub fn shallow(&self) -> Result<BTreeSet<Oid>> {
        let mut out = BTreeSet::new();
        if let Some(data) = self.backend.read_state_file("shallow")? {
            for line in String::from_utf8_lossy(&data).lines() {
                let line = line.trim();
                if !line.is_empty() {
                    if let Ok(oid) = Oid::from_hex(line) {
                        out.insert(oid);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Replace the shallow set; an empty set removes the file.
    pub fn write_shallow(&self, shallow: &BTreeSet<Oid>) -> Result<()> {
        if shallow.is_empty() {
            self.backend.delete_state_file("shallow")?;
        } else {
            let mut data = String::new();
            for oid in shallow {
                data.push_str(&oid.to_hex());
                data.push('\n');
            }
            self.backend.write_state_file("shallow", data.as_bytes())?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tree helpers
    // -----------------------------------------------------------------------

    /// Flatten a tree to `(path, mode, oid)` triples, depth-first
    /// pre-order, lexicographic within each directory.
    pub fn flatten_tree(&self, tree: &Oid) -> Result<Vec<(String, FileMode, Oid)>> {
        let mut out = Vec::new();
        self.flatten_into(tree, "", &mut out)?;
        Ok(out)
    }

    fn flatten_into(
        &self,
        tree: &Oid,
        prefix: &str,
        out: &mut Vec<(String, FileMode, Oid)>,
    ) -> Result<()> {
        let tree = self.read_tree(tree)?;
        for entry in &tree.entries {
            let path = if prefix.is_empty() {
                entry.name.to_string()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode == FileMode::Tree {
                self.flatten_into(&entry.oid, &path, out)?;
            } else {
                out.push((path, entry.mode, entry.oid));
            }
        }
        Ok(())
    }

    /// Build (and store) nested tree objects from `(path, mode, oid)`
    /// triples; returns the root tree id. An empty slice produces the
    /// empty tree.
    pub fn build_tree(&self, entries: &[(String, FileMode, Oid)]) -> Result<Oid> {
        self.build_subtree(entries, "")
    }

    fn build_subtree(&self, entries: &[(String, FileMode, Oid)], prefix: &str) -> Result<Oid> {
        let mut tree = Tree::default();
        let mut child_dirs: Vec<String> = Vec::new();
        for (path, _, _) in entries {
            let rest = match strip_prefix(path, prefix) {
                Some(rest) => rest,
                None => continue,
            };
            if let Some((dir, _)) = rest.split_once('/') {
                if child_dirs.last().map(String::as_str) != Some(dir) {
                    child_dirs.push(dir.to_owned());
                }
            }
        }
        for dir in child_dirs {
            let child_prefix = if prefix.is_empty() {
                dir.clone()
            } else {
                format!("{prefix}/{dir}")
            };
            let oid = self.build_subtree(entries, &child_prefix)?;
            tree.upsert(grit_odb::TreeEntry {
                mode: FileMode::Tree,
                name: dir.into(),
                oid,
            });
        }
        for (path, mode, oid) in entries {
            let Some(rest) = strip_prefix(path, prefix) else {
                continue;
            };
            if !rest.contains('/') {
                tree.upsert(grit_odb::TreeEntry {
                    mode: *mode,
                    name: rest.into(),
                    oid: *oid,
                });
            }
        }
        self.write_parsed(&Object::Tree(tree))
    }

    /// Look up a path inside a tree; `None` when absent.
    pub fn tree_lookup(&self, tree: &Oid, path: &str) -> Result<Option<(FileMode, Oid)>> {
        let mut current = *tree;
        let mut components = path.split('/').peekable();
        while let Some(component) = components.next() {
            let tree = self.read_tree(&current)?;
            let Some(entry) = tree.entry(component.as_bytes()) else {
                return Ok(None);
            };
            if components.peek().is_none() {
                return Ok(Some((entry.mode, entry.oid)));
            }
            if entry.mode != FileMode::Tree {
                return Ok(None);
            }
            current = entry.oid;
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Build a signature from explicit fields or `user.name`/`user.email`
    /// config, stamped with the current time.
    pub fn signature(&self, name: Option<&str>, email: Option<&str>) -> Result<Signature> {
        let config = self.config();
        let user = config.user();
        let (config_name, config_email) = user
            .map(|(n, e)| (Some(n), Some(e)))
            .unwrap_or((None, None));
        let name = name
            .map(ToOwned::to_owned)
            .or(config_name)
            .ok_or_else(|| Error::new(ErrorKind::MissingParameter { name: "author.name" }))?;
        let email = email
            .map(ToOwned::to_owned)
            .or(config_email)
            .ok_or_else(|| Error::new(ErrorKind::MissingParameter { name: "author.email" }))?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
        Ok(Signature {
            name,
            email,
            timestamp,
            tz_offset: "+0000".to_owned(),
        })
    }
}

fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        Some(path)
    } else {
        path.strip_prefix(prefix)?.strip_prefix('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_store::MemoryBackend;

    fn repo() -> Repository {
        Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks()
    }

    #[test]
    fn init_writes_config_and_head() {
        let repo = repo();
        assert_eq!(repo.config().get_int("core.repositoryformatversion"), Some(0));
        assert_eq!(
            repo.backend().read_ref_raw("HEAD").unwrap().as_deref(),
            Some("ref: refs/heads/master")
        );
        assert!(repo.has_workdir());
    }

    #[test]
    fn object_roundtrip_all_types() {
        let repo = repo();
        let blob = repo.write_object(ObjectKind::Blob, b"hello").unwrap();
        assert_eq!(repo.read_blob(&blob).unwrap(), b"hello");

        let tree = Tree {
            entries: vec![grit_odb::TreeEntry {
                mode: FileMode::Regular,
                name: "f".into(),
                oid: blob,
            }],
        };
        let tree_oid = repo.write_parsed(&Object::Tree(tree.clone())).unwrap();
        assert_eq!(repo.read_tree(&tree_oid).unwrap(), tree);

        // Rehash equals the address.
        let (kind, payload) = repo.read_object(&tree_oid).unwrap();
        assert_eq!(object::hash_object(repo.hash(), kind, &payload), tree_oid);
    }

    #[test]
    fn read_missing_object_is_not_found() {
        let repo = repo();
        let missing = object::hash_object(HashKind::Sha1, ObjectKind::Blob, b"nope");
        assert!(!repo.has_object(&missing).unwrap());
        let err = repo.read_object(&missing).unwrap_err();
        assert_eq!(err.code(), "NotFound");
    }

    #[test]
    fn expand_oid_unique_and_ambiguous() {
        let repo = repo();
        let oid = repo.write_object(ObjectKind::Blob, b"expand me").unwrap();
        let hex = oid.to_hex();
        assert_eq!(repo.expand_oid(&hex[..8]).unwrap(), oid);
        assert!(repo.expand_oid("abc").is_err());
    }

    #[test]
    fn tree_build_and_lookup() {
        let repo = repo();
        let a = repo.write_object(ObjectKind::Blob, b"a").unwrap();
        let b = repo.write_object(ObjectKind::Blob, b"b").unwrap();
        let entries = vec![
            ("dir/inner.txt".to_owned(), FileMode::Regular, a),
            ("top.txt".to_owned(), FileMode::Regular, b),
        ];
        let root = repo.build_tree(&entries).unwrap();
        assert_eq!(
            repo.tree_lookup(&root, "dir/inner.txt").unwrap(),
            Some((FileMode::Regular, a))
        );
        assert_eq!(repo.tree_lookup(&root, "missing").unwrap(), None);
        let flat = repo.flatten_tree(&root).unwrap();
        let paths: Vec<&str> = flat.iter().map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["dir/inner.txt", "top.txt"]);
    }

    #[test]
    fn cache_invalidated_on_backend_write() {
        let repo = repo();
        let index_before = repo.index().unwrap();
        assert_eq!(index_before.entries().len(), 0);
        // Mutate through the backend; the next read must not see the old
        // parse.
        let mut index = (*index_before).clone();
        let oid = repo.write_object(ObjectKind::Blob, b"staged").unwrap();
        index.insert("f.txt", oid, 0o100_644, grit_store::FileStat::default());
        repo.write_index(&index).unwrap();
        assert_eq!(repo.index().unwrap().entries().len(), 1);
    }

    #[test]
    fn shallow_roundtrip() {
        let repo = repo();
        let mut set = BTreeSet::new();
        set.insert(object::hash_object(HashKind::Sha1, ObjectKind::Blob, b"s"));
        repo.write_shallow(&set).unwrap();
        assert_eq!(repo.shallow().unwrap(), set);
        repo.write_shallow(&BTreeSet::new()).unwrap();
        assert!(repo.shallow().unwrap().is_empty());
    }
}
