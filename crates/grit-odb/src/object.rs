//! The four typed git objects and their canonical byte forms.
//!
//! Objects are hashed and stored in wrapped form: `type SP length NUL
//! payload`. This module parses and serializes the payloads, computes
//! object ids over the wrapped form, and defines the tree-entry ordering
//! git requires (directories sort as if their name ended in `/`).
//!
//! Parsing is strict about structure (a commit without a `tree` header is
//! corrupt) but tolerant about content: messages and identities are decoded
//! lossily for display while tree entry names stay raw bytes, since paths
//! are not guaranteed to be UTF-8.

use std::cmp::Ordering;
use std::fmt;

use bstr::{BString, ByteSlice as _};

use crate::oid::{HashKind, Hasher, Oid};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from object parsing and serialization.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// The `type SP length NUL` header was missing or unreadable.
    #[error("malformed object header: {0}")]
    Header(String),

    /// The header's declared length disagrees with the payload.
    #[error("object header declares {declared} bytes but payload has {actual}")]
    LengthMismatch {
        /// Length from the header.
        declared: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// An unknown object type name or pack type number.
    #[error("unknown object type {0:?}")]
    UnknownType(String),

    /// The payload of a typed object did not parse.
    #[error("corrupt {kind} object: {detail}")]
    Corrupt {
        /// Which object type was being parsed.
        kind: ObjectKind,
        /// What was wrong.
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// ObjectKind
// ---------------------------------------------------------------------------

/// The four storable object types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Snapshot plus ancestry and identities.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectKind {
    /// Type name as it appears in loose headers (`"blob"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parse a type name.
    pub fn from_name(name: &[u8]) -> Result<Self, ObjectError> {
        match name {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            b"tag" => Ok(Self::Tag),
            other => Err(ObjectError::UnknownType(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    /// Pack entry type number (1–4).
    #[must_use]
    pub const fn pack_type(self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Inverse of [`pack_type`](Self::pack_type).
    pub fn from_pack_type(n: u8) -> Result<Self, ObjectError> {
        match n {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            other => Err(ObjectError::UnknownType(format!("pack type {other}"))),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FileMode
// ---------------------------------------------------------------------------

/// Tree entry modes, the only five values git writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular file (`100644`).
    Regular,
    /// Executable file (`100755`).
    Executable,
    /// Symbolic link (`120000`).
    Symlink,
    /// Gitlink / submodule commit (`160000`).
    Gitlink,
    /// Subdirectory (`40000`).
    Tree,
}

impl FileMode {
    /// Octal string as written inside tree objects. Note trees use `40000`,
    /// not the zero-padded `040000` shown by porcelain.
    #[must_use]
    pub const fn as_tree_octal(self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Gitlink => "160000",
            Self::Tree => "40000",
        }
    }

    /// Numeric mode for index entries and stat comparison.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Regular => 0o100_644,
            Self::Executable => 0o100_755,
            Self::Symlink => 0o120_000,
            Self::Gitlink => 0o160_000,
            Self::Tree => 0o040_000,
        }
    }

    /// Parse an octal mode string from a tree entry.
    pub fn from_tree_octal(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"100644" | b"100664" => Ok(Self::Regular),
            b"100755" => Ok(Self::Executable),
            b"120000" => Ok(Self::Symlink),
            b"160000" => Ok(Self::Gitlink),
            b"40000" | b"040000" => Ok(Self::Tree),
            other => Err(ObjectError::Corrupt {
                kind: ObjectKind::Tree,
                detail: format!("bad entry mode {:?}", String::from_utf8_lossy(other)),
            }),
        }
    }

    /// Parse a numeric mode (index entries, walker stat).
    #[must_use]
    pub fn from_u32(mode: u32) -> Option<Self> {
        match mode & 0o170_000 {
            0o040_000 => Some(Self::Tree),
            0o120_000 => Some(Self::Symlink),
            0o160_000 => Some(Self::Gitlink),
            0o100_000 => {
                if mode & 0o111 != 0 {
                    Some(Self::Executable)
                } else {
                    Some(Self::Regular)
                }
            }
            _ => None,
        }
    }

    /// `true` for the two blob modes.
    #[must_use]
    pub const fn is_file(self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// An author/committer/tagger identity with timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Display name.
    pub name: String,
    /// Email address (without angle brackets).
    pub email: String,
    /// Seconds since the unix epoch.
    pub timestamp: i64,
    /// Timezone offset string, e.g. `"+0200"`.
    pub tz_offset: String,
}

impl Signature {
    /// Canonical serialization: `name <email> timestamp tz`.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.tz_offset
        )
    }

    /// Parse the header-value form.
    pub fn parse(bytes: &[u8], kind: ObjectKind) -> Result<Self, ObjectError> {
        let corrupt = |detail: &str| ObjectError::Corrupt {
            kind,
            detail: detail.to_owned(),
        };
        let lt = bytes
            .find_byte(b'<')
            .ok_or_else(|| corrupt("signature missing '<'"))?;
        let gt = bytes
            .find_byte(b'>')
            .ok_or_else(|| corrupt("signature missing '>'"))?;
        if gt < lt {
            return Err(corrupt("signature '>' precedes '<'"));
        }
        let name = bytes[..lt].trim_with(|c| c == ' ');
        let email = &bytes[lt + 1..gt];
        let rest = bytes[gt + 1..].trim_with(|c| c == ' ');
        let mut parts = rest.split(|&b| b == b' ');
        let ts = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| corrupt("signature missing timestamp"))?;
        let timestamp = ts
            .to_str()
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| corrupt("signature timestamp not a number"))?;
        let tz_offset = parts
            .next()
            .map_or_else(|| "+0000".to_owned(), |p| String::from_utf8_lossy(p).into_owned());
        Ok(Self {
            name: String::from_utf8_lossy(name).into_owned(),
            email: String::from_utf8_lossy(email).into_owned(),
            timestamp,
            tz_offset,
        })
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// One entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry mode.
    pub mode: FileMode,
    /// Basename, raw bytes (paths are not guaranteed UTF-8).
    pub name: BString,
    /// Child object id.
    pub oid: Oid,
}

/// A parsed tree object: entries in canonical git order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    /// Sorted entries.
    pub entries: Vec<TreeEntry>,
}

/// Git's tree ordering: byte order over names, with tree entries compared
/// as if their name ended in `/`.
#[must_use]
pub fn tree_entry_cmp(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    let key = |e: &TreeEntry, i: usize| -> Option<u8> {
        if i < e.name.len() {
            Some(e.name[i])
        } else if i == e.name.len() && e.mode == FileMode::Tree {
            Some(b'/')
        } else {
            None
        }
    };
    let mut i = 0;
    loop {
        match (key(a, i), key(b, i)) {
            (Some(x), Some(y)) if x == y => i += 1,
            (x, y) => return x.cmp(&y),
        }
    }
}

impl Tree {
    /// Look up an entry by name.
    #[must_use]
    pub fn entry(&self, name: &[u8]) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_slice() == name)
    }

    /// Insert or replace an entry, keeping canonical order.
    pub fn upsert(&mut self, entry: TreeEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.name == entry.name)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
        self.entries.sort_by(tree_entry_cmp);
    }

    /// Remove an entry by name. No-op if absent.
    pub fn remove(&mut self, name: &[u8]) {
        self.entries.retain(|e| e.name.as_slice() != name);
    }

    fn parse(payload: &[u8], oid_kind: HashKind) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let raw_len = oid_kind.raw_len();
        let mut rest = payload;
        while !rest.is_empty() {
            let sp = rest.find_byte(b' ').ok_or_else(|| ObjectError::Corrupt {
                kind: ObjectKind::Tree,
                detail: "entry missing mode separator".into(),
            })?;
            let mode = FileMode::from_tree_octal(&rest[..sp])?;
            rest = &rest[sp + 1..];
            let nul = rest.find_byte(0).ok_or_else(|| ObjectError::Corrupt {
                kind: ObjectKind::Tree,
                detail: "entry missing name terminator".into(),
            })?;
            let name = BString::from(&rest[..nul]);
            rest = &rest[nul + 1..];
            if rest.len() < raw_len {
                return Err(ObjectError::Corrupt {
                    kind: ObjectKind::Tree,
                    detail: "entry truncated before oid".into(),
                });
            }
            let oid = Oid::from_raw(oid_kind, &rest[..raw_len]);
            rest = &rest[raw_len..];
            entries.push(TreeEntry { mode, name, oid });
        }
        Ok(Self { entries })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        let mut sorted: Vec<&TreeEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| tree_entry_cmp(a, b));
        for entry in sorted {
            out.extend_from_slice(entry.mode.as_tree_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_raw());
        }
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// A parsed commit object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    /// Root tree.
    pub tree: Oid,
    /// Parent commits, oldest-first as listed.
    pub parents: Vec<Oid>,
    /// Author identity.
    pub author: Signature,
    /// Committer identity.
    pub committer: Signature,
    /// Detached signature block, if the commit is signed.
    pub gpgsig: Option<String>,
    /// Headers this implementation does not interpret (e.g. `encoding`),
    /// preserved in order.
    pub extra_headers: Vec<(String, String)>,
    /// Commit message, everything after the blank line.
    pub message: String,
}

impl Commit {
    /// First line of the message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let headers = HeaderBlock::parse(payload, ObjectKind::Commit)?;
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut gpgsig = None;
        let mut extra_headers = Vec::new();
        for (key, value) in &headers.fields {
            match key.as_str() {
                "tree" => tree = Some(parse_oid_field(value, ObjectKind::Commit)?),
                "parent" => parents.push(parse_oid_field(value, ObjectKind::Commit)?),
                "author" => author = Some(Signature::parse(value.as_bytes(), ObjectKind::Commit)?),
                "committer" => {
                    committer = Some(Signature::parse(value.as_bytes(), ObjectKind::Commit)?);
                }
                "gpgsig" => gpgsig = Some(value.clone()),
                _ => extra_headers.push((key.clone(), value.clone())),
            }
        }
        Ok(Self {
            tree: tree.ok_or_else(|| ObjectError::Corrupt {
                kind: ObjectKind::Commit,
                detail: "missing tree header".into(),
            })?,
            parents,
            author: author.ok_or_else(|| ObjectError::Corrupt {
                kind: ObjectKind::Commit,
                detail: "missing author header".into(),
            })?,
            committer: committer.ok_or_else(|| ObjectError::Corrupt {
                kind: ObjectKind::Commit,
                detail: "missing committer header".into(),
            })?,
            gpgsig,
            extra_headers,
            message: headers.message,
        })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        push_header(out, "tree", &self.tree.to_hex());
        for parent in &self.parents {
            push_header(out, "parent", &parent.to_hex());
        }
        push_header(out, "author", &self.author.to_header_value());
        push_header(out, "committer", &self.committer.to_header_value());
        for (key, value) in &self.extra_headers {
            push_header(out, key, value);
        }
        if let Some(sig) = &self.gpgsig {
            push_header(out, "gpgsig", sig);
        }
        out.push(b'\n');
        out.extend_from_slice(self.message.as_bytes());
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// A parsed annotated tag object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    /// The tagged object.
    pub object: Oid,
    /// Type of the tagged object.
    pub target_kind: ObjectKind,
    /// Tag name (`v1.0`, without `refs/tags/`).
    pub name: String,
    /// Tagger identity; some historical tags omit it.
    pub tagger: Option<Signature>,
    /// Detached signature block, if signed.
    pub gpgsig: Option<String>,
    /// Tag message.
    pub message: String,
}

impl Tag {
    fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let headers = HeaderBlock::parse(payload, ObjectKind::Tag)?;
        let mut object = None;
        let mut target_kind = None;
        let mut name = None;
        let mut tagger = None;
        let mut gpgsig = None;
        for (key, value) in &headers.fields {
            match key.as_str() {
                "object" => object = Some(parse_oid_field(value, ObjectKind::Tag)?),
                "type" => target_kind = Some(ObjectKind::from_name(value.as_bytes())?),
                "tag" => name = Some(value.clone()),
                "tagger" => tagger = Some(Signature::parse(value.as_bytes(), ObjectKind::Tag)?),
                "gpgsig" => gpgsig = Some(value.clone()),
                _ => {}
            }
        }
        let missing = |field: &str| ObjectError::Corrupt {
            kind: ObjectKind::Tag,
            detail: format!("missing {field} header"),
        };
        Ok(Self {
            object: object.ok_or_else(|| missing("object"))?,
            target_kind: target_kind.ok_or_else(|| missing("type"))?,
            name: name.ok_or_else(|| missing("tag"))?,
            tagger,
            gpgsig,
            message: headers.message,
        })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        push_header(out, "object", &self.object.to_hex());
        push_header(out, "type", self.target_kind.as_str());
        push_header(out, "tag", &self.name);
        if let Some(tagger) = &self.tagger {
            push_header(out, "tagger", &tagger.to_header_value());
        }
        if let Some(sig) = &self.gpgsig {
            push_header(out, "gpgsig", sig);
        }
        out.push(b'\n');
        out.extend_from_slice(self.message.as_bytes());
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// A fully parsed object of any type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    /// Raw file content.
    Blob(Vec<u8>),
    /// Directory listing.
    Tree(Tree),
    /// Commit.
    Commit(Commit),
    /// Annotated tag.
    Tag(Tag),
}

impl Object {
    /// The object's type tag.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Parse a payload (unwrapped) of a known type.
    pub fn parse(kind: ObjectKind, payload: &[u8], oid_kind: HashKind) -> Result<Self, ObjectError> {
        match kind {
            ObjectKind::Blob => Ok(Self::Blob(payload.to_vec())),
            ObjectKind::Tree => Ok(Self::Tree(Tree::parse(payload, oid_kind)?)),
            ObjectKind::Commit => Ok(Self::Commit(Commit::parse(payload)?)),
            ObjectKind::Tag => Ok(Self::Tag(Tag::parse(payload)?)),
        }
    }

    /// Serialize to the canonical payload (unwrapped form).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Blob(data) => out.extend_from_slice(data),
            Self::Tree(tree) => tree.serialize(&mut out),
            Self::Commit(commit) => commit.serialize(&mut out),
            Self::Tag(tag) => tag.serialize(&mut out),
        }
        out
    }

    /// Hash this object under `hash`, returning its id.
    #[must_use]
    pub fn id(&self, hash: HashKind) -> Oid {
        hash_object(hash, self.kind(), &self.serialize())
    }
}

// ---------------------------------------------------------------------------
// Wrapping and hashing
// ---------------------------------------------------------------------------

/// Prepend the `type SP length NUL` header.
#[must_use]
pub fn wrap(kind: ObjectKind, payload: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", kind.as_str(), payload.len());
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Split a wrapped object into its type and payload, validating the header.
pub fn unwrap(wrapped: &[u8]) -> Result<(ObjectKind, &[u8]), ObjectError> {
    let nul = wrapped
        .find_byte(0)
        .ok_or_else(|| ObjectError::Header("missing NUL terminator".into()))?;
    let header = &wrapped[..nul];
    let sp = header
        .find_byte(b' ')
        .ok_or_else(|| ObjectError::Header("missing space separator".into()))?;
    let kind = ObjectKind::from_name(&header[..sp])?;
    let declared: usize = header[sp + 1..]
        .to_str()
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ObjectError::Header("length is not a number".into()))?;
    let payload = &wrapped[nul + 1..];
    if payload.len() != declared {
        return Err(ObjectError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }
    Ok((kind, payload))
}

/// Hash a payload in wrapped form. This is the address of the object.
#[must_use]
pub fn hash_object(hash: HashKind, kind: ObjectKind, payload: &[u8]) -> Oid {
    let mut hasher = Hasher::new(hash);
    hasher.update(format!("{} {}\0", kind.as_str(), payload.len()).as_bytes());
    hasher.update(payload);
    hasher.finalize()
}

// ---------------------------------------------------------------------------
// Header block parsing (shared by commit and tag)
// ---------------------------------------------------------------------------

struct HeaderBlock {
    fields: Vec<(String, String)>,
    message: String,
}

impl HeaderBlock {
    /// Parse `key value` lines (with space-continuation) up to the blank
    /// line, then take the rest as the message.
    fn parse(payload: &[u8], kind: ObjectKind) -> Result<Self, ObjectError> {
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut rest = payload;
        loop {
            if rest.is_empty() {
                break;
            }
            if rest[0] == b'\n' {
                rest = &rest[1..];
                break;
            }
            let eol = rest.find_byte(b'\n').unwrap_or(rest.len());
            let line = &rest[..eol];
            rest = &rest[(eol + 1).min(rest.len())..];
            if line[0] == b' ' {
                // Continuation of the previous header (gpgsig blocks).
                let (_, value) = fields.last_mut().ok_or_else(|| ObjectError::Corrupt {
                    kind,
                    detail: "continuation line before any header".into(),
                })?;
                value.push('\n');
                value.push_str(&String::from_utf8_lossy(&line[1..]));
                continue;
            }
            let sp = line.find_byte(b' ').ok_or_else(|| ObjectError::Corrupt {
                kind,
                detail: format!("header line without value: {:?}", line.as_bstr()),
            })?;
            fields.push((
                String::from_utf8_lossy(&line[..sp]).into_owned(),
                String::from_utf8_lossy(&line[sp + 1..]).into_owned(),
            ));
        }
        Ok(Self {
            fields,
            message: String::from_utf8_lossy(rest).into_owned(),
        })
    }
}

fn parse_oid_field(value: &str, kind: ObjectKind) -> Result<Oid, ObjectError> {
    Oid::from_hex(value.trim()).map_err(|e| ObjectError::Corrupt {
        kind,
        detail: e.to_string(),
    })
}

fn push_header(out: &mut Vec<u8>, key: &str, value: &str) {
    out.extend_from_slice(key.as_bytes());
    out.push(b' ');
    // Multi-line values continue with a leading space on each line.
    let mut first = true;
    for line in value.split('\n') {
        if !first {
            out.push(b'\n');
            out.push(b' ');
        }
        out.extend_from_slice(line.as_bytes());
        first = false;
    }
    out.push(b'\n');
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> Signature {
        Signature {
            name: "Test User".into(),
            email: "test@example.com".into(),
            timestamp: 1_700_000_000,
            tz_offset: "+0100".into(),
        }
    }

    #[test]
    fn blob_hash_matches_git() {
        // `echo -n 'hi' | git hash-object --stdin`
        let oid = hash_object(HashKind::Sha1, ObjectKind::Blob, b"hi");
        assert_eq!(oid.to_string(), "32f95c0d1244a78b2be1bab8de17906fabb2c4a8");
    }

    #[test]
    fn empty_blob_hash_matches_git() {
        let oid = hash_object(HashKind::Sha1, ObjectKind::Blob, b"");
        assert_eq!(oid.to_string(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let wrapped = wrap(ObjectKind::Blob, b"hello");
        assert_eq!(&wrapped[..8], b"blob 5\0h");
        let (kind, payload) = unwrap(&wrapped).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn unwrap_rejects_length_mismatch() {
        let mut wrapped = wrap(ObjectKind::Blob, b"hello");
        wrapped.push(b'!');
        assert!(matches!(
            unwrap(&wrapped),
            Err(ObjectError::LengthMismatch { declared: 5, actual: 6 })
        ));
    }

    #[test]
    fn unwrap_rejects_garbage_header() {
        assert!(unwrap(b"blobby").is_err());
        assert!(unwrap(b"blob five\0hello").is_err());
    }

    #[test]
    fn tree_roundtrip() {
        let blob = hash_object(HashKind::Sha1, ObjectKind::Blob, b"x");
        let tree = Tree {
            entries: vec![
                TreeEntry {
                    mode: FileMode::Regular,
                    name: "a.txt".into(),
                    oid: blob,
                },
                TreeEntry {
                    mode: FileMode::Tree,
                    name: "sub".into(),
                    oid: blob,
                },
            ],
        };
        let bytes = Object::Tree(tree.clone()).serialize();
        let parsed = Object::parse(ObjectKind::Tree, &bytes, HashKind::Sha1).unwrap();
        assert_eq!(parsed, Object::Tree(tree));
    }

    #[test]
    fn tree_order_directories_sort_with_slash() {
        // "sub" as a dir sorts after "sub.txt" because it compares as "sub/".
        let oid = hash_object(HashKind::Sha1, ObjectKind::Blob, b"");
        let mut tree = Tree::default();
        tree.upsert(TreeEntry {
            mode: FileMode::Tree,
            name: "sub".into(),
            oid,
        });
        tree.upsert(TreeEntry {
            mode: FileMode::Regular,
            name: "sub.txt".into(),
            oid,
        });
        let names: Vec<_> = tree.entries.iter().map(|e| e.name.to_string()).collect();
        assert_eq!(names, vec!["sub.txt", "sub"]);
    }

    #[test]
    fn known_tree_hash() {
        // Tree containing a.txt -> blob("hi") at 100644, verified against
        // `git mktree`.
        let blob = hash_object(HashKind::Sha1, ObjectKind::Blob, b"hi");
        let tree = Tree {
            entries: vec![TreeEntry {
                mode: FileMode::Regular,
                name: "a.txt".into(),
                oid: blob,
            }],
        };
        let oid = Object::Tree(tree).id(HashKind::Sha1);
        assert_eq!(oid.to_string(), "959186c87f11cedbc03fb0aa728575ce3dbf3335");
    }

    #[test]
    fn commit_roundtrip() {
        let tree = hash_object(HashKind::Sha1, ObjectKind::Tree, b"");
        let commit = Commit {
            tree,
            parents: vec![tree],
            author: sig(),
            committer: sig(),
            gpgsig: None,
            extra_headers: vec![],
            message: "subject\n\nbody\n".into(),
        };
        let bytes = Object::Commit(commit.clone()).serialize();
        let parsed = Object::parse(ObjectKind::Commit, &bytes, HashKind::Sha1).unwrap();
        assert_eq!(parsed, Object::Commit(commit));
    }

    #[test]
    fn commit_with_gpgsig_roundtrip() {
        let tree = hash_object(HashKind::Sha1, ObjectKind::Tree, b"");
        let commit = Commit {
            tree,
            parents: vec![],
            author: sig(),
            committer: sig(),
            gpgsig: Some("-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----".into()),
            extra_headers: vec![],
            message: "signed\n".into(),
        };
        let bytes = Object::Commit(commit.clone()).serialize();
        let parsed = Object::parse(ObjectKind::Commit, &bytes, HashKind::Sha1).unwrap();
        assert_eq!(parsed, Object::Commit(commit));
    }

    #[test]
    fn commit_missing_tree_is_corrupt() {
        let payload = b"author A <a@b> 0 +0000\ncommitter A <a@b> 0 +0000\n\nmsg";
        assert!(Object::parse(ObjectKind::Commit, payload, HashKind::Sha1).is_err());
    }

    #[test]
    fn tag_roundtrip() {
        let target = hash_object(HashKind::Sha1, ObjectKind::Blob, b"t");
        let tag = Tag {
            object: target,
            target_kind: ObjectKind::Commit,
            name: "v1.0".into(),
            tagger: Some(sig()),
            gpgsig: None,
            message: "release\n".into(),
        };
        let bytes = Object::Tag(tag.clone()).serialize();
        let parsed = Object::parse(ObjectKind::Tag, &bytes, HashKind::Sha1).unwrap();
        assert_eq!(parsed, Object::Tag(tag));
    }

    #[test]
    fn signature_parse_variants() {
        let s = Signature::parse(b"A B <a@b.c> 1700000000 -0500", ObjectKind::Commit).unwrap();
        assert_eq!(s.name, "A B");
        assert_eq!(s.email, "a@b.c");
        assert_eq!(s.timestamp, 1_700_000_000);
        assert_eq!(s.tz_offset, "-0500");
    }

    #[test]
    fn pack_type_numbers() {
        assert_eq!(ObjectKind::Commit.pack_type(), 1);
        assert_eq!(ObjectKind::Tree.pack_type(), 2);
        assert_eq!(ObjectKind::Blob.pack_type(), 3);
        assert_eq!(ObjectKind::Tag.pack_type(), 4);
        assert_eq!(ObjectKind::from_pack_type(3).unwrap(), ObjectKind::Blob);
        assert!(ObjectKind::from_pack_type(5).is_err());
    }
}
