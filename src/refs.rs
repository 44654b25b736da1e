//! Refs: resolution, validation, updates, reflogs, packed-refs.
//!
//! Raw ref content is either `<hex>` or `ref: <target>`. Loose files
//! shadow `packed-refs` entries of the same name. Short names resolve
//! through git's search order, and symbolic chains are bounded at ten
//! hops before `CircularRef`.
//!
//! Every update goes through [`update`], which enforces name validation,
//! optional compare-and-set against the current value, and reflog
//! appends governed by `core.logallrefupdates` (HEAD and branches always
//! log).

use grit_odb::{Oid, Signature};

use grit_store::Backend as _;
use crate::errors::{Error, ErrorKind, Result};
use crate::repo::Repository;

/// The symbolic content prefix.
const SYMREF_PREFIX: &str = "ref: ";

/// Symbolic resolution hop bound.
const MAX_SYMREF_DEPTH: usize = 10;

/// Well-known top-level refs that are not under `refs/`.
pub const BARE_REFS: &[&str] = &[
    "HEAD",
    "FETCH_HEAD",
    "MERGE_HEAD",
    "ORIG_HEAD",
    "CHERRY_PICK_HEAD",
];

/// A parsed raw ref value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefValue {
    /// Direct OID.
    Direct(Oid),
    /// Symbolic pointer to another ref.
    Symbolic(String),
}

impl RefValue {
    /// Parse raw file content.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(target) = raw.strip_prefix(SYMREF_PREFIX) {
            return Ok(Self::Symbolic(target.trim().to_owned()));
        }
        Oid::from_hex(raw).map(Self::Direct).map_err(|_| {
            Error::new(ErrorKind::ObjectCorrupt {
                detail: format!("unparseable ref content {raw:?}"),
            })
        })
    }

    /// Serialize back to raw file content (no newline).
    #[must_use]
    pub fn to_raw(&self) -> String {
        match self {
            Self::Direct(oid) => oid.to_hex(),
            Self::Symbolic(target) => format!("{SYMREF_PREFIX}{target}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

/// Validate a full ref name against git's rules.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = || {
        Error::new(ErrorKind::InvalidRefName {
            name: name.to_owned(),
        })
    };
    if name.is_empty() || name == "@" {
        return Err(invalid());
    }
    if BARE_REFS.contains(&name) {
        return Ok(());
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(invalid());
    }
    if name.ends_with(".lock") || name.ends_with('.') {
        return Err(invalid());
    }
    if name.contains("..") || name.contains("@{") {
        return Err(invalid());
    }
    for forbidden in ['~', '^', ':', '?', '*', '[', '\\', ' ', '\t', '\n', '\x7f'] {
        if name.contains(forbidden) {
            return Err(invalid());
        }
    }
    if name.bytes().any(|b| b < 0x20) {
        return Err(invalid());
    }
    for segment in name.split('/') {
        if segment.is_empty() || segment.starts_with('.') || segment == "@" {
            return Err(invalid());
        }
        if segment.ends_with(".lock") {
            return Err(invalid());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Raw content of a ref, loose over packed. `None` when absent.
pub fn read_raw(repo: &Repository, name: &str) -> Result<Option<String>> {
    if let Some(loose) = repo.backend().read_ref_raw(name)? {
        return Ok(Some(loose));
    }
    Ok(repo.packed_refs()?.get(name).cloned())
}

/// Expand a possibly short name to the full name that exists, using the
/// documented search order.
pub fn expand_name(repo: &Repository, name: &str) -> Result<Option<String>> {
    for candidate in candidates(name) {
        if read_raw(repo, &candidate)?.is_some() {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

fn candidates(name: &str) -> Vec<String> {
    if name.starts_with("refs/") || BARE_REFS.contains(&name) {
        return vec![name.to_owned()];
    }
    vec![
        name.to_owned(),
        format!("refs/{name}"),
        format!("refs/tags/{name}"),
        format!("refs/heads/{name}"),
        format!("refs/remotes/{name}"),
        format!("refs/remotes/{name}/HEAD"),
    ]
}

/// Resolve a name (or raw hex / unique hex prefix) to an OID.
pub fn resolve(repo: &Repository, name: &str) -> Result<Oid> {
    resolve_opt(repo, name)?.ok_or_else(|| {
        Error::new(ErrorKind::NotFound {
            kind: "ref",
            id: name.to_owned(),
        })
    })
}

/// Like [`resolve`] but `None` when nothing matches.
pub fn resolve_opt(repo: &Repository, name: &str) -> Result<Option<Oid>> {
    // Full hex resolves directly; short hex only if no ref shadows it.
    if name.len() == repo.hash().hex_len() {
        if let Ok(oid) = Oid::from_hex(name) {
            return Ok(Some(oid));
        }
    }
    for candidate in candidates(name) {
        if let Some(raw) = read_raw(repo, &candidate)? {
            return match resolve_value(repo, &candidate, &raw, 0) {
                Ok(oid) => Ok(Some(oid)),
                // A symbolic chain dead-ending at a missing ref (an
                // unborn branch) resolves to nothing, not an error.
                Err(e) if matches!(e.kind(), crate::errors::ErrorKind::NotFound { .. }) => {
                    Ok(None)
                }
                Err(e) => Err(e),
            };
        }
    }
    if name.len() >= 4 && name.bytes().all(|b| b.is_ascii_hexdigit()) {
        if let Ok(oid) = repo.expand_oid(name) {
            return Ok(Some(oid));
        }
    }
    Ok(None)
}

fn resolve_value(repo: &Repository, name: &str, raw: &str, depth: usize) -> Result<Oid> {
    if depth >= MAX_SYMREF_DEPTH {
        return Err(Error::new(ErrorKind::CircularRef {
            name: name.to_owned(),
        }));
    }
    match RefValue::parse(raw)? {
        RefValue::Direct(oid) => Ok(oid),
        RefValue::Symbolic(target) => {
            let next = read_raw(repo, &target)?.ok_or_else(|| {
                Error::new(ErrorKind::NotFound {
                    kind: "ref",
                    id: target.clone(),
                })
            })?;
            resolve_value(repo, &target, &next, depth + 1)
        }
    }
}

/// The branch HEAD points at symbolically, or `None` when detached.
pub fn current_branch(repo: &Repository) -> Result<Option<String>> {
    match read_raw(repo, "HEAD")? {
        Some(raw) => match RefValue::parse(&raw)? {
            RefValue::Symbolic(target) => Ok(Some(target)),
            RefValue::Direct(_) => Ok(None),
        },
        None => Ok(None),
    }
}

/// List refs under a prefix, resolved to OIDs, merged across loose and
/// packed, sorted by name.
pub fn list(repo: &Repository, prefix: &str) -> Result<Vec<(String, Oid)>> {
    let mut names: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    for name in repo.backend().list_refs(prefix)? {
        names.insert(name);
    }
    for name in repo.packed_refs()?.keys() {
        if name.starts_with(prefix) {
            names.insert(name.clone());
        }
    }
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if let Some(raw) = read_raw(repo, &name)? {
            if let Ok(oid) = resolve_value(repo, &name, &raw, 0) {
                out.push((name, oid));
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Options for a ref update.
#[derive(Debug, Default)]
pub struct UpdateOptions<'a> {
    /// Compare-and-set: `Some(None)` asserts absence, `Some(Some(oid))`
    /// asserts the current value. `None` skips the check.
    pub expected_old: Option<Option<Oid>>,
    /// Reflog message (`"commit: ..."`, `"update by fetch"`, ...).
    pub message: &'a str,
    /// Identity for the reflog line; falls back to config, then a
    /// placeholder.
    pub committer: Option<&'a Signature>,
    /// Skip the reflog entirely (packed-refs maintenance).
    pub suppress_reflog: bool,
}

/// Whether updates to `name` get a reflog entry.
fn should_log(repo: &Repository, name: &str) -> bool {
    if name == "HEAD" || name.starts_with("refs/heads/") {
        return true;
    }
    repo.config().log_all_ref_updates()
}

/// Create or move a ref to `new`, with CAS and reflog.
pub fn update(repo: &Repository, name: &str, new: Oid, options: &UpdateOptions<'_>) -> Result<()> {
    validate_name(name)?;
    let old = match read_raw(repo, name)? {
        Some(raw) => match RefValue::parse(&raw)? {
            RefValue::Direct(oid) => Some(oid),
            // Updating HEAD by value moves the branch it points at.
            RefValue::Symbolic(target) => {
                if name == "HEAD" {
                    return update(repo, &target.clone(), new, options);
                }
                resolve_opt(repo, &target)?
            }
        },
        None => None,
    };
    if let Some(expected) = options.expected_old {
        if old != expected {
            return Err(Error::new(ErrorKind::RefMismatch {
                name: name.to_owned(),
                expected: expected.map(|o| o.to_hex()),
                actual: old.map(|o| o.to_hex()),
            }));
        }
    }
    repo.backend().write_ref_raw(name, &new.to_hex(), None)?;
    if !options.suppress_reflog && should_log(repo, name) {
        append_reflog(repo, name, old.unwrap_or_else(|| repo.zero_oid()), new, options)?;
    }
    Ok(())
}

/// Point `name` symbolically at `target`.
pub fn write_symbolic(repo: &Repository, name: &str, target: &str, message: &str) -> Result<()> {
    validate_name(name)?;
    validate_name(target)?;
    let old = resolve_opt(repo, name)?;
    repo.backend()
        .write_ref_raw(name, &format!("{SYMREF_PREFIX}{target}"), None)?;
    if !message.is_empty() && should_log(repo, name) {
        let new = resolve_opt(repo, target)?.unwrap_or_else(|| repo.zero_oid());
        append_reflog(
            repo,
            name,
            old.unwrap_or_else(|| repo.zero_oid()),
            new,
            &UpdateOptions {
                message,
                ..UpdateOptions::default()
            },
        )?;
    }
    Ok(())
}

/// Delete a ref from both the loose store and `packed-refs`.
pub fn delete(repo: &Repository, name: &str) -> Result<()> {
    repo.backend().delete_ref_raw(name)?;
    let packed = repo.packed_refs()?;
    if packed.contains_key(name) {
        let mut map = (*packed).clone();
        map.remove(name);
        write_packed_refs(repo, &map)?;
    }
    repo.backend().delete_reflog(name)?;
    Ok(())
}

/// Serialize and store a packed-refs map with the standard header.
pub fn write_packed_refs(
    repo: &Repository,
    map: &std::collections::BTreeMap<String, String>,
) -> Result<()> {
    let mut out = String::from("# pack-refs with: peeled fully-peeled sorted \n");
    for (name, value) in map {
        out.push_str(value);
        out.push(' ');
        out.push_str(name);
        out.push('\n');
        // Annotated tags carry their peeled target on a ^ line.
        if name.starts_with("refs/tags/") {
            if let Ok(oid) = Oid::from_hex(value) {
                if let Ok(tag) = repo.read_tag(&oid) {
                    out.push('^');
                    out.push_str(&tag.object.to_hex());
                    out.push('\n');
                }
            }
        }
    }
    repo.backend().write_packed_refs(out.as_bytes())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reflog
// ---------------------------------------------------------------------------

/// One parsed reflog entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflogEntry {
    /// Value before the update (zero OID for creation).
    pub old: Oid,
    /// Value after the update.
    pub new: Oid,
    /// Who performed it.
    pub committer: Signature,
    /// The message, without the tab separator.
    pub message: String,
}

fn append_reflog(
    repo: &Repository,
    name: &str,
    old: Oid,
    new: Oid,
    options: &UpdateOptions<'_>,
) -> Result<()> {
    let committer = match options.committer {
        Some(sig) => sig.clone(),
        None => repo
            .signature(None, None)
            .unwrap_or_else(|_| Signature {
                name: "grit".to_owned(),
                email: "grit@localhost".to_owned(),
                timestamp: 0,
                tz_offset: "+0000".to_owned(),
            }),
    };
    let line = format!(
        "{} {} {}\t{}",
        old.to_hex(),
        new.to_hex(),
        committer.to_header_value(),
        options.message
    );
    repo.backend().append_reflog(name, &line)?;
    Ok(())
}

/// Read a ref's reflog, oldest entry first. Absent log reads as empty.
pub fn read_reflog(repo: &Repository, name: &str) -> Result<Vec<ReflogEntry>> {
    let Some(data) = repo.backend().read_reflog(name)? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for line in String::from_utf8_lossy(&data).lines() {
        if line.is_empty() {
            continue;
        }
        let (header, message) = line.split_once('\t').unwrap_or((line, ""));
        let mut parts = header.splitn(3, ' ');
        let (Some(old), Some(new), Some(who)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(old), Ok(new)) = (Oid::from_hex(old), Oid::from_hex(new)) else {
            continue;
        };
        let committer = Signature::parse(who.as_bytes(), grit_odb::ObjectKind::Commit)
            .unwrap_or(Signature {
                name: String::new(),
                email: String::new(),
                timestamp: 0,
                tz_offset: "+0000".to_owned(),
            });
        out.push(ReflogEntry {
            old,
            new,
            committer,
            message: message.to_owned(),
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
