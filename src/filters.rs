//! Content filters: line endings and LFS.
//!
//! "Clean" runs on the way into the object store (staging), "smudge" on
//! the way out (checkout). `core.autocrlf` drives CRLF↔LF conversion —
//! applied only to text; anything with a NUL in its head is binary and
//! passes through untouched. `core.safecrlf` optionally rejects
//! conversions that would not round-trip.
//!
//! LFS: paths attributed `filter=lfs` in `.gitattributes` store a
//! pointer in the object database; the real bytes live in the backend's
//! LFS area, keyed by sha256.

use grit_lfs::LfsPointer;

use grit_store::Backend as _;
use crate::config::{AutoCrlf, SafeCrlf};
use crate::errors::{Error, ErrorKind, Result};
use crate::repo::Repository;

/// NUL within the first 8000 bytes classifies content as binary, the
/// same heuristic git uses.
#[must_use]
pub fn is_binary(content: &[u8]) -> bool {
    content[..content.len().min(8000)].contains(&0)
}

/// Clean direction: worktree bytes to repository bytes.
#[must_use]
pub fn clean_crlf(content: &[u8], autocrlf: AutoCrlf) -> Vec<u8> {
    match autocrlf {
        AutoCrlf::False => content.to_vec(),
        AutoCrlf::True | AutoCrlf::Input => {
            if is_binary(content) {
                return content.to_vec();
            }
            let mut out = Vec::with_capacity(content.len());
            let mut i = 0;
            while i < content.len() {
                if content[i] == b'\r' && content.get(i + 1) == Some(&b'\n') {
                    i += 1; // Drop the CR of a CRLF pair.
                }
                out.push(content[i]);
                i += 1;
            }
            out
        }
    }
}

/// Smudge direction: repository bytes to worktree bytes.
#[must_use]
pub fn smudge_crlf(content: &[u8], autocrlf: AutoCrlf) -> Vec<u8> {
    match autocrlf {
        // Only `autocrlf = true` converts on checkout; `input` leaves LF.
        AutoCrlf::False | AutoCrlf::Input => content.to_vec(),
        AutoCrlf::True => {
            if is_binary(content) {
                return content.to_vec();
            }
            let mut out = Vec::with_capacity(content.len() + content.len() / 16);
            let mut prev = 0u8;
            for &byte in content {
                if byte == b'\n' && prev != b'\r' {
                    out.push(b'\r');
                }
                out.push(byte);
                prev = byte;
            }
            out
        }
    }
}

/// Enforce `core.safecrlf`: fail (or warn) when clean-then-smudge does
/// not reproduce the input.
pub fn check_safecrlf(
    path: &str,
    original: &[u8],
    autocrlf: AutoCrlf,
    safecrlf: SafeCrlf,
) -> Result<()> {
    if safecrlf == SafeCrlf::False || autocrlf == AutoCrlf::False || is_binary(original) {
        return Ok(());
    }
    let cleaned = clean_crlf(original, autocrlf);
    let restored = smudge_crlf(&cleaned, autocrlf);
    if restored == original {
        return Ok(());
    }
    match safecrlf {
        SafeCrlf::Warn => {
            tracing::warn!(path, "CRLF conversion is not reversible");
            Ok(())
        }
        SafeCrlf::Fail => Err(Error::new(ErrorKind::InvalidFilepath {
            reason: "irreversible-crlf",
            path: path.to_owned(),
        })),
        SafeCrlf::False => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Attributes (the slice of .gitattributes grit interprets)
// ---------------------------------------------------------------------------

/// Whether `.gitattributes` marks a path with `filter=lfs`.
#[must_use]
pub fn is_lfs_path(attributes: &[u8], path: &str) -> bool {
    use glob::{MatchOptions, Pattern};
    let options = MatchOptions {
        require_literal_separator: false,
        ..MatchOptions::new()
    };
    let mut lfs = false;
    for line in String::from_utf8_lossy(attributes).lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(pattern_text) = parts.next() else {
            continue;
        };
        let Ok(pattern) = Pattern::new(pattern_text.trim_start_matches('/')) else {
            continue;
        };
        let basename = path.rsplit('/').next().unwrap_or(path);
        if pattern.matches_with(path, options) || pattern.matches_with(basename, options) {
            for attr in parts {
                if attr == "filter=lfs" {
                    lfs = true;
                } else if attr == "-filter" || attr == "!filter" {
                    lfs = false;
                }
            }
        }
    }
    lfs
}

/// The repository's `.gitattributes` content (worktree first, then the
/// committed copy is the caller's concern). Empty when absent.
#[must_use]
pub fn load_attributes(repo: &Repository) -> Vec<u8> {
    if repo.has_workdir() {
        if let Ok(Some(data)) = repo.backend().read_workdir_file(".gitattributes") {
            return data;
        }
    }
    Vec::new()
}

// ---------------------------------------------------------------------------
// Combined clean/smudge
// ---------------------------------------------------------------------------

/// Filter worktree bytes for storage: LFS pointer substitution first
/// (stashing the payload in the backend's LFS area), then CRLF cleaning.
pub fn clean(repo: &Repository, path: &str, content: &[u8]) -> Result<Vec<u8>> {
    let config = repo.config();
    let attributes = load_attributes(repo);
    if is_lfs_path(&attributes, path) && !LfsPointer::looks_like_pointer(content) {
        let pointer = LfsPointer::for_content(content);
        repo.backend().write_lfs_object(&pointer.oid, content)?;
        return Ok(pointer.serialize());
    }
    check_safecrlf(path, content, config.autocrlf(), config.safecrlf())?;
    Ok(clean_crlf(content, config.autocrlf()))
}

/// Filter repository bytes for the worktree: LFS pointer expansion (when
/// the payload is present locally), then CRLF smudging.
pub fn smudge(repo: &Repository, path: &str, content: &[u8]) -> Result<Vec<u8>> {
    let attributes = load_attributes(repo);
    if is_lfs_path(&attributes, path) && LfsPointer::looks_like_pointer(content) {
        if let Ok(pointer) = LfsPointer::parse(content) {
            if let Some(payload) = repo.backend().read_lfs_object(&pointer.oid)? {
                return Ok(payload);
            }
            // Payload not fetched yet: materialize the pointer itself.
            tracing::debug!(path, oid = %pointer.oid, "LFS object missing, writing pointer");
        }
    }
    Ok(smudge_crlf(content, repo.config().autocrlf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_heuristic() {
        assert!(is_binary(b"abc\0def"));
        assert!(!is_binary(b"plain text\r\n"));
    }

    #[test]
    fn clean_strips_crlf_for_text_only() {
        assert_eq!(clean_crlf(b"a\r\nb\r\n", AutoCrlf::True), b"a\nb\n");
        assert_eq!(clean_crlf(b"a\r\nb", AutoCrlf::Input), b"a\nb");
        let binary = b"a\r\n\0b";
        assert_eq!(clean_crlf(binary, AutoCrlf::True), binary.to_vec());
        assert_eq!(clean_crlf(b"a\r\nb", AutoCrlf::False), b"a\r\nb");
    }

    #[test]
    fn smudge_restores_crlf_only_for_true() {
        assert_eq!(smudge_crlf(b"a\nb\n", AutoCrlf::True), b"a\r\nb\r\n");
        assert_eq!(smudge_crlf(b"a\nb", AutoCrlf::Input), b"a\nb");
        // Existing CRLF is not doubled.
        assert_eq!(smudge_crlf(b"a\r\nb", AutoCrlf::True), b"a\r\nb");
    }

    #[test]
    fn safecrlf_fail_rejects_mixed_endings() {
        // Mixed endings: cleaning then smudging yields uniform CRLF, not
        // the original.
        let mixed = b"a\r\nb\n";
        assert!(check_safecrlf("f", mixed, AutoCrlf::True, SafeCrlf::Fail).is_err());
        assert!(check_safecrlf("f", mixed, AutoCrlf::True, SafeCrlf::Warn).is_ok());
        assert!(check_safecrlf("f", b"a\r\nb\r\n", AutoCrlf::True, SafeCrlf::Fail).is_ok());
    }

    #[test]
    fn lfs_attribute_matching() {
        let attrs = b"*.bin filter=lfs diff=lfs merge=lfs -text\n*.txt text\n";
        assert!(is_lfs_path(attrs, "model.bin"));
        assert!(is_lfs_path(attrs, "data/deep/model.bin"));
        assert!(!is_lfs_path(attrs, "readme.txt"));
    }
}
