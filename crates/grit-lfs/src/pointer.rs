//! The LFS pointer file codec.
//!
//! A pointer is a small UTF-8 text file:
//!
//! ```text
//! version https://git-lfs.github.com/spec/v1
//! oid sha256:<64 hex>
//! size <bytes>
//! ```
//!
//! Keys sort alphabetically after `version`, values are single-line, and
//! the file must stay under a few hundred bytes — anything else is
//! treated as ordinary file content, not a pointer.

use sha2::{Digest as _, Sha256};

/// The `version` line every pointer starts with.
pub const VERSION_LINE: &str = "version https://git-lfs.github.com/spec/v1";

/// Conservative upper bound; real pointers are well under this.
const MAX_POINTER_LEN: usize = 1024;

/// Errors from pointer parsing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PointerError {
    /// Content does not begin with the pointer version line.
    #[error("not an LFS pointer")]
    NotAPointer,

    /// The version line was present but a required key was missing or
    /// malformed.
    #[error("malformed LFS pointer: {0}")]
    Malformed(String),
}

/// A parsed LFS pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LfsPointer {
    /// sha256 of the real content, lowercase hex.
    pub oid: String,
    /// Size of the real content in bytes.
    pub size: u64,
}

impl LfsPointer {
    /// Build a pointer for `content`, hashing it with sha256.
    #[must_use]
    pub fn for_content(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        let digest = hasher.finalize();
        let oid = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self {
            oid,
            size: content.len() as u64,
        }
    }

    /// Quick check whether bytes begin with the pointer header. Cheap
    /// enough to run on every checkout/add filter decision.
    #[must_use]
    pub fn looks_like_pointer(content: &[u8]) -> bool {
        content.len() <= MAX_POINTER_LEN && content.starts_with(VERSION_LINE.as_bytes())
    }

    /// Parse pointer text.
    pub fn parse(content: &[u8]) -> Result<Self, PointerError> {
        if !Self::looks_like_pointer(content) {
            return Err(PointerError::NotAPointer);
        }
        let text = std::str::from_utf8(content)
            .map_err(|_| PointerError::Malformed("not UTF-8".into()))?;
        let mut oid = None;
        let mut size = None;
        for line in text.lines().skip(1) {
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(' ') else {
                return Err(PointerError::Malformed(format!("bad line {line:?}")));
            };
            match key {
                "oid" => {
                    let hex = value.strip_prefix("sha256:").ok_or_else(|| {
                        PointerError::Malformed(format!("unsupported oid {value:?}"))
                    })?;
                    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                        return Err(PointerError::Malformed("oid is not 64 hex chars".into()));
                    }
                    oid = Some(hex.to_ascii_lowercase());
                }
                "size" => {
                    size = Some(value.parse::<u64>().map_err(|_| {
                        PointerError::Malformed(format!("size {value:?} is not a number"))
                    })?);
                }
                _ => {} // Unknown keys are allowed by the spec.
            }
        }
        Ok(Self {
            oid: oid.ok_or_else(|| PointerError::Malformed("missing oid".into()))?,
            size: size.ok_or_else(|| PointerError::Malformed("missing size".into()))?,
        })
    }

    /// Serialize to pointer text.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!("{VERSION_LINE}\noid sha256:{}\nsize {}\n", self.oid, self.size).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let pointer = LfsPointer::for_content(b"large binary payload");
        let parsed = LfsPointer::parse(&pointer.serialize()).unwrap();
        assert_eq!(parsed, pointer);
        assert_eq!(parsed.size, 20);
    }

    #[test]
    fn known_sha256() {
        // `echo -n 'hello' | sha256sum`
        let pointer = LfsPointer::for_content(b"hello");
        assert_eq!(
            pointer.oid,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn ordinary_content_is_not_a_pointer() {
        assert_eq!(
            LfsPointer::parse(b"#!/bin/sh\necho hi\n"),
            Err(PointerError::NotAPointer)
        );
        assert!(!LfsPointer::looks_like_pointer(b"version 1.0 of my doc"));
    }

    #[test]
    fn oversized_text_is_not_a_pointer() {
        let mut big = VERSION_LINE.as_bytes().to_vec();
        big.extend(std::iter::repeat_n(b'x', 2000));
        assert!(!LfsPointer::looks_like_pointer(&big));
    }

    #[test]
    fn missing_size_is_malformed() {
        let text = format!("{VERSION_LINE}\noid sha256:{}\n", "a".repeat(64));
        assert!(matches!(
            LfsPointer::parse(text.as_bytes()),
            Err(PointerError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_keys_tolerated() {
        let text = format!(
            "{VERSION_LINE}\next-custom 1\noid sha256:{}\nsize 5\n",
            "b".repeat(64)
        );
        let pointer = LfsPointer::parse(text.as_bytes()).unwrap();
        assert_eq!(pointer.size, 5);
    }
}
