//! Object identifiers and hashing.
//!
//! An [`Oid`] is the canonical address of an object: the hash of its
//! wrapped form (`type SP length NUL payload`). Repositories choose their
//! hash with `extensions.objectformat`; both widths share one value type so
//! the rest of the workspace never branches on the algorithm.

use std::fmt;
use std::str::FromStr;

use sha1::{Digest as _, Sha1};
use sha2::Sha256;

// ---------------------------------------------------------------------------
// HashKind
// ---------------------------------------------------------------------------

/// The object hash algorithm a repository uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKind {
    /// SHA-1, 20 bytes, 40 hex chars. The git default.
    #[default]
    Sha1,
    /// SHA-256, 32 bytes, 64 hex chars (`extensions.objectformat = sha256`).
    Sha256,
}

impl HashKind {
    /// Width of a raw digest in bytes.
    #[must_use]
    pub const fn raw_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Width of a hex-encoded digest in characters.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        self.raw_len() * 2
    }

    /// The all-zero OID for this algorithm, the "ref does not exist" sentinel.
    #[must_use]
    pub const fn zero(self) -> Oid {
        Oid {
            kind: self,
            bytes: [0; 32],
        }
    }

    /// Name as it appears in `extensions.objectformat` and protocol
    /// `object-format=` capabilities.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Parse an `object-format` name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Oid
// ---------------------------------------------------------------------------

/// A git object identifier.
///
/// Stored inline (no allocation) with the algorithm tag; only the first
/// [`HashKind::raw_len`] bytes of the buffer are meaningful. Displays as
/// lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid {
    kind: HashKind,
    bytes: [u8; 32],
}

impl Oid {
    /// Build an OID from a raw digest. `raw` must be exactly
    /// [`HashKind::raw_len`] bytes.
    ///
    /// # Panics
    /// Panics if `raw` has the wrong length; raw digests only come from
    /// hashers and validated parsers.
    #[must_use]
    pub fn from_raw(kind: HashKind, raw: &[u8]) -> Self {
        assert_eq!(raw.len(), kind.raw_len(), "raw digest width mismatch");
        let mut bytes = [0u8; 32];
        bytes[..raw.len()].copy_from_slice(raw);
        Self { kind, bytes }
    }

    /// Parse a hex string, inferring the algorithm from its length.
    pub fn from_hex(hex: &str) -> Result<Self, OidParseError> {
        let kind = match hex.len() {
            40 => HashKind::Sha1,
            64 => HashKind::Sha256,
            n => {
                return Err(OidParseError {
                    value: hex.to_owned(),
                    reason: format!("expected 40 or 64 hex characters, got {n}"),
                });
            }
        };
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let hi = hex_digit(chunk[0]).ok_or_else(|| OidParseError {
                value: hex.to_owned(),
                reason: format!("invalid hex digit '{}'", chunk[0] as char),
            })?;
            let lo = hex_digit(chunk[1]).ok_or_else(|| OidParseError {
                value: hex.to_owned(),
                reason: format!("invalid hex digit '{}'", chunk[1] as char),
            })?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self { kind, bytes })
    }

    /// The hash algorithm this OID was produced by.
    #[must_use]
    pub const fn kind(&self) -> HashKind {
        self.kind
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.bytes[..self.kind.raw_len()]
    }

    /// First byte of the digest, the pack index fanout key.
    #[must_use]
    pub const fn first_byte(&self) -> u8 {
        self.bytes[0]
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }

    /// `true` if every digest byte is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.as_raw().iter().all(|&b| b == 0)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_raw() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl FromStr for Oid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Error from parsing a hex string into an [`Oid`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid OID {value:?}: {reason}")]
pub struct OidParseError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        // Tolerate uppercase on input; output is always lowercase.
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Hasher
// ---------------------------------------------------------------------------

/// Streaming hasher over either algorithm.
///
/// Used for object hashing, pack trailers, and index trailers, where the
/// input arrives in chunks.
pub enum Hasher {
    /// SHA-1 state.
    Sha1(Sha1),
    /// SHA-256 state.
    Sha256(Sha256),
}

impl Hasher {
    /// Start a new digest for `kind`.
    #[must_use]
    pub fn new(kind: HashKind) -> Self {
        match kind {
            HashKind::Sha1 => Self::Sha1(Sha1::new()),
            HashKind::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    /// Feed bytes.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    /// Finish and return the digest as an [`Oid`].
    #[must_use]
    pub fn finalize(self) -> Oid {
        match self {
            Self::Sha1(h) => Oid::from_raw(HashKind::Sha1, &h.finalize()),
            Self::Sha256(h) => Oid::from_raw(HashKind::Sha256, &h.finalize()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
