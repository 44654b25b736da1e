//! Bundle files: a ref listing plus a packfile in one byte stream.
//!
//! v2: `# v2 git bundle`, optional `-<oid> <comment>` prerequisite lines,
//! `<oid> <refname>` lines, a blank line, then the pack. v3 adds
//! `@capability[=value]` lines (notably `@object-format=sha256`) between
//! the header and the prerequisites.

use bstr::ByteSlice as _;

use crate::oid::{HashKind, Oid};
use crate::pack::PackError;

const V2_HEADER: &[u8] = b"# v2 git bundle";
const V3_HEADER: &[u8] = b"# v3 git bundle";

/// A parsed bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle {
    /// 2 or 3.
    pub version: u32,
    /// v3 capability lines, `(name, value)`.
    pub capabilities: Vec<(String, Option<String>)>,
    /// Commits the bundle assumes the reader already has.
    pub prerequisites: Vec<(Oid, String)>,
    /// Refs carried by the bundle.
    pub refs: Vec<(Oid, String)>,
    /// The raw packfile bytes.
    pub pack: Vec<u8>,
}

impl Bundle {
    /// The object format a v3 bundle declares, defaulting to SHA-1.
    #[must_use]
    pub fn hash_kind(&self) -> HashKind {
        self.capabilities
            .iter()
            .find(|(name, _)| name == "object-format")
            .and_then(|(_, value)| value.as_deref().and_then(HashKind::from_name))
            .unwrap_or(HashKind::Sha1)
    }

    /// Parse a bundle byte stream.
    pub fn parse(data: &[u8]) -> Result<Self, PackError> {
        let (version, mut rest) = if let Some(rest) = strip_header(data, V2_HEADER) {
            (2, rest)
        } else if let Some(rest) = strip_header(data, V3_HEADER) {
            (3, rest)
        } else {
            return Err(PackError::Corrupt("not a git bundle".into()));
        };

        let mut capabilities = Vec::new();
        let mut prerequisites = Vec::new();
        let mut refs = Vec::new();
        loop {
            let eol = rest
                .find_byte(b'\n')
                .ok_or_else(|| PackError::Corrupt("bundle truncated before pack".into()))?;
            let line = &rest[..eol];
            rest = &rest[eol + 1..];
            if line.is_empty() {
                break;
            }
            if let Some(cap) = line.strip_prefix(b"@") {
                if version != 3 {
                    return Err(PackError::Corrupt("capability line in v2 bundle".into()));
                }
                let cap = String::from_utf8_lossy(cap).into_owned();
                match cap.split_once('=') {
                    Some((name, value)) => {
                        capabilities.push((name.to_owned(), Some(value.to_owned())));
                    }
                    None => capabilities.push((cap, None)),
                }
            } else if let Some(prereq) = line.strip_prefix(b"-") {
                let (oid, message) = split_oid_line(prereq)?;
                prerequisites.push((oid, message));
            } else {
                let (oid, name) = split_oid_line(line)?;
                if name.is_empty() {
                    return Err(PackError::Corrupt("bundle ref line without name".into()));
                }
                refs.push((oid, name));
            }
        }
        Ok(Self {
            version,
            capabilities,
            prerequisites,
            refs,
            pack: rest.to_vec(),
        })
    }

    /// Serialize back to the byte stream form.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(if self.version == 3 { V3_HEADER } else { V2_HEADER });
        out.push(b'\n');
        for (name, value) in &self.capabilities {
            out.push(b'@');
            out.extend_from_slice(name.as_bytes());
            if let Some(value) = value {
                out.push(b'=');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        for (oid, message) in &self.prerequisites {
            out.push(b'-');
            out.extend_from_slice(oid.to_hex().as_bytes());
            if !message.is_empty() {
                out.push(b' ');
                out.extend_from_slice(message.as_bytes());
            }
            out.push(b'\n');
        }
        for (oid, name) in &self.refs {
            out.extend_from_slice(oid.to_hex().as_bytes());
            out.push(b' ');
            out.extend_from_slice(name.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.pack);
        out
    }
}

fn strip_header<'a>(data: &'a [u8], header: &[u8]) -> Option<&'a [u8]> {
    data.strip_prefix(header)?.strip_prefix(b"\n")
}

fn split_oid_line(line: &[u8]) -> Result<(Oid, String), PackError> {
    let (hex, rest) = match line.find_byte(b' ') {
        Some(sp) => (&line[..sp], &line[sp + 1..]),
        None => (line, &line[line.len()..]),
    };
    let oid = Oid::from_hex(&String::from_utf8_lossy(hex))
        .map_err(|e| PackError::Corrupt(format!("bundle line: {e}")))?;
    Ok((oid, String::from_utf8_lossy(rest).into_owned()))
}
