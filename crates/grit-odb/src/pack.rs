//! Pack v2 reader and writer.
//!
//! A pack is `PACK` + version + object count, then one entry per object
//! (varint type+size header, optional delta-base reference, zlib body),
//! then a trailing hash over everything before it. Entries of type 6
//! (`OFS_DELTA`) and 7 (`REF_DELTA`) store instruction streams against a
//! base object; resolution recurses with memoized bases.
//!
//! The writer emits only non-delta entries. Readers must handle the full
//! format either way, since packs received from remotes use deltas heavily.

use std::collections::HashMap;
use std::io::{Read as _, Write as _};

use flate2::Compression;
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::delta::{self, MAX_DELTA_DEPTH};
use crate::object::{ObjectError, ObjectKind};
use crate::oid::{HashKind, Hasher, Oid};

/// Pack file signature.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// The only pack version this implementation reads or writes.
pub const PACK_VERSION: u32 = 2;
/// Fixed header size: signature + version + count.
pub const PACK_HEADER_SIZE: usize = 12;

const OFS_DELTA: u8 = 6;
const REF_DELTA: u8 = 7;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from pack reading, writing, and delta resolution.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Structural corruption: bad magic, truncated entry, bad delta.
    #[error("pack corrupt: {0}")]
    Corrupt(String),

    /// Pack version other than 2.
    #[error("unsupported pack version {0}")]
    UnsupportedVersion(u32),

    /// Trailer hash does not match the file bytes.
    #[error("pack checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Hash from the trailer.
        expected: Oid,
        /// Hash computed over the bytes.
        actual: Oid,
    },

    /// A `REF_DELTA` base is in neither this pack nor the local store.
    #[error("delta base {0} not found")]
    MissingBase(Oid),

    /// Delta chain exceeded [`MAX_DELTA_DEPTH`].
    #[error("delta chain too deep at offset {offset}")]
    DeltaChainTooDeep {
        /// Offset of the entry whose resolution exceeded the bound.
        offset: u64,
    },

    /// zlib failure while inflating an entry body.
    #[error("zlib: {0}")]
    Zlib(#[from] std::io::Error),

    /// A resolved entry failed object-level parsing.
    #[error(transparent)]
    Object(#[from] ObjectError),
}

// ---------------------------------------------------------------------------
// Entry headers
// ---------------------------------------------------------------------------

/// What a pack entry stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackedEntryKind {
    /// A complete object of the given type.
    Base(ObjectKind),
    /// Delta against the entry at `base_offset` in the same pack.
    OfsDelta {
        /// Absolute offset of the base entry.
        base_offset: u64,
    },
    /// Delta against an object referenced by id (possibly outside the pack).
    RefDelta {
        /// Base object id.
        base: Oid,
    },
}

/// A parsed entry header, before inflating the body.
#[derive(Clone, Copy, Debug)]
pub struct RawEntry {
    /// What the body is.
    pub kind: PackedEntryKind,
    /// Inflated body size declared by the header.
    pub size: u64,
    /// Offset of the zlib body within the pack.
    pub body_offset: usize,
}

// ---------------------------------------------------------------------------
// PackFile
// ---------------------------------------------------------------------------

/// An in-memory pack with parsed header and verified trailer.
pub struct PackFile {
    data: Vec<u8>,
    hash: HashKind,
    count: u32,
}

impl PackFile {
    /// Parse and verify a pack: magic, version, and trailer hash.
    pub fn parse(data: Vec<u8>, hash: HashKind) -> Result<Self, PackError> {
        if data.len() < PACK_HEADER_SIZE + hash.raw_len() {
            return Err(PackError::Corrupt("file shorter than header".into()));
        }
        if &data[..4] != PACK_SIGNATURE {
            return Err(PackError::Corrupt("bad signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let body_end = data.len() - hash.raw_len();
        let expected = Oid::from_raw(hash, &data[body_end..]);
        let mut hasher = Hasher::new(hash);
        hasher.update(&data[..body_end]);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }
        Ok(Self { data, hash, count })
    }

    /// Number of objects the header declares.
    #[must_use]
    pub const fn object_count(&self) -> u32 {
        self.count
    }

    /// The trailer hash, which names the pack on disk.
    #[must_use]
    pub fn checksum(&self) -> Oid {
        let start = self.data.len() - self.hash.raw_len();
        Oid::from_raw(self.hash, &self.data[start..])
    }

    /// Raw pack bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Parse the entry header at `offset`.
    pub fn entry_at(&self, offset: u64) -> Result<RawEntry, PackError> {
        let mut pos = usize::try_from(offset)
            .ok()
            .filter(|&p| p >= PACK_HEADER_SIZE && p < self.data.len())
            .ok_or_else(|| PackError::Corrupt(format!("entry offset {offset} out of range")))?;
        let first = self.data[pos];
        pos += 1;
        let type_num = (first >> 4) & 0x07;
        let mut size = u64::from(first & 0x0f);
        let mut shift = 4u32;
        let mut byte = first;
        while byte & 0x80 != 0 {
            byte = *self
                .data
                .get(pos)
                .ok_or_else(|| PackError::Corrupt("truncated entry size".into()))?;
            pos += 1;
            size |= u64::from(byte & 0x7f) << shift;
            shift += 7;
        }
        let kind = match type_num {
            OFS_DELTA => {
                // Big-endian base-128 with the +1 bias per continuation.
                let mut b = *self
                    .data
                    .get(pos)
                    .ok_or_else(|| PackError::Corrupt("truncated ofs-delta".into()))?;
                pos += 1;
                let mut distance = u64::from(b & 0x7f);
                while b & 0x80 != 0 {
                    b = *self
                        .data
                        .get(pos)
                        .ok_or_else(|| PackError::Corrupt("truncated ofs-delta".into()))?;
                    pos += 1;
                    distance = ((distance + 1) << 7) | u64::from(b & 0x7f);
                }
                let base_offset = offset
                    .checked_sub(distance)
                    .filter(|&o| o >= PACK_HEADER_SIZE as u64)
                    .ok_or_else(|| PackError::Corrupt("ofs-delta points before pack".into()))?;
                PackedEntryKind::OfsDelta { base_offset }
            }
            REF_DELTA => {
                let raw_len = self.hash.raw_len();
                let raw = self
                    .data
                    .get(pos..pos + raw_len)
                    .ok_or_else(|| PackError::Corrupt("truncated ref-delta".into()))?;
                pos += raw_len;
                PackedEntryKind::RefDelta {
                    base: Oid::from_raw(self.hash, raw),
                }
            }
            n => PackedEntryKind::Base(ObjectKind::from_pack_type(n)?),
        };
        Ok(RawEntry {
            kind,
            size,
            body_offset: pos,
        })
    }

    /// Inflate the zlib body starting at `body_offset`, returning the bytes
    /// and the compressed length consumed (needed to find the next entry).
    pub fn inflate_body(&self, body_offset: usize) -> Result<(Vec<u8>, usize), PackError> {
        let slice = self
            .data
            .get(body_offset..)
            .ok_or_else(|| PackError::Corrupt("body offset out of range".into()))?;
        let mut decoder = ZlibDecoder::new(slice);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        let consumed = usize::try_from(decoder.total_in())
            .map_err(|_| PackError::Corrupt("compressed body too large".into()))?;
        Ok((out, consumed))
    }

    /// Fully resolve the object at `offset`, following delta chains.
    ///
    /// `lookup_base` supplies `REF_DELTA` bases that live outside this pack
    /// (thin packs); `cache` memoizes resolved bases across one logical
    /// read so shared chains inflate once.
    pub fn resolve_at(
        &self,
        offset: u64,
        lookup_base: &mut dyn FnMut(&Oid) -> Option<(ObjectKind, Vec<u8>)>,
        cache: &mut HashMap<u64, (ObjectKind, Vec<u8>)>,
    ) -> Result<(ObjectKind, Vec<u8>), PackError> {
        self.resolve_inner(offset, lookup_base, cache, 0)
    }

    fn resolve_inner(
        &self,
        offset: u64,
        lookup_base: &mut dyn FnMut(&Oid) -> Option<(ObjectKind, Vec<u8>)>,
        cache: &mut HashMap<u64, (ObjectKind, Vec<u8>)>,
        depth: usize,
    ) -> Result<(ObjectKind, Vec<u8>), PackError> {
        if depth > MAX_DELTA_DEPTH {
            return Err(PackError::DeltaChainTooDeep { offset });
        }
        if let Some(hit) = cache.get(&offset) {
            return Ok(hit.clone());
        }
        let entry = self.entry_at(offset)?;
        let (body, _) = self.inflate_body(entry.body_offset)?;
        if body.len() as u64 != entry.size {
            return Err(PackError::Corrupt(format!(
                "entry at {offset} inflated to {} bytes, header declared {}",
                body.len(),
                entry.size
            )));
        }
        let resolved = match entry.kind {
            PackedEntryKind::Base(kind) => (kind, body),
            PackedEntryKind::OfsDelta { base_offset } => {
                let (kind, base) =
                    self.resolve_inner(base_offset, lookup_base, cache, depth + 1)?;
                (kind, delta::apply(&base, &body)?)
            }
            PackedEntryKind::RefDelta { base } => {
                let (kind, base_data) =
                    lookup_base(&base).ok_or(PackError::MissingBase(base))?;
                (kind, delta::apply(&base_data, &body)?)
            }
        };
        cache.insert(offset, resolved.clone());
        Ok(resolved)
    }

    /// Walk every entry in file order, yielding `(offset, header,
    /// total entry length)`.
    pub fn entries(&self) -> Result<Vec<(u64, RawEntry, usize)>, PackError> {
        let mut out = Vec::with_capacity(self.count as usize);
        let mut offset = PACK_HEADER_SIZE as u64;
        let body_end = self.data.len() - self.hash.raw_len();
        for _ in 0..self.count {
            if offset >= body_end as u64 {
                return Err(PackError::Corrupt("entry count exceeds file".into()));
            }
            let entry = self.entry_at(offset)?;
            let (_, compressed) = self.inflate_body(entry.body_offset)?;
            let end = entry.body_offset + compressed;
            out.push((offset, entry, end - offset as usize));
            offset = end as u64;
        }
        if offset != body_end as u64 {
            return Err(PackError::Corrupt(format!(
                "{} stray bytes between last entry and trailer",
                (body_end as u64).abs_diff(offset)
            )));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Write a pack from an ordered object list, deduplicated by id.
///
/// Returns the pack bytes plus per-entry `(oid, offset, crc32)` records for
/// index building. All entries are written undeltified.
pub fn write_pack(
    hash: HashKind,
    objects: &[(Oid, ObjectKind, Vec<u8>)],
) -> Result<(Vec<u8>, Vec<(Oid, u64, u32)>), PackError> {
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<&(Oid, ObjectKind, Vec<u8>)> = objects
        .iter()
        .filter(|(oid, _, _)| seen.insert(*oid))
        .collect();

    let mut pack = Vec::new();
    pack.extend_from_slice(PACK_SIGNATURE);
    pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
    let count = u32::try_from(unique.len())
        .map_err(|_| PackError::Corrupt("too many objects for one pack".into()))?;
    pack.extend_from_slice(&count.to_be_bytes());

    let mut records = Vec::with_capacity(unique.len());
    for (oid, kind, payload) in unique {
        let offset = pack.len() as u64;
        let entry_start = pack.len();
        push_entry_header(&mut pack, kind.pack_type(), payload.len() as u64);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload)?;
        pack.extend_from_slice(&encoder.finish()?);
        let mut crc = crc32fast::Hasher::new();
        crc.update(&pack[entry_start..]);
        records.push((*oid, offset, crc.finalize()));
    }

    let mut hasher = Hasher::new(hash);
    hasher.update(&pack);
    let checksum = hasher.finalize();
    pack.extend_from_slice(checksum.as_raw());
    Ok((pack, records))
}

fn push_entry_header(out: &mut Vec<u8>, type_num: u8, mut size: u64) {
    let mut byte = (type_num << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size != 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(byte);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::hash_object;

    fn obj(kind: ObjectKind, payload: &[u8]) -> (Oid, ObjectKind, Vec<u8>) {
        (
            hash_object(HashKind::Sha1, kind, payload),
            kind,
            payload.to_vec(),
        )
    }

    #[test]
    fn write_then_read_roundtrip() {
        let objects = vec![
            obj(ObjectKind::Blob, b"first"),
            obj(ObjectKind::Blob, b"second"),
            obj(ObjectKind::Tree, b""),
        ];
        let (bytes, records) = write_pack(HashKind::Sha1, &objects).unwrap();
        let pack = PackFile::parse(bytes, HashKind::Sha1).unwrap();
        assert_eq!(pack.object_count(), 3);

        let mut cache = HashMap::new();
        for ((oid, kind, payload), (rec_oid, offset, _crc)) in objects.iter().zip(&records) {
            assert_eq!(oid, rec_oid);
            let (got_kind, got_payload) = pack
                .resolve_at(*offset, &mut |_| None, &mut cache)
                .unwrap();
            assert_eq!(got_kind, *kind);
            assert_eq!(&got_payload, payload);
            assert_eq!(hash_object(HashKind::Sha1, got_kind, &got_payload), *oid);
        }
    }

    #[test]
    fn duplicates_are_written_once() {
        let a = obj(ObjectKind::Blob, b"same");
        let objects = vec![a.clone(), a.clone(), obj(ObjectKind::Blob, b"other")];
        let (bytes, records) = write_pack(HashKind::Sha1, &objects).unwrap();
        let pack = PackFile::parse(bytes, HashKind::Sha1).unwrap();
        assert_eq!(pack.object_count(), 2);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn trailer_corruption_detected() {
        let (mut bytes, _) = write_pack(HashKind::Sha1, &[obj(ObjectKind::Blob, b"x")]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            PackFile::parse(bytes, HashKind::Sha1),
            Err(PackError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_signature_rejected() {
        assert!(matches!(
            PackFile::parse(vec![0u8; 64], HashKind::Sha1),
            Err(PackError::Corrupt(_))
        ));
    }

    #[test]
    fn version_3_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(PACK_SIGNATURE);
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        let mut hasher = Hasher::new(HashKind::Sha1);
        hasher.update(&bytes);
        let sum = hasher.finalize();
        bytes.extend_from_slice(sum.as_raw());
        assert!(matches!(
            PackFile::parse(bytes, HashKind::Sha1),
            Err(PackError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn entries_enumerates_offsets() {
        let objects = vec![obj(ObjectKind::Blob, b"aaa"), obj(ObjectKind::Blob, b"bbbb")];
        let (bytes, records) = write_pack(HashKind::Sha1, &objects).unwrap();
        let pack = PackFile::parse(bytes, HashKind::Sha1).unwrap();
        let entries = pack.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, records[0].1);
        assert_eq!(entries[1].0, records[1].1);
        assert_eq!(entries[0].0, PACK_HEADER_SIZE as u64);
    }

    /// Build a pack containing one base object and one REF_DELTA entry by
    /// hand, then check resolution against an external base lookup.
    #[test]
    fn ref_delta_resolution_with_external_base() {
        let base_payload = b"hello base".to_vec();
        let base_oid = hash_object(HashKind::Sha1, ObjectKind::Blob, &base_payload);

        // delta: base size 10, result size 5, copy offset 0 size 5 -> "hello"
        let delta = vec![10, 5, 0x91, 0, 5];

        let mut pack = Vec::new();
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&1u32.to_be_bytes());
        let offset = pack.len() as u64;
        push_entry_header(&mut pack, 7, delta.len() as u64);
        pack.extend_from_slice(base_oid.as_raw());
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&delta).unwrap();
        pack.extend_from_slice(&enc.finish().unwrap());
        let mut hasher = Hasher::new(HashKind::Sha1);
        hasher.update(&pack);
        let sum = hasher.finalize();
        pack.extend_from_slice(sum.as_raw());

        let pack = PackFile::parse(pack, HashKind::Sha1).unwrap();
        let mut cache = HashMap::new();
        let (kind, data) = pack
            .resolve_at(
                offset,
                &mut |oid| {
                    (*oid == base_oid).then(|| (ObjectKind::Blob, base_payload.clone()))
                },
                &mut cache,
            )
            .unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(data, b"hello");

        // Unknown base -> MissingBase.
        let mut cache = HashMap::new();
        assert!(matches!(
            pack.resolve_at(offset, &mut |_| None, &mut cache),
            Err(PackError::MissingBase(_))
        ));
    }
}
