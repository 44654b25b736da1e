//! Pack index v2.
//!
//! Layout: `\xFFtOc` magic, version 2, a 256-entry fanout (cumulative
//! object counts by first digest byte), sorted OIDs, per-object CRC32s,
//! 4-byte offsets (high bit set means an index into the trailing 64-bit
//! offset table), the pack checksum, and the index's own trailing hash.
//!
//! The index is derived data: it can always be rebuilt from the pack via
//! [`index_pack`], which is also the ingestion path for packs received
//! over the wire (delta bases resolved, every object hashed).

use std::collections::HashMap;

use crate::object::{ObjectKind, hash_object};
use crate::oid::{HashKind, Hasher, Oid};
use crate::pack::{PackError, PackFile};

/// Index v2 magic bytes (`\xFFtOc`).
pub const INDEX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
/// The only index version read or written.
pub const INDEX_VERSION: u32 = 2;

/// Offsets at or above this bit go through the 64-bit spill table.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// A parsed (or freshly built) pack index.
pub struct PackIndex {
    hash: HashKind,
    fanout: [u32; 256],
    oids: Vec<Oid>,
    crcs: Vec<u32>,
    offsets: Vec<u64>,
    pack_checksum: Oid,
}

impl PackIndex {
    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.oids.len()
    }

    /// `true` if the pack holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.oids.is_empty()
    }

    /// Checksum of the pack this index describes.
    #[must_use]
    pub const fn pack_checksum(&self) -> Oid {
        self.pack_checksum
    }

    /// All object ids, sorted.
    #[must_use]
    pub fn oids(&self) -> &[Oid] {
        &self.oids
    }

    /// The fanout table (cumulative counts, monotone).
    #[must_use]
    pub const fn fanout(&self) -> &[u32; 256] {
        &self.fanout
    }

    /// CRC32 of the raw pack entry for the `i`th sorted object.
    #[must_use]
    pub fn crc(&self, i: usize) -> u32 {
        self.crcs[i]
    }

    /// Binary-search an OID within its fanout bucket; returns the pack
    /// offset of its entry.
    #[must_use]
    pub fn lookup(&self, oid: &Oid) -> Option<u64> {
        let bucket = oid.first_byte() as usize;
        let hi = self.fanout[bucket] as usize;
        let lo = if bucket == 0 {
            0
        } else {
            self.fanout[bucket - 1] as usize
        };
        let slot = self.oids[lo..hi]
            .binary_search_by(|probe| probe.as_raw().cmp(oid.as_raw()))
            .ok()?;
        Some(self.offsets[lo + slot])
    }

    /// Matches of a hex prefix (for short-OID expansion).
    #[must_use]
    pub fn prefix_matches(&self, prefix: &str) -> Vec<Oid> {
        self.oids
            .iter()
            .filter(|oid| oid.to_hex().starts_with(prefix))
            .copied()
            .collect()
    }

    /// Build an index from writer records (`(oid, offset, crc)`).
    #[must_use]
    pub fn from_records(
        hash: HashKind,
        mut records: Vec<(Oid, u64, u32)>,
        pack_checksum: Oid,
    ) -> Self {
        records.sort_by(|a, b| a.0.as_raw().cmp(b.0.as_raw()));
        let mut fanout = [0u32; 256];
        for (oid, _, _) in &records {
            fanout[oid.first_byte() as usize] += 1;
        }
        let mut running = 0u32;
        for slot in &mut fanout {
            running += *slot;
            *slot = running;
        }
        Self {
            hash,
            fanout,
            oids: records.iter().map(|r| r.0).collect(),
            crcs: records.iter().map(|r| r.2).collect(),
            offsets: records.iter().map(|r| r.1).collect(),
            pack_checksum,
        }
    }

    /// Parse index bytes, verifying magic, version, and the trailing hash.
    pub fn parse(data: &[u8], hash: HashKind) -> Result<Self, PackError> {
        let raw_len = hash.raw_len();
        let min = 4 + 4 + 256 * 4 + raw_len * 2;
        if data.len() < min {
            return Err(PackError::Corrupt("index shorter than fixed layout".into()));
        }
        if data[..4] != INDEX_SIGNATURE {
            return Err(PackError::Corrupt("bad index signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != INDEX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let body_end = data.len() - raw_len;
        let expected = Oid::from_raw(hash, &data[body_end..]);
        let mut hasher = Hasher::new(hash);
        hasher.update(&data[..body_end]);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }

        let mut fanout = [0u32; 256];
        let mut pos = 8;
        for slot in &mut fanout {
            *slot = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
            pos += 4;
        }
        for pair in fanout.windows(2) {
            if pair[1] < pair[0] {
                return Err(PackError::Corrupt("fanout not monotone".into()));
            }
        }
        let count = fanout[255] as usize;

        let need = pos + count * (raw_len + 4 + 4) + raw_len * 2;
        if data.len() < need {
            return Err(PackError::Corrupt("index truncated".into()));
        }

        let mut oids = Vec::with_capacity(count);
        for _ in 0..count {
            oids.push(Oid::from_raw(hash, &data[pos..pos + raw_len]));
            pos += raw_len;
        }
        let mut crcs = Vec::with_capacity(count);
        for _ in 0..count {
            crcs.push(u32::from_be_bytes([
                data[pos],
                data[pos + 1],
                data[pos + 2],
                data[pos + 3],
            ]));
            pos += 4;
        }
        let mut small_offsets = Vec::with_capacity(count);
        for _ in 0..count {
            small_offsets.push(u32::from_be_bytes([
                data[pos],
                data[pos + 1],
                data[pos + 2],
                data[pos + 3],
            ]));
            pos += 4;
        }
        let large_count = small_offsets
            .iter()
            .filter(|&&o| o & LARGE_OFFSET_FLAG != 0)
            .count();
        let large_table_end = pos + large_count * 8;
        if data.len() < large_table_end + raw_len * 2 {
            return Err(PackError::Corrupt("64-bit offset table truncated".into()));
        }
        let mut offsets = Vec::with_capacity(count);
        for &small in &small_offsets {
            if small & LARGE_OFFSET_FLAG == 0 {
                offsets.push(u64::from(small));
            } else {
                let idx = (small & !LARGE_OFFSET_FLAG) as usize;
                let at = pos + idx * 8;
                if at + 8 > large_table_end {
                    return Err(PackError::Corrupt("64-bit offset index out of range".into()));
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&data[at..at + 8]);
                offsets.push(u64::from_be_bytes(buf));
            }
        }
        pos = large_table_end;
        let pack_checksum = Oid::from_raw(hash, &data[pos..pos + raw_len]);

        Ok(Self {
            hash,
            fanout,
            oids,
            crcs,
            offsets,
            pack_checksum,
        })
    }

    /// Serialize to index v2 bytes, including both trailing hashes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&INDEX_SIGNATURE);
        out.extend_from_slice(&INDEX_VERSION.to_be_bytes());
        for slot in &self.fanout {
            out.extend_from_slice(&slot.to_be_bytes());
        }
        for oid in &self.oids {
            out.extend_from_slice(oid.as_raw());
        }
        for crc in &self.crcs {
            out.extend_from_slice(&crc.to_be_bytes());
        }
        let mut large = Vec::new();
        for &offset in &self.offsets {
            if offset < u64::from(LARGE_OFFSET_FLAG) {
                out.extend_from_slice(&(offset as u32).to_be_bytes());
            } else {
                let idx = LARGE_OFFSET_FLAG | u32::try_from(large.len()).unwrap_or(0);
                out.extend_from_slice(&idx.to_be_bytes());
                large.push(offset);
            }
        }
        for offset in large {
            out.extend_from_slice(&offset.to_be_bytes());
        }
        out.extend_from_slice(self.pack_checksum.as_raw());
        let mut hasher = Hasher::new(self.hash);
        hasher.update(&out);
        let sum = hasher.finalize();
        out.extend_from_slice(sum.as_raw());
        out
    }
}

/// Index a pack: resolve every entry (including deltas), hash the results,
/// and produce the index plus the resolved objects.
///
/// `lookup_base` supplies thin-pack bases from outside the pack. The
/// resolved object list lets ingestion verify reachability or store
/// side-effects without a second resolution pass.
pub fn index_pack(
    pack: &PackFile,
    hash: HashKind,
    lookup_base: &mut dyn FnMut(&Oid) -> Option<(ObjectKind, Vec<u8>)>,
) -> Result<(PackIndex, Vec<(Oid, ObjectKind, Vec<u8>)>), PackError> {
    let entries = pack.entries()?;
    let mut cache = HashMap::new();
    let mut records = Vec::with_capacity(entries.len());
    let mut objects = Vec::with_capacity(entries.len());
    let bytes = pack.bytes();
    for (offset, _, len) in entries {
        let (kind, payload) = pack.resolve_at(offset, lookup_base, &mut cache)?;
        let oid = hash_object(hash, kind, &payload);
        let start = usize::try_from(offset)
            .map_err(|_| PackError::Corrupt("offset overflow".into()))?;
        let mut crc = crc32fast::Hasher::new();
        crc.update(&bytes[start..start + len]);
        records.push((oid, offset, crc.finalize()));
        objects.push((oid, kind, payload));
    }
    tracing::debug!(
        objects = objects.len(),
        pack = %pack.checksum(),
        "indexed pack"
    );
    Ok((
        PackIndex::from_records(hash, records, pack.checksum()),
        objects,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::write_pack;

    fn sample_pack() -> (PackFile, Vec<(Oid, u64, u32)>, Vec<(Oid, ObjectKind, Vec<u8>)>) {
        let objects: Vec<(Oid, ObjectKind, Vec<u8>)> = [
            &b"alpha"[..],
            b"bravo",
            b"charlie",
            b"delta",
            b"echo",
        ]
        .iter()
        .map(|payload| {
            (
                hash_object(HashKind::Sha1, ObjectKind::Blob, payload),
                ObjectKind::Blob,
                payload.to_vec(),
            )
        })
        .collect();
        let (bytes, records) = write_pack(HashKind::Sha1, &objects).unwrap();
        (
            PackFile::parse(bytes, HashKind::Sha1).unwrap(),
            records,
            objects,
        )
    }

    #[test]
    fn lookup_finds_every_object() {
        let (pack, records, _) = sample_pack();
        let index = PackIndex::from_records(HashKind::Sha1, records.clone(), pack.checksum());
        for (oid, offset, _) in &records {
            assert_eq!(index.lookup(oid), Some(*offset));
        }
        let absent = hash_object(HashKind::Sha1, ObjectKind::Blob, b"not here");
        assert_eq!(index.lookup(&absent), None);
    }

    #[test]
    fn fanout_is_monotone_and_totals() {
        let (pack, records, _) = sample_pack();
        let index = PackIndex::from_records(HashKind::Sha1, records, pack.checksum());
        let fanout = index.fanout();
        for pair in fanout.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(fanout[255] as usize, index.len());
    }

    #[test]
    fn serialize_parse_roundtrip() {
        let (pack, records, _) = sample_pack();
        let index = PackIndex::from_records(HashKind::Sha1, records, pack.checksum());
        let bytes = index.serialize();
        let parsed = PackIndex::parse(&bytes, HashKind::Sha1).unwrap();
        assert_eq!(parsed.len(), index.len());
        assert_eq!(parsed.oids(), index.oids());
        assert_eq!(parsed.pack_checksum(), index.pack_checksum());
        for oid in index.oids() {
            assert_eq!(parsed.lookup(oid), index.lookup(oid));
        }
    }

    #[test]
    fn parse_rejects_flipped_trailer() {
        let (pack, records, _) = sample_pack();
        let index = PackIndex::from_records(HashKind::Sha1, records, pack.checksum());
        let mut bytes = index.serialize();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            PackIndex::parse(&bytes, HashKind::Sha1),
            Err(PackError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn index_pack_matches_writer_records() {
        let (pack, records, objects) = sample_pack();
        let (index, resolved) = index_pack(&pack, HashKind::Sha1, &mut |_| None).unwrap();
        assert_eq!(index.len(), records.len());
        for (oid, offset, crc) in &records {
            assert_eq!(index.lookup(oid), Some(*offset));
            let slot = index.oids().iter().position(|o| o == oid).unwrap();
            assert_eq!(index.crc(slot), *crc);
        }
        assert_eq!(resolved.len(), objects.len());
        for (oid, kind, payload) in &objects {
            assert!(resolved.iter().any(|(o, k, p)| o == oid && k == kind && p == payload));
        }
    }

    #[test]
    fn large_offsets_spill_to_wide_table() {
        // Synthesize records with an offset above the 31-bit boundary.
        let oid_a = hash_object(HashKind::Sha1, ObjectKind::Blob, b"a");
        let oid_b = hash_object(HashKind::Sha1, ObjectKind::Blob, b"b");
        let records = vec![(oid_a, 12u64, 1u32), (oid_b, 0x9_0000_0000u64, 2u32)];
        let index = PackIndex::from_records(HashKind::Sha1, records, oid_a);
        let bytes = index.serialize();
        let parsed = PackIndex::parse(&bytes, HashKind::Sha1).unwrap();
        assert_eq!(parsed.lookup(&oid_a), Some(12));
        assert_eq!(parsed.lookup(&oid_b), Some(0x9_0000_0000));
    }

    #[test]
    fn prefix_matches_expand_short_ids() {
        let (pack, records, _) = sample_pack();
        let index = PackIndex::from_records(HashKind::Sha1, records, pack.checksum());
        let target = index.oids()[0];
        let hex = target.to_hex();
        let hits = index.prefix_matches(&hex[..8]);
        assert!(hits.contains(&target));
    }
}
