//! Loose object codec.
//!
//! A loose object is the zlib-deflated wrapped form (`type SP length NUL
//! payload`) stored at `objects/ab/cdef...` — first two hex digits of the
//! OID as the fan-out directory, the rest as the file name. The codec here
//! works on bytes; placement is the storage backend's job, but the path
//! split lives here so both backends share it.

use std::io::{Read as _, Write as _};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::object::{self, ObjectError, ObjectKind};
use crate::oid::Oid;

/// Errors from loose object encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    /// zlib stream error.
    #[error("zlib: {0}")]
    Zlib(#[from] std::io::Error),

    /// The inflated bytes were not a valid wrapped object.
    #[error(transparent)]
    Object(#[from] ObjectError),
}

/// Split an OID into the `(fan-out dir, file name)` pair used on disk.
#[must_use]
pub fn split_path(oid: &Oid) -> (String, String) {
    let hex = oid.to_hex();
    (hex[..2].to_owned(), hex[2..].to_owned())
}

/// Deflate a payload into loose-object bytes.
pub fn encode(kind: ObjectKind, payload: &[u8]) -> Result<Vec<u8>, LooseError> {
    let wrapped = object::wrap(kind, payload);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&wrapped)?;
    Ok(encoder.finish()?)
}

/// Inflate loose-object bytes and strip the header.
///
/// Rejects malformed headers and header/payload length disagreement.
pub fn decode(deflated: &[u8]) -> Result<(ObjectKind, Vec<u8>), LooseError> {
    let mut decoder = ZlibDecoder::new(deflated);
    let mut wrapped = Vec::new();
    decoder.read_to_end(&mut wrapped)?;
    let (kind, payload) = object::unwrap(&wrapped)?;
    Ok((kind, payload.to_vec()))
}
