//! Git LFS support for grit.
//!
//! LFS replaces large blobs with small text pointers; the real content
//! lives out-of-band and is addressed by its sha256. This crate owns the
//! pointer codec and the JSON shapes of the batch API. Where the content
//! is stored (and fetched from) is the storage backend's and protocol
//! engine's business — this crate never does I/O.

pub mod pointer;

pub use pointer::{LfsPointer, PointerError};

use serde::{Deserialize, Serialize};

/// One object reference in a batch API exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchObject {
    /// sha256 of the content, lowercase hex.
    pub oid: String,
    /// Content size in bytes.
    pub size: u64,
}

/// A batch API request (`POST .../objects/batch`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    /// `"download"` or `"upload"`.
    pub operation: String,
    /// Requested transfer adapters; `["basic"]` unless negotiated.
    pub transfers: Vec<String>,
    /// Objects in question.
    pub objects: Vec<BatchObject>,
}

impl BatchRequest {
    /// A basic-transfer download request for the given objects.
    #[must_use]
    pub fn download(objects: Vec<BatchObject>) -> Self {
        Self {
            operation: "download".to_owned(),
            transfers: vec!["basic".to_owned()],
            objects,
        }
    }
}
