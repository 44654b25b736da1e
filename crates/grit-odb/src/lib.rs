//! Object model and codecs for grit.
//!
//! This crate owns everything below the storage backend: object identity,
//! the four typed git objects, the loose object format, packfiles and their
//! indexes, delta resolution, and bundle files. Nothing here touches the
//! filesystem or the network — callers hand in bytes and get bytes (or
//! parsed values) back, which keeps the codecs testable in isolation.
//!
//! # Crate layout
//!
//! - [`oid`] — [`Oid`] and [`HashKind`] (SHA-1 or SHA-256 per repository).
//! - [`object`] — typed objects, header wrap/unwrap, canonical hashing.
//! - [`loose`] — zlib-wrapped single-object files.
//! - [`delta`] — copy/insert delta instruction streams.
//! - [`pack`] — pack v2 reader and writer.
//! - [`pack_index`] — pack index v2 with fanout and 64-bit offset spill.
//! - [`bundle`] — bundle v2/v3 container format.

pub mod bundle;
pub mod delta;
pub mod loose;
pub mod object;
pub mod oid;
pub mod pack;
pub mod pack_index;

pub use bundle::Bundle;
pub use loose::LooseError;
pub use object::{
    Commit, FileMode, Object, ObjectError, ObjectKind, Signature, Tag, Tree, TreeEntry,
};
pub use oid::{HashKind, Hasher, Oid, OidParseError};
pub use pack::{PackError, PackFile, PackedEntryKind, write_pack};
pub use pack_index::{PackIndex, index_pack};
