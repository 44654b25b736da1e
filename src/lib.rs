//! grit — an embeddable, pure-Rust git implementation.
//!
//! grit is a library, not a daemon: a content-addressable object store
//! with packfile support, refs and reflogs, the dircache, the smart-HTTP
//! protocol (v1 and v2), and working-tree machinery (checkout, merge,
//! status, sparse, filters), all behind the pluggable storage backend
//! defined in `grit-store`.
//!
//! The command surface lives in [`ops`]: thin functions (`add`,
//! `commit`, `fetch`, `push`, `merge`, ...) composed from the
//! subsystem modules. Hosts open a [`Repository`] over a backend
//! (filesystem or in-memory), inject an HTTP client for network
//! operations, and pass a [`Callbacks`] bundle for progress, auth, and
//! signing.
//!
//! # Crate layout
//!
//! - [`repo`] — the repository handle and per-gitdir cache.
//! - [`refs`] — ref resolution, updates, reflogs, packed-refs.
//! - [`index`] — the dircache codec and mutations.
//! - [`config`] — git INI config and the cascade.
//! - [`walk`] — the three-tree walker.
//! - [`checkout`] / [`merge`] / [`text_merge`] — working-tree
//!   transitions.
//! - [`remote`] — the smart-HTTP protocol engine.
//! - [`ops`] — the command surface.
//! - [`errors`] — the closed error taxonomy.

pub mod callbacks;
pub mod checkout;
pub mod config;
pub mod errors;
pub mod filters;
pub mod hooks;
pub mod ignore;
pub mod index;
pub mod merge;
pub mod ops;
pub mod refs;
pub mod remote;
pub mod repo;
pub mod revwalk;
pub mod sparse;
pub mod text_merge;
pub mod walk;

pub use callbacks::{AbortSignal, Callbacks, Credentials, Progress};
pub use errors::{Error, ErrorKind, Result};
pub use repo::{InitOptions, Repository};

// The subsystem crates are part of the public surface: hosts implement
// `grit_store::Backend` and `grit_wire::HttpClient` against these exact
// versions.
pub use grit_lfs;
pub use grit_odb;
pub use grit_store;
pub use grit_wire;
