//! The grit error type.
//!
//! Every operation returns [`Error`]: a closed [`ErrorKind`] sum plus the
//! `caller` naming the entry point that surfaced it (`grit.add`,
//! `grit.fetch`, ...). Variants carry structured data so embedders can
//! match on failure modes without parsing messages, and [`Error::code`]
//! gives a stable string for logging and cross-language bindings.

use std::fmt;

use grit_odb::{ObjectError, ObjectKind, Oid, PackError};
use grit_store::StoreError;
use grit_wire::WireError;

/// An error with its originating operation attached.
#[derive(Debug)]
pub struct Error {
    caller: &'static str,
    kind: ErrorKind,
}

/// The closed sum of grit failure modes.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A required argument was not supplied.
    #[error("missing required parameter `{name}`")]
    MissingParameter {
        /// Parameter name, or `dir OR gitdir` when either suffices.
        name: &'static str,
    },

    /// An object, ref, file, config key, or similar was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What class of thing was missing (`"object"`, `"ref"`, ...).
        kind: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },

    /// Creating something that already exists.
    #[error("{kind} already exists: {name}")]
    AlreadyExists {
        /// What class of thing collided.
        kind: &'static str,
        /// Its name.
        name: String,
    },

    /// A ref name violated the git naming rules.
    #[error("invalid ref name `{name}`")]
    InvalidRefName {
        /// The rejected name.
        name: String,
    },

    /// A path was outside the accepted shape.
    #[error("invalid filepath ({reason}): `{path}`")]
    InvalidFilepath {
        /// Which rule was violated (`"leading-slash"`, ...).
        reason: &'static str,
        /// The rejected path.
        path: String,
    },

    /// An object had a different type than the operation requires.
    #[error("expected a {expected}, found a {actual}")]
    ObjectType {
        /// Required type.
        expected: ObjectKind,
        /// Actual type.
        actual: ObjectKind,
    },

    /// An object id collided with different content.
    #[error("object {oid} exists with different content")]
    ObjectHashMismatch {
        /// The colliding id.
        oid: Oid,
    },

    /// Pack or pack-index corruption.
    #[error("pack corrupt: {detail}")]
    PackCorrupt {
        /// What was wrong.
        detail: String,
    },

    /// Index (dircache) corruption: `"empty"`, `"magic"`, `"checksum"`,
    /// or a longer description.
    #[error("index corrupt: {detail}")]
    IndexCorrupt {
        /// What was wrong.
        detail: String,
    },

    /// A loose object or typed payload failed to parse.
    #[error("object corrupt: {detail}")]
    ObjectCorrupt {
        /// What was wrong.
        detail: String,
    },

    /// Pull/push refused because the update is not fast-forward.
    #[error("not a fast-forward")]
    FastForward,

    /// A merge produced conflicts.
    #[error("merge conflict in {} file(s)", paths.len())]
    MergeConflict {
        /// Conflicted paths.
        paths: Vec<String>,
    },

    /// Compare-and-set ref update found an unexpected current value.
    #[error("ref `{name}` was {actual:?}, expected {expected:?}")]
    RefMismatch {
        /// The ref.
        name: String,
        /// Expected current value.
        expected: Option<String>,
        /// Actual current value.
        actual: Option<String>,
    },

    /// Symbolic ref resolution exceeded the hop bound.
    #[error("circular symbolic ref at `{name}`")]
    CircularRef {
        /// The ref where the bound was hit.
        name: String,
    },

    /// The remote lacks a capability the request needs.
    #[error("remote does not support `{capability}`")]
    RemoteCapability {
        /// The missing capability.
        capability: String,
    },

    /// The URL's transport is not supported.
    #[error("unknown transport for `{url}` (only http/https)")]
    UnknownTransport {
        /// The offending URL.
        url: String,
    },

    /// HTTP-level failure.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code (0 for transport failures below HTTP).
        status: u16,
        /// Message from the response or transport.
        message: String,
    },

    /// Protocol-level failure that is not an HTTP status (bad pkt-line,
    /// malformed advertisement, remote ERR).
    #[error("protocol: {detail}")]
    Protocol {
        /// What was wrong.
        detail: String,
    },

    /// The operation was cancelled via its abort signal.
    #[error("operation aborted")]
    Aborted,

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Several independent failures from a batch operation.
    #[error("{} operations failed", errors.len())]
    MultipleErrors {
        /// The collected failures.
        errors: Vec<Error>,
    },
}

impl Error {
    /// Wrap a kind with the default caller; operations override it at
    /// their boundary.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            caller: "grit",
            kind,
        }
    }

    /// The operation that surfaced this error.
    #[must_use]
    pub const fn caller(&self) -> &'static str {
        self.caller
    }

    /// Attach the entry-point name. Applied once at the command boundary;
    /// an already-specific caller is kept.
    #[must_use]
    pub fn with_caller(mut self, caller: &'static str) -> Self {
        if self.caller == "grit" {
            self.caller = caller;
        }
        self
    }

    /// The failure mode.
    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Take the failure mode.
    #[must_use]
    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    /// Stable machine-readable code for the failure mode.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match &self.kind {
            ErrorKind::MissingParameter { .. } => "MissingParameter",
            ErrorKind::NotFound { .. } => "NotFound",
            ErrorKind::AlreadyExists { .. } => "AlreadyExists",
            ErrorKind::InvalidRefName { .. } => "InvalidRefName",
            ErrorKind::InvalidFilepath { .. } => "InvalidFilepath",
            ErrorKind::ObjectType { .. } => "ObjectType",
            ErrorKind::ObjectHashMismatch { .. } => "ObjectHashMismatch",
            ErrorKind::PackCorrupt { .. } => "PackCorrupt",
            ErrorKind::IndexCorrupt { .. } => "IndexCorrupt",
            ErrorKind::ObjectCorrupt { .. } => "ObjectCorrupt",
            ErrorKind::FastForward => "FastForward",
            ErrorKind::MergeConflict { .. } => "MergeConflict",
            ErrorKind::RefMismatch { .. } => "RefMismatch",
            ErrorKind::CircularRef { .. } => "CircularRef",
            ErrorKind::RemoteCapability { .. } => "RemoteCapability",
            ErrorKind::UnknownTransport { .. } => "UnknownTransport",
            ErrorKind::Http { .. } => "Http",
            ErrorKind::Protocol { .. } => "Protocol",
            ErrorKind::Aborted => "Aborted",
            ErrorKind::Io(_) => "Io",
            ErrorKind::MultipleErrors { .. } => "MultipleErrors",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.caller, self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(e))
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        let kind = match e {
            StoreError::NotFound { what } => ErrorKind::NotFound {
                kind: "file",
                id: what,
            },
            StoreError::RefMismatch {
                name,
                expected,
                actual,
            } => ErrorKind::RefMismatch {
                name,
                expected,
                actual,
            },
            StoreError::ObjectHashMismatch { oid } => ErrorKind::ObjectHashMismatch { oid },
            StoreError::Io(e) => ErrorKind::Io(e),
            StoreError::Corrupt { detail } => ErrorKind::ObjectCorrupt { detail },
        };
        Self::new(kind)
    }
}

impl From<PackError> for Error {
    fn from(e: PackError) -> Self {
        let kind = match e {
            PackError::Zlib(io) => ErrorKind::Io(io),
            PackError::Object(obj) => return obj.into(),
            other => ErrorKind::PackCorrupt {
                detail: other.to_string(),
            },
        };
        Self::new(kind)
    }
}

impl From<ObjectError> for Error {
    fn from(e: ObjectError) -> Self {
        Self::new(ErrorKind::ObjectCorrupt {
            detail: e.to_string(),
        })
    }
}

impl From<grit_odb::LooseError> for Error {
    fn from(e: grit_odb::LooseError) -> Self {
        match e {
            grit_odb::LooseError::Zlib(io) => Self::new(ErrorKind::Io(io)),
            grit_odb::LooseError::Object(obj) => obj.into(),
        }
    }
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        let kind = match e {
            WireError::Http { status, message } => ErrorKind::Http { status, message },
            WireError::Io(io) => ErrorKind::Io(io),
            other => ErrorKind::Protocol {
                detail: other.to_string(),
            },
        };
        Self::new(kind)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
