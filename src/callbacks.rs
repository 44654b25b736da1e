//! The callback mesh and cancellation token.
//!
//! Long-running operations accept a [`Callbacks`] bundle: progress
//! reporting, HTTP auth, pre-push veto, commit signing, and a custom
//! merge driver. Absent callbacks are no-ops. The [`AbortSignal`] is
//! checked at I/O boundaries and per pack entry during ingestion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{Error, ErrorKind, Result};

/// A progress report from a long-running phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Phase name (`"Receiving objects"`, `"Resolving deltas"`, ...).
    pub phase: String,
    /// Units completed so far.
    pub loaded: u64,
    /// Total units when known.
    pub total: Option<u64>,
}

/// Credentials produced by the auth callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl Credentials {
    /// The `Authorization: Basic` header value.
    #[must_use]
    pub fn to_basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", base64(raw.as_bytes()))
    }
}

/// A proposed ref update handed to the pre-push callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrePushRef {
    /// Local ref name.
    pub local_ref: String,
    /// Remote ref name.
    pub remote_ref: String,
    /// OID being pushed (hex).
    pub new_oid: String,
    /// Current remote OID (hex, zeroes when creating).
    pub old_oid: String,
}

/// Outcome of a custom merge driver.
pub struct MergeDriverResult {
    /// Whether the merge was clean.
    pub clean: bool,
    /// Merged content.
    pub merged: Vec<u8>,
}

type ProgressFn = dyn FnMut(&Progress) + Send;
type AuthFn = dyn FnMut(&str) -> Option<Credentials> + Send;
type PrePushFn = dyn FnMut(&[PrePushRef]) -> bool + Send;
type SignFn = dyn FnMut(&[u8]) -> Result<String> + Send;
type MergeDriverFn =
    dyn FnMut(&[u8], &[u8], &[u8], &str) -> Option<MergeDriverResult> + Send;

/// The callback bundle operations accept. Build with the `on_*` setters;
/// every hook is optional.
#[derive(Default)]
pub struct Callbacks {
    progress: Option<Box<ProgressFn>>,
    auth: Option<Box<AuthFn>>,
    pre_push: Option<Box<PrePushFn>>,
    sign: Option<Box<SignFn>>,
    merge_driver: Option<Box<MergeDriverFn>>,
}

impl Callbacks {
    /// No callbacks at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive progress events.
    #[must_use]
    pub fn on_progress(mut self, f: impl FnMut(&Progress) + Send + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Supply credentials when the remote answers 401. Called with the
    /// URL; returning `None` keeps the failure.
    #[must_use]
    pub fn on_auth(
        mut self,
        f: impl FnMut(&str) -> Option<Credentials> + Send + 'static,
    ) -> Self {
        self.auth = Some(Box::new(f));
        self
    }

    /// Veto a push: return `false` to cancel before any data moves.
    #[must_use]
    pub fn on_pre_push(mut self, f: impl FnMut(&[PrePushRef]) -> bool + Send + 'static) -> Self {
        self.pre_push = Some(Box::new(f));
        self
    }

    /// Sign commit/tag payloads; returns the armored signature block.
    #[must_use]
    pub fn on_sign(mut self, f: impl FnMut(&[u8]) -> Result<String> + Send + 'static) -> Self {
        self.sign = Some(Box::new(f));
        self
    }

    /// Override the built-in three-way text merge for a path. Receives
    /// `(base, ours, theirs, path)`; `None` falls through to the
    /// built-in.
    #[must_use]
    pub fn on_merge_driver(
        mut self,
        f: impl FnMut(&[u8], &[u8], &[u8], &str) -> Option<MergeDriverResult> + Send + 'static,
    ) -> Self {
        self.merge_driver = Some(Box::new(f));
        self
    }

    /// Emit a progress event.
    pub fn progress(&mut self, phase: &str, loaded: u64, total: Option<u64>) {
        if let Some(f) = &mut self.progress {
            f(&Progress {
                phase: phase.to_owned(),
                loaded,
                total,
            });
        }
    }

    /// Ask for credentials.
    pub fn auth(&mut self, url: &str) -> Option<Credentials> {
        self.auth.as_mut().and_then(|f| f(url))
    }

    /// Run the pre-push veto; pushes proceed when unset.
    pub fn pre_push(&mut self, refs: &[PrePushRef]) -> bool {
        self.pre_push.as_mut().is_none_or(|f| f(refs))
    }

    /// Whether a signer is installed.
    #[must_use]
    pub fn has_signer(&self) -> bool {
        self.sign.is_some()
    }

    /// Sign a payload.
    pub fn sign(&mut self, payload: &[u8]) -> Result<Option<String>> {
        match &mut self.sign {
            Some(f) => f(payload).map(Some),
            None => Ok(None),
        }
    }

    /// Run the custom merge driver, if any.
    pub fn merge_driver(
        &mut self,
        base: &[u8],
        ours: &[u8],
        theirs: &[u8],
        path: &str,
    ) -> Option<MergeDriverResult> {
        self.merge_driver.as_mut().and_then(|f| f(base, ours, theirs, path))
    }
}

// ---------------------------------------------------------------------------
// AbortSignal
// ---------------------------------------------------------------------------

/// Cooperative cancellation token. Clone freely; all clones observe the
/// same flag.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    /// A fresh, unsignalled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`ErrorKind::Aborted`] when cancellation was requested.
    /// Called at I/O boundaries and pack-entry boundaries.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(Error::new(ErrorKind::Aborted))
        } else {
            Ok(())
        }
    }
}

/// Minimal base64 for the basic-auth header; avoids a dependency for 4
/// lines of table lookup.
fn base64(input: &[u8]) -> String {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        out.push(TABLE[(n >> 18) as usize & 63] as char);
        out.push(TABLE[(n >> 12) as usize & 63] as char);
        out.push(if chunk.len() > 1 {
            TABLE[(n >> 6) as usize & 63] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            TABLE[n as usize & 63] as char
        } else {
            '='
        });
    }
    out
}
