//! Hook execution.
//!
//! Spawning an external process sits outside the core's purity
//! guarantees, so hooks go through the [`HookRunner`] trait: the default
//! [`ProcessHookRunner`] spawns `hooks/<name>` with the documented
//! argv/stdin contract, tests and embedders substitute their own.
//!
//! Failure policy: pre-side hooks (`pre-commit`, `pre-push`,
//! `commit-msg`) abort the operation on non-zero exit; post-side hooks
//! (`post-checkout`, `post-merge`, `post-commit`) are logged and
//! swallowed.

use std::io::Write as _;
use std::process::{Command, Stdio};

use grit_store::Backend;

use crate::errors::Result;

/// Outcome of one hook invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookOutcome {
    /// Process exit code (`0` for success or for a missing hook).
    pub status: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl HookOutcome {
    /// A hook that did not exist or ran clean.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Whether the hook allowed the operation.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs hooks by name. A missing hook must report success.
pub trait HookRunner: Send {
    /// Run `hooks/<name>` with `args`, feeding `stdin`.
    fn run(
        &self,
        backend: &dyn Backend,
        name: &str,
        args: &[&str],
        stdin: &[u8],
    ) -> Result<HookOutcome>;
}

/// The default runner: spawn the executable the backend locates.
#[derive(Default)]
pub struct ProcessHookRunner;

impl HookRunner for ProcessHookRunner {
    fn run(
        &self,
        backend: &dyn Backend,
        name: &str,
        args: &[&str],
        stdin: &[u8],
    ) -> Result<HookOutcome> {
        let Some(path) = backend.hook_path(name)? else {
            return Ok(HookOutcome::ok());
        };
        tracing::debug!(hook = name, path = %path.display(), "running hook");
        let mut child = Command::new(&path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(stdin)?;
        }
        let output = child.wait_with_output()?;
        Ok(HookOutcome {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A runner that executes nothing; every hook reports success. Used by
/// memory-backed repositories and tests.
#[derive(Default)]
pub struct NoopHookRunner;

impl HookRunner for NoopHookRunner {
    fn run(
        &self,
        _backend: &dyn Backend,
        _name: &str,
        _args: &[&str],
        _stdin: &[u8],
    ) -> Result<HookOutcome> {
        Ok(HookOutcome::ok())
    }
}
