//! The `push` command: a thin wrapper over the protocol engine.

use grit_wire::http::HttpClient;

use crate::callbacks::Callbacks;
use crate::errors::Result;
use crate::remote::{self, PushOptions, PushResult};
use crate::repo::Repository;

/// Push to a remote.
pub fn push(
    repo: &Repository,
    client: &dyn HttpClient,
    options: &PushOptions,
    callbacks: &mut Callbacks,
) -> Result<PushResult> {
    remote::push(repo, client, options, callbacks).map_err(|e| e.with_caller("grit.push"))
}
