//! The `fetch` command: a thin wrapper over the protocol engine.

use grit_wire::http::HttpClient;

use crate::callbacks::Callbacks;
use crate::errors::Result;
use crate::remote::{self, FetchOptions, FetchResult};
use crate::repo::Repository;

/// Fetch from a remote.
pub fn fetch(
    repo: &Repository,
    client: &dyn HttpClient,
    options: &FetchOptions,
    callbacks: &mut Callbacks,
) -> Result<FetchResult> {
    remote::fetch(repo, client, options, callbacks).map_err(|e| e.with_caller("grit.fetch"))
}
