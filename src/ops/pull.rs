//! `pull`: fetch then merge (or fast-forward only).

use grit_odb::Oid;
use grit_wire::http::HttpClient;

use crate::callbacks::{AbortSignal, Callbacks};
use crate::errors::{Error, ErrorKind, Result};
use crate::ops::merge::{MergeParams, MergeReport, merge};
use crate::refs;
use crate::remote::{self, FetchOptions};
use crate::repo::Repository;

/// Parameters for [`pull`].
#[derive(Debug, Default)]
pub struct PullParams {
    /// Remote name; defaults to the current branch's
    /// `branch.<name>.remote`, then `"origin"`.
    pub remote: Option<String>,
    /// Branch to pull; defaults to the current branch.
    pub branch: Option<String>,
    /// Refuse a merge: only fast-forward, otherwise `FastForward`.
    pub fast_forward_only: bool,
    /// Abort token.
    pub abort: AbortSignal,
}

/// Fetch the tracked branch and integrate it into HEAD.
pub fn pull(
    repo: &Repository,
    client: &dyn HttpClient,
    params: &PullParams,
    callbacks: &mut Callbacks,
) -> Result<MergeReport> {
    let caller = "grit.pull";
    pull_inner(repo, client, params, callbacks).map_err(|e| e.with_caller(caller))
}

fn pull_inner(
    repo: &Repository,
    client: &dyn HttpClient,
    params: &PullParams,
    callbacks: &mut Callbacks,
) -> Result<MergeReport> {
    let branch = match &params.branch {
        Some(branch) => branch.clone(),
        None => refs::current_branch(repo)?
            .and_then(|full| full.strip_prefix("refs/heads/").map(ToOwned::to_owned))
            .ok_or_else(|| Error::new(ErrorKind::MissingParameter { name: "ref" }))?,
    };
    let config = repo.config();
    let remote = params
        .remote
        .clone()
        .or_else(|| config.get(&format!("branch.{branch}.remote")).map(ToOwned::to_owned))
        .unwrap_or_else(|| "origin".to_owned());

    let fetched = remote::fetch(
        repo,
        client,
        &FetchOptions {
            remote: remote.clone(),
            single_branch: true,
            ref_name: Some(branch.clone()),
            abort: params.abort.clone(),
            ..FetchOptions::default()
        },
        callbacks,
    )?;

    let theirs: Oid = match fetched.fetch_head {
        Some(oid) => oid,
        None => {
            return Err(Error::new(ErrorKind::NotFound {
                kind: "ref",
                id: format!("refs/heads/{branch} on {remote}"),
            }));
        }
    };
    let tracking = format!("refs/remotes/{remote}/{branch}");
    let theirs_rev = if refs::resolve_opt(repo, &tracking)? == Some(theirs) {
        tracking
    } else {
        theirs.to_hex()
    };

    merge(
        repo,
        &MergeParams {
            theirs: &theirs_rev,
            fast_forward_only: params.fast_forward_only,
            message: Some(&format!("Merge branch '{branch}' of {remote}\n")),
            abort: params.abort.clone(),
            ..MergeParams::default()
        },
        callbacks,
    )
}
