//! `clone`: init, configure the remote, fetch, check out.

use grit_store::Backend;
use grit_wire::http::HttpClient;
use grit_wire::upload_pack::DepthSpec;

use crate::callbacks::{AbortSignal, Callbacks};
use crate::errors::Result;
use crate::ops::checkout::{CheckoutParams, checkout};
use crate::refs;
use crate::remote::{self, FetchOptions};
use crate::repo::{InitOptions, Repository};

/// Parameters for [`clone`].
#[derive(Debug, Default)]
pub struct CloneParams {
    /// Remote URL.
    pub url: String,
    /// Remote name (`"origin"` by default).
    pub remote: Option<String>,
    /// Clone only one branch.
    pub single_branch: bool,
    /// Branch to check out; defaults to the remote's HEAD.
    pub branch: Option<String>,
    /// Skip the working-tree checkout.
    pub no_checkout: bool,
    /// Shallow bounds.
    pub depth: DepthSpec,
    /// Abort token.
    pub abort: AbortSignal,
}

/// Clone into a fresh backend; returns the opened repository.
pub fn clone(
    backend: Box<dyn Backend>,
    client: &dyn HttpClient,
    params: &CloneParams,
    callbacks: &mut Callbacks,
) -> Result<Repository> {
    let caller = "grit.clone";
    clone_inner(backend, client, params, callbacks).map_err(|e| e.with_caller(caller))
}

fn clone_inner(
    backend: Box<dyn Backend>,
    client: &dyn HttpClient,
    params: &CloneParams,
    callbacks: &mut Callbacks,
) -> Result<Repository> {
    let repo = Repository::init(backend, &InitOptions::default())?;
    let remote_name = params.remote.clone().unwrap_or_else(|| "origin".to_owned());

    repo.update_config(|config| {
        config.set(&format!("remote.{remote_name}.url"), &params.url)?;
        config.add(
            &format!("remote.{remote_name}.fetch"),
            &format!("+refs/heads/*:refs/remotes/{remote_name}/*"),
        )
    })?;

    let fetched = remote::fetch(
        &repo,
        client,
        &FetchOptions {
            remote: remote_name.clone(),
            single_branch: params.single_branch,
            ref_name: params.branch.clone(),
            tags: true,
            depth: params.depth.clone(),
            abort: params.abort.clone(),
            ..FetchOptions::default()
        },
        callbacks,
    )?;

    // An empty remote leaves an unborn HEAD.
    let Some(default_branch) = params
        .branch
        .clone()
        .map(|b| format!("refs/heads/{b}"))
        .or(fetched.default_branch)
    else {
        return Ok(repo);
    };
    let short = default_branch
        .strip_prefix("refs/heads/")
        .unwrap_or(&default_branch)
        .to_owned();

    // Local branch from the remote tip, tracking config, HEAD.
    let tracking = format!("refs/remotes/{remote_name}/{short}");
    if let Some(tip) = refs::resolve_opt(&repo, &tracking)? {
        refs::update(
            &repo,
            &default_branch,
            tip,
            &crate::refs::UpdateOptions {
                message: &format!("clone: from {}", params.url),
                ..crate::refs::UpdateOptions::default()
            },
        )?;
        repo.update_config(|config| {
            config.set(&format!("branch.{short}.remote"), &remote_name)?;
            config.set(&format!("branch.{short}.merge"), &default_branch)
        })?;
        refs::write_symbolic(&repo, "HEAD", &default_branch, "")?;
        if !params.no_checkout && repo.has_workdir() {
            checkout(
                &repo,
                &CheckoutParams {
                    rev: &short,
                    abort: params.abort.clone(),
                    ..CheckoutParams::default()
                },
            )?;
        }
    }
    Ok(repo)
}
