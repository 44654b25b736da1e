//! The `merge` command.

use grit_odb::{Commit, FileMode, Object, Oid};
use grit_store::Backend as _;

use crate::callbacks::{AbortSignal, Callbacks};
use crate::errors::{Error, ErrorKind, Result};
use crate::merge::{MergeAnalysis, analyze, merge_trees};
use crate::refs::{self, UpdateOptions};
use crate::repo::Repository;

/// Parameters for [`merge`].
#[derive(Debug, Default)]
pub struct MergeParams<'a> {
    /// The branch or revision to merge into HEAD.
    pub theirs: &'a str,
    /// Refuse anything that is not a fast-forward.
    pub fast_forward_only: bool,
    /// Create a merge commit even when fast-forward is possible.
    pub no_fast_forward: bool,
    /// Merge commit message (defaults to `Merge branch '<theirs>'`).
    pub message: Option<&'a str>,
    /// Abort token.
    pub abort: AbortSignal,
}

/// What a merge did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// The resulting commit (the fast-forward target, or the new merge
    /// commit). `None` when already up to date.
    pub oid: Option<Oid>,
    /// The merge was a fast-forward.
    pub fast_forward: bool,
    /// Nothing to do.
    pub already_up_to_date: bool,
}

/// Merge `theirs` into the current branch.
pub fn merge(
    repo: &Repository,
    params: &MergeParams<'_>,
    callbacks: &mut Callbacks,
) -> Result<MergeReport> {
    let caller = "grit.merge";
    merge_inner(repo, params, callbacks).map_err(|e| e.with_caller(caller))
}

fn merge_inner(
    repo: &Repository,
    params: &MergeParams<'_>,
    callbacks: &mut Callbacks,
) -> Result<MergeReport> {
    let ours = refs::resolve(repo, "HEAD")?;
    let theirs = refs::resolve(repo, params.theirs)?;
    let config = repo.config();
    let ff_config = config.get("merge.ff").map(ToOwned::to_owned);
    let ff_only = params.fast_forward_only || ff_config.as_deref() == Some("only");
    let no_ff = params.no_fast_forward || ff_config.as_deref() == Some("false");

    match analyze(repo, ours, theirs)? {
        MergeAnalysis::UpToDate => Ok(MergeReport {
            oid: Some(ours),
            already_up_to_date: true,
            ..MergeReport::default()
        }),
        MergeAnalysis::FastForward if !no_ff => {
            apply_tree_transition(repo, ours, theirs, &params.abort)?;
            refs::update(
                repo,
                "HEAD",
                theirs,
                &UpdateOptions {
                    message: &format!("merge {}: Fast-forward", params.theirs),
                    ..UpdateOptions::default()
                },
            )?;
            Ok(MergeReport {
                oid: Some(theirs),
                fast_forward: true,
                ..MergeReport::default()
            })
        }
        MergeAnalysis::Diverged { .. } if ff_only => {
            Err(Error::new(ErrorKind::FastForward))
        }
        analysis => {
            // A true merge (or a forced merge commit over a
            // fast-forward).
            let base = match analysis {
                MergeAnalysis::Diverged { base } => base,
                MergeAnalysis::FastForward => Some(ours),
                MergeAnalysis::UpToDate => unreachable!("handled above"),
            };
            three_way(repo, params, ours, theirs, base, callbacks)
        }
    }
}

fn three_way(
    repo: &Repository,
    params: &MergeParams<'_>,
    ours: Oid,
    theirs: Oid,
    base: Option<Oid>,
    callbacks: &mut Callbacks,
) -> Result<MergeReport> {
    params.abort.check()?;
    let base_tree = match base {
        Some(base) => repo.read_commit(&base)?.tree,
        // Unrelated histories merge against the empty tree.
        None => repo.build_tree(&[])?,
    };
    let ours_tree = repo.read_commit(&ours)?.tree;
    let theirs_tree = repo.read_commit(&theirs)?.tree;

    let ours_label = refs::current_branch(repo)?
        .and_then(|b| b.strip_prefix("refs/heads/").map(ToOwned::to_owned))
        .unwrap_or_else(|| "HEAD".to_owned());
    let outcome = merge_trees(
        repo,
        base_tree,
        ours_tree,
        theirs_tree,
        &ours_label,
        params.theirs,
        repo.config().conflict_style(),
        callbacks,
    )?;

    let message = params
        .message
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("Merge branch '{}'\n", params.theirs));

    if !outcome.is_clean() {
        // Record the in-progress merge: MERGE_HEAD, MERGE_MSG, conflict
        // stages, and marker files.
        repo.backend()
            .write_state_file("MERGE_HEAD", format!("{theirs}\n").as_bytes())?;
        repo.backend()
            .write_state_file("MERGE_MSG", message.as_bytes())?;
        let mut index = (*repo.index()?).clone();
        let mut paths = Vec::new();
        for (path, mode, oid) in &outcome.entries {
            // Cleanly merged paths still land in the working tree.
            let changed = index.get(path, 0).is_none_or(|e| e.oid != *oid);
            if changed && repo.has_workdir() {
                let content = repo.read_blob(oid)?;
                let content = crate::filters::smudge(repo, path, &content)?;
                repo.backend().write_workdir_file(
                    path,
                    &content,
                    *mode == FileMode::Executable,
                )?;
            }
            let stat = repo.backend().stat_workdir(path)?.unwrap_or_default();
            index.insert(path, *oid, mode.as_u32(), stat);
        }
        for conflict in &outcome.conflicts {
            paths.push(conflict.path.clone());
            index.stage_conflict(
                &conflict.path,
                conflict.base,
                conflict.ours,
                conflict.theirs,
            );
            // Materialize markers (or our side for binary conflicts).
            let content = match &conflict.markers {
                Some(markers) => Some(markers.clone()),
                None => match conflict.ours {
                    Some((oid, _)) => Some(repo.read_blob(&oid)?),
                    None => None,
                },
            };
            if let Some(content) = content {
                repo.backend()
                    .write_workdir_file(&conflict.path, &content, false)?;
            }
        }
        repo.write_index(&index)?;
        return Err(Error::new(ErrorKind::MergeConflict { paths }));
    }

    // Clean: write the merged tree, commit with both parents, update the
    // working tree.
    let tree = repo.build_tree(&outcome.entries)?;
    let author = repo.signature(None, None)?;
    let commit = Commit {
        tree,
        parents: vec![ours, theirs],
        author: author.clone(),
        committer: author,
        gpgsig: None,
        extra_headers: Vec::new(),
        message,
    };
    let merge_oid = repo.write_parsed(&Object::Commit(commit))?;
    apply_tree_transition(repo, ours, merge_oid, &params.abort)?;
    refs::update(
        repo,
        "HEAD",
        merge_oid,
        &UpdateOptions {
            message: &format!("merge {}: Merge made", params.theirs),
            ..UpdateOptions::default()
        },
    )?;
    let _ = repo.hooks().run(repo.backend(), "post-merge", &["0"], b"");
    Ok(MergeReport {
        oid: Some(merge_oid),
        ..MergeReport::default()
    })
}

/// Move the working tree and index from `from` commit to `to` commit.
fn apply_tree_transition(
    repo: &Repository,
    from: Oid,
    to: Oid,
    abort: &AbortSignal,
) -> Result<()> {
    if !repo.has_workdir() {
        return Ok(());
    }
    let from_tree = repo.read_commit(&from)?.tree;
    let to_tree = repo.read_commit(&to)?.tree;
    let options = crate::checkout::CheckoutOptions {
        force: false,
        abort: abort.clone(),
    };
    let plan = crate::checkout::plan(repo, Some(from_tree), to_tree, &options)?;
    crate::checkout::execute(repo, &plan, &options)?;
    Ok(())
}
