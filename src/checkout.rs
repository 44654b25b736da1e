//! Checkout: plan, then execute.
//!
//! The planner walks (HEAD tree, stage, working tree, target tree) and
//! classifies every path: create, update, delete, keep, or refuse. A
//! dirty path blocks the transition unless `force` is set. Sparse
//! patterns filter the target before any decision is made, so nothing
//! outside the pattern set is ever materialized; tracked paths that fall
//! outside the patterns leave the working tree but stay in the index
//! with `skip-worktree`.
//!
//! Execution applies deletions first, then writes, then rewrites the
//! index in one shot. If a write fails partway, the index is still
//! rewritten to cover exactly the paths whose files were touched, so
//! index and working tree stay mutually consistent for recovery.

use grit_odb::{FileMode, Oid};

use grit_store::Backend as _;
use crate::callbacks::AbortSignal;
use crate::errors::{Error, ErrorKind, Result};
use crate::filters;
use crate::repo::Repository;
use crate::sparse::SparseSpec;
use crate::walk::{TreeSource, WalkItem, walk};

/// Options for a checkout transition.
#[derive(Debug, Default)]
pub struct CheckoutOptions {
    /// Overwrite local modifications instead of refusing.
    pub force: bool,
    /// Abort token, checked per path.
    pub abort: AbortSignal,
}

/// One planned filesystem action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanStep {
    /// Remove a tracked file.
    Delete {
        /// Path to remove.
        path: String,
    },
    /// Write (create or overwrite) a file from a blob.
    Write {
        /// Path to write.
        path: String,
        /// Mode from the target tree.
        mode: FileMode,
        /// Blob to materialize.
        oid: Oid,
    },
    /// Keep the working-tree copy, update only the index entry.
    Index {
        /// Path whose index entry follows the target.
        path: String,
        /// Mode from the target tree.
        mode: FileMode,
        /// Blob recorded in the index.
        oid: Oid,
        /// Entry leaves the working tree (sparse filtering).
        skip_worktree: bool,
    },
}

/// A computed checkout plan.
#[derive(Debug, Default)]
pub struct CheckoutPlan {
    /// Ordered steps (deletes sort before writes at execution).
    pub steps: Vec<PlanStep>,
    /// Paths whose local modifications block the transition.
    pub conflicts: Vec<String>,
}

impl CheckoutPlan {
    /// Whether the plan can execute.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

const HEAD_SLOT: usize = 0;
const STAGE_SLOT: usize = 1;
const WORKDIR_SLOT: usize = 2;
const TARGET_SLOT: usize = 3;

/// Build the plan to move the working tree from `from_tree` (usually the
/// HEAD tree) to `target_tree`.
pub fn plan(
    repo: &Repository,
    from_tree: Option<Oid>,
    target_tree: Oid,
    options: &CheckoutOptions,
) -> Result<CheckoutPlan> {
    let sparse = SparseSpec::load(repo)?;
    let head_source = from_tree.map_or(
        // An unborn HEAD has no tree; an empty tree gives every target
        // path the "create" shape.
        TreeSource::Tree(repo.build_tree(&[])?),
        TreeSource::Tree,
    );
    let items = walk(
        repo,
        &[
            head_source,
            TreeSource::Stage,
            TreeSource::Workdir,
            TreeSource::Tree(target_tree),
        ],
    )?;

    let mut plan = CheckoutPlan::default();
    for item in &items {
        options.abort.check()?;
        classify(repo, item, sparse.as_ref(), options, &mut plan)?;
    }
    Ok(plan)
}

fn classify(
    repo: &Repository,
    item: &WalkItem,
    sparse: Option<&SparseSpec>,
    options: &CheckoutOptions,
    plan: &mut CheckoutPlan,
) -> Result<()> {
    let path = item.path.as_str();
    let head = item.entry(HEAD_SLOT);
    let stage = item.entry(STAGE_SLOT);
    let workdir = item.entry(WORKDIR_SLOT);
    let target = item.entry(TARGET_SLOT);

    let in_sparse = sparse.is_none_or(|s| s.included(path));

    // Workdir dirtiness is judged against the stage when present, else
    // the HEAD tree.
    let reference = stage.or(head);
    let dirty = match (workdir, reference) {
        (Some(w), Some(r)) => {
            w.oid(repo)? != r.oid(repo)? || modes_differ(repo, w.mode(), r.mode())
        }
        (Some(_), None) => true, // Untracked file in the way.
        (None, _) => false,
    };

    match (head.is_some() || stage.is_some(), target) {
        // Target has the path.
        (_, Some(target_entry)) => {
            let target_oid = target_entry.oid(repo)?;
            let target_mode = FileMode::from_u32(target_entry.mode()).unwrap_or(FileMode::Regular);
            if !in_sparse {
                // Outside the sparse cone: never materialize; tracked
                // entries keep an index record with skip-worktree.
                if workdir.is_some() {
                    plan.steps.push(PlanStep::Delete {
                        path: path.to_owned(),
                    });
                }
                plan.steps.push(PlanStep::Index {
                    path: path.to_owned(),
                    mode: target_mode,
                    oid: target_oid,
                    skip_worktree: true,
                });
                return Ok(());
            }
            // The transition does not touch this path at all: local
            // state (modifications included) is preserved untouched.
            let head_matches_target = head
                .map(|h| {
                    Ok::<_, Error>(
                        h.oid(repo)? == target_oid
                            && !modes_differ(repo, h.mode(), target_entry.mode()),
                    )
                })
                .transpose()?
                .unwrap_or(false);
            if head_matches_target && workdir.is_some() {
                return Ok(());
            }
            let unchanged_in_place = workdir
                .map(|w| {
                    Ok::<_, Error>(
                        w.oid(repo)? == target_oid && !modes_differ(repo, w.mode(), target_entry.mode()),
                    )
                })
                .transpose()?
                .unwrap_or(false);
            if unchanged_in_place {
                // Working tree already matches the target: record only.
                plan.steps.push(PlanStep::Index {
                    path: path.to_owned(),
                    mode: target_mode,
                    oid: target_oid,
                    skip_worktree: false,
                });
                return Ok(());
            }
            if dirty && !options.force {
                plan.conflicts.push(path.to_owned());
                return Ok(());
            }
            plan.steps.push(PlanStep::Write {
                path: path.to_owned(),
                mode: target_mode,
                oid: target_oid,
            });
        }
        // Target lacks the path; it was tracked.
        (true, None) => {
            if dirty && !options.force {
                plan.conflicts.push(path.to_owned());
                return Ok(());
            }
            if workdir.is_some() {
                plan.steps.push(PlanStep::Delete {
                    path: path.to_owned(),
                });
            }
        }
        // Untracked and absent from target: leave it alone.
        (false, None) => {}
    }
    Ok(())
}

/// Mode comparison that honors `core.filemode` (exec-bit flips are
/// ignored when the filesystem cannot represent them).
fn modes_differ(repo: &Repository, a: u32, b: u32) -> bool {
    let (a, b) = (a & 0o170_777, b & 0o170_777);
    if repo.config().filemode() {
        FileMode::from_u32(a) != FileMode::from_u32(b)
    } else {
        (a & 0o170_000) != (b & 0o170_000)
    }
}

/// Execute a plan: deletions, then writes, then the index, in that
/// order. Returns the index mutations applied.
pub fn execute(repo: &Repository, plan: &CheckoutPlan, options: &CheckoutOptions) -> Result<()> {
    if !plan.is_clean() {
        return Err(Error::new(ErrorKind::MergeConflict {
            paths: plan.conflicts.clone(),
        }));
    }
    let mut index = (*repo.index()?).clone();
    let mut failure: Option<Error> = None;

    for step in &plan.steps {
        if let PlanStep::Delete { path } = step {
            if let Err(e) = abort_or(&options.abort)
                .and_then(|()| repo.backend().delete_workdir_file(path).map_err(Error::from))
            {
                failure = Some(e);
                break;
            }
            index.remove(path);
        }
    }
    if failure.is_none() {
        for step in &plan.steps {
            match step {
                PlanStep::Write { path, mode, oid } => {
                    let result = abort_or(&options.abort)
                        .and_then(|()| write_file(repo, path, *mode, oid));
                    match result {
                        Ok(()) => {
                            let stat = repo.backend().stat_workdir(path)?.unwrap_or_default();
                            index.insert(path, *oid, mode.as_u32(), stat);
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                PlanStep::Index {
                    path,
                    mode,
                    oid,
                    skip_worktree,
                } => {
                    let stat = if *skip_worktree {
                        grit_store::FileStat::default()
                    } else {
                        repo.backend().stat_workdir(path)?.unwrap_or_default()
                    };
                    index.remove(path);
                    index.insert(path, *oid, mode.as_u32(), stat);
                    if *skip_worktree {
                        index.mark_skip_worktree(path, true);
                    }
                }
                PlanStep::Delete { .. } => {}
            }
        }
    }

    // The index always reflects exactly what reached the working tree,
    // even on a partial failure.
    repo.write_index(&index)?;
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn abort_or(abort: &AbortSignal) -> Result<()> {
    abort.check()
}

fn write_file(repo: &Repository, path: &str, mode: FileMode, oid: &Oid) -> Result<()> {
    let content = repo.read_blob(oid)?;
    let content = filters::smudge(repo, path, &content)?;
    match mode {
        FileMode::Symlink => {
            let target = String::from_utf8_lossy(&content).into_owned();
            if repo.config().symlinks() {
                repo.backend().write_workdir_symlink(path, &target)?;
            } else {
                repo.backend().write_workdir_file(path, target.as_bytes(), false)?;
            }
        }
        FileMode::Gitlink => {
            // Submodule working trees are their own repositories; record
            // only the index entry.
        }
        _ => {
            repo.backend().write_workdir_file(
                path,
                &content,
                mode == FileMode::Executable && repo.config().filemode(),
            )?;
        }
    }
    Ok(())
}
