//! The command surface.
//!
//! Thin operation functions composed from the subsystem modules. Each
//! entry point normalizes its arguments, performs the work through the
//! repository handle, and stamps its name (`grit.add`, `grit.fetch`,
//! ...) onto any error it surfaces.

mod add;
mod branch;
mod bundle;
mod checkout;
mod cherry_pick;
mod clone;
mod commit;
mod fetch;
mod log;
mod ls_remote;
mod merge;
mod plumbing;
mod pull;
mod push;
mod stash;
mod status;
mod tag;
mod worktree;

pub use add::{add, remove};
pub use branch::{create_branch, delete_branch, list_branches, rename_branch};
pub use bundle::{create_bundle, unbundle};
pub use checkout::{CheckoutParams, checkout};
pub use cherry_pick::cherry_pick;
pub use clone::{CloneParams, clone};
pub use commit::{CommitParams, commit};
pub use fetch::fetch;
pub use log::log;
pub use ls_remote::ls_remote;
pub use merge::{MergeParams, MergeReport, merge};
pub use plumbing::{
    config_get, config_set, expand_oid, is_descendant, list_files, merge_base, read_blob_at,
    read_reflog, resolve_ref, update_ref, write_blob,
};
pub use pull::{PullParams, pull};
pub use push::push;
pub use stash::{stash_apply, stash_drop, stash_list, stash_pop, stash_push};
pub use status::{FileState, status, status_list};
pub use tag::{annotated_tag, delete_tag, list_tags, tag};
pub use worktree::{worktree_add, worktree_list, worktree_prune};
