//! Working-tree scenarios on the filesystem backend: the add/commit
//! round trip, autocrlf staging, checkout transitions, sparse filtering.

mod common;

use common::{commit_file, fs_repo};
use grit::callbacks::Callbacks;
use grit::grit_odb::FileMode;
use grit::grit_store::Backend as _;
use grit::ops::{self, CheckoutParams, CommitParams};
use grit::refs;
use grit::walk::{TreeSource, walk};

#[test]
fn init_add_commit_scenario() {
    let (_dir, repo) = fs_repo();
    repo.backend().write_workdir_file("a.txt", b"hi", false).unwrap();
    ops::add(&repo, &["a.txt"]).unwrap();
    let oid = ops::commit(
        &repo,
        &CommitParams {
            message: "c1",
            ..CommitParams::default()
        },
        &mut Callbacks::new(),
    )
    .unwrap();

    assert_eq!(refs::resolve(&repo, "HEAD").unwrap(), oid);
    let commit = repo.read_commit(&oid).unwrap();
    let tree = repo.read_tree(&commit.tree).unwrap();
    assert_eq!(tree.entries.len(), 1);
    assert_eq!(tree.entries[0].name.to_string(), "a.txt");
    assert_eq!(tree.entries[0].mode, FileMode::Regular);
    assert_eq!(repo.read_blob(&tree.entries[0].oid).unwrap(), b"hi");
}

#[test]
fn autocrlf_staging_produces_pinned_oids() {
    let (_dir, repo) = fs_repo();
    repo.update_config(|c| c.set("core.autocrlf", "true")).unwrap();
    repo.backend()
        .write_workdir_file("a.txt", b"Hello\r\nagain", false)
        .unwrap();

    let items = walk(&repo, &[TreeSource::Workdir]).unwrap();
    let entry = items
        .iter()
        .find(|i| i.path == "a.txt")
        .and_then(|i| i.entry(0))
        .unwrap();
    assert_eq!(
        entry.oid(&repo).unwrap().to_hex(),
        "e855bd8b67cc7ee321e4dec1b9e5b17e13aec8e1"
    );
    assert_eq!(entry.content(&repo).unwrap(), b"Hello\nagain");

    repo.update_config(|c| c.set("core.autocrlf", "false")).unwrap();
    let items = walk(&repo, &[TreeSource::Workdir]).unwrap();
    let entry = items
        .iter()
        .find(|i| i.path == "a.txt")
        .and_then(|i| i.entry(0))
        .unwrap();
    assert_eq!(
        entry.oid(&repo).unwrap().to_hex(),
        "8d4f7af538be6af26291dc33eb1fde39b558dbea"
    );
    assert_eq!(entry.content(&repo).unwrap(), b"Hello\r\nagain");
}

#[test]
fn checkout_moves_files_and_head_reflog() {
    let (dir, repo) = fs_repo();
    commit_file(&repo, "f.txt", b"first\n", "first");
    ops::create_branch(&repo, "side", None).unwrap();
    commit_file(&repo, "f.txt", b"second\n", "second");

    ops::checkout(
        &repo,
        &CheckoutParams {
            rev: "side",
            ..CheckoutParams::default()
        },
    )
    .unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("f.txt")).unwrap(),
        b"first\n"
    );
    let log = refs::read_reflog(&repo, "HEAD").unwrap();
    assert!(
        log.iter().any(|e| e.message.contains("checkout: moving")),
        "HEAD reflog records the checkout"
    );
}

#[test]
fn dirty_checkout_blocked_then_forced() {
    let (dir, repo) = fs_repo();
    commit_file(&repo, "f.txt", b"v1\n", "v1");
    ops::create_branch(&repo, "other", None).unwrap();
    commit_file(&repo, "f.txt", b"v2\n", "v2");
    std::fs::write(dir.path().join("f.txt"), b"local edits\n").unwrap();

    let err = ops::checkout(
        &repo,
        &CheckoutParams {
            rev: "other",
            ..CheckoutParams::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.code(), "MergeConflict");
    // Local edits intact after refusal.
    assert_eq!(
        std::fs::read(dir.path().join("f.txt")).unwrap(),
        b"local edits\n"
    );

    ops::checkout(
        &repo,
        &CheckoutParams {
            rev: "other",
            force: true,
            ..CheckoutParams::default()
        },
    )
    .unwrap();
    assert_eq!(std::fs::read(dir.path().join("f.txt")).unwrap(), b"v1\n");
}

#[test]
fn sparse_checkout_keeps_outside_paths_unmaterialized() {
    let (dir, repo) = fs_repo();
    commit_file(&repo, "kept/in.txt", b"in\n", "seed in");
    commit_file(&repo, "dropped/out.txt", b"out\n", "seed out");
    let head = refs::resolve(&repo, "HEAD").unwrap();

    repo.update_config(|c| {
        c.set("core.sparsecheckout", "true")?;
        c.set("core.sparsecheckoutcone", "true")
    })
    .unwrap();
    repo.backend()
        .write_state_file("info/sparse-checkout", b"/*\n!/*/\n/kept/\n")
        .unwrap();

    // Re-checkout HEAD under the sparse rules.
    ops::checkout(
        &repo,
        &CheckoutParams {
            rev: &head.to_hex(),
            force: true,
            ..CheckoutParams::default()
        },
    )
    .unwrap();

    assert!(dir.path().join("kept/in.txt").is_file());
    // Correctness requirement: nothing outside the patterns on disk.
    assert!(!dir.path().join("dropped/out.txt").exists());
    // Still tracked, flagged skip-worktree.
    let index = repo.index().unwrap();
    assert!(index.get("dropped/out.txt", 0).unwrap().skip_worktree);
}

#[test]
fn status_distinguishes_workdir_and_stage() {
    let (dir, repo) = fs_repo();
    commit_file(&repo, "f.txt", b"committed\n", "base");
    std::fs::write(dir.path().join("f.txt"), b"edited\n").unwrap();
    assert_eq!(
        ops::status(&repo, "f.txt").unwrap(),
        ops::FileState::ModifiedUnstaged
    );
    ops::add(&repo, &["f.txt"]).unwrap();
    assert_eq!(ops::status(&repo, "f.txt").unwrap(), ops::FileState::Modified);
    std::fs::write(dir.path().join("untracked.txt"), b"?\n").unwrap();
    assert_eq!(
        ops::status(&repo, "untracked.txt").unwrap(),
        ops::FileState::Untracked
    );
}

#[test]
fn touched_mtime_without_content_change_stays_unmodified() {
    let (dir, repo) = fs_repo();
    commit_file(&repo, "f.txt", b"stable\n", "base");
    // Bump mtime only; the stat shortcut misses, the oid comparison
    // must still classify the file as unmodified.
    let path = dir.path().join("f.txt");
    filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(2_000_000_000, 0))
        .unwrap();
    assert_eq!(
        ops::status(&repo, "f.txt").unwrap(),
        ops::FileState::Unmodified
    );
}

#[test]
fn executable_bit_round_trips_through_commit() {
    let (_dir, repo) = fs_repo();
    repo.backend()
        .write_workdir_file("run.sh", b"#!/bin/sh\n", true)
        .unwrap();
    ops::add(&repo, &["run.sh"]).unwrap();
    let oid = ops::commit(
        &repo,
        &CommitParams {
            message: "exec",
            ..CommitParams::default()
        },
        &mut Callbacks::new(),
    )
    .unwrap();
    let tree = repo.read_commit(&oid).unwrap().tree;
    let (mode, _) = repo.tree_lookup(&tree, "run.sh").unwrap().unwrap();
    assert_eq!(mode, FileMode::Executable);
}
