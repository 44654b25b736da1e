//! Ref store and dircache behavior over the filesystem backend.

mod common;

use common::{commit_file, fs_repo};
use grit::ErrorKind;
use grit::grit_odb::Oid;
use grit::grit_store::Backend as _;
use grit::index::Index;
use grit::refs::{self, UpdateOptions};

#[test]
fn packed_refs_precedence_scenario() {
    let (_dir, repo) = fs_repo();
    let a = commit_file(&repo, "f", b"a\n", "a");
    let b = commit_file(&repo, "f", b"b\n", "b");

    // refs/heads/x loose -> A, packed -> B.
    let mut packed = std::collections::BTreeMap::new();
    packed.insert("refs/heads/x".to_owned(), b.to_hex());
    refs::write_packed_refs(&repo, &packed).unwrap();
    refs::update(&repo, "refs/heads/x", a, &UpdateOptions::default()).unwrap();

    assert_eq!(refs::resolve(&repo, "refs/heads/x").unwrap(), a);

    // Deleting the loose file exposes the packed value.
    repo.backend().delete_ref_raw("refs/heads/x").unwrap();
    assert_eq!(refs::resolve(&repo, "refs/heads/x").unwrap(), b);
}

#[test]
fn cas_failure_leaves_ref_and_reflog_untouched() {
    let (_dir, repo) = fs_repo();
    let first = commit_file(&repo, "f", b"1\n", "one");
    let second = commit_file(&repo, "f", b"2\n", "two");

    refs::update(&repo, "refs/heads/guarded", first, &UpdateOptions::default()).unwrap();
    let log_len = refs::read_reflog(&repo, "refs/heads/guarded").unwrap().len();

    let err = refs::update(
        &repo,
        "refs/heads/guarded",
        second,
        &UpdateOptions {
            expected_old: Some(Some(second)), // wrong expectation
            ..UpdateOptions::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.code(), "RefMismatch");
    assert_eq!(refs::resolve(&repo, "refs/heads/guarded").unwrap(), first);
    assert_eq!(
        refs::read_reflog(&repo, "refs/heads/guarded").unwrap().len(),
        log_len
    );

    // The matching expectation succeeds and appends exactly one entry.
    refs::update(
        &repo,
        "refs/heads/guarded",
        second,
        &UpdateOptions {
            expected_old: Some(Some(first)),
            message: "guarded advance",
            ..UpdateOptions::default()
        },
    )
    .unwrap();
    let log = refs::read_reflog(&repo, "refs/heads/guarded").unwrap();
    assert_eq!(log.len(), log_len + 1);
    assert_eq!(log.last().unwrap().new, second);
}

#[test]
fn reflog_reads_oldest_first_on_disk() {
    let (dir, repo) = fs_repo();
    commit_file(&repo, "f", b"1\n", "one");
    commit_file(&repo, "f", b"2\n", "two");
    let log = refs::read_reflog(&repo, "refs/heads/master").unwrap();
    assert_eq!(log.len(), 2);
    assert!(log[0].old.is_zero());
    assert_eq!(log[0].new, log[1].old);
    // And the file lives where native git keeps it.
    assert!(dir.path().join(".git/logs/refs/heads/master").is_file());
}

#[test]
fn index_corruption_classified() {
    let empty = Index::parse(b"", grit::grit_odb::HashKind::Sha1).unwrap_err();
    assert!(matches!(
        empty.kind(),
        ErrorKind::IndexCorrupt { detail } if detail == "empty"
    ));

    let magic = Index::parse(&[0u8; 40], grit::grit_odb::HashKind::Sha1).unwrap_err();
    assert!(matches!(
        magic.kind(),
        ErrorKind::IndexCorrupt { detail } if detail == "magic"
    ));

    let mut index = Index::default();
    index.insert(
        "f",
        Oid::from_hex(&"ab".repeat(20)).unwrap(),
        0o100_644,
        grit::grit_store::FileStat::default(),
    );
    let mut bytes = index.serialize(grit::grit_odb::HashKind::Sha1);
    let last = bytes.len() - 1;
    bytes[last] ^= 1;
    let checksum = Index::parse(&bytes, grit::grit_odb::HashKind::Sha1).unwrap_err();
    assert!(matches!(
        checksum.kind(),
        ErrorKind::IndexCorrupt { detail } if detail == "checksum"
    ));
}

#[test]
fn index_survives_fs_roundtrip_with_stat_data() {
    let (_dir, repo) = fs_repo();
    commit_file(&repo, "dir/f.txt", b"content\n", "c");
    let index = repo.index().unwrap();
    let entry = index.get("dir/f.txt", 0).unwrap();
    // Real stat data was captured from disk.
    assert!(entry.stat.mtime > 0);
    assert!(entry.stat.size > 0);

    // Rewrite and re-read through the backend.
    repo.write_index(&index).unwrap();
    let again = repo.index().unwrap();
    assert_eq!(again.entries(), index.entries());
}

#[test]
fn head_symbolic_and_detached_shapes() {
    let (_dir, repo) = fs_repo();
    let head = commit_file(&repo, "f", b"x\n", "c");
    assert_eq!(
        refs::current_branch(&repo).unwrap().as_deref(),
        Some("refs/heads/master")
    );
    // Detach.
    repo.backend()
        .write_ref_raw("HEAD", &head.to_hex(), None)
        .unwrap();
    assert_eq!(refs::current_branch(&repo).unwrap(), None);
    assert_eq!(refs::resolve(&repo, "HEAD").unwrap(), head);
}
