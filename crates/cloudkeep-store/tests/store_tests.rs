//! Integration tests for the content-addressed store.

use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;

use cloudkeep_core::domain::{AccountId, Digest, ProviderKind};
use cloudkeep_store::{compute_digest, AccountStore, StoreError};

fn store() -> (tempfile::TempDir, AccountStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = AccountStore::new(dir.path(), ProviderKind::GoogleDrive, AccountId(1));
    (dir, store)
}

#[test]
fn store_root_includes_provider_and_account() {
    let (dir, store) = store();
    assert_eq!(store.root(), dir.path().join("google_drive").join("1"));
}

#[test]
fn write_blob_returns_digest_and_creates_sharded_path() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"hello world\n", None).unwrap();

    assert_eq!(
        digest.as_str(),
        "sha256:a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447"
    );
    let path = store.blob_path(&digest);
    assert!(path.exists());
    assert!(path.to_string_lossy().contains("blobs/sha256/a9/48/"));
}

#[test]
fn written_blob_is_read_only() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"content", None).unwrap();
    let mode = fs::metadata(store.blob_path(&digest))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o444);
}

#[test]
fn write_blob_verifies_expected_digest() {
    let (_dir, store) = store();
    let expected = compute_digest(b"hello world\n");
    let digest = store.write_blob(b"hello world\n", Some(&expected)).unwrap();
    assert_eq!(digest, expected);
}

#[test]
fn write_blob_rejects_wrong_expected_digest() {
    let (_dir, store) = store();
    let wrong = compute_digest(b"other bytes");
    let err = store.write_blob(b"hello world\n", Some(&wrong)).unwrap_err();
    assert!(matches!(err, StoreError::DigestMismatch { .. }));
    // Nothing committed, and no temp residue.
    assert!(!store.blob_exists(&compute_digest(b"hello world\n")));
    let tmp_entries: Vec<_> = fs::read_dir(store.root().join("tmp")).unwrap().collect();
    assert!(tmp_entries.is_empty());
}

#[test]
fn duplicate_write_is_a_dedup_hit() {
    let (_dir, store) = store();
    let first = store.write_blob(b"same bytes", None).unwrap();
    let second = store.write_blob(b"same bytes", None).unwrap();
    assert_eq!(first, second);
    assert!(store.blob_exists(&first));
}

#[test]
fn empty_blob_round_trips() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"", None).unwrap();
    assert_eq!(
        digest.as_str(),
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(store.read_blob_bytes(&digest).unwrap(), b"");

    let path = store
        .materialize_to_current(&digest, "empty.txt", false)
        .unwrap();
    assert_eq!(fs::read(path).unwrap(), b"");

    assert!(store.move_to_archive("empty.txt").unwrap().is_some());
    assert!(store.restore_from_archive("empty.txt").unwrap().is_some());
    assert_eq!(fs::read(store.current_path("empty.txt")).unwrap(), b"");
}

#[test]
fn read_blob_verifies_on_full_consumption() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"verified content", None).unwrap();
    let mut reader = store.read_blob(&digest).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"verified content");
}

#[test]
fn read_blob_detects_corruption() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"original content", None).unwrap();

    // Corrupt the canonical file behind the store's back.
    let path = store.blob_path(&digest);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    fs::write(&path, b"tampered content").unwrap();

    let err = store.read_blob_bytes(&digest).unwrap_err();
    match err {
        StoreError::DigestMismatch { expected, actual } => {
            assert_eq!(expected, digest);
            assert_eq!(actual, compute_digest(b"tampered content"));
        }
        other => panic!("expected DigestMismatch, got {other:?}"),
    }
}

#[test]
fn read_missing_blob_is_not_found() {
    let (_dir, store) = store();
    let digest = compute_digest(b"never written");
    assert!(matches!(
        store.read_blob_bytes(&digest).unwrap_err(),
        StoreError::BlobNotFound(_)
    ));
}

#[test]
fn digest_is_pure_function_of_path() {
    let (_dir, store) = store();
    let digest =
        Digest::parse("sha256:a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447")
            .unwrap();
    let a = store.blob_path(&digest);
    let b = store.blob_path(&digest);
    assert_eq!(a, b);
}

#[test]
fn delete_blob_removes_file_and_empty_shards() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"short-lived", None).unwrap();
    let shard = store.blob_path(&digest).parent().unwrap().to_path_buf();

    assert!(store.delete_blob(&digest).unwrap());
    assert!(!store.blob_exists(&digest));
    assert!(!shard.exists());
    // blobs/ itself survives.
    assert!(store.root().join("blobs").exists());

    assert!(!store.delete_blob(&digest).unwrap());
}

#[test]
fn delete_blob_keeps_shared_shard_dirs() {
    let (_dir, store) = store();
    // Two blobs that happen to share nothing still leave blobs/sha256 in
    // place while one of them remains.
    let a = store.write_blob(b"blob a", None).unwrap();
    let b = store.write_blob(b"blob b", None).unwrap();
    assert!(store.delete_blob(&a).unwrap());
    assert!(store.blob_exists(&b));
}

#[test]
fn materialize_copies_into_current_tree() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"report body", None).unwrap();
    let path = store
        .materialize_to_current(&digest, "Docs/report.pdf", false)
        .unwrap();
    assert_eq!(path, store.current_path("Docs/report.pdf"));
    assert_eq!(fs::read(&path).unwrap(), b"report body");
}

#[test]
fn materialize_replaces_existing_file() {
    let (_dir, store) = store();
    let old = store.write_blob(b"old body", None).unwrap();
    let new = store.write_blob(b"new body", None).unwrap();
    store
        .materialize_to_current(&old, "Docs/report.pdf", false)
        .unwrap();
    store
        .materialize_to_current(&new, "Docs/report.pdf", false)
        .unwrap();
    assert_eq!(
        fs::read(store.current_path("Docs/report.pdf")).unwrap(),
        b"new body"
    );
}

#[test]
fn materialize_is_repeatable() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"idempotent", None).unwrap();
    store
        .materialize_to_current(&digest, "a/b/c.txt", false)
        .unwrap();
    store
        .materialize_to_current(&digest, "a/b/c.txt", false)
        .unwrap();
    assert_eq!(fs::read(store.current_path("a/b/c.txt")).unwrap(), b"idempotent");
}

#[test]
fn materialize_hardlink_shares_inode() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"linked body", None).unwrap();
    let path = store
        .materialize_to_current(&digest, "linked.txt", true)
        .unwrap();

    use std::os::unix::fs::MetadataExt;
    let blob_ino = fs::metadata(store.blob_path(&digest)).unwrap().ino();
    assert_eq!(fs::metadata(path).unwrap().ino(), blob_ino);
}

#[test]
fn materialize_missing_blob_fails() {
    let (_dir, store) = store();
    let digest = compute_digest(b"absent");
    assert!(matches!(
        store.materialize_to_current(&digest, "x.txt", false),
        Err(StoreError::BlobNotFound(_))
    ));
}

#[test]
fn archive_round_trip_preserves_bytes() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"archived body", None).unwrap();
    store
        .materialize_to_current(&digest, "Docs/deep/file.txt", false)
        .unwrap();

    let archived = store.move_to_archive("Docs/deep/file.txt").unwrap().unwrap();
    assert_eq!(archived, store.archive_path("Docs/deep/file.txt"));
    assert!(!store.current_path("Docs/deep/file.txt").exists());
    // Emptied current/ parents are pruned.
    assert!(!store.current_path("Docs").exists());

    store.restore_from_archive("Docs/deep/file.txt").unwrap().unwrap();
    assert_eq!(
        fs::read(store.current_path("Docs/deep/file.txt")).unwrap(),
        b"archived body"
    );
    assert!(!store.archive_path("Docs").exists());
}

#[test]
fn move_to_archive_of_missing_file_is_none() {
    let (_dir, store) = store();
    store.ensure_directories().unwrap();
    assert!(store.move_to_archive("no/such/file").unwrap().is_none());
}

#[test]
fn remove_from_current_prunes_empty_parents() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"x", None).unwrap();
    store
        .materialize_to_current(&digest, "a/b/file.txt", false)
        .unwrap();

    assert!(store.remove_from_current("a/b/file.txt").unwrap());
    assert!(!store.current_path("a").exists());
    assert!(store.root().join("current").exists());
    assert!(!store.remove_from_current("a/b/file.txt").unwrap());
}

#[test]
fn remove_from_archive_for_quarantine_expiry() {
    let (_dir, store) = store();
    let digest = store.write_blob(b"doomed", None).unwrap();
    store
        .materialize_to_current(&digest, "old/file.txt", false)
        .unwrap();
    store.move_to_archive("old/file.txt").unwrap();

    assert!(store.remove_from_archive("old/file.txt").unwrap());
    assert!(!store.archive_path("old").exists());
    assert!(!store.remove_from_archive("old/file.txt").unwrap());
}

#[test]
fn storage_stats_counts_blobs_and_current_files() {
    let (_dir, store) = store();
    let a = store.write_blob(b"aaaa", None).unwrap();
    store.write_blob(b"bbbbbb", None).unwrap();
    store.materialize_to_current(&a, "a.txt", false).unwrap();

    let stats = store.storage_stats().unwrap();
    assert_eq!(stats.blob_count, 2);
    assert_eq!(stats.total_size_bytes, 10);
    assert_eq!(stats.current_file_count, 1);
}
