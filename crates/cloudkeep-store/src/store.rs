//! Per-account content-addressed store.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use cloudkeep_core::domain::{AccountId, Digest, ProviderKind};
use sha2::{Digest as _, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{digest_from_hasher, reader::VerifyingReader, StoreError};

/// Read/write buffer size for streaming blob I/O.
const CHUNK_SIZE: usize = 65536;

/// Summary counters for one account's on-disk store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub blob_count: u64,
    pub total_size_bytes: u64,
    pub current_file_count: u64,
}

/// Content-addressed storage for a single account.
///
/// A blob's on-disk path is a pure function of its digest
/// (`blobs/sha256/<aa>/<bb>/<full hex>`), so there is exactly one canonical
/// location per digest. Concurrent writers of the same digest are safe: both
/// stream into unique temp files, the rename is atomic, one wins and the
/// other discards its temp file.
#[derive(Debug, Clone)]
pub struct AccountStore {
    root: PathBuf,
    current_dir: PathBuf,
    blobs_dir: PathBuf,
    tmp_dir: PathBuf,
    archive_dir: PathBuf,
}

impl AccountStore {
    pub fn new(backup_root: &Path, provider: ProviderKind, account_id: AccountId) -> Self {
        let root = backup_root
            .join(provider.as_str())
            .join(account_id.to_string());
        Self {
            current_dir: root.join("current"),
            blobs_dir: root.join("blobs"),
            tmp_dir: root.join("tmp"),
            archive_dir: root.join("archive"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the account directory structure if it doesn't exist.
    pub fn ensure_directories(&self) -> Result<(), StoreError> {
        for dir in [
            &self.current_dir,
            &self.blobs_dir,
            &self.tmp_dir,
            &self.archive_dir,
        ] {
            fs::create_dir_all(dir).map_err(StoreError::io(dir))?;
        }
        Ok(())
    }

    /// Canonical sharded path for a digest:
    /// `blobs/sha256/<aa>/<bb>/<full hex>`.
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.hex();
        self.blobs_dir
            .join("sha256")
            .join(&hex[..2])
            .join(&hex[2..4])
            .join(hex)
    }

    pub fn blob_exists(&self, digest: &Digest) -> bool {
        self.blob_path(digest).exists()
    }

    /// Write content to blob storage atomically and return its digest.
    ///
    /// If `expected` is given and the content hashes differently, the write
    /// fails with [`StoreError::DigestMismatch`] and nothing is committed.
    /// Writing a digest that already exists is a dedup hit: the temp file is
    /// discarded and the existing blob is left untouched.
    pub fn write_blob(
        &self,
        data: &[u8],
        expected: Option<&Digest>,
    ) -> Result<Digest, StoreError> {
        let mut cursor = data;
        let (digest, _) = self.write_blob_from_reader(&mut cursor, expected)?;
        Ok(digest)
    }

    /// Streaming variant of [`AccountStore::write_blob`]; returns the digest
    /// and the number of bytes written.
    pub fn write_blob_from_reader(
        &self,
        reader: &mut dyn Read,
        expected: Option<&Digest>,
    ) -> Result<(Digest, u64), StoreError> {
        self.ensure_directories()?;

        let tmp_path = self.tmp_dir.join(format!("{}.tmp", Uuid::new_v4().simple()));
        let result = self.write_tmp_then_commit(&tmp_path, reader, expected);
        if result.is_err() && tmp_path.exists() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    fn write_tmp_then_commit(
        &self,
        tmp_path: &Path,
        reader: &mut dyn Read,
        expected: Option<&Digest>,
    ) -> Result<(Digest, u64), StoreError> {
        let mut file = File::create(tmp_path).map_err(StoreError::io(tmp_path))?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut buf = [0u8; CHUNK_SIZE];

        loop {
            let n = reader.read(&mut buf).map_err(StoreError::io(tmp_path))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).map_err(StoreError::io(tmp_path))?;
            size += n as u64;
        }
        file.sync_all().map_err(StoreError::io(tmp_path))?;
        drop(file);

        let digest = digest_from_hasher(hasher);
        if let Some(expected) = expected {
            if digest != *expected {
                return Err(StoreError::DigestMismatch {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }

        let blob_path = self.blob_path(&digest);
        if blob_path.exists() {
            // Dedup hit; the canonical copy already holds these bytes.
            fs::remove_file(tmp_path).map_err(StoreError::io(tmp_path))?;
            debug!(digest = digest.short(), "Blob already stored");
        } else {
            let parent = blob_path.parent().expect("sharded path has parents");
            fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
            fs::rename(tmp_path, &blob_path).map_err(StoreError::io(&blob_path))?;
            fs::set_permissions(&blob_path, fs::Permissions::from_mode(0o444))
                .map_err(StoreError::io(&blob_path))?;
            debug!(digest = digest.short(), size, "Blob stored");
        }

        Ok((digest, size))
    }

    /// Open a blob for reading with digest verification at EOF.
    pub fn read_blob(&self, digest: &Digest) -> Result<VerifyingReader<File>, StoreError> {
        Ok(VerifyingReader::new(
            self.open_blob(digest)?,
            digest.clone(),
        ))
    }

    /// Open a blob without verification.
    pub fn read_blob_unverified(&self, digest: &Digest) -> Result<File, StoreError> {
        self.open_blob(digest)
    }

    /// Read a whole blob into memory, verifying its digest.
    pub fn read_blob_bytes(&self, digest: &Digest) -> Result<Vec<u8>, StoreError> {
        let mut reader = self.read_blob(digest)?;
        let mut data = Vec::new();
        match reader.read_to_end(&mut data) {
            Ok(_) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                Err(StoreError::DigestMismatch {
                    expected: digest.clone(),
                    actual: crate::compute_digest(&data),
                })
            }
            Err(err) => Err(StoreError::Io {
                path: self.blob_path(digest),
                source: err,
            }),
        }
    }

    fn open_blob(&self, digest: &Digest) -> Result<File, StoreError> {
        let path = self.blob_path(digest);
        if !path.exists() {
            return Err(StoreError::BlobNotFound(digest.clone()));
        }
        File::open(&path).map_err(StoreError::io(path))
    }

    /// Delete a blob. Returns whether it existed. Empty shard directories
    /// are removed up to (but not including) `blobs/`.
    pub fn delete_blob(&self, digest: &Digest) -> Result<bool, StoreError> {
        let path = self.blob_path(digest);
        if !path.exists() {
            return Ok(false);
        }
        // Clear the read-only bit before unlinking.
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))
            .map_err(StoreError::io(&path))?;
        fs::remove_file(&path).map_err(StoreError::io(&path))?;
        if let Some(parent) = path.parent() {
            cleanup_empty_dirs(parent, &self.blobs_dir);
        }
        debug!(digest = digest.short(), "Blob deleted");
        Ok(true)
    }

    /// Absolute path of a relative path inside `current/`.
    pub fn current_path(&self, relative_path: &str) -> PathBuf {
        self.current_dir.join(relative_path)
    }

    /// Absolute path of a relative path inside `archive/`.
    pub fn archive_path(&self, relative_path: &str) -> PathBuf {
        self.archive_dir.join(relative_path)
    }

    /// Create a directory (and parents) inside `current/`.
    pub fn create_current_dir(&self, relative_path: &str) -> Result<PathBuf, StoreError> {
        let path = self.current_path(relative_path);
        fs::create_dir_all(&path).map_err(StoreError::io(&path))?;
        Ok(path)
    }

    /// Copy or hardlink a blob into the `current/` tree.
    ///
    /// Parents are created, any existing file at the target is replaced, and
    /// a failed hardlink (e.g. cross-filesystem) falls back to a copy.
    /// Repeating the call for the same digest and path is safe.
    pub fn materialize_to_current(
        &self,
        digest: &Digest,
        relative_path: &str,
        use_hardlink: bool,
    ) -> Result<PathBuf, StoreError> {
        let blob_path = self.blob_path(digest);
        if !blob_path.exists() {
            return Err(StoreError::BlobNotFound(digest.clone()));
        }

        let target = self.current_path(relative_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
        }
        if target.exists() {
            fs::remove_file(&target).map_err(StoreError::io(&target))?;
        }

        if use_hardlink {
            if let Err(err) = fs::hard_link(&blob_path, &target) {
                warn!(
                    path = relative_path,
                    %err,
                    "Hardlink failed, falling back to copy"
                );
                fs::copy(&blob_path, &target).map_err(StoreError::io(&target))?;
            }
        } else {
            fs::copy(&blob_path, &target).map_err(StoreError::io(&target))?;
        }

        Ok(target)
    }

    /// Unlink a file from `current/`. Returns whether it existed.
    pub fn remove_from_current(&self, relative_path: &str) -> Result<bool, StoreError> {
        let target = self.current_path(relative_path);
        if !target.exists() {
            return Ok(false);
        }
        fs::remove_file(&target).map_err(StoreError::io(&target))?;
        if let Some(parent) = target.parent() {
            cleanup_empty_dirs(parent, &self.current_dir);
        }
        Ok(true)
    }

    /// Move a file from `current/` to `archive/`, preserving its relative
    /// structure. Returns the archive path, or `None` if the source was
    /// absent. An existing file at the archive target is replaced.
    pub fn move_to_archive(&self, relative_path: &str) -> Result<Option<PathBuf>, StoreError> {
        move_between(
            &self.current_dir,
            &self.archive_dir,
            relative_path,
        )
    }

    /// Move a file from `archive/` back to `current/`.
    pub fn restore_from_archive(
        &self,
        relative_path: &str,
    ) -> Result<Option<PathBuf>, StoreError> {
        move_between(
            &self.archive_dir,
            &self.current_dir,
            relative_path,
        )
    }

    /// Unlink a file from `archive/`. Returns whether it existed.
    pub fn remove_from_archive(&self, relative_path: &str) -> Result<bool, StoreError> {
        let target = self.archive_path(relative_path);
        if !target.exists() {
            return Ok(false);
        }
        fs::remove_file(&target).map_err(StoreError::io(&target))?;
        if let Some(parent) = target.parent() {
            cleanup_empty_dirs(parent, &self.archive_dir);
        }
        Ok(true)
    }

    /// Walk the store and count blobs, blob bytes, and current-tree files.
    pub fn storage_stats(&self) -> Result<StorageStats, StoreError> {
        let mut stats = StorageStats::default();
        if self.blobs_dir.exists() {
            walk_files(&self.blobs_dir, &mut |meta| {
                stats.blob_count += 1;
                stats.total_size_bytes += meta.len();
            })?;
        }
        if self.current_dir.exists() {
            walk_files(&self.current_dir, &mut |_| {
                stats.current_file_count += 1;
            })?;
        }
        Ok(stats)
    }
}

/// Rename `from_root/rel` to `to_root/rel`, creating target parents and
/// pruning emptied source parents.
fn move_between(
    from_root: &Path,
    to_root: &Path,
    relative_path: &str,
) -> Result<Option<PathBuf>, StoreError> {
    let source = from_root.join(relative_path);
    if !source.exists() {
        return Ok(None);
    }

    let target = to_root.join(relative_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
    }
    if target.exists() {
        fs::remove_file(&target).map_err(StoreError::io(&target))?;
    }
    fs::rename(&source, &target).map_err(StoreError::io(&target))?;
    if let Some(parent) = source.parent() {
        cleanup_empty_dirs(parent, from_root);
    }
    Ok(Some(target))
}

/// Remove empty directories from `path` upward, stopping at `stop_at`.
fn cleanup_empty_dirs(path: &Path, stop_at: &Path) {
    let mut current = path.to_path_buf();
    while current != stop_at && current.exists() {
        // rmdir fails on non-empty directories, which ends the walk.
        if fs::remove_dir(&current).is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

fn walk_files(
    dir: &Path,
    visit: &mut dyn FnMut(&fs::Metadata),
) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir).map_err(StoreError::io(dir))? {
        let entry = entry.map_err(StoreError::io(dir))?;
        let meta = entry.metadata().map_err(StoreError::io(entry.path()))?;
        if meta.is_dir() {
            walk_files(&entry.path(), visit)?;
        } else if meta.is_file() {
            visit(&meta);
        }
    }
    Ok(())
}
