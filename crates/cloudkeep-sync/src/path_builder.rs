//! Path building and resolution.
//!
//! Converts a provider file record into a relative path under `current/`:
//! parent resolution through the catalog, name sanitization, and ` (N)`
//! conflict suffixing. The in-memory cache is a performance aid only — the
//! catalog remains the ground truth and can be re-read with
//! [`PathBuilder::refresh_cache`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use cloudkeep_core::domain::SyncRoot;
use cloudkeep_core::ports::{Catalog, RemoteFile};

use crate::SyncError;

/// Characters forbidden in filenames on common filesystems.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\0'];

/// Maximum filename length in bytes.
const MAX_NAME_BYTES: usize = 255;

/// Longest extension worth preserving when truncating.
const MAX_EXT_BYTES: usize = 10;

/// Conflict-suffix attempts before falling back to the provider id.
const MAX_CONFLICT_ATTEMPTS: u32 = 1000;

/// Items whose parent has not been seen yet are filed under this prefix
/// until a later sync observes the parent.
const PENDING_PREFIX: &str = "_pending_";

/// Per-sync-root path builder.
pub struct PathBuilder {
    sync_root: SyncRoot,
    catalog: Arc<dyn Catalog>,
    cache: HashMap<String, String>,
}

impl PathBuilder {
    /// Construct a builder with the cache bulk-loaded from the catalog.
    pub async fn new(sync_root: SyncRoot, catalog: Arc<dyn Catalog>) -> anyhow::Result<Self> {
        let mut builder = Self {
            sync_root,
            catalog,
            cache: HashMap::new(),
        };
        builder.load_cache().await?;
        Ok(builder)
    }

    async fn load_cache(&mut self) -> anyhow::Result<()> {
        for (provider_item_id, path) in self.catalog.item_paths(self.sync_root.id).await? {
            self.cache.insert(provider_item_id, path);
        }
        debug!(paths = self.cache.len(), "Path cache loaded");
        Ok(())
    }

    /// Drop and reload the cache from the catalog.
    pub async fn refresh_cache(&mut self) -> anyhow::Result<()> {
        self.cache.clear();
        self.load_cache().await
    }

    /// Build the relative path for a provider file record.
    ///
    /// `export_extension` is the extension of an exported cloud-native
    /// document; it is appended only when the provider name does not
    /// already carry it.
    pub async fn build_path(
        &mut self,
        file: &RemoteFile,
        export_extension: Option<&str>,
    ) -> Result<String, SyncError> {
        if let Some(cached) = self.cache.get(&file.id) {
            return Ok(cached.clone());
        }

        let mut name = sanitize_name(&file.name);
        if let Some(ext) = export_extension {
            if !name.ends_with(ext) {
                name.push_str(ext);
            }
        }

        // Root-level items use just the sanitized name.
        let at_root = file.parents.is_empty()
            || file
                .parents
                .contains(&self.sync_root.provider_root_id);

        let path = if at_root {
            name
        } else {
            let parent_id = &file.parents[0];
            let parent_path = self.resolve_parent_path(parent_id).await?;
            format!("{parent_path}/{name}")
        };

        let path = self.resolve_conflicts(path, &file.id).await?;
        self.cache.insert(file.id.clone(), path.clone());
        Ok(path)
    }

    async fn resolve_parent_path(&mut self, parent_id: &str) -> Result<String, SyncError> {
        if let Some(path) = self.cache.get(parent_id) {
            return Ok(path.clone());
        }

        match self
            .catalog
            .find_item(self.sync_root.id, parent_id)
            .await
            .map_err(SyncError::Other)?
        {
            Some(parent) => {
                self.cache.insert(parent_id.to_string(), parent.path.clone());
                Ok(parent.path)
            }
            None => {
                // Parent not synced yet; a later sync relocates the child
                // once the parent is learned.
                warn!(parent_id, "Parent not found, using pending placeholder");
                Ok(format!("{PENDING_PREFIX}/{parent_id}"))
            }
        }
    }

    /// Append ` (N)` before the extension until the path is unique within
    /// the sync root, capped at [`MAX_CONFLICT_ATTEMPTS`]; beyond the cap,
    /// fall back to suffixing the provider id.
    async fn resolve_conflicts(
        &self,
        path: String,
        file_id: &str,
    ) -> Result<String, SyncError> {
        let original = path.clone();
        let mut candidate = path;
        let mut counter: u32 = 1;

        loop {
            let taken = self
                .catalog
                .find_item_by_path(self.sync_root.id, &candidate)
                .await
                .map_err(SyncError::Other)?
                .is_some_and(|item| item.provider_item_id != file_id);

            if !taken {
                return Ok(candidate);
            }

            if counter > MAX_CONFLICT_ATTEMPTS {
                error!(path = original, "Too many path conflicts");
                return Ok(format!("{original}_{file_id}"));
            }

            candidate = match split_extension(&original) {
                Some((base, ext)) => format!("{base} ({counter}).{ext}"),
                None => format!("{original} ({counter})"),
            };
            counter += 1;
        }
    }
}

/// `(base, ext)` when the final path component has an extension.
fn split_extension(path: &str) -> Option<(&str, &str)> {
    let (base, ext) = path.rsplit_once('.')?;
    // A slash after the last dot means the dot belongs to a directory name.
    if ext.contains('/') {
        return None;
    }
    Some((base, ext))
}

/// Remove invalid filesystem characters and bound the length.
fn sanitize_name(name: &str) -> String {
    let mut name: String = name
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect();

    name = name
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string();

    if name.is_empty() {
        name = "unnamed".to_string();
    }

    if name.len() > MAX_NAME_BYTES {
        match name.rsplit_once('.') {
            Some((base, ext)) if !ext.is_empty() && ext.len() <= MAX_EXT_BYTES => {
                let max_base = MAX_NAME_BYTES - ext.len() - 1;
                name = format!("{}.{ext}", truncate_at_char_boundary(base, max_base));
            }
            _ => name = truncate_at_char_boundary(&name, MAX_NAME_BYTES).to_string(),
        }
    }

    name
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
