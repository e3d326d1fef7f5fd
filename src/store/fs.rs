//! Filesystem-backed object store
//!
//! Objects live at `<root>/<bucket>/<key>`. Listing is lexicographic by key
//! and paginated; the last key of a page is the continuation marker. Puts
//! are staged in `<root>/.staging`, outside every bucket, and persisted into
//! place so a partially written object is never listed.

use crate::error::{JobCacheError, JobCacheResult};
use crate::store::{ListPage, ObjectMetadata, ObjectSummary, RemoteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Default number of objects per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Directory under the store root holding in-progress uploads
pub const STAGING_DIR: &str = ".staging";

/// Object store kept in a local directory
#[derive(Debug, Clone)]
pub struct FsStore {
    bucket_dir: PathBuf,
    staging_dir: PathBuf,
    bucket: String,
    page_size: usize,
}

impl FsStore {
    /// Create a store for `bucket` under `root`
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let root = root.into();
        Self {
            bucket_dir: root.join(&bucket),
            staging_dir: root.join(STAGING_DIR),
            bucket,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the listing page size (minimum 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Directory holding this bucket's objects
    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn object_path(&self, key: &str) -> JobCacheResult<PathBuf> {
        let mut path = self.bucket_dir.clone();
        let mut any = false;
        for segment in key.split('/') {
            match segment {
                "" => continue,
                "." | ".." => {
                    return Err(JobCacheError::InvalidKey {
                        key: key.to_string(),
                        reason: "relative segments are not allowed".to_string(),
                    })
                }
                s => {
                    path.push(s);
                    any = true;
                }
            }
        }
        if !any {
            return Err(JobCacheError::InvalidKey {
                key: key.to_string(),
                reason: "key is empty".to_string(),
            });
        }
        Ok(path)
    }

    /// Deepest directory that can hold keys starting with `prefix`
    fn walk_root(bucket_dir: &Path, prefix: &str) -> PathBuf {
        let mut root = bucket_dir.to_path_buf();
        let Some((dirs, _)) = prefix.rsplit_once('/') else {
            return root;
        };
        for segment in dirs.split('/') {
            match segment {
                "" => continue,
                "." | ".." => return bucket_dir.to_path_buf(),
                s => root.push(s),
            }
        }
        root
    }

    fn scan_objects(
        bucket_dir: &Path,
        prefix: &str,
        marker: Option<&str>,
        page_size: usize,
    ) -> JobCacheResult<ListPage> {
        let walk_root = Self::walk_root(bucket_dir, prefix);
        if !walk_root.is_dir() {
            return Ok(ListPage::default());
        }

        let mut keys: Vec<(String, PathBuf)> = Vec::new();
        for entry in WalkDir::new(&walk_root).follow_links(false).min_depth(1) {
            let entry = entry.map_err(|e| JobCacheError::transfer(prefix, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = crate::cache::matcher::relative_slash_path(bucket_dir, entry.path())
            else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            if marker.is_some_and(|m| key.as_str() <= m) {
                continue;
            }
            keys.push((key, entry.into_path()));
        }
        keys.sort();

        let has_more = keys.len() > page_size;
        keys.truncate(page_size);

        let mut objects = Vec::with_capacity(keys.len());
        for (key, path) in keys {
            let meta = std::fs::metadata(&path).map_err(|e| JobCacheError::transfer(&key, e))?;
            let modified = meta.modified().map_err(|e| JobCacheError::transfer(&key, e))?;
            objects.push(ObjectSummary {
                key,
                last_modified: DateTime::<Utc>::from(modified),
                size: meta.len(),
            });
        }

        let next_marker = if has_more {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_marker,
        })
    }
}

#[async_trait]
impl RemoteStore for FsStore {
    async fn list(&self, prefix: &str, marker: Option<&str>) -> JobCacheResult<ListPage> {
        let bucket_dir = self.bucket_dir.clone();
        let prefix = prefix.to_string();
        let marker = marker.map(str::to_string);
        let page_size = self.page_size;

        tokio::task::spawn_blocking(move || {
            Self::scan_objects(&bucket_dir, &prefix, marker.as_deref(), page_size)
        })
        .await
        .map_err(|e| JobCacheError::Internal(format!("listing task failed: {}", e)))?
    }

    async fn put(&self, key: &str, local: &Path, metadata: &ObjectMetadata) -> JobCacheResult<()> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| JobCacheError::transfer(key, e))?;
        }

        fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| JobCacheError::transfer(key, e))?;

        let staging_dir = self.staging_dir.clone();
        let local = local.to_path_buf();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut staged = NamedTempFile::new_in(&staging_dir)?;
            let mut source = std::fs::File::open(&local)?;
            std::io::copy(&mut source, staged.as_file_mut())?;
            staged.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| JobCacheError::Internal(format!("upload task failed: {}", e)))?
        .map_err(|e| JobCacheError::transfer(key, e))?;

        debug!(
            key,
            size = metadata.size,
            storage_class = metadata.storage_class.as_deref().unwrap_or("default"),
            "Stored object"
        );
        Ok(())
    }

    async fn get(&self, key: &str, local: &Path) -> JobCacheResult<()> {
        let source = self.object_path(key)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| JobCacheError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::copy(&source, local)
            .await
            .map_err(|e| JobCacheError::transfer(key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str, recursive: bool) -> JobCacheResult<()> {
        let path = self.object_path(key)?;
        let meta = match fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(JobCacheError::transfer(key, e)),
        };

        let result = if meta.is_dir() {
            if !recursive {
                return Err(JobCacheError::transfer(
                    key,
                    "key has children; use a recursive delete",
                ));
            }
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|e| JobCacheError::transfer(key, e))?;

        debug!(key, recursive, "Deleted object");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} (bucket {})", self.bucket_dir.display(), self.bucket)
    }
}
