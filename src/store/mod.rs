//! Remote object store abstraction
//!
//! The sync engine only needs four operations from a store: paginated
//! listing, put, get and (recursive) delete. Vendor clients implement
//! [`RemoteStore`]; [`FsStore`] keeps objects in a local directory tree.

mod factory;
pub mod fs;
pub mod listing;

pub use factory::create_store;
pub use fs::FsStore;
pub use listing::{list_all, summaries_by_key, total_size};

use crate::error::JobCacheResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

/// Summary of one remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Full object key
    pub key: String,
    /// When the object was last written
    pub last_modified: DateTime<Utc>,
    /// Object size in bytes
    pub size: u64,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects on this page
    pub objects: Vec<ObjectSummary>,
    /// Marker to pass to the next `list` call, `None` when exhausted
    pub next_marker: Option<String>,
}

/// Metadata attached to an uploaded object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Content length in bytes
    pub size: u64,
    /// Request server-side encryption
    pub server_side_encryption: bool,
    /// Storage class, if any
    pub storage_class: Option<String>,
    /// User metadata
    pub user_metadata: BTreeMap<String, String>,
}

/// Per-upload options shared by every object of a save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Request server-side encryption
    pub server_side_encryption: bool,
    /// Storage class, if any
    pub storage_class: Option<String>,
    /// User metadata
    pub user_metadata: BTreeMap<String, String>,
}

impl UploadOptions {
    /// Build the metadata for an object of `size` bytes
    pub fn metadata_for(&self, size: u64) -> ObjectMetadata {
        ObjectMetadata {
            size,
            server_side_encryption: self.server_side_encryption,
            storage_class: self.storage_class.clone(),
            user_metadata: self.user_metadata.clone(),
        }
    }
}

/// Abstract remote store interface
///
/// Implementations are bound to a single bucket. A `put` must only become
/// visible to `list`/`get` once it has completed.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List objects whose key starts with `prefix`, after `marker`
    async fn list(&self, prefix: &str, marker: Option<&str>) -> JobCacheResult<ListPage>;

    /// Upload `local` to `key`
    async fn put(&self, key: &str, local: &Path, metadata: &ObjectMetadata) -> JobCacheResult<()>;

    /// Download `key` into `local`, replacing it
    async fn get(&self, key: &str, local: &Path) -> JobCacheResult<()>;

    /// Delete `key`, or every object below it when `recursive`
    async fn delete(&self, key: &str, recursive: bool) -> JobCacheResult<()>;

    /// Human-readable location for status output
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_from_options() {
        let mut options = UploadOptions {
            server_side_encryption: true,
            storage_class: Some("REDUCED_REDUNDANCY".to_string()),
            ..Default::default()
        };
        options
            .user_metadata
            .insert("build".to_string(), "42".to_string());

        let metadata = options.metadata_for(1024);
        assert_eq!(metadata.size, 1024);
        assert!(metadata.server_side_encryption);
        assert_eq!(metadata.storage_class.as_deref(), Some("REDUCED_REDUNDANCY"));
        assert_eq!(metadata.user_metadata.get("build").map(String::as_str), Some("42"));
    }
}
