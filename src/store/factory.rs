//! Store factory
//!
//! Builds the configured [`RemoteStore`] backend.

use crate::config::{ConfigManager, StoreConfig};
use crate::error::{JobCacheError, JobCacheResult};
use crate::store::fs::FsStore;
use crate::store::RemoteStore;
use std::sync::Arc;

/// Create the remote store described by `config`
pub fn create_store(config: &StoreConfig) -> JobCacheResult<Arc<dyn RemoteStore>> {
    if config.bucket.trim().is_empty()
        || config.bucket.starts_with('.')
        || config.bucket.contains(['/', '\\'])
    {
        return Err(JobCacheError::Configuration(format!(
            "invalid bucket name: {:?}",
            config.bucket
        )));
    }

    match config.backend.as_str() {
        "filesystem" | "fs" => {
            let root = config
                .root
                .clone()
                .unwrap_or_else(ConfigManager::default_store_root);
            Ok(Arc::new(
                FsStore::new(root, config.bucket.clone()).with_page_size(config.page_size),
            ))
        }
        other => Err(JobCacheError::Configuration(format!(
            "unsupported store backend: {}",
            other
        ))),
    }
}
