//! Configuration schema for jobcache
//!
//! Configuration is stored at `~/.config/jobcache/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Remote store settings
    pub store: StoreConfig,

    /// Cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,

    /// Record a summary of every cache run
    pub history: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
            history: true,
        }
    }
}

/// Remote store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store backend ("filesystem")
    pub backend: String,

    /// Root directory for the filesystem backend
    pub root: Option<PathBuf>,

    /// Bucket holding all job caches
    pub bucket: String,

    /// Maximum objects returned per listing page
    pub page_size: usize,

    /// Storage class attached to uploaded objects
    pub storage_class: Option<String>,

    /// Request server-side encryption for uploaded objects
    pub server_side_encryption: bool,

    /// User metadata attached to uploaded objects
    pub user_metadata: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "filesystem".to_string(),
            root: None,
            bucket: "jobcache".to_string(),
            page_size: 1000,
            storage_class: None,
            server_side_encryption: false,
            user_metadata: BTreeMap::new(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum total remote size per job in megabytes (0 = unlimited)
    pub max_size_mb: u64,

    /// In-flight transfer count at which a directory walk waits to drain
    pub transfer_threshold: usize,

    /// Maximum transfers executing at the same time
    pub max_concurrent_transfers: usize,

    /// Digest policy for dependency descriptors: "raw" or "text"
    pub digest: String,

    /// Declared caches
    pub definitions: Vec<DefinitionConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 0,
            transfer_threshold: 20,
            max_concurrent_transfers: 8,
            digest: "raw".to_string(),
            definitions: vec![],
        }
    }
}

/// A single declared cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionConfig {
    /// Workspace-relative path to cache
    pub path: String,

    /// Comma-separated include globs (empty = everything)
    #[serde(default)]
    pub includes: String,

    /// Comma-separated exclude globs
    #[serde(default)]
    pub excludes: String,

    /// Storage format: "directory", "zip" or "tar"
    #[serde(default = "default_format")]
    pub format: String,

    /// Workspace-relative file whose digest keys the cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_descriptor: Option<String>,

    /// Use the un-keyed path when the descriptor is missing instead of failing
    #[serde(default)]
    pub fallback_without_descriptor: bool,
}

fn default_format() -> String {
    "directory".to_string()
}
