//! Cache definitions and storage formats

use crate::config::DefinitionConfig;
use crate::error::{JobCacheError, JobCacheResult};
use crate::sync::{ArchiveKind, ArchiveSync, DirectorySync, SyncStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a cache is laid out in the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// One remote object per file
    Directory,
    /// Single ZIP archive; symlinks are followed, not preserved
    Zip,
    /// Single TAR archive; symlinks are preserved
    Tar,
}

impl StorageFormat {
    /// Select the sync strategy for this format
    pub fn strategy(&self) -> Box<dyn SyncStrategy> {
        match self {
            Self::Directory => Box::new(DirectorySync),
            Self::Zip => Box::new(ArchiveSync::new(ArchiveKind::Zip)),
            Self::Tar => Box::new(ArchiveSync::new(ArchiveKind::Tar)),
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Directory => "directory",
            Self::Zip => "zip",
            Self::Tar => "tar",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for StorageFormat {
    type Err = JobCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "directory" | "dir" => Ok(Self::Directory),
            "zip" => Ok(Self::Zip),
            "tar" => Ok(Self::Tar),
            other => Err(JobCacheError::Configuration(format!(
                "unknown storage format: {}",
                other
            ))),
        }
    }
}

/// A declared cache: which local path to persist and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDefinition {
    /// Workspace-relative path to cache
    pub path: String,
    /// Comma-separated include globs, relative to `path`
    pub includes: String,
    /// Comma-separated exclude globs, relative to `path`
    pub excludes: String,
    /// Storage format
    pub format: StorageFormat,
    /// Workspace-relative file whose content digest keys the cache
    pub dependency_descriptor: Option<String>,
    /// Fall back to the un-keyed path when the descriptor is missing
    pub fallback_without_descriptor: bool,
}

impl CacheDefinition {
    /// Create a definition caching everything under `path`
    pub fn new(path: impl Into<String>, format: StorageFormat) -> Self {
        Self {
            path: path.into(),
            includes: String::new(),
            excludes: String::new(),
            format,
            dependency_descriptor: None,
            fallback_without_descriptor: false,
        }
    }

    /// Set include globs
    pub fn with_includes(mut self, includes: impl Into<String>) -> Self {
        self.includes = includes.into();
        self
    }

    /// Set exclude globs
    pub fn with_excludes(mut self, excludes: impl Into<String>) -> Self {
        self.excludes = excludes.into();
        self
    }

    /// Key the cache by the digest of a dependency descriptor
    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.dependency_descriptor = Some(descriptor.into());
        self
    }

    /// Convert all configured definitions
    pub fn from_configs(configs: &[DefinitionConfig]) -> JobCacheResult<Vec<Self>> {
        configs.iter().map(Self::try_from).collect()
    }
}

impl TryFrom<&DefinitionConfig> for CacheDefinition {
    type Error = JobCacheError;

    fn try_from(config: &DefinitionConfig) -> Result<Self, Self::Error> {
        if config.path.trim().is_empty() {
            return Err(JobCacheError::Configuration(
                "cache definition has an empty path".to_string(),
            ));
        }

        Ok(Self {
            path: config.path.clone(),
            includes: config.includes.clone(),
            excludes: config.excludes.clone(),
            format: config.format.parse()?,
            dependency_descriptor: config
                .dependency_descriptor
                .clone()
                .filter(|d| !d.trim().is_empty()),
            fallback_without_descriptor: config.fallback_without_descriptor,
        })
    }
}
