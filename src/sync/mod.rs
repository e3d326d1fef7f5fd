//! Sync strategies
//!
//! A strategy moves one cache between the local workspace and the remote
//! store. The storage format picks the strategy once, at configuration time:
//!
//! - [`DirectorySync`]: one object per file, incremental uploads
//! - [`ArchiveSync`]: the whole tree as a single ZIP or TAR object

mod archive;
mod directory;

pub use archive::{ArchiveKind, ArchiveSync};
pub use directory::DirectorySync;

use crate::cache::PathMatcher;
use crate::error::JobCacheResult;
use crate::store::{RemoteStore, UploadOptions};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default number of in-flight transfers before a walk waits to drain
pub const DEFAULT_TRANSFER_THRESHOLD: usize = 20;

/// Everything a strategy needs for one restore or save call
#[derive(Clone)]
pub struct SyncContext {
    /// Remote store
    pub store: Arc<dyn RemoteStore>,
    /// Resolved cache key prefix, without trailing slash
    pub prefix: String,
    /// Local directory the cache is restored into and saved from
    pub base_dir: PathBuf,
    /// File selection for saves
    pub matcher: PathMatcher,
    /// Metadata options for uploads
    pub upload: UploadOptions,
    /// Drain the tracker when this many jobs are outstanding
    pub threshold: usize,
    /// Maximum transfers executing at once
    pub max_in_flight: usize,
    /// Cooperative cancellation
    pub cancel: CancellationToken,
}

impl SyncContext {
    /// Context with default tuning for `store`, `prefix` and `base_dir`
    pub fn new(store: Arc<dyn RemoteStore>, prefix: impl Into<String>, base_dir: PathBuf) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            base_dir,
            matcher: PathMatcher::all(),
            upload: UploadOptions::default(),
            threshold: DEFAULT_TRANSFER_THRESHOLD,
            max_in_flight: DEFAULT_TRANSFER_THRESHOLD,
            cancel: CancellationToken::new(),
        }
    }

    /// Object key for a `/`-separated path below the prefix
    pub fn object_key(&self, relative: &str) -> String {
        format!("{}/{}", self.prefix.trim_end_matches('/'), relative)
    }
}

/// Moves one cache between the workspace and the remote store
#[async_trait]
pub trait SyncStrategy: Send + Sync {
    /// Copy the stored cache into `ctx.base_dir`; returns files restored
    async fn restore(&self, ctx: &SyncContext) -> JobCacheResult<usize>;

    /// Copy matching local files to the store; returns objects uploaded
    async fn save(&self, ctx: &SyncContext) -> JobCacheResult<usize>;

    /// Strategy name for status output
    fn name(&self) -> &'static str;
}
