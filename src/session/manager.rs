//! Cache lifecycle for one job run
//!
//! A run resolves every cache key once ([`CacheManager::prepare`]), restores
//! the caches before the workload and afterwards either saves them or, when
//! the stored total has outgrown the configured cap, wipes them so the next
//! run starts cold.

use crate::cache::{digest_policy, CacheDefinition, CacheKey, KeyResolver, PathMatcher};
use crate::config::Config;
use crate::error::{JobCacheError, JobCacheResult};
use crate::session::history::{CacheOutcome, CacheRecord, RunHistory, RunRecord};
use crate::session::locks::KeyLocks;
use crate::store::listing::{dir_prefix, list_all, total_size};
use crate::store::{create_store, RemoteStore, UploadOptions};
use crate::sync::{SyncContext, SyncStrategy, DEFAULT_TRANSFER_THRESHOLD};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Tuning shared by every cache of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Cap on the stored total in megabytes, 0 for unlimited
    pub max_size_mb: u64,
    /// Outstanding transfers at which a walk drains the tracker
    pub transfer_threshold: usize,
    /// Transfers executing at once
    pub max_concurrent_transfers: usize,
    /// Options attached to every upload
    pub upload: UploadOptions,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size_mb: 0,
            transfer_threshold: DEFAULT_TRANSFER_THRESHOLD,
            max_concurrent_transfers: 8,
            upload: UploadOptions::default(),
        }
    }
}

impl CacheSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_size_mb: config.cache.max_size_mb,
            transfer_threshold: config.cache.transfer_threshold.max(1),
            max_concurrent_transfers: config.cache.max_concurrent_transfers.max(1),
            upload: UploadOptions {
                server_side_encryption: config.store.server_side_encryption,
                storage_class: config.store.storage_class.clone(),
                user_metadata: config.store.user_metadata.clone(),
            },
        }
    }

    /// Size cap in bytes, `None` when unlimited
    pub fn limit_bytes(&self) -> Option<u64> {
        (self.max_size_mb > 0).then(|| self.max_size_mb.saturating_mul(BYTES_PER_MB))
    }
}

/// One definition with its key resolved for this run
pub struct PreparedCache {
    pub definition: CacheDefinition,
    pub key: CacheKey,
    pub base_dir: PathBuf,
    matcher: PathMatcher,
    strategy: Box<dyn SyncStrategy>,
}

impl PreparedCache {
    pub fn format_name(&self) -> &'static str {
        self.strategy.name()
    }

    fn record(&self, outcome: CacheOutcome, files: usize) -> CacheRecord {
        CacheRecord {
            path: self.definition.path.clone(),
            format: self.format_name().to_string(),
            key: self.key.as_prefix(),
            outcome,
            files,
        }
    }
}

/// All caches of one job run
pub struct PreparedJob {
    pub job: String,
    pub root: CacheKey,
    pub caches: Vec<PreparedCache>,
}

impl PreparedJob {
    fn key_strings(&self) -> Vec<String> {
        self.caches.iter().map(|c| c.key.as_prefix()).collect()
    }
}

/// Result of the post-workload step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Every cache was offered to its strategy
    Saved {
        caches: Vec<CacheRecord>,
        total_bytes: u64,
    },
    /// The job's stored total exceeded the cap and its namespace was deleted
    Evicted {
        total_bytes: u64,
        limit_bytes: u64,
        /// Objects removed
        deleted: usize,
    },
}

/// Stored state of one resolved key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStatus {
    pub path: String,
    pub format: &'static str,
    pub key: String,
    pub objects: usize,
    pub bytes: u64,
}

/// Outcome of a guarded workload
///
/// `saved` is `None` when the save was skipped after cancellation, or when
/// it failed after the workload had already failed.
#[derive(Debug)]
pub struct GuardedRun<T> {
    pub outcome: JobCacheResult<T>,
    pub restored: Vec<CacheRecord>,
    pub saved: Option<SaveOutcome>,
}

/// Drives restore, eviction and save against one remote store
pub struct CacheManager {
    store: Arc<dyn RemoteStore>,
    resolver: KeyResolver,
    locks: Arc<KeyLocks>,
    history: RunHistory,
    settings: CacheSettings,
}

impl CacheManager {
    pub fn new(store: Arc<dyn RemoteStore>, resolver: KeyResolver, settings: CacheSettings) -> Self {
        Self {
            store,
            resolver,
            locks: Arc::new(KeyLocks::new()),
            history: RunHistory::disabled(),
            settings,
        }
    }

    /// Build the store, resolver and history described by `config`
    pub fn from_config(config: &Config) -> JobCacheResult<Self> {
        let store = create_store(&config.store)?;
        let resolver = KeyResolver::new(digest_policy(&config.cache.digest)?);
        debug!(
            "Using {} with {} descriptor digests",
            store.describe(),
            resolver.policy_name()
        );
        Ok(Self::new(store, resolver, CacheSettings::from_config(config))
            .with_history(RunHistory::new(config)))
    }

    /// Share a lock registry with other managers in this process
    pub fn with_locks(mut self, locks: Arc<KeyLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_history(mut self, history: RunHistory) -> Self {
        self.history = history;
        self
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Resolve every definition's key for `job`
    ///
    /// Keys are computed once here and reused by restore and save, so a
    /// descriptor edited by the workload does not move the save target.
    pub fn prepare(
        &self,
        job: &str,
        workspace: &Path,
        definitions: &[CacheDefinition],
    ) -> JobCacheResult<PreparedJob> {
        let root = CacheKey::for_job(job)?;
        let mut caches = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let key = self.resolver.resolve(&root, definition, workspace)?;
            let matcher = PathMatcher::new(&definition.includes, &definition.excludes)?;
            debug!("Cache {} resolved to {}", definition.path, key);
            caches.push(PreparedCache {
                definition: definition.clone(),
                base_dir: workspace.join(&definition.path),
                key,
                matcher,
                strategy: definition.format.strategy(),
            });
        }

        Ok(PreparedJob {
            job: job.to_string(),
            root,
            caches,
        })
    }

    /// Restore every cache into the workspace
    pub async fn restore(
        &self,
        prepared: &PreparedJob,
        cancel: &CancellationToken,
    ) -> JobCacheResult<Vec<CacheRecord>> {
        let mut run = RunRecord::new(&prepared.job);
        let result = self.restore_all(prepared, cancel, &mut run).await;
        self.history.record(&run).await;
        result
    }

    /// Evict or save every cache after the workload
    pub async fn save(
        &self,
        prepared: &PreparedJob,
        cancel: &CancellationToken,
    ) -> JobCacheResult<SaveOutcome> {
        let mut run = RunRecord::new(&prepared.job);
        let result = self.save_all(prepared, cancel, &mut run).await;
        self.history.record(&run).await;
        result
    }

    /// Restore, run `workload`, then save whatever the workload left behind
    ///
    /// The save is attempted even when the workload fails, and the workload
    /// result is handed back in [`GuardedRun::outcome`] next to what was
    /// restored and saved. A restore error, or a save error after a
    /// successful workload, is returned directly. A save error after a failed
    /// workload is logged.
    pub async fn run_guarded<F, T>(
        &self,
        job: &str,
        workspace: &Path,
        definitions: &[CacheDefinition],
        cancel: &CancellationToken,
        workload: F,
    ) -> JobCacheResult<GuardedRun<T>>
    where
        F: Future<Output = JobCacheResult<T>>,
    {
        let prepared = self.prepare(job, workspace, definitions)?;
        let mut run = RunRecord::new(job);

        let restored = match self.restore_all(&prepared, cancel, &mut run).await {
            Ok(restored) => restored,
            Err(e) => {
                self.history.record(&run).await;
                return Err(e);
            }
        };

        let outcome = workload.await;

        if cancel.is_cancelled() {
            warn!("Run for {} was cancelled, skipping cache save", job);
            self.history.record(&run).await;
            let outcome = match outcome {
                Err(e) => Err(e),
                Ok(_) => Err(JobCacheError::Interrupted),
            };
            return Ok(GuardedRun {
                outcome,
                restored,
                saved: None,
            });
        }

        let saved = self.save_all(&prepared, cancel, &mut run).await;
        self.history.record(&run).await;

        let saved = match (&outcome, saved) {
            (_, Ok(saved)) => Some(saved),
            (Ok(_), Err(save_err)) => return Err(save_err),
            (Err(_), Err(save_err)) => {
                error!("Cache save after failed workload also failed: {}", save_err);
                None
            }
        };
        Ok(GuardedRun {
            outcome,
            restored,
            saved,
        })
    }

    /// Delete everything stored for `job`, including stale digest keys
    pub async fn purge_job(&self, job: &str) -> JobCacheResult<u64> {
        let root = CacheKey::for_job(job)?;
        let prefix = root.as_prefix();
        let guard = self.locks.lock(&prefix).await;

        let objects = list_all(self.store.as_ref(), &dir_prefix(&prefix)).await?;
        let bytes: u64 = objects.iter().map(|o| o.size).sum();
        self.store.delete(&prefix, true).await?;

        drop(guard);
        self.locks.remove_job(&prefix);
        info!("Purged {} objects ({} bytes) for {}", objects.len(), bytes, job);
        Ok(bytes)
    }

    /// Stored bytes under the job root, stale digest keys included
    pub async fn job_total(&self, prepared: &PreparedJob) -> JobCacheResult<u64> {
        total_size(self.store.as_ref(), &dir_prefix(&prepared.root.as_prefix())).await
    }

    /// Stored object count and size for every resolved key
    pub async fn key_status(&self, prepared: &PreparedJob) -> JobCacheResult<Vec<KeyStatus>> {
        let mut status = Vec::with_capacity(prepared.caches.len());
        for cache in &prepared.caches {
            let prefix = cache.key.as_prefix();
            let objects = list_all(self.store.as_ref(), &dir_prefix(&prefix)).await?;
            status.push(KeyStatus {
                path: cache.definition.path.clone(),
                format: cache.format_name(),
                key: prefix,
                objects: objects.len(),
                bytes: objects.iter().map(|o| o.size).sum(),
            });
        }
        Ok(status)
    }

    /// Lock the job root and every resolved key
    ///
    /// The root lock is what purge and eviction hold while deleting the
    /// whole namespace.
    async fn lock_keys(&self, prepared: &PreparedJob) -> Vec<OwnedMutexGuard<()>> {
        let keys = std::iter::once(prepared.root.as_prefix()).chain(prepared.key_strings());
        self.locks.lock_all(keys).await
    }

    fn context(&self, cache: &PreparedCache, cancel: &CancellationToken) -> SyncContext {
        SyncContext {
            store: self.store.clone(),
            prefix: cache.key.as_prefix(),
            base_dir: cache.base_dir.clone(),
            matcher: cache.matcher.clone(),
            upload: self.settings.upload.clone(),
            threshold: self.settings.transfer_threshold,
            max_in_flight: self.settings.max_concurrent_transfers,
            cancel: cancel.clone(),
        }
    }

    async fn restore_all(
        &self,
        prepared: &PreparedJob,
        cancel: &CancellationToken,
        run: &mut RunRecord,
    ) -> JobCacheResult<Vec<CacheRecord>> {
        let _guards = self.lock_keys(prepared).await;
        let mut restored = Vec::with_capacity(prepared.caches.len());

        for cache in &prepared.caches {
            info!("Restoring {} from {}", cache.definition.path, cache.key);
            match cache.strategy.restore(&self.context(cache, cancel)).await {
                Ok(files) => {
                    let record = cache.record(CacheOutcome::Restored, files);
                    run.caches.push(record.clone());
                    restored.push(record);
                }
                Err(e) => {
                    run.caches.push(cache.record(CacheOutcome::Failed, 0));
                    return Err(e);
                }
            }
        }
        Ok(restored)
    }

    async fn save_all(
        &self,
        prepared: &PreparedJob,
        cancel: &CancellationToken,
        run: &mut RunRecord,
    ) -> JobCacheResult<SaveOutcome> {
        let _guards = self.lock_keys(prepared).await;

        let total_bytes = self.job_total(prepared).await?;
        run.total_bytes = total_bytes;
        debug!("Stored total for {} is {} bytes", prepared.job, total_bytes);

        if let Some(limit_bytes) = self.settings.limit_bytes() {
            if total_bytes > limit_bytes {
                warn!(
                    "Removing job cache as it has grown beyond the maximum of {}M",
                    self.settings.max_size_mb
                );
                let deleted = self.evict(prepared, run).await?;
                return Ok(SaveOutcome::Evicted {
                    total_bytes,
                    limit_bytes,
                    deleted,
                });
            }
        }

        let mut caches = Vec::with_capacity(prepared.caches.len());
        for cache in &prepared.caches {
            info!("Saving {} to {}", cache.definition.path, cache.key);
            match cache.strategy.save(&self.context(cache, cancel)).await {
                Ok(files) => {
                    let record = cache.record(CacheOutcome::Saved, files);
                    run.caches.push(record.clone());
                    caches.push(record);
                }
                Err(e) => {
                    run.caches.push(cache.record(CacheOutcome::Failed, 0));
                    return Err(e);
                }
            }
        }

        Ok(SaveOutcome::Saved {
            caches,
            total_bytes,
        })
    }

    /// Delete the job namespace, stale digest keys included
    ///
    /// Returns the number of objects removed.
    async fn evict(&self, prepared: &PreparedJob, run: &mut RunRecord) -> JobCacheResult<usize> {
        run.evicted = true;
        let root = prepared.root.as_prefix();
        let existing = list_all(self.store.as_ref(), &dir_prefix(&root)).await?;
        if existing.is_empty() {
            warn!("Cache does not exist even though the maximum size was reached");
            return Ok(0);
        }

        for cache in &prepared.caches {
            let key_prefix = dir_prefix(&cache.key.as_prefix());
            let objects = existing
                .iter()
                .filter(|o| o.key.starts_with(&key_prefix))
                .count();
            run.caches.push(cache.record(CacheOutcome::Evicted, objects));
        }

        self.store.delete(&root, true).await?;
        info!("Evicted {} objects under {}", existing.len(), root);
        Ok(existing.len())
    }
}
