//! Bounded-concurrency transfer tracking
//!
//! Every upload or download runs as a tokio task in a [`JoinSet`] and holds a
//! semaphore permit while it talks to the store, so no more than
//! `max_in_flight` transfers execute at once. [`TransferTracker::finish_waiting`]
//! is the only join point: it returns once every started job is terminal, or
//! aborts the rest on the first failure or on cancellation.

use crate::error::{JobCacheError, JobCacheResult};
use crate::store::{ObjectMetadata, RemoteStore};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Download => write!(f, "download"),
        }
    }
}

/// One unit of transfer work
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Local file read (upload) or written (download)
    pub local_file: PathBuf,
    /// Remote object key
    pub remote_key: String,
    /// Metadata sent with uploads
    pub metadata: ObjectMetadata,
    /// Remote modification time to stamp on a downloaded file
    pub last_modified: Option<DateTime<Utc>>,
}

impl TransferJob {
    /// Upload job for `local_file`
    pub fn upload(local_file: PathBuf, remote_key: String, metadata: ObjectMetadata) -> Self {
        Self {
            local_file,
            remote_key,
            metadata,
            last_modified: None,
        }
    }

    /// Download job into `local_file`
    pub fn download(
        remote_key: String,
        local_file: PathBuf,
        size: u64,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            local_file,
            remote_key,
            metadata: ObjectMetadata {
                size,
                ..Default::default()
            },
            last_modified,
        }
    }
}

/// Result of a finished transfer
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub direction: Direction,
    pub key: String,
    pub bytes: u64,
}

/// Counters across the tracker's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub started: usize,
    pub completed: usize,
    pub bytes: u64,
}

/// Tracks asynchronous transfers against one store
pub struct TransferTracker {
    store: Arc<dyn RemoteStore>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<JobCacheResult<TransferOutcome>>,
    stats: TransferStats,
}

impl TransferTracker {
    /// Create a tracker allowing `max_in_flight` concurrent transfers
    pub fn new(store: Arc<dyn RemoteStore>, max_in_flight: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: JoinSet::new(),
            stats: TransferStats::default(),
        }
    }

    /// Start uploading `job.local_file` to `job.remote_key`
    pub fn start_upload(&mut self, job: TransferJob) {
        debug!(key = %job.remote_key, file = %job.local_file.display(), "Starting upload");
        self.spawn(Direction::Upload, job);
    }

    /// Start downloading `job.remote_key` into `job.local_file`
    pub fn start_download(&mut self, job: TransferJob) {
        debug!(key = %job.remote_key, file = %job.local_file.display(), "Starting download");
        self.spawn(Direction::Download, job);
    }

    fn spawn(&mut self, direction: Direction, job: TransferJob) {
        let store = Arc::clone(&self.store);
        let permits = Arc::clone(&self.permits);
        self.stats.started += 1;

        self.tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| JobCacheError::Internal("transfer pool closed".to_string()))?;

            match direction {
                Direction::Upload => {
                    store
                        .put(&job.remote_key, &job.local_file, &job.metadata)
                        .await?
                }
                Direction::Download => {
                    store.get(&job.remote_key, &job.local_file).await?;
                    if let Some(modified) = job.last_modified {
                        stamp_mtime(&job, modified);
                    }
                }
            }

            Ok(TransferOutcome {
                direction,
                key: job.remote_key,
                bytes: job.metadata.size,
            })
        });
    }

    /// Jobs started and not yet harvested by `finish_waiting`
    pub fn count(&self) -> usize {
        self.tasks.len()
    }

    /// Lifetime counters
    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// Wait until every started job has finished
    ///
    /// Returns the number of jobs harvested. The first failed job aborts the
    /// remaining ones and its error is returned. If `cancel` fires, all
    /// outstanding jobs are cancelled and `Interrupted` is returned.
    pub async fn finish_waiting(&mut self, cancel: &CancellationToken) -> JobCacheResult<usize> {
        let pending = self.tasks.len();
        if pending > 0 {
            info!("Waiting for {} transfers", pending);
        }

        let mut harvested = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Interrupted with {} transfers outstanding", self.tasks.len());
                    self.cleanup().await;
                    return Err(JobCacheError::Interrupted);
                }
                next = self.tasks.join_next() => next,
            };

            match next {
                None => break,
                Some(Ok(Ok(outcome))) => {
                    harvested += 1;
                    self.stats.completed += 1;
                    self.stats.bytes += outcome.bytes;
                    debug!(key = %outcome.key, direction = %outcome.direction, "Transfer complete");
                }
                Some(Ok(Err(e))) => {
                    self.cleanup().await;
                    return Err(e);
                }
                Some(Err(join_error)) => {
                    self.cleanup().await;
                    if join_error.is_cancelled() {
                        return Err(JobCacheError::Interrupted);
                    }
                    return Err(JobCacheError::Internal(format!(
                        "transfer task panicked: {}",
                        join_error
                    )));
                }
            }
        }

        if harvested > 0 {
            info!("{} transfers complete", harvested);
        }
        Ok(harvested)
    }

    /// Cancel every outstanding job and wait for the aborts to land
    pub async fn cleanup(&mut self) {
        let outstanding = self.tasks.len();
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        if outstanding > 0 {
            debug!("Cancelled {} outstanding transfers", outstanding);
        }
    }
}

fn stamp_mtime(job: &TransferJob, modified: DateTime<Utc>) {
    let time = filetime::FileTime::from_system_time(modified.into());
    if let Err(e) = filetime::set_file_mtime(&job.local_file, time) {
        warn!(
            "Failed to set modification time on {}: {}",
            job.local_file.display(),
            e
        );
    }
}
