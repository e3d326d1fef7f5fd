//! File-granularity sync
//!
//! Save is incremental: a file is uploaded only when no object exists for its
//! key or the local copy is strictly newer than the stored one. Restore
//! always copies everything under the key.

use crate::error::{JobCacheError, JobCacheResult};
use crate::store::listing::{dir_prefix, list_all, summaries_by_key};
use crate::sync::{SyncContext, SyncStrategy};
use crate::transfer::{TransferJob, TransferTracker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// One remote object per local file
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectorySync;

#[async_trait]
impl SyncStrategy for DirectorySync {
    async fn restore(&self, ctx: &SyncContext) -> JobCacheResult<usize> {
        ensure_base_dir(&ctx.base_dir).await?;

        let listing_prefix = dir_prefix(&ctx.prefix);
        let objects = list_all(ctx.store.as_ref(), &listing_prefix).await?;
        if objects.is_empty() {
            info!("No cached files at {}", ctx.prefix);
            return Ok(0);
        }

        let mut tracker = TransferTracker::new(ctx.store.clone(), ctx.max_in_flight);
        let mut restored = 0;

        for object in objects {
            let Some(relative) = object.key.strip_prefix(&listing_prefix) else {
                continue;
            };
            let target = local_target(&ctx.base_dir, relative)
                .ok_or_else(|| JobCacheError::transfer(&object.key, "unsafe object path"))?;

            tracker.start_download(TransferJob::download(
                object.key.clone(),
                target,
                object.size,
                Some(object.last_modified),
            ));
            restored += 1;

            if tracker.count() > ctx.threshold {
                tracker.finish_waiting(&ctx.cancel).await?;
            }
        }

        tracker.finish_waiting(&ctx.cancel).await?;
        info!(
            "Restored {} files ({} bytes) from {}",
            restored,
            tracker.stats().bytes,
            ctx.prefix
        );
        Ok(restored)
    }

    async fn save(&self, ctx: &SyncContext) -> JobCacheResult<usize> {
        if !ctx.base_dir.exists() {
            warn!("Nothing to cache at {}", ctx.base_dir.display());
            return Ok(0);
        }

        debug!("Querying store for existing objects at {}", ctx.prefix);
        let summaries = summaries_by_key(ctx.store.as_ref(), &dir_prefix(&ctx.prefix)).await?;
        let files = ctx.matcher.scan(&ctx.base_dir)?;

        let mut tracker = TransferTracker::new(ctx.store.clone(), ctx.max_in_flight);
        let mut uploaded = 0;
        let mut skipped = 0;

        for file in files {
            if !file.is_readable_file() {
                continue;
            }
            let key = ctx.object_key(&file.relative);
            let meta = fs::metadata(&file.path)
                .await
                .map_err(|e| JobCacheError::io(format!("reading {}", file.path.display()), e))?;

            let stale = match summaries.get(&key) {
                None => true,
                Some(summary) => {
                    let modified = meta.modified().map_err(|e| {
                        JobCacheError::io(format!("reading mtime of {}", file.path.display()), e)
                    })?;
                    DateTime::<Utc>::from(modified) > summary.last_modified
                }
            };

            if !stale {
                debug!("Skipping upload of {} to {}", file.relative, key);
                skipped += 1;
                continue;
            }

            tracker.start_upload(TransferJob::upload(
                file.path,
                key,
                ctx.upload.metadata_for(meta.len()),
            ));
            uploaded += 1;

            if tracker.count() > ctx.threshold {
                tracker.finish_waiting(&ctx.cancel).await?;
            }
        }

        tracker.finish_waiting(&ctx.cancel).await?;
        info!(
            "Uploaded {} files ({} bytes) to {} ({} unchanged)",
            uploaded,
            tracker.stats().bytes,
            ctx.prefix,
            skipped
        );
        Ok(uploaded)
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}

/// Create the restore target directory if needed
pub(crate) async fn ensure_base_dir(base: &Path) -> JobCacheResult<()> {
    if base.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(base)
        .await
        .map_err(|e| JobCacheError::io(format!("creating directory {}", base.display()), e))
}

/// Map a relative object path onto `base`, refusing anything that escapes it
fn local_target(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative.as_os_str().is_empty() {
        return None;
    }
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(base.join(relative))
}
