//! Whole-tree archive sync
//!
//! The cache is stored as a single `archive.zip` or `archive.tar` object.
//! Once the object exists for a key it is never rewritten; a different key
//! (new dependency digest) is how the cache gets refreshed.

use crate::cache::MatchedFile;
use crate::error::{JobCacheError, JobCacheResult};
use crate::store::listing::list_all;
use crate::sync::directory::ensure_base_dir;
use crate::sync::{SyncContext, SyncStrategy};
use crate::transfer::{TransferJob, TransferTracker};
use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Archive container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
}

impl ArchiveKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Tar => "tar",
        }
    }

    fn object_name(&self) -> String {
        format!("archive.{}", self.extension())
    }
}

/// One remote archive object per cache key
#[derive(Debug, Clone)]
pub struct ArchiveSync {
    kind: ArchiveKind,
    temp_dir: Option<PathBuf>,
}

impl ArchiveSync {
    pub fn new(kind: ArchiveKind) -> Self {
        Self {
            kind,
            temp_dir: None,
        }
    }

    /// Stage archives in `dir` instead of the system temp directory
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    async fn exists(&self, ctx: &SyncContext, key: &str) -> JobCacheResult<bool> {
        let objects = list_all(ctx.store.as_ref(), key).await?;
        Ok(objects.iter().any(|o| o.key == key))
    }

    fn temp_path(&self) -> JobCacheResult<TempPath> {
        let suffix = format!(".{}", self.kind.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("jobcache-").suffix(&suffix);
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        file.map(|f| f.into_temp_path())
            .map_err(|e| JobCacheError::io("creating temporary archive", e))
    }
}

#[async_trait]
impl SyncStrategy for ArchiveSync {
    async fn restore(&self, ctx: &SyncContext) -> JobCacheResult<usize> {
        ensure_base_dir(&ctx.base_dir).await?;

        let key = ctx.object_key(&self.kind.object_name());
        if !self.exists(ctx, &key).await? {
            info!("No cached archive at {}", key);
            return Ok(0);
        }

        let temp = self.temp_path()?;
        let result = download_and_extract(self.kind, ctx, &key, &temp).await;
        remove_temp(temp);
        result?;

        info!("Restored archive {} into {}", key, ctx.base_dir.display());
        Ok(0)
    }

    async fn save(&self, ctx: &SyncContext) -> JobCacheResult<usize> {
        if !ctx.base_dir.exists() {
            warn!("Nothing to cache at {}", ctx.base_dir.display());
            return Ok(0);
        }

        let key = ctx.object_key(&self.kind.object_name());
        if self.exists(ctx, &key).await? {
            info!("Skipping save, archive already exists at {}", key);
            return Ok(0);
        }

        let files = ctx.matcher.scan(&ctx.base_dir)?;
        let temp = self.temp_path()?;
        let result = build_and_upload(self.kind, ctx, &key, files, &temp).await;
        remove_temp(temp);
        result?;

        info!("Uploaded archive {}", key);
        Ok(1)
    }

    fn name(&self) -> &'static str {
        self.kind.extension()
    }
}

async fn build_and_upload(
    kind: ArchiveKind,
    ctx: &SyncContext,
    key: &str,
    files: Vec<MatchedFile>,
    archive: &Path,
) -> JobCacheResult<()> {
    let target = archive.to_path_buf();
    let entries = files.len();
    let size = tokio::task::spawn_blocking(move || build_archive(kind, &files, &target))
        .await
        .map_err(|e| JobCacheError::Internal(format!("archive task failed: {}", e)))??;
    debug!(entries, size, "Built {} archive for {}", kind.extension(), key);

    let mut tracker = TransferTracker::new(ctx.store.clone(), ctx.max_in_flight);
    tracker.start_upload(TransferJob::upload(
        archive.to_path_buf(),
        key.to_string(),
        ctx.upload.metadata_for(size),
    ));
    tracker.finish_waiting(&ctx.cancel).await?;
    Ok(())
}

async fn download_and_extract(
    kind: ArchiveKind,
    ctx: &SyncContext,
    key: &str,
    archive: &Path,
) -> JobCacheResult<()> {
    let mut tracker = TransferTracker::new(ctx.store.clone(), ctx.max_in_flight);
    tracker.start_download(TransferJob::download(
        key.to_string(),
        archive.to_path_buf(),
        0,
        None,
    ));
    tracker.finish_waiting(&ctx.cancel).await?;

    let source = archive.to_path_buf();
    let dest = ctx.base_dir.clone();
    tokio::task::spawn_blocking(move || extract_archive(kind, &source, &dest))
        .await
        .map_err(|e| JobCacheError::Internal(format!("archive task failed: {}", e)))?
}

fn remove_temp(temp: TempPath) {
    let path = temp.to_path_buf();
    if let Err(e) = temp.close() {
        warn!("Failed to delete temporary archive {}: {}", path.display(), e);
    }
}

/// Write `files` into a fresh archive at `out`; returns the archive size
fn build_archive(kind: ArchiveKind, files: &[MatchedFile], out: &Path) -> JobCacheResult<u64> {
    let archive_err = |e: &dyn std::fmt::Display| JobCacheError::archive(out, e.to_string());
    let file = File::create(out).map_err(|e| archive_err(&e))?;

    match kind {
        ArchiveKind::Zip => {
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::FileOptions::<()>::default()
                .compression_method(zip::CompressionMethod::Deflated);
            for entry in files.iter().filter(|f| f.is_readable_file()) {
                zip.start_file(entry.relative.as_str(), options)
                    .map_err(|e| archive_err(&e))?;
                let mut source = File::open(&entry.path).map_err(|e| archive_err(&e))?;
                io::copy(&mut source, &mut zip).map_err(|e| archive_err(&e))?;
            }
            zip.finish().map_err(|e| archive_err(&e))?;
        }
        ArchiveKind::Tar => {
            let mut builder = tar::Builder::new(file);
            builder.follow_symlinks(false);
            for entry in files {
                builder
                    .append_path_with_name(&entry.path, &entry.relative)
                    .map_err(|e| archive_err(&e))?;
            }
            builder.into_inner().map_err(|e| archive_err(&e))?;
        }
    }

    std::fs::metadata(out)
        .map(|m| m.len())
        .map_err(|e| JobCacheError::io(format!("reading {}", out.display()), e))
}

fn extract_archive(kind: ArchiveKind, archive: &Path, dest: &Path) -> JobCacheResult<()> {
    let archive_err = |e: &dyn std::fmt::Display| JobCacheError::archive(archive, e.to_string());
    let file = File::open(archive).map_err(|e| archive_err(&e))?;

    match kind {
        ArchiveKind::Zip => {
            let mut zip = zip::ZipArchive::new(file).map_err(|e| archive_err(&e))?;
            zip.extract(dest).map_err(|e| archive_err(&e))?;
        }
        ArchiveKind::Tar => {
            let mut tar = tar::Archive::new(file);
            tar.set_preserve_mtime(true);
            tar.set_overwrite(true);
            tar.unpack(dest).map_err(|e| archive_err(&e))?;
        }
    }
    Ok(())
}
