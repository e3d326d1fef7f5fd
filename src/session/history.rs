//! Run history
//!
//! Appends one JSON line per cache run to `history.jsonl` in the state directory.
//! Failures to write are logged and never fail the run.

use crate::config::{schema::Config, ConfigManager};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// What happened to one cache during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    Restored,
    Saved,
    Evicted,
    Failed,
}

/// One cache's entry in a run record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub path: String,
    pub format: String,
    pub key: String,
    pub outcome: CacheOutcome,
    pub files: usize,
}

/// Summary of one restore, save or guarded run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub job: String,
    pub caches: Vec<CacheRecord>,
    pub evicted: bool,
    pub total_bytes: u64,
}

impl RunRecord {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            job: job.into(),
            caches: Vec::new(),
            evicted: false,
            total_bytes: 0,
        }
    }
}

/// Append-only JSON lines file of run records
pub struct RunHistory {
    enabled: bool,
    path: PathBuf,
}

impl RunHistory {
    /// History writer configured from `config`
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.history,
            path: ConfigManager::history_path(),
        }
    }

    /// History writer at an explicit path
    pub fn at(path: PathBuf) -> Self {
        Self {
            enabled: true,
            path,
        }
    }

    /// History writer that records nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub async fn record(&self, run: &RunRecord) {
        if !self.enabled {
            return;
        }

        let mut line = match serde_json::to_string(run) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize run record: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write run history {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
