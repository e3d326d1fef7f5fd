//! CLI command implementations

pub mod config;
pub mod keys;
pub mod purge;
pub mod restore;
pub mod run;
pub mod save;

pub use config::execute as config;
pub use keys::execute as keys;
pub use purge::execute as purge;
pub use restore::execute as restore;
pub use run::execute as run;
pub use save::execute as save;

use crate::cache::CacheDefinition;
use crate::cli::args::JobArgs;
use crate::config::Config;
use crate::error::{JobCacheError, JobCacheResult};
use crate::session::{CacheOutcome, CacheRecord, SaveOutcome};
use crate::ui::{self, UiContext};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Configured definitions plus any `--path` additions
///
/// A `--path` naming an already configured path is ignored.
pub(crate) fn definitions(config: &Config, args: &JobArgs) -> JobCacheResult<Vec<CacheDefinition>> {
    let mut definitions = CacheDefinition::from_configs(&config.cache.definitions)?;
    for (path, format) in &args.paths {
        if !definitions.iter().any(|d| &d.path == path) {
            definitions.push(CacheDefinition::new(path.clone(), *format));
        }
    }

    if definitions.is_empty() {
        return Err(JobCacheError::User(
            "No caches declared: add [[cache.definitions]] to the config or pass --path".to_string(),
        ));
    }
    Ok(definitions)
}

/// Token cancelled on the first Ctrl-C
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for in-flight transfers to stop");
            child.cancel();
        }
    });
    token
}

pub(crate) fn report_restored(ctx: &UiContext, records: &[CacheRecord]) {
    for record in records {
        let message = if record.format == "directory" {
            format!("Restored {} ({} files)", record.path, record.files)
        } else {
            format!("Restored {} from {} archive", record.path, record.format)
        };
        ui::step_ok_detail(ctx, &message, &record.key);
    }
}

pub(crate) fn report_saved(ctx: &UiContext, outcome: &SaveOutcome) {
    match outcome {
        SaveOutcome::Saved { caches, .. } => {
            for record in caches {
                let message = match (record.outcome, record.files) {
                    (CacheOutcome::Saved, 0) => format!("{} is up to date", record.path),
                    (_, files) => format!("Saved {} ({} uploaded)", record.path, files),
                };
                ui::step_ok_detail(ctx, &message, &record.key);
            }
        }
        SaveOutcome::Evicted {
            total_bytes,
            limit_bytes,
            deleted,
        } => {
            ui::step_warn(
                ctx,
                &format!(
                    "Removed job cache ({} objects): {} stored exceeds the {} maximum, next run starts cold",
                    deleted,
                    ui::format_bytes(*total_bytes),
                    ui::format_bytes(*limit_bytes)
                ),
            );
            if *deleted == 0 {
                ui::step_warn_hint(
                    ctx,
                    "Cache does not exist even though the maximum size was reached",
                    "Consider increasing cache.max_size_mb",
                );
            }
        }
    }
}
