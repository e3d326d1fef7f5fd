//! Save command - upload workspace caches or evict them

use super::{cancel_on_ctrl_c, definitions, report_saved};
use crate::cli::args::JobArgs;
use crate::config::Config;
use crate::error::JobCacheResult;
use crate::session::{CacheManager, SaveOutcome};
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::Path;

/// Execute the save command
pub async fn execute(args: JobArgs, config: &Config, workspace: &Path) -> JobCacheResult<()> {
    let ctx = UiContext::detect();
    let manager = CacheManager::from_config(config)?;
    let prepared = manager.prepare(&args.job, workspace, &definitions(config, &args)?)?;
    let cancel = cancel_on_ctrl_c();

    ui::intro(&ctx, &format!("Saving caches for {}", args.job));
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Uploading to {}", manager.store().describe()));

    match manager.save(&prepared, &cancel).await {
        Ok(outcome) => {
            match &outcome {
                SaveOutcome::Saved { caches, .. } => {
                    spinner.stop(&format!("Saved {} caches", caches.len()))
                }
                SaveOutcome::Evicted { .. } => spinner.stop_warn("Cache evicted"),
            }
            report_saved(&ctx, &outcome);
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Save failed");
            Err(e)
        }
    }
}
