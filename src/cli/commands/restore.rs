//! Restore command - copy stored caches into the workspace

use super::{cancel_on_ctrl_c, definitions, report_restored};
use crate::cli::args::JobArgs;
use crate::config::Config;
use crate::error::JobCacheResult;
use crate::session::CacheManager;
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::Path;

/// Execute the restore command
pub async fn execute(args: JobArgs, config: &Config, workspace: &Path) -> JobCacheResult<()> {
    let ctx = UiContext::detect();
    let manager = CacheManager::from_config(config)?;
    let prepared = manager.prepare(&args.job, workspace, &definitions(config, &args)?)?;
    let cancel = cancel_on_ctrl_c();

    ui::intro(&ctx, &format!("Restoring caches for {}", args.job));
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Fetching from {}", manager.store().describe()));

    match manager.restore(&prepared, &cancel).await {
        Ok(records) => {
            spinner.stop(&format!("Restored {} caches", records.len()));
            report_restored(&ctx, &records);
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Restore failed");
            Err(e)
        }
    }
}
