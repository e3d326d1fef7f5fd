//! Purge command - delete everything stored for a job

use crate::cli::args::PurgeArgs;
use crate::config::Config;
use crate::error::JobCacheResult;
use crate::session::CacheManager;
use crate::ui::{self, UiContext};

/// Execute the purge command
pub async fn execute(args: PurgeArgs, config: &Config) -> JobCacheResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let manager = CacheManager::from_config(config)?;

    let question = format!("Delete every cache stored for {}?", args.job);
    if !ui::confirm(&ctx, &question, false).await? {
        ui::outro_warn(&ctx, "Purge cancelled (pass --yes to skip this prompt)");
        return Ok(());
    }

    let bytes = manager.purge_job(&args.job).await?;
    ui::outro_success(
        &ctx,
        &format!("Purged {} for {}", ui::format_bytes(bytes), args.job),
    );
    Ok(())
}
