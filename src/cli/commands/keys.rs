//! Keys command - show resolved keys and what is stored under them

use super::definitions;
use crate::cli::args::JobArgs;
use crate::config::Config;
use crate::error::JobCacheResult;
use crate::session::CacheManager;
use crate::ui::{self, UiContext};
use console::style;
use std::path::Path;

/// Execute the keys command
pub async fn execute(args: JobArgs, config: &Config, workspace: &Path) -> JobCacheResult<()> {
    let ctx = UiContext::detect();
    let manager = CacheManager::from_config(config)?;
    let prepared = manager.prepare(&args.job, workspace, &definitions(config, &args)?)?;
    let status = manager.key_status(&prepared).await?;

    ui::key_value(&ctx, "store", &manager.store().describe());
    ui::key_value(&ctx, "job root", &prepared.root.as_prefix());

    println!();
    println!(
        "{:<24} {:<10} {:>8} {:>12}  {}",
        style("PATH").bold(),
        style("FORMAT").bold(),
        style("OBJECTS").bold(),
        style("SIZE").bold(),
        style("KEY").bold()
    );
    for entry in &status {
        println!(
            "{:<24} {:<10} {:>8} {:>12}  {}",
            entry.path,
            entry.format,
            entry.objects,
            ui::format_bytes(entry.bytes),
            style(&entry.key).dim()
        );
    }

    println!();
    let total = manager.job_total(&prepared).await?;
    match manager.settings().limit_bytes() {
        Some(limit) => ui::key_value(
            &ctx,
            "total",
            &format!("{} of {}", ui::format_bytes(total), ui::format_bytes(limit)),
        ),
        None => ui::key_value(&ctx, "total", &ui::format_bytes(total)),
    }
    Ok(())
}
