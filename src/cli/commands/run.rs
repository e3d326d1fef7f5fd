//! Run command - restore caches, run a build command, save caches

use super::{cancel_on_ctrl_c, definitions, report_restored, report_saved};
use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::error::{JobCacheError, JobCacheResult};
use crate::session::CacheManager;
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config, workspace: &Path) -> JobCacheResult<()> {
    let ctx = UiContext::detect();
    let manager = CacheManager::from_config(config)?;
    let definitions = definitions(config, &args.job)?;
    let cancel = cancel_on_ctrl_c();

    ui::intro(&ctx, &format!("jobcache run {}", args.job.job));

    let workload = run_command(&args.command, &args.env, workspace, &cancel);
    let run = manager
        .run_guarded(&args.job.job, workspace, &definitions, &cancel, workload)
        .await?;

    report_restored(&ctx, &run.restored);
    match &run.saved {
        Some(saved) => report_saved(&ctx, saved),
        None => ui::step_warn(&ctx, "Caches were not saved"),
    }

    run.outcome?;
    ui::outro_success(&ctx, "Build finished, caches updated");
    Ok(())
}

/// Run `command` in `workspace`, killing it if `cancel` fires
async fn run_command(
    command: &[String],
    env: &[(String, String)],
    workspace: &Path,
    cancel: &CancellationToken,
) -> JobCacheResult<()> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| JobCacheError::User("No command given".to_string()))?;

    debug!("Running {:?} in {}", command, workspace.display());
    let mut child = Command::new(program)
        .args(rest)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(workspace)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| JobCacheError::command_failed(command.join(" "), e))?;

    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    let Some(status) = status else {
        child.kill().await.ok();
        return Err(JobCacheError::Interrupted);
    };
    let status = status.map_err(|e| JobCacheError::command_failed(command.join(" "), e))?;

    if status.success() {
        info!("Command completed");
        Ok(())
    } else {
        Err(JobCacheError::WorkloadFailed {
            code: status.code().unwrap_or(-1),
        })
    }
}
