//! jobcache - persist build caches between isolated job runs
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use jobcache::cli::{Cli, Commands};
use jobcache::config::{Config, ConfigManager};
use jobcache::error::{JobCacheError, JobCacheResult};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            match e {
                JobCacheError::WorkloadFailed { code } if (1..=255).contains(&code) => {
                    ExitCode::from(code as u8)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run() -> JobCacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let cwd = std::env::current_dir()
        .map_err(|e| JobCacheError::io("getting current directory", e))?;
    let workspace = match cli.workspace {
        Some(ref path) => absolute(&cwd, path),
        None => cwd,
    };

    // Local config is searched from the workspace, not the shell directory
    let local_config_path = if cli.no_local {
        None
    } else {
        ConfigManager::find_local_config(&workspace)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    if let Some(ref path) = local_config_path {
        debug!("Loaded local config: {}", path.display());
    }
    jobcache::ui::init_theme();

    debug!("Workspace: {}", workspace.display());

    match cli.command {
        Commands::Restore(args) => jobcache::cli::commands::restore(args, &config, &workspace).await,
        Commands::Save(args) => jobcache::cli::commands::save(args, &config, &workspace).await,
        Commands::Run(args) => jobcache::cli::commands::run(args, &config, &workspace).await,
        Commands::Keys(args) => jobcache::cli::commands::keys(args, &config, &workspace).await,
        Commands::Purge(args) => jobcache::cli::commands::purge(args, &config).await,
        Commands::Config(args) => {
            jobcache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `general.verbose` counts as one `-v`
fn init_logging(verbose: u8, config: &Config) {
    let level = verbose.max(u8::from(config.general.verbose));
    let filter = match level {
        0 => EnvFilter::new("jobcache=warn"),
        1 => EnvFilter::new("jobcache=info"),
        _ => EnvFilter::new("jobcache=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
