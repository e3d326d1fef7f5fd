//! CLI argument definitions using clap derive

use crate::cache::StorageFormat;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// jobcache - persist build caches between isolated job runs
///
/// Restores declared workspace directories from a remote store before a
/// build and saves them back afterwards.
#[derive(Parser, Debug)]
#[command(name = "jobcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "JOBCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .jobcache.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,

    /// Workspace directory (defaults to current directory)
    #[arg(short, long, global = true, env = "JOBCACHE_WORKSPACE")]
    pub workspace: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore caches into the workspace
    Restore(JobArgs),

    /// Save workspace caches, or evict them if over the size cap
    Save(JobArgs),

    /// Restore, run a command, then save
    Run(RunArgs),

    /// Show resolved cache keys and their stored size
    Keys(JobArgs),

    /// Delete everything stored for a job
    Purge(PurgeArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Job selection shared by the cache commands
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Job name; `/` separates folders (e.g. team/service/build)
    #[arg(short, long, env = "JOBCACHE_JOB")]
    pub job: String,

    /// Extra cache definition as PATH[:FORMAT] (repeatable)
    #[arg(short = 'p', long = "path", value_parser = parse_definition)]
    pub paths: Vec<(String, StorageFormat)>,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Additional environment variables for the command (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Command and arguments to run
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Arguments for the purge command
#[derive(Parser, Debug)]
pub struct PurgeArgs {
    /// Job name
    #[arg(short, long, env = "JOBCACHE_JOB")]
    pub job: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Parse `PATH[:FORMAT]`, defaulting to directory format
fn parse_definition(s: &str) -> Result<(String, StorageFormat), String> {
    let (path, format) = match s.rsplit_once(':') {
        Some((path, format)) => (path, format.parse::<StorageFormat>().map_err(|e| format!("{}", e))?),
        None => (s, StorageFormat::Directory),
    };
    if path.trim().is_empty() {
        return Err(format!("empty cache path in '{}'", s));
    }
    Ok((path.to_string(), format))
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_definition_with_format() {
        let (path, format) = parse_definition("node_modules:zip").unwrap();
        assert_eq!(path, "node_modules");
        assert_eq!(format, StorageFormat::Zip);
    }

    #[test]
    fn parse_definition_defaults_to_directory() {
        let (path, format) = parse_definition(".m2/repository").unwrap();
        assert_eq!(path, ".m2/repository");
        assert_eq!(format, StorageFormat::Directory);
    }

    #[test]
    fn parse_definition_rejects_bad_input() {
        assert!(parse_definition("deps:rar").is_err());
        assert!(parse_definition(":tar").is_err());
    }

    #[test]
    fn parse_env_var_with_equals() {
        let (k, v) = parse_env_var("OPTS=-Xmx=1g").unwrap();
        assert_eq!(k, "OPTS");
        assert_eq!(v, "-Xmx=1g");
        assert!(parse_env_var("OPTS").is_err());
    }

    #[test]
    fn cli_parses_restore() {
        let cli = Cli::parse_from(["jobcache", "restore", "--job", "team/build", "-p", "deps:tar"]);
        match cli.command {
            Commands::Restore(args) => {
                assert_eq!(args.job, "team/build");
                assert_eq!(args.paths, vec![("deps".to_string(), StorageFormat::Tar)]);
            }
            _ => panic!("expected Restore command"),
        }
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::parse_from([
            "jobcache", "-vv", "run", "--job", "build", "-e", "CI=1", "--", "make", "all",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.job.job, "build");
                assert_eq!(args.env, vec![("CI".to_string(), "1".to_string())]);
                assert_eq!(args.command, vec!["make", "all"]);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_purge_and_global_flags() {
        let cli = Cli::parse_from([
            "jobcache",
            "purge",
            "--job",
            "build",
            "--yes",
            "--no-local",
            "--workspace",
            "/tmp/ws",
        ]);
        assert!(cli.no_local);
        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/ws")));
        assert!(matches!(cli.command, Commands::Purge(PurgeArgs { yes: true, .. })));
    }

    #[test]
    fn cli_parses_config_init() {
        let cli = Cli::parse_from(["jobcache", "config", "init", "--force"]);
        match cli.command {
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Init { force }),
            }) => assert!(force),
            _ => panic!("expected Config Init command"),
        }
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
