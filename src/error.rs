//! Error types for jobcache
//!
//! All modules use `JobCacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for jobcache operations
pub type JobCacheResult<T> = Result<T, JobCacheError>;

/// All errors that can occur in jobcache
#[derive(Error, Debug)]
pub enum JobCacheError {
    // Local filesystem errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error at {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    // Remote store errors
    #[error("Transfer failed for {key}: {reason}")]
    Transfer { key: String, reason: String },

    #[error("Invalid object key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    // Cancellation
    #[error("Interrupted while waiting for transfers")]
    Interrupted,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob pattern {pattern}: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    // Workload errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Workload exited with code {code}")]
    WorkloadFailed { code: i32 },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl JobCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a transfer error for a remote key
    pub fn transfer(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transfer {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an archive error
    pub fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether this error came from cooperative cancellation
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transfer { .. } | Self::Interrupted)
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Configuration(_) => Some("Supported formats are: directory, zip, tar"),
            Self::ConfigInvalid { .. } => Some("Run: jobcache config show"),
            Self::InvalidGlob { .. } => {
                Some("Separate multiple patterns with commas, e.g. \"**/*.jar,lib/**\"")
            }
            Self::Interrupted => Some("The cache may be incomplete; the next run will resync it"),
            _ => None,
        }
    }
}
