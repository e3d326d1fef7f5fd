//! Include/exclude file selection over a local directory tree
//!
//! Patterns are comma-separated globs evaluated against paths relative to the
//! scanned base, always with forward slashes. `*` stays within one path
//! component while `**` crosses directories; a pattern ending in `/` matches
//! everything below that directory.

use crate::error::{JobCacheError, JobCacheResult};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Kind of a matched filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Symbolic link (not followed during the walk)
    Symlink,
}

/// A file selected by the matcher
#[derive(Debug, Clone)]
pub struct MatchedFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the scanned base, `/`-separated
    pub relative: String,
    /// Entry kind
    pub kind: EntryKind,
}

impl MatchedFile {
    /// Whether this entry can be read as a regular file (following symlinks)
    pub fn is_readable_file(&self) -> bool {
        match self.kind {
            EntryKind::File => true,
            EntryKind::Symlink => self.path.is_file(),
        }
    }
}

/// Glob-based include/exclude selector
#[derive(Debug, Clone)]
pub struct PathMatcher {
    includes: GlobSet,
    excludes: GlobSet,
}

impl PathMatcher {
    /// Build a matcher; empty `includes` selects everything
    pub fn new(includes: &str, excludes: &str) -> JobCacheResult<Self> {
        let include_patterns = split_patterns(includes);
        let includes = if include_patterns.is_empty() {
            build_set(&["**".to_string()])?
        } else {
            build_set(&include_patterns)?
        };
        let excludes = build_set(&split_patterns(excludes))?;

        Ok(Self { includes, excludes })
    }

    /// Matcher that selects every file
    pub fn all() -> Self {
        Self {
            includes: build_set(&["**".to_string()]).unwrap_or_else(|_| GlobSet::empty()),
            excludes: GlobSet::empty(),
        }
    }

    /// Check a `/`-separated relative path
    pub fn is_match(&self, relative: &str) -> bool {
        self.includes.is_match(relative) && !self.excludes.is_match(relative)
    }

    /// Walk `base` and return the matching files in a stable order
    ///
    /// Directories are not returned. Symlinks are reported as such and never
    /// followed.
    pub fn scan(&self, base: &Path) -> JobCacheResult<Vec<MatchedFile>> {
        let mut matched = Vec::new();

        for entry in WalkDir::new(base)
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1)
        {
            let entry = entry.map_err(|e| {
                let context = format!("scanning {}", base.display());
                match e.into_io_error() {
                    Some(io) => JobCacheError::io(context, io),
                    None => JobCacheError::Internal(format!("{}: filesystem loop", context)),
                }
            })?;

            let file_type = entry.file_type();
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                continue;
            };

            let Some(relative) = relative_slash_path(base, entry.path()) else {
                continue;
            };

            if self.is_match(&relative) {
                matched.push(MatchedFile {
                    path: entry.path().to_path_buf(),
                    relative,
                    kind,
                });
            }
        }

        debug!("Matched {} files under {}", matched.len(), base.display());
        Ok(matched)
    }
}

fn split_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let p = p.replace('\\', "/");
            let p = p.trim_start_matches("./").to_string();
            if p.ends_with('/') {
                format!("{}**", p)
            } else {
                p
            }
        })
        .collect()
}

fn build_set(patterns: &[String]) -> JobCacheResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| JobCacheError::InvalidGlob {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| JobCacheError::InvalidGlob {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}

/// Render `path` relative to `base` with forward slashes
pub(crate) fn relative_slash_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
