//! Cache key resolution
//!
//! A cache lives under `<job>/cache/<declared path>` in the remote store.
//! Dependency-keyed caches add one more segment holding the digest of a
//! descriptor file (a lockfile, a `pom.xml`, ...), so a changed descriptor
//! resolves to a fresh key instead of reusing stale dependencies.

use crate::cache::definition::CacheDefinition;
use crate::error::{JobCacheError, JobCacheResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Namespace segment under each job
pub const CACHE_NAMESPACE: &str = "cache";

/// A remote key prefix, stored as path segments
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    segments: Vec<String>,
}

impl CacheKey {
    /// Root namespace for a job: `<job segments>/cache`
    pub fn for_job(job: &str) -> JobCacheResult<Self> {
        let mut key = Self {
            segments: Vec::new(),
        };
        key.push_path(job)?;
        if key.segments.is_empty() {
            return Err(JobCacheError::InvalidKey {
                key: job.to_string(),
                reason: "job name is empty".to_string(),
            });
        }
        key.segments.push(CACHE_NAMESPACE.to_string());
        Ok(key)
    }

    /// Extend with a `/`-separated path
    pub fn child(&self, path: &str) -> JobCacheResult<Self> {
        let mut key = self.clone();
        key.push_path(path)?;
        Ok(key)
    }

    fn push_path(&mut self, path: &str) -> JobCacheResult<()> {
        for segment in path.replace('\\', "/").split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(JobCacheError::InvalidKey {
                        key: path.to_string(),
                        reason: "parent directory segments are not allowed".to_string(),
                    })
                }
                s => self.segments.push(s.to_string()),
            }
        }
        Ok(())
    }

    /// Key segments in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether `other` lies at or below this key
    pub fn contains(&self, other: &CacheKey) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Render as a remote prefix without trailing slash
    pub fn as_prefix(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_prefix())
    }
}

/// How a descriptor file is turned into a digest segment
pub trait DigestPolicy: Send + Sync {
    /// Compute a lowercase hex digest for `path`
    fn digest(&self, path: &Path) -> JobCacheResult<String>;

    /// Policy name used in configuration
    fn name(&self) -> &'static str;
}

/// SHA-256 over the raw file bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytes;

impl DigestPolicy for RawBytes {
    fn digest(&self, path: &Path) -> JobCacheResult<String> {
        let contents = read_descriptor(path)?;
        Ok(sha256_hex(&contents))
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}

/// SHA-256 over the file's lines joined with `\n` for known text formats
///
/// Line endings and a trailing newline do not affect the digest. Files with
/// other extensions, or that are not UTF-8, are digested as raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedText;

impl NormalizedText {
    const TEXT_EXTENSIONS: &'static [&'static str] =
        &["json", "lock", "xml", "yaml", "yml", "toml", "txt"];

    fn is_text_descriptor(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| Self::TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl DigestPolicy for NormalizedText {
    fn digest(&self, path: &Path) -> JobCacheResult<String> {
        let contents = read_descriptor(path)?;
        if !Self::is_text_descriptor(path) {
            return Ok(sha256_hex(&contents));
        }

        match String::from_utf8(contents) {
            Ok(text) => {
                let joined = text.lines().collect::<Vec<_>>().join("\n");
                Ok(sha256_hex(joined.as_bytes()))
            }
            Err(e) => {
                debug!("{} is not UTF-8, digesting raw bytes", path.display());
                Ok(sha256_hex(e.as_bytes()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// Look up a digest policy by its configured name
pub fn digest_policy(name: &str) -> JobCacheResult<Box<dyn DigestPolicy>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "raw" => Ok(Box::new(RawBytes)),
        "text" => Ok(Box::new(NormalizedText)),
        other => Err(JobCacheError::Configuration(format!(
            "unknown digest policy: {}",
            other
        ))),
    }
}

fn read_descriptor(path: &Path) -> JobCacheResult<Vec<u8>> {
    fs::read(path).map_err(|e| JobCacheError::Io {
        context: format!("reading dependency descriptor {}", path.display()),
        source: e,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Maps cache definitions to remote keys
pub struct KeyResolver {
    policy: Box<dyn DigestPolicy>,
}

impl KeyResolver {
    /// Create a resolver with the given digest policy
    pub fn new(policy: Box<dyn DigestPolicy>) -> Self {
        Self { policy }
    }

    /// Name of the active digest policy
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Resolve the key for `definition` below `base`
    ///
    /// Without a descriptor this is `base/<declared path>`. With one, the
    /// descriptor's digest is appended as a final segment. A missing
    /// descriptor is an IO error unless the definition asks to fall back to
    /// the un-keyed path.
    pub fn resolve(
        &self,
        base: &CacheKey,
        definition: &CacheDefinition,
        workspace: &Path,
    ) -> JobCacheResult<CacheKey> {
        let key = base.child(&definition.path)?;
        if key.segments().len() == base.segments().len() {
            return Err(JobCacheError::InvalidKey {
                key: definition.path.clone(),
                reason: "declared path does not name a directory".to_string(),
            });
        }

        let Some(descriptor) = definition.dependency_descriptor.as_deref() else {
            return Ok(key);
        };

        let descriptor_path = workspace.join(descriptor);
        debug!(
            "Computing {} digest for {}",
            self.policy.name(),
            descriptor_path.display()
        );

        match self.policy.digest(&descriptor_path) {
            Ok(digest) => {
                info!("Dependency digest for {} is {}", definition.path, digest);
                key.child(&digest)
            }
            Err(e) if definition.fallback_without_descriptor => {
                warn!(
                    "Dependency descriptor {} unavailable ({}), using un-keyed cache path",
                    descriptor_path.display(),
                    e
                );
                Ok(key)
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new(Box::new(RawBytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::definition::StorageFormat;
    use tempfile::TempDir;

    fn base() -> CacheKey {
        CacheKey::for_job("folder/my-job").unwrap()
    }

    #[test]
    fn job_key_layout() {
        let key = base();
        assert_eq!(key.as_prefix(), "folder/my-job/cache");
        assert_eq!(key.segments().len(), 3);
    }

    #[test]
    fn empty_job_rejected() {
        assert!(CacheKey::for_job("/").is_err());
    }

    #[test]
    fn child_normalizes_separators() {
        let key = base().child("./target\\deps/").unwrap();
        assert_eq!(key.as_prefix(), "folder/my-job/cache/target/deps");
        assert!(base().contains(&key));
        assert!(!key.contains(&base()));
    }

    #[test]
    fn parent_segments_rejected() {
        let err = base().child("../other-job").unwrap_err();
        assert!(matches!(err, JobCacheError::InvalidKey { .. }));
    }

    #[test]
    fn resolve_plain_definition() {
        let dir = TempDir::new().unwrap();
        let def = CacheDefinition::new("deps", StorageFormat::Directory);
        let key = KeyResolver::default()
            .resolve(&base(), &def, dir.path())
            .unwrap();
        assert_eq!(key.as_prefix(), "folder/my-job/cache/deps");
    }

    #[test]
    fn resolve_rejects_empty_declared_path() {
        let dir = TempDir::new().unwrap();
        let def = CacheDefinition::new("./", StorageFormat::Directory);
        assert!(KeyResolver::default().resolve(&base(), &def, dir.path()).is_err());
    }

    #[test]
    fn resolve_appends_digest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Cargo.lock"), b"version = 3").unwrap();
        let def =
            CacheDefinition::new("target", StorageFormat::Tar).with_descriptor("Cargo.lock");

        let key = KeyResolver::default()
            .resolve(&base(), &def, dir.path())
            .unwrap();

        let digest = key.segments().last().unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(key.segments()[..4].join("/"), "folder/my-job/cache/target");
    }

    #[test]
    fn digest_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("package-lock.json");
        std::fs::write(&path, b"{\"lockfileVersion\": 3}").unwrap();

        assert_eq!(RawBytes.digest(&path).unwrap(), RawBytes.digest(&path).unwrap());
    }

    #[test]
    fn one_byte_changes_the_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("yarn.lock");
        let def = CacheDefinition::new("node_modules", StorageFormat::Directory)
            .with_descriptor("yarn.lock");
        let resolver = KeyResolver::default();

        std::fs::write(&path, b"left-pad@1.3.0").unwrap();
        let first = resolver.resolve(&base(), &def, dir.path()).unwrap();
        std::fs::write(&path, b"left-pad@1.3.1").unwrap();
        let second = resolver.resolve(&base(), &def, dir.path()).unwrap();

        assert_ne!(first, second);
        assert_eq!(first.segments()[..4], second.segments()[..4]);
    }

    #[test]
    fn missing_descriptor_is_io_error() {
        let dir = TempDir::new().unwrap();
        let def = CacheDefinition::new("deps", StorageFormat::Directory)
            .with_descriptor("missing.lock");
        let err = KeyResolver::default()
            .resolve(&base(), &def, dir.path())
            .unwrap_err();
        assert!(matches!(err, JobCacheError::Io { .. }));
    }

    #[test]
    fn missing_descriptor_can_fall_back() {
        let dir = TempDir::new().unwrap();
        let mut def = CacheDefinition::new("deps", StorageFormat::Directory)
            .with_descriptor("missing.lock");
        def.fallback_without_descriptor = true;
        let key = KeyResolver::default()
            .resolve(&base(), &def, dir.path())
            .unwrap();
        assert_eq!(key.as_prefix(), "folder/my-job/cache/deps");
    }

    #[test]
    fn normalized_text_ignores_line_endings() {
        let dir = TempDir::new().unwrap();
        let unix = dir.path().join("unix.lock");
        let windows = dir.path().join("windows.lock");
        std::fs::write(&unix, b"a\nb\n").unwrap();
        std::fs::write(&windows, b"a\r\nb\r\n").unwrap();

        assert_eq!(
            NormalizedText.digest(&unix).unwrap(),
            NormalizedText.digest(&windows).unwrap()
        );
        assert_ne!(RawBytes.digest(&unix).unwrap(), RawBytes.digest(&windows).unwrap());
    }

    #[test]
    fn normalized_text_uses_raw_bytes_for_binaries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deps.bin");
        std::fs::write(&path, b"a\r\nb").unwrap();
        assert_eq!(
            NormalizedText.digest(&path).unwrap(),
            RawBytes.digest(&path).unwrap()
        );
    }

    #[test]
    fn digest_policy_lookup() {
        assert_eq!(digest_policy("raw").unwrap().name(), "raw");
        assert_eq!(digest_policy("Text").unwrap().name(), "text");
        assert!(matches!(
            digest_policy("md5"),
            Err(JobCacheError::Configuration(_))
        ));
    }
}
