//! Cache definitions, key resolution and file selection
//!
//! Provides the leaves of the sync engine: what a cache is, where it lives in
//! the remote store, and which local files belong to it.
//!
//! # Key layout
//!
//! | Mode | Object key |
//! |------|------------|
//! | directory | `<job>/cache/<path>[/<digest>]/<relative file path>` |
//! | zip | `<job>/cache/<path>[/<digest>]/archive.zip` |
//! | tar | `<job>/cache/<path>[/<digest>]/archive.tar` |

pub mod definition;
pub mod key;
pub mod matcher;

pub use definition::{CacheDefinition, StorageFormat};
pub use key::{digest_policy, CacheKey, DigestPolicy, KeyResolver, NormalizedText, RawBytes};
pub use matcher::{EntryKind, MatchedFile, PathMatcher};
