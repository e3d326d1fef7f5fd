//! Cache run orchestration

pub mod history;
pub mod locks;
pub mod manager;

pub use history::{CacheOutcome, CacheRecord, RunHistory, RunRecord};
pub use locks::KeyLocks;
pub use manager::{
    CacheManager, CacheSettings, GuardedRun, KeyStatus, PreparedCache, PreparedJob, SaveOutcome,
};
