//! jobcache - build cache persistence for isolated job runs
//!
//! Synchronizes declared workspace directories with a remote object store so
//! regenerable artifacts (dependency trees, build outputs) survive between
//! otherwise clean builds.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod sync;
pub mod transfer;
pub mod ui;

pub use error::{JobCacheError, JobCacheResult};
