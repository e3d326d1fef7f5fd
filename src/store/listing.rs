//! Paginated enumeration of remote objects

use crate::error::JobCacheResult;
use crate::store::{ObjectSummary, RemoteStore};
use std::collections::HashMap;
use tracing::debug;

/// List every object under `prefix`, following continuation markers
pub async fn list_all(store: &dyn RemoteStore, prefix: &str) -> JobCacheResult<Vec<ObjectSummary>> {
    let mut objects = Vec::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.list(prefix, marker.as_deref()).await?;
        pages += 1;
        objects.extend(page.objects);

        match page.next_marker {
            Some(next) if Some(&next) != marker.as_ref() => marker = Some(next),
            _ => break,
        }
    }

    debug!(
        prefix,
        pages,
        objects = objects.len(),
        "Listed remote objects"
    );
    Ok(objects)
}

/// List every object under `prefix` keyed by object key
pub async fn summaries_by_key(
    store: &dyn RemoteStore,
    prefix: &str,
) -> JobCacheResult<HashMap<String, ObjectSummary>> {
    Ok(list_all(store, prefix)
        .await?
        .into_iter()
        .map(|summary| (summary.key.clone(), summary))
        .collect())
}

/// Sum of object sizes under `prefix`
pub async fn total_size(store: &dyn RemoteStore, prefix: &str) -> JobCacheResult<u64> {
    Ok(list_all(store, prefix).await?.iter().map(|o| o.size).sum())
}

/// Prefix used to list the objects of a cache key
///
/// The trailing slash keeps `deps` from matching `deps-old/...`.
pub fn dir_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}
