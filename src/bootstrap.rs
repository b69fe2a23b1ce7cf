//! Startup population of the content cache.

use thiserror::Error;
use tracing::{error, info};

use crate::cache::{ContentCache, StorageError, UpsertSummary};
use crate::feed::{FeedLoader, LoadError};

#[derive(Debug, Error)]
pub enum WarmCacheError {
    #[error("could not load feed: {0}")]
    Load(#[from] LoadError),
    #[error("could not write cache: {0}")]
    Storage(#[from] StorageError),
}

/// Load the whole feed and upsert it into the cache.
///
/// Failures are logged and returned; the caller decides whether to continue.
///
/// # Errors
///
/// Returns an error if the feed cannot be loaded or the cache write fails.
pub async fn warm_cache(
    loader: &FeedLoader,
    cache: &ContentCache,
) -> Result<UpsertSummary, WarmCacheError> {
    let page = loader.load().await.inspect_err(|e| {
        error!("Cache warm-up skipped, feed unavailable: {e}");
    })?;

    let summary = cache.upsert_all(&page.records).await.inspect_err(|e| {
        error!("Cache warm-up failed, cache left unchanged: {e}");
    })?;

    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        unchanged = summary.unchanged,
        "Cache warmed from feed"
    );
    Ok(summary)
}
