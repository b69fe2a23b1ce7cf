//! Local persistent store of normalized posts, keyed by id.

mod migrations;
mod models;
mod queries;

pub use models::{decode_labels, encode_labels, CachedPostRow, UpsertSummary};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::feed::{page_offset, LoadError, PostPager};
use crate::model::{FeedPage, PostRecord};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open cache database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("cache migration failed: {0}")]
    Migration(#[source] sqlx::Error),
    #[error("cache {operation} failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("cached post {id} is corrupt: {message}")]
    CorruptRecord { id: String, message: String },
}

/// SQLite-backed post cache.
///
/// Clones share the same pool and the same writer lock, so at most one batch
/// write or clear runs at a time for a given cache.
#[derive(Debug, Clone)]
pub struct ContentCache {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    page_size: usize,
}

impl ContentCache {
    /// Open (or create) the cache database, running migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Readers and the single writer may still contend for the file lock.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|source| StorageError::Open {
                path: path.display().to_string(),
                source,
            })?;

        migrations::run(&pool).await.map_err(StorageError::Migration)?;
        info!(path = %path.display(), "Content cache ready");

        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            page_size: crate::feed::DEFAULT_PAGE_SIZE,
        })
    }

    /// Set the number of posts served per page through [`PostPager`].
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Insert new posts and overwrite existing ones with the same id.
    ///
    /// The batch is atomic: if any row fails, nothing from this call is visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the cache is left as it was.
    pub async fn upsert_all(&self, posts: &[PostRecord]) -> Result<UpsertSummary, StorageError> {
        let _guard = self.write_lock.lock().await;

        let summary = queries::upsert_posts(&self.pool, posts)
            .await
            .inspect_err(|e| warn!("Failed to cache posts: {e}"))?;

        debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "Cached posts"
        );
        Ok(summary)
    }

    /// Every cached post, newest first (ties by id).
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or a stored row is corrupt.
    pub async fn fetch_all(&self) -> Result<Vec<PostRecord>, StorageError> {
        queries::get_all_posts(&self.pool).await
    }

    /// One page of posts in [`fetch_all`](Self::fetch_all) order. Pages are 1-based.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or a stored row is corrupt.
    pub async fn fetch_posts_page(
        &self,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<PostRecord>, StorageError> {
        let offset = page_offset(page, page_size);
        queries::get_posts_page(&self.pool, page_size as i64, offset as i64).await
    }

    /// Look up one post.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored row is corrupt.
    pub async fn get(&self, id: &str) -> Result<Option<PostRecord>, StorageError> {
        queries::get_post(&self.pool, id).await
    }

    /// Number of cached posts.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let count = queries::count_posts(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    /// Remove every cached post. Clearing an empty cache succeeds.
    ///
    /// Returns the number of posts removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn clear(&self) -> Result<u64, StorageError> {
        let _guard = self.write_lock.lock().await;

        let removed = queries::delete_all_posts(&self.pool)
            .await
            .inspect_err(|e| warn!("Failed to clear cached posts: {e}"))?;

        info!(removed, "Cleared cached posts");
        Ok(removed)
    }

    /// Close the underlying pool. Later calls fail with [`StorageError::Query`].
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PostPager for ContentCache {
    async fn fetch_page(&self, page: u32) -> Result<FeedPage, LoadError> {
        let unavailable = |e: StorageError| LoadError::CacheUnavailable(e.to_string());

        let records = self
            .fetch_posts_page(page, self.page_size)
            .await
            .map_err(unavailable)?;
        let total = self.count().await.map_err(unavailable)?;

        Ok(FeedPage::new(records, total))
    }
}
