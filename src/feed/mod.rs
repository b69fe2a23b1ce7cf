//! Reading the bundled feed and serving it page by page.

mod convert;
mod loader;
mod source;

pub use convert::{canonical_feed_json, convert_legacy_file, write_canonical_feed, ConvertError};
pub use loader::{FeedLoader, FeedShape, DEFAULT_PAGE_SIZE};
pub use source::{FeedSource, FileFeedSource, StaticFeedSource};

use async_trait::async_trait;
use thiserror::Error;

use crate::model::FeedPage;
use crate::normalize::NormalizeError;

/// Failure to produce a page of posts.
///
/// Cloneable so the list controller can keep the last error in its state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("feed source not found: {location}")]
    SourceNotFound { location: String },
    #[error("failed to read feed source {location}: {message}")]
    SourceUnreadable { location: String, message: String },
    #[error("failed to decode feed: {0}")]
    DecodeFailed(String),
    #[error("content cache unavailable: {0}")]
    CacheUnavailable(String),
}

impl From<NormalizeError> for LoadError {
    fn from(e: NormalizeError) -> Self {
        Self::DecodeFailed(e.to_string())
    }
}

/// Anything that can serve numbered pages of posts.
#[async_trait]
pub trait PostPager: Send + Sync {
    /// Fetch page `page` (1-based). Pages past the end are empty but still
    /// report the full `total`.
    async fn fetch_page(&self, page: u32) -> Result<FeedPage, LoadError>;
}

/// Zero-based offset of the first record on `page`. Page 0 is treated as 1.
#[must_use]
pub fn page_offset(page: u32, page_size: usize) -> usize {
    (page.max(1) as usize - 1).saturating_mul(page_size)
}
