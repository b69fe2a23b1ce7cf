use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{page_offset, FeedSource, LoadError, PostPager};
use crate::model::FeedPage;
use crate::normalize::{decode_canonical, decode_legacy, Normalizer};

/// Records per page when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Which raw record shape a feed uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedShape {
    Canonical,
    Legacy,
}

impl FeedShape {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::Legacy => "legacy",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "canonical" => Some(Self::Canonical),
            "legacy" => Some(Self::Legacy),
            _ => None,
        }
    }
}

/// Reads a feed source, decodes it and normalizes the records.
#[derive(Clone)]
pub struct FeedLoader {
    source: Arc<dyn FeedSource>,
    shape: FeedShape,
    normalizer: Normalizer,
    page_size: usize,
}

impl std::fmt::Debug for FeedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedLoader")
            .field("source", &self.source.location())
            .field("shape", &self.shape)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl FeedLoader {
    #[must_use]
    pub fn new(source: Arc<dyn FeedSource>, shape: FeedShape, normalizer: Normalizer) -> Self {
        Self {
            source,
            shape,
            normalizer,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the number of records per page. Zero is raised to one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Load and normalize the whole feed.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::SourceNotFound`] or [`LoadError::SourceUnreadable`]
    /// if the source cannot be read, and [`LoadError::DecodeFailed`] if the
    /// payload is malformed.
    pub async fn load(&self) -> Result<FeedPage, LoadError> {
        let location = self.source.location();
        let bytes = self.source.read().await.inspect_err(|e| {
            warn!(source = %location, "Failed to read feed: {e}");
        })?;

        let page = self.decode(&bytes).inspect_err(|e| {
            warn!(source = %location, "Failed to decode feed: {e}");
        })?;

        info!(
            source = %location,
            shape = self.shape.as_str(),
            records = page.records.len(),
            total = page.total,
            "Feed loaded"
        );
        Ok(page)
    }

    /// Decode and normalize raw feed bytes in this loader's shape.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::DecodeFailed`] if the payload is malformed.
    pub fn decode(&self, bytes: &[u8]) -> Result<FeedPage, LoadError> {
        let page = match self.shape {
            FeedShape::Canonical => self.normalizer.from_canonical(decode_canonical(bytes)?),
            FeedShape::Legacy => self.normalizer.from_legacy(decode_legacy(bytes)?),
        };
        Ok(page)
    }
}

#[async_trait]
impl PostPager for FeedLoader {
    async fn fetch_page(&self, page: u32) -> Result<FeedPage, LoadError> {
        let full = self.load().await?;
        let offset = page_offset(page, self.page_size);

        debug!(page, offset, page_size = self.page_size, "Slicing feed page");
        let records = full
            .records
            .into_iter()
            .skip(offset)
            .take(self.page_size)
            .collect();

        Ok(FeedPage::new(records, full.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::feed::StaticFeedSource;
    use chrono::{TimeZone, Utc};

    fn feed_json(count: usize) -> String {
        let posts: Vec<String> = (1..=count)
            .map(|i| format!(r#"{{"id":"{i}","title":"Post {i}","excerpt":"E"}}"#))
            .collect();
        format!(r#"{{"data":[{}],"total":{count}}}"#, posts.join(","))
    }

    fn loader(json: String, shape: FeedShape) -> FeedLoader {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        FeedLoader::new(
            Arc::new(StaticFeedSource::new("test", json.into_bytes())),
            shape,
            Normalizer::new(Arc::new(clock)),
        )
    }

    #[test]
    fn test_feed_shape_parse() {
        assert_eq!(FeedShape::from_str("canonical"), Some(FeedShape::Canonical));
        assert_eq!(FeedShape::from_str("legacy"), Some(FeedShape::Legacy));
        assert_eq!(FeedShape::from_str("other"), None);
    }

    #[tokio::test]
    async fn test_load_canonical() {
        let page = loader(feed_json(3), FeedShape::Canonical).load().await.unwrap();
        assert_eq!(page.records.len(), 3);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_load_malformed_is_decode_failed() {
        let err = loader("[]".to_string(), FeedShape::Canonical)
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::DecodeFailed(_)));
    }

    #[tokio::test]
    async fn test_legacy_shape_reads_content() {
        let json = r#"{"data":[{"id":"1","title":"T","excerpt":"E","content":"<p>x</p>"}],"total":1}"#;
        let page = loader(json.to_string(), FeedShape::Legacy).load().await.unwrap();
        assert_eq!(page.records[0].html_content(), Some("<p>x</p>"));
    }

    #[tokio::test]
    async fn test_fetch_page_slices_and_keeps_total() {
        let loader = loader(feed_json(25), FeedShape::Canonical).with_page_size(10);

        let first = loader.fetch_page(1).await.unwrap();
        assert_eq!(first.records.len(), 10);
        assert_eq!(first.records[0].id(), "1");
        assert_eq!(first.total, 25);

        let third = loader.fetch_page(3).await.unwrap();
        assert_eq!(third.records.len(), 5);
        assert_eq!(third.records[0].id(), "21");

        let past_end = loader.fetch_page(4).await.unwrap();
        assert!(past_end.records.is_empty());
        assert_eq!(past_end.total, 25);
    }
}
