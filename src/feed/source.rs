use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::LoadError;

/// Where feed bytes come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable location, used in errors and logs.
    fn location(&self) -> &str;

    /// Read the whole feed. A single attempt, no retries.
    async fn read(&self) -> Result<Vec<u8>, LoadError>;
}

/// Feed stored as a file on disk (the bundled `BlogData.json`).
#[derive(Debug, Clone)]
pub struct FileFeedSource {
    path: PathBuf,
    location: String,
}

impl FileFeedSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let location = path.display().to_string();
        Self { path, location }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FeedSource for FileFeedSource {
    fn location(&self) -> &str {
        &self.location
    }

    async fn read(&self) -> Result<Vec<u8>, LoadError> {
        debug!(path = %self.location, "Reading feed file");
        tokio::fs::read(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LoadError::SourceNotFound {
                    location: self.location.clone(),
                }
            } else {
                LoadError::SourceUnreadable {
                    location: self.location.clone(),
                    message: e.to_string(),
                }
            }
        })
    }
}

/// Feed held in memory, e.g. compiled into the binary or built by a test.
#[derive(Debug, Clone)]
pub struct StaticFeedSource {
    name: String,
    bytes: Arc<[u8]>,
}

impl StaticFeedSource {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    fn location(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> Result<Vec<u8>, LoadError> {
        Ok(self.bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_source_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = FileFeedSource::new(dir.path().join("missing.json"));

        let err = source.read().await.unwrap_err();
        assert!(matches!(err, LoadError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = FileFeedSource::new(dir.path());

        let err = source.read().await.unwrap_err();
        assert!(matches!(err, LoadError::SourceUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_static_source_returns_bytes() {
        let source = StaticFeedSource::new("inline", b"{}".to_vec());
        assert_eq!(source.location(), "inline");
        assert_eq!(source.read().await.unwrap(), b"{}");
    }
}
