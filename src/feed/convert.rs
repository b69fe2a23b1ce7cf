//! Rewriting a legacy-shape feed as a canonical one.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::{FeedSource, FileFeedSource, LoadError};
use crate::model::FeedPage;
use crate::normalize::{decode_legacy, CanonicalPost, Normalizer, RawFeed};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to encode canonical feed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write canonical feed to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pretty-printed canonical JSON for a normalized page.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn canonical_feed_json(page: &FeedPage) -> Result<Vec<u8>, serde_json::Error> {
    let raw = RawFeed {
        data: page
            .records
            .iter()
            .map(CanonicalPost::from_record)
            .collect(),
        total: page.total,
    };
    serde_json::to_vec_pretty(&raw)
}

/// Write `page` as a canonical feed file, creating parent directories.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub async fn write_canonical_feed(path: &Path, page: &FeedPage) -> Result<(), ConvertError> {
    let json = canonical_feed_json(page)?;
    let write_err = |source| ConvertError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, json).await.map_err(write_err)?;
    Ok(())
}

/// Convert a legacy feed file into a canonical one at `output`.
///
/// Returns the number of posts written.
///
/// # Errors
///
/// Returns an error if the input cannot be read or decoded, or the output
/// cannot be written.
pub async fn convert_legacy_file(
    input: &Path,
    output: &Path,
    normalizer: &Normalizer,
) -> Result<usize, ConvertError> {
    let bytes = FileFeedSource::new(input).read().await?;

    let raw = decode_legacy(&bytes).map_err(LoadError::from)?;
    let page = normalizer.from_legacy(raw);
    write_canonical_feed(output, &page).await?;

    info!(
        input = %input.display(),
        output = %output.display(),
        posts = page.records.len(),
        "Converted legacy feed"
    );
    Ok(page.records.len())
}
