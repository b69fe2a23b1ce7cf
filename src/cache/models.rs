use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use super::StorageError;
use crate::model::{CoverImage, Label, NewPostRecord, PostRecord};
use crate::normalize::parse_timestamp;

/// A post as stored in the `posts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CachedPostRow {
    pub id: String,
    pub title: String,
    pub author: String,
    pub publish_time: String,
    pub excerpt: String,
    pub labels: String,
    pub comment_count: i64,
    pub cover: Option<String>,
    pub html_content: Option<String>,
    pub content_hash: String,
    pub cached_at: String,
}

impl CachedPostRow {
    /// Rebuild the normalized post.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CorruptRecord`] if the stored timestamp does not parse.
    pub fn into_record(self) -> Result<PostRecord, StorageError> {
        let publish_time =
            parse_timestamp(&self.publish_time).ok_or_else(|| StorageError::CorruptRecord {
                id: self.id.clone(),
                message: format!("unparsable publish_time '{}'", self.publish_time),
            })?;

        Ok(PostRecord::new(NewPostRecord {
            labels: decode_labels(&self.labels),
            comment_count: u32::try_from(self.comment_count.max(0)).unwrap_or(u32::MAX),
            cover: self.cover.and_then(CoverImage::new),
            id: self.id,
            title: self.title,
            author: Some(self.author),
            excerpt: self.excerpt,
            publish_time,
            html_content: self.html_content,
        }))
    }
}

/// Outcome of a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// Column values derived from a post for writing.
pub(crate) struct PostColumns<'a> {
    pub post: &'a PostRecord,
    pub publish_time: String,
    pub labels: String,
    pub content_hash: String,
}

impl<'a> PostColumns<'a> {
    pub fn new(post: &'a PostRecord) -> Self {
        let publish_time = encode_timestamp(post);
        let labels = encode_labels(post.labels());
        let content_hash = compute_hash(post, &publish_time, &labels);
        Self {
            post,
            publish_time,
            labels,
            content_hash,
        }
    }
}

fn encode_timestamp(post: &PostRecord) -> String {
    post.publish_time()
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Labels as a JSON array of their wire strings.
#[must_use]
pub fn encode_labels(labels: &[Label]) -> String {
    serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string())
}

/// Read a labels column. Falls back to the older comma-joined encoding when
/// the value is not a JSON array.
#[must_use]
pub fn decode_labels(raw: &str) -> Vec<Label> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(names) => names.iter().map(|n| Label::parse(n)).collect(),
        Err(_) => raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Label::parse)
            .collect(),
    }
}

/// SHA-256 over the column values exactly as they are written.
fn compute_hash(post: &PostRecord, publish_time: &str, labels: &str) -> String {
    let columns = serde_json::json!([
        post.id(),
        post.title(),
        post.author(),
        publish_time,
        post.excerpt(),
        labels,
        post.comment_count(),
        post.cover().map(CoverImage::as_str),
        post.html_content(),
    ]);
    let mut hasher = Sha256::new();
    hasher.update(columns.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_json_encoding() {
        let encoded = encode_labels(&[Label::Design, Label::PressRelease]);
        assert_eq!(encoded, r#"["design","press-release"]"#);
        assert_eq!(decode_labels(&encoded), vec![Label::Design, Label::PressRelease]);
    }

    #[test]
    fn test_labels_legacy_comma_encoding() {
        assert_eq!(
            decode_labels("technology,lifestyle,unknown"),
            vec![Label::Technology, Label::Lifestyle, Label::Other]
        );
        assert!(decode_labels("").is_empty());
        assert!(decode_labels("[]").is_empty());
    }

    fn post_at(publish_time: chrono::DateTime<chrono::Utc>) -> PostRecord {
        PostRecord::new(NewPostRecord {
            id: "p".to_string(),
            title: "T".to_string(),
            author: None,
            excerpt: "E".to_string(),
            publish_time,
            labels: vec![Label::Design],
            comment_count: 1,
            cover: None,
            html_content: None,
        })
    }

    #[test]
    fn test_hash_tracks_sub_second_publish_time() {
        use chrono::TimeZone;
        let base = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let early = post_at(base + chrono::Duration::milliseconds(100));
        let late = post_at(base + chrono::Duration::milliseconds(800));

        assert_ne!(
            PostColumns::new(&early).content_hash,
            PostColumns::new(&late).content_hash
        );
        assert_eq!(
            PostColumns::new(&early).content_hash,
            PostColumns::new(&post_at(base + chrono::Duration::milliseconds(100))).content_hash
        );
    }

    #[test]
    fn test_corrupt_timestamp_is_reported() {
        let row = CachedPostRow {
            id: "x".to_string(),
            title: "T".to_string(),
            author: "A".to_string(),
            publish_time: "garbage".to_string(),
            excerpt: "E".to_string(),
            labels: "[]".to_string(),
            comment_count: 0,
            cover: None,
            html_content: None,
            content_hash: String::new(),
            cached_at: String::new(),
        };
        assert!(matches!(
            row.into_record(),
            Err(StorageError::CorruptRecord { ref id, .. }) if id == "x"
        ));
    }
}
