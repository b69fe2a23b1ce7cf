//! Conversion of raw feed records into [`PostRecord`]s.
//!
//! Two raw shapes exist. The canonical shape uses `lastCommentedAt` for the
//! publish time, `cover` for the cover image and `htmlContent` for the body.
//! The legacy shape uses `publishTime` and `content` and has no cover. Callers
//! pick the matching entry point; the shape is never guessed.
//!
//! Per-field anomalies are not errors: missing or malformed optional fields
//! fall back to documented defaults. Only a structurally broken payload fails.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::model::{CoverImage, FeedPage, Label, NewPostRecord, PostRecord};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed feed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Top-level feed wrapper shared by both shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFeed<P> {
    pub data: Vec<P>,
    pub total: u64,
}

/// A post in the canonical feed shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPost {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, alias = "publishTime", skip_serializing_if = "Option::is_none")]
    pub last_commented_at: Option<Value>,
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<Value>,
    #[serde(
        default,
        alias = "coverImageURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
}

impl CanonicalPost {
    /// Render a normalized post back into the canonical shape.
    #[must_use]
    pub fn from_record(post: &PostRecord) -> Self {
        Self {
            id: post.id().to_string(),
            title: post.title().to_string(),
            author: Some(post.author().to_string()),
            last_commented_at: Some(Value::String(
                post.publish_time()
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )),
            excerpt: post.excerpt().to_string(),
            labels: Some(Value::Array(
                post.labels()
                    .iter()
                    .map(|l| Value::String(l.as_str().to_string()))
                    .collect(),
            )),
            comment_count: Some(Value::from(post.comment_count())),
            cover: post.cover().map(|c| c.as_str().to_string()),
            html_content: post.html_content().map(ToString::to_string),
        }
    }
}

/// A post in the legacy feed shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub publish_time: Option<Value>,
    pub excerpt: String,
    #[serde(default)]
    pub labels: Option<Value>,
    #[serde(default)]
    pub comment_count: Option<Value>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Decode a canonical-shape payload without normalizing it.
///
/// # Errors
///
/// Returns an error if the payload is not JSON or lacks required keys.
pub fn decode_canonical(bytes: &[u8]) -> Result<RawFeed<CanonicalPost>, NormalizeError> {
    decode(bytes)
}

/// Decode a legacy-shape payload without normalizing it.
///
/// # Errors
///
/// Returns an error if the payload is not JSON or lacks required keys.
pub fn decode_legacy(bytes: &[u8]) -> Result<RawFeed<LegacyPost>, NormalizeError> {
    decode(bytes)
}

fn decode<P: DeserializeOwned>(bytes: &[u8]) -> Result<RawFeed<P>, NormalizeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Converts raw posts into [`PostRecord`]s.
///
/// The clock supplies the publish time for posts whose timestamp is missing or
/// unparsable.
#[derive(Clone)]
pub struct Normalizer {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Normalizer {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    #[must_use]
    pub fn from_canonical(&self, raw: RawFeed<CanonicalPost>) -> FeedPage {
        let records = raw.data.into_iter().map(|p| self.canonical_post(p));
        FeedPage::new(dedup_by_id(records), raw.total)
    }

    #[must_use]
    pub fn from_legacy(&self, raw: RawFeed<LegacyPost>) -> FeedPage {
        let records = raw.data.into_iter().map(|p| self.legacy_post(p));
        FeedPage::new(dedup_by_id(records), raw.total)
    }

    #[must_use]
    pub fn canonical_post(&self, post: CanonicalPost) -> PostRecord {
        PostRecord::new(NewPostRecord {
            publish_time: self.publish_time(&post.id, post.last_commented_at.as_ref()),
            labels: parse_labels(post.labels.as_ref()),
            comment_count: parse_comment_count(post.comment_count.as_ref()),
            cover: post.cover.and_then(CoverImage::new),
            id: post.id,
            title: post.title,
            author: post.author,
            excerpt: post.excerpt,
            html_content: post.html_content,
        })
    }

    #[must_use]
    pub fn legacy_post(&self, post: LegacyPost) -> PostRecord {
        PostRecord::new(NewPostRecord {
            publish_time: self.publish_time(&post.id, post.publish_time.as_ref()),
            labels: parse_labels(post.labels.as_ref()),
            comment_count: parse_comment_count(post.comment_count.as_ref()),
            cover: None,
            id: post.id,
            title: post.title,
            author: post.author,
            excerpt: post.excerpt,
            html_content: post.content,
        })
    }

    fn publish_time(&self, id: &str, raw: Option<&Value>) -> DateTime<Utc> {
        match raw.and_then(Value::as_str).and_then(parse_timestamp) {
            Some(time) => time,
            None => {
                debug!(id = %id, raw = ?raw, "Publish time missing or unparsable, using now");
                self.clock.now()
            }
        }
    }
}

/// Parse an ISO-8601 timestamp with offset.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Labels from an array of tags. A comma-joined string is also accepted.
/// Non-string entries degrade to [`Label::Other`].
fn parse_labels(raw: Option<&Value>) -> Vec<Label> {
    match raw {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map_or(Label::Other, Label::parse))
            .collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Label::parse)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_comment_count(raw: Option<&Value>) -> u32 {
    let count = match raw {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    count.map_or(0, |c| u32::try_from(c.max(0)).unwrap_or(u32::MAX))
}

fn dedup_by_id(records: impl Iterator<Item = PostRecord>) -> Vec<PostRecord> {
    let mut seen = HashSet::new();
    records
        .filter(|post| {
            let fresh = seen.insert(post.id().to_string());
            if !fresh {
                warn!(id = %post.id(), "Duplicate post id in feed, keeping first");
            }
            fresh
        })
        .collect()
}
