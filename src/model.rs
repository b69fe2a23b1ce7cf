use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::constants::{
    PUBLISH_DATE_FORMAT, RECENT_WINDOW_DAYS, UNKNOWN_AUTHOR, WORDS_PER_MINUTE,
};

/// Category tag attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    Technology,
    Lifestyle,
    Programming,
    Design,
    PressRelease,
    Other,
}

impl Label {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technology => "technology",
            Self::Lifestyle => "lifestyle",
            Self::Programming => "programming",
            Self::Design => "design",
            Self::PressRelease => "press-release",
            Self::Other => "other",
        }
    }

    /// Match a feed tag case-insensitively; anything unrecognized is `Other`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "technology" => Self::Technology,
            "lifestyle" => Self::Lifestyle,
            "programming" => Self::Programming,
            "design" => Self::Design,
            "press-release" => Self::PressRelease,
            _ => Self::Other,
        }
    }
}

/// Cover image reference as it appears in the feed.
///
/// Either an absolute URL or a path fragment under the blog's uploads
/// directory; see [`crate::links::cover_image_url`] for how it is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage(String);

impl CoverImage {
    /// Wrap a raw cover value, treating blank strings as no cover.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Data for constructing a post.
#[derive(Debug, Clone)]
pub struct NewPostRecord {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub excerpt: String,
    pub publish_time: DateTime<Utc>,
    pub labels: Vec<Label>,
    pub comment_count: u32,
    pub cover: Option<CoverImage>,
    pub html_content: Option<String>,
}

/// A normalized blog post.
///
/// Immutable after construction: `formatted_publish_time` is computed once from
/// `publish_time` and there are no setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    id: String,
    title: String,
    author: String,
    excerpt: String,
    publish_time: DateTime<Utc>,
    formatted_publish_time: String,
    labels: Vec<Label>,
    comment_count: u32,
    cover: Option<CoverImage>,
    html_content: Option<String>,
}

impl PostRecord {
    #[must_use]
    pub fn new(new: NewPostRecord) -> Self {
        let author = new
            .author
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

        Self {
            formatted_publish_time: format_publish_time(new.publish_time),
            id: new.id,
            title: new.title,
            author,
            excerpt: new.excerpt,
            publish_time: new.publish_time,
            labels: new.labels,
            comment_count: new.comment_count,
            cover: new.cover,
            html_content: new.html_content,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    #[must_use]
    pub fn excerpt(&self) -> &str {
        &self.excerpt
    }

    #[must_use]
    pub fn publish_time(&self) -> DateTime<Utc> {
        self.publish_time
    }

    #[must_use]
    pub fn formatted_publish_time(&self) -> &str {
        &self.formatted_publish_time
    }

    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[must_use]
    pub fn comment_count(&self) -> u32 {
        self.comment_count
    }

    #[must_use]
    pub fn cover(&self) -> Option<&CoverImage> {
        self.cover.as_ref()
    }

    #[must_use]
    pub fn html_content(&self) -> Option<&str> {
        self.html_content.as_deref()
    }

    /// Whether the post was published within the last 30 days of `now`.
    #[must_use]
    pub fn is_recent(&self, now: DateTime<Utc>) -> bool {
        self.publish_time > now - Duration::days(RECENT_WINDOW_DAYS)
    }

    /// Whole minutes needed to read the body, rounded down.
    #[must_use]
    pub fn estimated_reading_minutes(&self) -> usize {
        self.html_content
            .as_deref()
            .map_or(0, |body| body.split_whitespace().count() / WORDS_PER_MINUTE)
    }
}

/// Render a timestamp as `yyyy年MM月dd日` (UTC calendar date).
#[must_use]
pub fn format_publish_time(time: DateTime<Utc>) -> String {
    time.format(PUBLISH_DATE_FORMAT).to_string()
}

/// One page of normalized posts plus the feed's declared total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    pub records: Vec<PostRecord>,
    /// Declared size of the whole feed; may exceed `records.len()`.
    pub total: u64,
}

impl FeedPage {
    #[must_use]
    pub fn new(records: Vec<PostRecord>, total: u64) -> Self {
        Self { records, total }
    }
}
