//! Image and share link composition for the blog's public host.

use url::Url;

use crate::constants::{DETAIL_IMAGE_WIDTH, IMAGE_UPLOADS_BASE, LIST_THUMBNAIL_WIDTH, SHARE_BASE};
use crate::model::{CoverImage, PostRecord};

/// Where a cover image is displayed, which decides the requested width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVariant {
    ListThumbnail,
    Detail,
}

impl ImageVariant {
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            Self::ListThumbnail => LIST_THUMBNAIL_WIDTH,
            Self::Detail => DETAIL_IMAGE_WIDTH,
        }
    }
}

/// Resolve a cover reference to a fetchable URL.
///
/// Absolute http(s) URLs are returned unchanged. Anything else is treated as a
/// path under the uploads directory and gets the host's resize filter appended.
/// Returns `None` when the result is not a valid URL.
#[must_use]
pub fn cover_image_url(cover: &CoverImage, variant: ImageVariant) -> Option<Url> {
    if let Ok(url) = Url::parse(cover.as_str()) {
        if url.scheme() == "http" || url.scheme() == "https" {
            return Some(url);
        }
    }

    let composed = format!(
        "{IMAGE_UPLOADS_BASE}{path}?imageFilter=resize&w={width}&f=webp",
        path = cover.as_str(),
        width = variant.width()
    );
    Url::parse(&composed).ok()
}

/// Cover URL for a post, if it has one.
#[must_use]
pub fn post_cover_url(post: &PostRecord, variant: ImageVariant) -> Option<Url> {
    post.cover().and_then(|c| cover_image_url(c, variant))
}

/// Public page for a post. The id is used as-is.
#[must_use]
pub fn share_url(id: &str) -> String {
    format!("{SHARE_BASE}/{id}")
}
