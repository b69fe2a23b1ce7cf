//! Shared constants used across the application.

/// Base for cover images stored as upload path fragments.
pub const IMAGE_UPLOADS_BASE: &str = "https://www.arcblock.io/blog/uploads";

/// Base for share links to a post's public page.
pub const SHARE_BASE: &str = "https://www.arcblock.io/blog";

/// Cover width requested for list thumbnails.
pub const LIST_THUMBNAIL_WIDTH: u32 = 400;

/// Cover width requested for the detail view.
pub const DETAIL_IMAGE_WIDTH: u32 = 800;

/// Author shown when the feed omits one.
pub const UNKNOWN_AUTHOR: &str = "佚名";

/// Display format for publish dates.
pub const PUBLISH_DATE_FORMAT: &str = "%Y年%m月%d日";

/// A post this close to the end of the loaded list triggers "load more".
pub const LOAD_MORE_THRESHOLD: usize = 2;

/// Posts published within this many days count as recent.
pub const RECENT_WINDOW_DAYS: i64 = 30;

/// Reading speed used for reading time estimates.
pub const WORDS_PER_MINUTE: usize = 200;
