use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Ingestion channel recorded on every [`Post`].
pub const SOURCE: &str = "truth_social_rss";

/// A normalized post, ready for dedup and delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// `rss_post_<status id>` or `rss_post_<content hash>`.
    pub id: String,
    /// Cleaned text, trimmed, at least the configured minimum length.
    pub content: String,
    /// Serialized as RFC 3339.
    pub timestamp: DateTime<FixedOffset>,
    /// Timestamp rendered in the display zone; empty when rendering failed.
    pub formatted_time: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub source: &'static str,
    pub guid: String,
}

impl Post {
    /// RFC 3339 rendering of [`Post::timestamp`].
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339()
    }
}

/// One `<item>` as found in the feed, before any cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedItem {
    pub title: Option<String>,
    /// HTML fragment; `None` when the element is missing entirely.
    pub description: Option<String>,
    pub link: Option<String>,
    pub pub_date: Option<String>,
    pub guid: Option<String>,
    pub enclosure: Option<Enclosure>,
    pub media_content: Option<MediaContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
}

/// `<media:content>` location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaContent {
    pub url: Option<String>,
}
