//! One [`RawFeedItem`] in, zero or one [`Post`] out.
use crate::clean::clean;
use crate::identity::generate_post_id;
use crate::image::ImageLocator;
use crate::timestamp::{DisplayClock, TimestampResolver};
use crate::types::{Post, RawFeedItem, SOURCE};
use std::fmt;

/// Content-quality knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerSettings {
    /// Titles starting with any of these are feed filler, not headlines.
    pub title_placeholders: Vec<String>,
    /// Items whose final text is shorter than this (in chars) are dropped.
    pub min_content_chars: usize,
    /// A real title must be longer than this to be prepended.
    pub title_min_chars: usize,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            title_placeholders: vec!["[No Title]".to_string(), "REFORMING".to_string()],
            min_content_chars: 10,
            title_min_chars: 20,
        }
    }
}

/// Why an item produced no post. Not an error; the item is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingDescription,
    TooShort { chars: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingDescription => write!(f, "item has no description"),
            Rejection::TooShort { chars } => write!(f, "content too short ({chars} chars)"),
        }
    }
}

pub struct FeedEntryNormalizer {
    timestamps: TimestampResolver,
    images: ImageLocator,
    clock: DisplayClock,
    settings: NormalizerSettings,
}

impl FeedEntryNormalizer {
    pub fn new(timestamps: TimestampResolver, images: ImageLocator, clock: DisplayClock) -> Self {
        Self {
            timestamps,
            images,
            clock,
            settings: NormalizerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: NormalizerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the post for `item`, or `None` if it does not qualify.
    pub async fn normalize(&self, item: &RawFeedItem) -> Option<Post> {
        let content = match self.prepare_content(item) {
            Ok(content) => content,
            Err(rejection) => {
                tracing::debug!(
                    guid = item.guid.as_deref().unwrap_or_default(),
                    reason = %rejection,
                    "feed.normalize.rejected"
                );
                return None;
            }
        };

        let guid = item.guid.as_deref().unwrap_or_default();
        let link = item.link.as_deref().unwrap_or_default();
        let description = item.description.as_deref().unwrap_or_default();

        let timestamp = self
            .timestamps
            .resolve(item.pub_date.as_deref().unwrap_or_default(), guid, link)
            .await;
        let formatted_time = self.clock.format(&timestamp);

        let image = self
            .images
            .locate(
                item.enclosure.as_ref(),
                item.media_content.as_ref(),
                description,
                link,
            )
            .await;

        Some(Post {
            id: generate_post_id(guid, &content),
            content,
            timestamp,
            formatted_time,
            link: link.to_string(),
            image,
            source: SOURCE,
            guid: guid.to_string(),
        })
    }

    /// Cleaned text with a meaningful title prepended, or the reason the item
    /// is skipped. No network access.
    pub fn prepare_content(&self, item: &RawFeedItem) -> Result<String, Rejection> {
        let description = item
            .description
            .as_deref()
            .ok_or(Rejection::MissingDescription)?;
        let mut content = clean(description);

        if let Some(title) = item.title.as_deref().filter(|t| self.is_real_title(t)) {
            content = format!("{title}\n\n{content}");
        }

        let content = content.trim();
        let chars = content.chars().count();
        if chars < self.settings.min_content_chars {
            return Err(Rejection::TooShort { chars });
        }
        Ok(content.to_string())
    }

    fn is_real_title(&self, title: &str) -> bool {
        !title.is_empty()
            && !self
                .settings
                .title_placeholders
                .iter()
                .any(|p| title.starts_with(p.as_str()))
            && title.chars().count() > self.settings.title_min_chars
    }
}
