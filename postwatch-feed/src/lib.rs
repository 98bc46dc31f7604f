//! Feed-entry normalization for a single-author RSS feed.
//!
//! [`FeedClient`] downloads the document and hands each item to a
//! [`FeedEntryNormalizer`], which runs it through [`clean`](clean::clean),
//! [`TimestampResolver`], [`ImageLocator`] and
//! [`generate_post_id`](identity::generate_post_id) to produce a [`Post`].
//! Network access beyond the feed itself goes through a [`PageSource`] that
//! the caller constructs and passes in.
pub mod clean;
pub mod client;
pub mod error;
pub mod identity;
pub mod image;
pub mod normalize;
pub mod page;
pub mod timestamp;
pub mod types;

pub use client::{FeedClient, parse_feed};
pub use error::FeedError;
pub use image::ImageLocator;
pub use normalize::{FeedEntryNormalizer, NormalizerSettings, Rejection};
pub use page::{HttpPageSource, PageSource};
pub use timestamp::{DisplayClock, TimestampResolver};
pub use types::{Enclosure, MediaContent, Post, RawFeedItem, SOURCE};
