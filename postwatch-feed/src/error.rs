use postwatch_http::HttpError;
use thiserror::Error;

/// Failures inside the feed pipeline.
///
/// Only [`FeedError::Parse`] on the top-level document escapes a poll cycle;
/// everything else is recovered by the stage that hit it.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed or a post page could not be downloaded.
    #[error("fetch failed: {0}")]
    Fetch(#[from] HttpError),

    /// XML/HTML or configuration input could not be parsed.
    #[error("parse failed: {0}")]
    Parse(String),

    /// A date string matched none of the known layouts.
    #[error("no known date format matches {0:?}")]
    FormatMismatch(String),

    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
}

impl From<rss::Error> for FeedError {
    fn from(err: rss::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}
