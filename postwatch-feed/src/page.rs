//! Permalink fetching used by the timestamp and image fallbacks.
use crate::error::FeedError;
use async_trait::async_trait;
use postwatch_http::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use postwatch_http::{HttpClient, RequestOpts};
use std::time::Duration;

/// Something that can return the HTML of a post page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FeedError>;
}

/// [`PageSource`] backed by the shared HTTP client.
///
/// Page fetches never retry: a slow permalink only costs its own timeout.
#[derive(Clone)]
pub struct HttpPageSource {
    http: HttpClient,
    timeout: Duration,
}

impl HttpPageSource {
    pub fn new(http: HttpClient, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, url: &str) -> Result<String, FeedError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let opts = RequestOpts {
            headers: Some(headers),
            ..RequestOpts::absolute()
                .with_timeout(self.timeout)
                .with_retries(0)
        };
        let html = self.http.get_text(url, opts).await?;
        tracing::debug!(%url, bytes = html.len(), "feed.page.fetched");
        Ok(html)
    }
}
