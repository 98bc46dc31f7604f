use crate::error::FeedError;
use crate::normalize::FeedEntryNormalizer;
use crate::types::{Enclosure, MediaContent, Post, RawFeedItem};
use futures::{FutureExt, StreamExt, stream};
use postwatch_http::header::{ACCEPT, HeaderMap, HeaderValue};
use postwatch_http::{HttpClient, RequestOpts};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Downloads the feed and turns its items into posts.
#[derive(Clone)]
pub struct FeedClient {
    http: HttpClient,
    feed_url: String,
    timeout: Duration,
    normalizer: Arc<FeedEntryNormalizer>,
    concurrency: usize,
}

impl FeedClient {
    pub fn new(http: HttpClient, feed_url: impl Into<String>, normalizer: FeedEntryNormalizer) -> Self {
        Self {
            http,
            feed_url: feed_url.into(),
            timeout: Duration::from_secs(30),
            normalizer: Arc::new(normalizer),
            concurrency: 4,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Items normalized at once. Output order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    /// Download and parse the feed document.
    pub async fn fetch_items(&self) -> Result<Vec<RawFeedItem>, FeedError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/rss+xml, application/xml, text/xml"),
        );
        let opts = RequestOpts {
            headers: Some(headers),
            ..RequestOpts::absolute().with_timeout(self.timeout)
        };
        let body = self.http.get_bytes(&self.feed_url, opts).await?;
        parse_feed(&body)
    }

    /// All qualifying posts, in feed order.
    ///
    /// An unreachable feed yields an empty list; a malformed document is an
    /// error.
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, FeedError> {
        let items = match self.fetch_items().await {
            Ok(items) => items,
            Err(FeedError::Fetch(err)) => {
                tracing::warn!(
                    url = %self.feed_url,
                    status = ?err.status(),
                    error = %err,
                    "feed.fetch.failed"
                );
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        tracing::info!(items = items.len(), "feed.fetch.items");

        let posts = self.normalize_all(&items).await;
        tracing::info!(
            items = items.len(),
            posts = posts.len(),
            "feed.fetch.normalized"
        );
        Ok(posts)
    }

    /// Normalize `items` with bounded concurrency, keeping input order.
    /// A panic while normalizing one item only drops that item.
    pub async fn normalize_all(&self, items: &[RawFeedItem]) -> Vec<Post> {
        let normalizer = self.normalizer.as_ref();
        stream::iter(0..items.len())
            .map(|index| {
                let item = &items[index];
                async move {
                    match AssertUnwindSafe(normalizer.normalize(item))
                        .catch_unwind()
                        .await
                    {
                        Ok(post) => post,
                        Err(_) => {
                            tracing::error!(
                                index,
                                guid = item.guid.as_deref().unwrap_or_default(),
                                "feed.normalize.panicked"
                            );
                            None
                        }
                    }
                }
            })
            .buffered(self.concurrency)
            .filter_map(|post| async move { post })
            .collect()
            .await
    }
}

/// Parse an RSS 2.0 document into raw items.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<RawFeedItem>, FeedError> {
    let channel = rss::Channel::read_from(bytes)?;
    Ok(channel.items().iter().map(raw_item).collect())
}

fn raw_item(item: &rss::Item) -> RawFeedItem {
    RawFeedItem {
        title: item.title().map(str::to_string),
        description: item.description().map(str::to_string),
        link: item.link().map(str::to_string),
        pub_date: item.pub_date().map(str::to_string),
        guid: item.guid().map(|g| g.value().to_string()),
        enclosure: item.enclosure().map(|e| Enclosure {
            url: e.url().to_string(),
            mime_type: e.mime_type().to_string(),
        }),
        media_content: media_content(item),
    }
}

fn media_content(item: &rss::Item) -> Option<MediaContent> {
    let content = item.extensions().get("media")?.get("content")?.first()?;
    Some(MediaContent {
        url: content.attrs().get("url").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageLocator;
    use crate::page::PageSource;
    use crate::timestamp::{DisplayClock, TimestampResolver};
    use async_trait::async_trait;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Trump's Truth</title>
    <link>https://trumpstruth.org</link>
    <description>All posts</description>
    <item>
      <title>[No Title] - Post from May 25, 2025</title>
      <description><![CDATA[<p>Hello <a href="https://t.co/abc"><span class="ellipsis">link</span></a> world</p>]]></description>
      <link>https://trumpstruth.org/statuses/31337</link>
      <guid>https://truthsocial.com/@realDonaldTrump/statuses/114567</guid>
      <pubDate>Sun, 25 May 2025 04:15:44 +0000</pubDate>
      <enclosure url="https://static.test/a.jpg" type="image/jpeg" length="0"/>
    </item>
    <item>
      <title>No description here</title>
      <link>https://trumpstruth.org/statuses/2</link>
      <media:content url="https://static.test/m.png" medium="image"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn items_are_mapped() {
        let items = parse_feed(FEED.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(
            first.description.as_deref(),
            Some(r#"<p>Hello <a href="https://t.co/abc"><span class="ellipsis">link</span></a> world</p>"#)
        );
        assert_eq!(
            first.guid.as_deref(),
            Some("https://truthsocial.com/@realDonaldTrump/statuses/114567")
        );
        assert_eq!(first.pub_date.as_deref(), Some("Sun, 25 May 2025 04:15:44 +0000"));
        let enclosure = first.enclosure.as_ref().unwrap();
        assert_eq!(enclosure.url, "https://static.test/a.jpg");
        assert_eq!(enclosure.mime_type, "image/jpeg");

        let second = &items[1];
        assert_eq!(second.description, None);
        assert_eq!(
            second.media_content,
            Some(MediaContent {
                url: Some("https://static.test/m.png".into()),
            })
        );
    }

    /// Page source that blows up on one post page.
    struct PanickingPages;

    #[async_trait]
    impl PageSource for PanickingPages {
        async fn fetch_page(&self, url: &str) -> Result<String, FeedError> {
            if url.ends_with("/statuses/16") {
                panic!("page renderer crashed on {url}");
            }
            Ok(String::new())
        }
    }

    fn item(id: u32, pub_date: &str) -> RawFeedItem {
        RawFeedItem {
            description: Some(format!("<p>Statement number {id} for the record</p>")),
            link: Some(format!("https://trumpstruth.org/statuses/{id}")),
            pub_date: Some(pub_date.to_string()),
            guid: Some(format!("https://truthsocial.com/@realDonaldTrump/statuses/{id}")),
            ..RawFeedItem::default()
        }
    }

    #[tokio::test]
    async fn panicking_item_is_dropped_and_order_kept() {
        let normalizer = FeedEntryNormalizer::new(
            TimestampResolver::new(Arc::new(PanickingPages)),
            ImageLocator::new("https://trumpstruth.org").unwrap(),
            DisplayClock::default(),
        );
        let client = FeedClient::new(
            HttpClient::new("https://trumpstruth.org").unwrap(),
            "https://trumpstruth.org/feed",
            normalizer,
        )
        .with_concurrency(3);

        let items = [
            item(15, "Sun, 25 May 2025 04:15:44 +0000"),
            item(16, ""),
            item(18, "Sun, 25 May 2025 03:00:00 +0000"),
        ];
        let posts = client.normalize_all(&items).await;
        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["rss_post_15", "rss_post_18"]);
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        for body in ["<rss><channel><item>", "<html><body>nope</body></html>", ""] {
            let err = parse_feed(body.as_bytes()).unwrap_err();
            assert!(matches!(err, FeedError::Parse(_)), "body: {body:?}");
        }
    }
}
