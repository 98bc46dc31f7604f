mod common;

use postwatch_feed::{
    DisplayClock, FeedClient, FeedEntryNormalizer, FeedError, HttpPageSource, ImageLocator,
    TimestampResolver,
};
use postwatch_http::HttpClient;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_for(server: &MockServer) -> HttpClient {
    HttpClient::new(&server.uri())
        .expect("mock server uri parses")
        .with_timeout(Duration::from_secs(2))
        .with_retries(0)
}

fn feed_client(server: &MockServer, page_images: bool) -> FeedClient {
    let http = http_for(server);
    let pages = Arc::new(HttpPageSource::new(http.clone(), Duration::from_secs(2)));
    let mut images = ImageLocator::new("https://trumpstruth.org").expect("origin");
    if page_images {
        images = images.with_page_fallback(pages.clone());
    }
    let normalizer = FeedEntryNormalizer::new(
        TimestampResolver::new(pages),
        images,
        DisplayClock::default(),
    );
    FeedClient::new(http, format!("{}/feed", server.uri()), normalizer).with_concurrency(2)
}

fn feed_xml(base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Trump's Truth</title>
    <link>https://trumpstruth.org</link>
    <description>All posts</description>
    <item>
      <title>[No Title] - Post from May 25, 2025</title>
      <description><![CDATA[<p>Hello <a href="https://t.co/abc"><span class="ellipsis">link</span></a> world</p>]]></description>
      <link>{base}/statuses/1</link>
      <guid>https://truthsocial.com/@realDonaldTrump/statuses/114567</guid>
      <pubDate>Sun, 25 May 2025 04:15:44 +0000</pubDate>
      <enclosure url="https://static.test/a.jpg" type="image/jpeg" length="0"/>
    </item>
    <item>
      <title>[No Title] - Post from May 24, 2025</title>
      <description><![CDATA[<p>A post whose date only lives on its page</p>]]></description>
      <link>{base}/statuses/2</link>
      <guid>https://truthsocial.com/@realDonaldTrump/statuses/114566</guid>
      <pubDate></pubDate>
    </item>
    <item>
      <title>[No Title] - Post from May 24, 2025</title>
      <description><![CDATA[<p><a href="https://t.co/"></a></p>]]></description>
      <guid>https://truthsocial.com/@realDonaldTrump/statuses/114565</guid>
      <pubDate>Sat, 24 May 2025 10:00:00 +0000</pubDate>
    </item>
    <item>
      <title>[No Title] - Post from May 24, 2025</title>
      <description><![CDATA[<p>ok</p>]]></description>
      <guid>https://truthsocial.com/@realDonaldTrump/statuses/114564</guid>
      <pubDate>Sat, 24 May 2025 09:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#
    )
}

async fn mount_feed(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn feed_items_become_ordered_posts() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    mount_feed(&server, feed_xml(&server.uri())).await;
    Mock::given(method("GET"))
        .and(path("/statuses/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><article><time datetime="2025-05-24T18:02:11.000Z">May 24</time></article></body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let posts = feed_client(&server, false)
        .fetch_posts()
        .await
        .expect("feed parses");

    // the link-only item survives thanks to its markdown rendering; "ok" does not
    let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["rss_post_114567", "rss_post_114566", "rss_post_114565"]);

    let first = &posts[0];
    assert_eq!(first.content, "Hello [link......](https://t.co/abc) world");
    assert_eq!(first.timestamp_iso(), "2025-05-25T04:15:44+00:00");
    assert_eq!(first.formatted_time, "2025年05月24日 21:15 (洛杉矶时间)");
    assert_eq!(first.image.as_deref(), Some("https://static.test/a.jpg"));

    let second = &posts[1];
    assert_eq!(second.timestamp_iso(), "2025-05-24T18:02:11+00:00");
    assert_eq!(second.image, None);
    assert_eq!(second.link, format!("{}/statuses/2", server.uri()));
}

#[tokio::test]
async fn page_images_are_used_only_when_enabled() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    let feed = format!(
        r#"<rss version="2.0"><channel><title>t</title><link>https://x.test</link><description>d</description>
        <item>
          <description>&lt;p&gt;A post with its picture on the page&lt;/p&gt;</description>
          <link>{}/statuses/9</link>
          <guid>https://truthsocial.com/@u/statuses/9</guid>
          <pubDate>Sun, 25 May 2025 04:15:44 +0000</pubDate>
        </item></channel></rss>"#,
        server.uri()
    );
    mount_feed(&server, feed).await;
    Mock::given(method("GET"))
        .and(path("/statuses/9"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><meta property="og:image" content="/media/og.png"></head></html>"#,
        ))
        .mount(&server)
        .await;

    let without = feed_client(&server, false).fetch_posts().await.unwrap();
    assert_eq!(without.len(), 1);
    assert_eq!(without[0].image, None);

    let with = feed_client(&server, true).fetch_posts().await.unwrap();
    assert_eq!(
        with[0].image.as_deref(),
        Some("https://trumpstruth.org/media/og.png")
    );
}

#[tokio::test]
async fn unreachable_feed_yields_no_posts() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = feed_client(&server, false);
    let posts = client.fetch_posts().await.expect("fetch failures are soft");
    assert!(posts.is_empty());
    assert!(matches!(
        client.fetch_items().await,
        Err(FeedError::Fetch(_))
    ));
}

#[tokio::test]
async fn malformed_feed_is_a_hard_error() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    mount_feed(&server, "<rss><channel><item><title>cut".to_string()).await;

    let err = feed_client(&server, false)
        .fetch_posts()
        .await
        .expect_err("parse failures propagate");
    assert!(matches!(err, FeedError::Parse(_)));
}

#[tokio::test]
async fn failed_page_fetch_falls_back_to_now() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    let feed = format!(
        r#"<rss version="2.0"><channel><title>t</title><link>https://x.test</link><description>d</description>
        <item>
          <description>Text long enough to keep</description>
          <link>{}/statuses/404</link>
          <guid>https://truthsocial.com/@u/statuses/404</guid>
        </item></channel></rss>"#,
        server.uri()
    );
    mount_feed(&server, feed).await;

    let before = chrono::Utc::now();
    let posts = feed_client(&server, false).fetch_posts().await.unwrap();
    assert_eq!(posts.len(), 1);
    let delta = posts[0].timestamp.with_timezone(&chrono::Utc) - before;
    assert!(delta.num_seconds().abs() <= 5);
}
