use crate::discord::{DiscordWebhook, LogNotifier, Notifier};
use anyhow::{Context, Result};
use postwatch_common::PostwatchError;
use postwatch_common::observability::{LogConfig, LogFormat};
use postwatch_config::{LogSettings, PostwatchConfig};
use postwatch_feed::{
    DisplayClock, FeedClient, FeedEntryNormalizer, HttpPageSource, ImageLocator,
    NormalizerSettings, PageSource, TimestampResolver,
};
use postwatch_http::HttpClient;
use std::sync::Arc;
use std::time::Duration;

pub fn log_config(log: &LogSettings) -> Result<LogConfig> {
    let format: LogFormat = log
        .format
        .parse()
        .map_err(|e| PostwatchError::Config(format!("log.format: {e}")))?;
    Ok(LogConfig {
        app_name: "postwatch",
        log_dir: log.dir.clone(),
        emit_stderr: log.stderr,
        format,
        default_filter: log.filter.clone(),
    })
}

/// Feed client with its normalizer, sharing one HTTP client for the feed
/// and post pages.
pub fn build_feed_client(cfg: &PostwatchConfig) -> Result<FeedClient> {
    let feed = &cfg.feed;
    let mut http = HttpClient::new(&feed.base_origin)
        .with_context(|| format!("feed.base_origin {:?}", feed.base_origin))?
        .with_timeout(Duration::from_secs(feed.timeout_secs));
    if let Some(agent) = feed.user_agent.as_deref() {
        http = http.with_user_agent(agent)?;
    }

    let pages: Arc<dyn PageSource> = Arc::new(HttpPageSource::new(
        http.clone(),
        Duration::from_secs(feed.page_timeout_secs),
    ));
    let mut images = ImageLocator::new(&feed.base_origin)?;
    if feed.fetch_page_images {
        images = images.with_page_fallback(pages.clone());
    }
    let clock = DisplayClock::new(
        &cfg.display.timezone,
        cfg.display.label.clone(),
        cfg.display.pattern.clone(),
    )?;

    let normalizer = FeedEntryNormalizer::new(TimestampResolver::new(pages), images, clock)
        .with_settings(NormalizerSettings {
            title_placeholders: feed.title_placeholders.clone(),
            min_content_chars: feed.min_content_chars,
            title_min_chars: feed.title_min_chars,
        });

    Ok(FeedClient::new(http, feed.url.clone(), normalizer)
        .with_timeout(Duration::from_secs(feed.timeout_secs))
        .with_concurrency(feed.concurrency))
}

/// Discord delivery, or a logging stand-in for dry runs. A dry run does not
/// need a webhook configured.
pub fn build_notifier(cfg: &PostwatchConfig, dry_run: bool) -> Result<Arc<dyn Notifier>> {
    if dry_run {
        return Ok(Arc::new(LogNotifier));
    }
    let url = cfg
        .webhook_url()
        .map_err(|e| PostwatchError::Config(e.to_string()))?;
    let http = HttpClient::new(url)
        .context("notifier.discord_webhook_url is not a valid URL")?
        .with_timeout(Duration::from_secs(cfg.feed.timeout_secs));
    Ok(Arc::new(DiscordWebhook::new(
        http,
        url,
        cfg.notifier.username.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use postwatch_config::PostwatchConfigLoader;

    fn config(yaml: &str) -> PostwatchConfig {
        PostwatchConfigLoader::new()
            .with_yaml_str(yaml)
            .load()
            .expect("config loads")
    }

    #[test]
    fn log_settings_map_onto_log_config() {
        let cfg = config("log:\n  format: json\n  stderr: false\n  filter: debug");
        let log = log_config(&cfg.log).unwrap();
        assert_eq!(log.format, LogFormat::Json);
        assert!(!log.emit_stderr);
        assert_eq!(log.default_filter, "debug");

        let bad = config("log:\n  format: xml");
        let err = log_config(&bad.log).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PostwatchError>(),
            Some(PostwatchError::Config(m)) if m.contains("xml")
        ));
    }

    #[test]
    fn pipeline_builds_from_defaults() {
        let cfg = PostwatchConfigLoader::new().load().expect("defaults load");
        let client = build_feed_client(&cfg).unwrap();
        assert_eq!(client.feed_url(), "https://trumpstruth.org/feed");
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let cfg = config("display:\n  timezone: Mars/Olympus");
        assert!(build_feed_client(&cfg).is_err());
    }

    #[test]
    fn webhook_required_unless_dry_run() {
        let cfg = config("notifier:\n  discord_webhook_url: \"\"");
        let err = build_notifier(&cfg, false).err().expect("webhook is required");
        assert!(matches!(
            err.downcast_ref::<PostwatchError>(),
            Some(PostwatchError::Config(_))
        ));
        assert!(build_notifier(&cfg, true).is_ok());

        let cfg = config("notifier:\n  discord_webhook_url: https://discord.test/api/webhooks/1/t");
        assert!(build_notifier(&cfg, false).is_ok());
    }
}
