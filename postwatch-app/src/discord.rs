//! Delivery of posts to Discord.
use async_trait::async_trait;
use postwatch_common::PostwatchError;
use postwatch_feed::Post;
use postwatch_http::{HttpClient, RequestOpts};
use serde::Serialize;

/// Discord rejects embed descriptions above this many characters.
const DESCRIPTION_LIMIT: usize = 4096;
const EMBED_COLOR: u32 = 0x1DA1F2;

/// Something that forwards a post to its audience.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, post: &Post) -> Result<(), PostwatchError>;
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    username: &'a str,
    embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    timestamp: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<Footer<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage<'a>>,
}

#[derive(Debug, Serialize)]
struct Footer<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbedImage<'a> {
    url: &'a str,
}

/// Posts each [`Post`] as a single embed to a Discord webhook.
pub struct DiscordWebhook {
    http: HttpClient,
    url: String,
    username: String,
}

impl DiscordWebhook {
    pub fn new(http: HttpClient, url: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            username: username.into(),
        }
    }

    fn message<'a>(&'a self, post: &'a Post) -> WebhookMessage<'a> {
        let embed = Embed {
            description: truncate_chars(&post.content, DESCRIPTION_LIMIT),
            url: Some(post.link.as_str()).filter(|l| !l.is_empty()),
            timestamp: post.timestamp_iso(),
            color: EMBED_COLOR,
            footer: Some(post.formatted_time.as_str())
                .filter(|t| !t.is_empty())
                .map(|text| Footer { text }),
            image: post.image.as_deref().map(|url| EmbedImage { url }),
        };
        WebhookMessage {
            username: &self.username,
            embeds: vec![embed],
        }
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn notify(&self, post: &Post) -> Result<(), PostwatchError> {
        let message = self.message(post);
        self.http
            .post_json_no_content(
                &self.url,
                &message,
                RequestOpts::absolute().not_idempotent(),
            )
            .await
            .map_err(|e| PostwatchError::Notify(e.to_string()))?;
        tracing::info!(id = %post.id, "notify.discord.sent");
        Ok(())
    }
}

/// Logs posts instead of sending them (`--dry-run`).
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, post: &Post) -> Result<(), PostwatchError> {
        let rendered = serde_json::to_string(post)
            .map_err(|e| PostwatchError::Notify(format!("render post: {e}")))?;
        tracing::info!(id = %post.id, post = %rendered, "notify.dry_run");
        Ok(())
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit.saturating_sub(1)) {
        Some((idx, _)) if text[idx..].chars().count() > 1 => {
            let mut cut = text[..idx].to_string();
            cut.push('…');
            cut
        }
        _ => text.to_string(),
    }
}
