use regex::Regex;
use std::sync::LazyLock;

const ID_PREFIX: &str = "rss_post_";
const HASHED_PREFIX_CHARS: usize = 100;

static STATUS_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/statuses/(\d+)").unwrap());

/// Numeric status id embedded in a guid such as
/// `https://truthsocial.com/@realDonaldTrump/statuses/114567`.
pub fn status_id(guid: &str) -> Option<&str> {
    STATUS_ID
        .captures(guid)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Stable post identifier.
///
/// Uses the status id when the guid carries one. Otherwise falls back to a
/// BLAKE3 hash of the first 100 characters of `content`, so two posts sharing
/// that prefix collide.
///
/// ```
/// use postwatch_feed::identity::generate_post_id;
///
/// let id = generate_post_id("https://truthsocial.com/@x/statuses/42", "anything");
/// assert_eq!(id, "rss_post_42");
/// ```
pub fn generate_post_id(guid: &str, content: &str) -> String {
    if let Some(id) = status_id(guid) {
        return format!("{ID_PREFIX}{id}");
    }
    let head: String = content.chars().take(HASHED_PREFIX_CHARS).collect();
    let digest = blake3::hash(head.as_bytes());
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest.as_bytes()[..8]);
    format!("{ID_PREFIX}{}", u64::from_le_bytes(first))
}
