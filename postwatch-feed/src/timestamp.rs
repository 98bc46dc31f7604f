//! Publish-time resolution.
//!
//! Precedence: the item's `pubDate`, then the post page, then "now".
//! Each stage is an ordered list of strategies; the first `Some` wins.
use crate::clean::parse_selector;
use crate::error::FeedError;
use crate::page::PageSource;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use scraper::{Html, Selector};
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

type DateStrategy = fn(&str) -> Option<DateTime<FixedOffset>>;
type PageStrategy = fn(&Html) -> Option<DateTime<FixedOffset>>;

/// `pubDate` layouts, most common first.
const PUB_DATE_STRATEGIES: &[DateStrategy] = &[rfc822, iso_offset, spaced_offset, named_zone];

/// Layouts seen in page markup and `datetime` attributes.
const PAGE_TIME_STRATEGIES: &[DateStrategy] = &[rfc3339, iso_offset, naive_page_time];

const PAGE_STRATEGIES: &[PageStrategy] = &[
    time_attribute,
    time_text,
    iso_in_markup,
    us_date_in_markup,
];

const NAIVE_PAGE_FORMATS: &[&str] = &[
    "%b %d, %Y · %I:%M %p",
    "%B %d, %Y · %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%Y-%m-%dT%H:%M:%S",
];

/// Offset assumed for page times that carry none (UTC-8, no DST).
const PAGE_LOCAL_OFFSET_SECS: i32 = 8 * 3600;

const TIME_SELECTORS: &[&str] = &[
    "time[datetime]",
    r#"[data-testid*="time"]"#,
    ".timestamp",
    ".post-time",
    ".created-at",
    "time",
];

static COMPILED_TIME_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    TIME_SELECTORS
        .iter()
        .filter_map(|src| match parse_selector(src) {
            Ok(selector) => Some(selector),
            Err(err) => {
                tracing::warn!(error = %err, "feed.timestamp.selector_skipped");
                None
            }
        })
        .collect()
});

static ISO_IN_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})").unwrap()
});

static US_DATE_IN_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z]{3,9}\s+\d{1,2},\s+\d{4}\s+·\s+\d{1,2}:\d{2}\s+[AP]M").unwrap()
});

// ==============================
// pubDate cascade
// ==============================

/// Parse a feed `pubDate`, trying each known layout in order.
///
/// ```
/// use postwatch_feed::timestamp::parse_pub_date;
///
/// let ts = parse_pub_date("Sun, 25 May 2025 04:15:44 +0000").unwrap();
/// assert_eq!(ts.to_rfc3339(), "2025-05-25T04:15:44+00:00");
/// ```
pub fn parse_pub_date(raw: &str) -> Result<DateTime<FixedOffset>, FeedError> {
    let text = strip_cdata(raw);
    PUB_DATE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(text))
        .ok_or_else(|| FeedError::FormatMismatch(text.to_string()))
}

fn strip_cdata(raw: &str) -> &str {
    let text = raw.trim();
    let text = text.strip_prefix("<![CDATA[").unwrap_or(text);
    text.strip_suffix("]]>").unwrap_or(text).trim()
}

/// `Sun, 25 May 2025 04:15:44 +0000`. The weekday is optional and not
/// cross-checked against the date.
fn rfc822(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(without_weekday(text), "%d %b %Y %H:%M:%S %z").ok()
}

/// `2025-05-25T04:15:44+0000`, `...+00:00` or `...Z`.
fn iso_offset(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .or_else(|| rfc3339(text))
}

/// `2025-05-25 04:15:44 +0000`
fn spaced_offset(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S %z").ok()
}

/// `Sun, 25 May 2025 04:15:44 GMT` and the North American abbreviations.
fn named_zone(text: &str) -> Option<DateTime<FixedOffset>> {
    let (stamp, zone) = text.rsplit_once(' ')?;
    let offset = zone_offset(zone)?;
    NaiveDateTime::parse_from_str(without_weekday(stamp), "%d %b %Y %H:%M:%S")
        .ok()?
        .and_local_timezone(offset)
        .single()
}

fn without_weekday(text: &str) -> &str {
    match text.split_once(',') {
        Some((day, rest)) if day.chars().all(|c| c.is_ascii_alphabetic()) => rest.trim_start(),
        _ => text,
    }
}

fn zone_offset(zone: &str) -> Option<FixedOffset> {
    let hours = match zone.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

// ==============================
// Page cascade
// ==============================

/// Parse a time string lifted from a post page.
///
/// Values without an offset are taken to be UTC-8.
pub fn parse_page_time(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    PAGE_TIME_STRATEGIES.iter().find_map(|strategy| strategy(&text))
}

fn rfc3339(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok()
}

fn naive_page_time(text: &str) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::west_opt(PAGE_LOCAL_OFFSET_SECS)?;
    NAIVE_PAGE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())?
        .and_local_timezone(offset)
        .single()
}

/// Find the publish time in a post page's HTML.
pub fn extract_page_time(html: &str) -> Option<DateTime<FixedOffset>> {
    let document = Html::parse_document(html);
    PAGE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(&document))
}

/// First time-like element carrying a machine-readable `datetime`.
fn time_attribute(document: &Html) -> Option<DateTime<FixedOffset>> {
    COMPILED_TIME_SELECTORS.iter().find_map(|selector| {
        let element = document.select(selector).next()?;
        parse_page_time(element.value().attr("datetime")?)
    })
}

/// First time-like element whose visible text reads like a clock time.
fn time_text(document: &Html) -> Option<DateTime<FixedOffset>> {
    COMPILED_TIME_SELECTORS.iter().find_map(|selector| {
        let element = document.select(selector).next()?;
        let text = element.text().collect::<String>();
        if text.contains("AM") || text.contains("PM") {
            parse_page_time(&text)
        } else {
            None
        }
    })
}

fn iso_in_markup(document: &Html) -> Option<DateTime<FixedOffset>> {
    let markup = serialized_markup(document);
    ISO_IN_PAGE
        .find_iter(&markup)
        .find_map(|m| parse_page_time(m.as_str()))
}

fn us_date_in_markup(document: &Html) -> Option<DateTime<FixedOffset>> {
    let markup = serialized_markup(document);
    US_DATE_IN_PAGE
        .find_iter(&markup)
        .find_map(|m| parse_page_time(m.as_str()))
}

/// The document written back out as HTML. Serialization re-escapes U+00A0 as
/// `&nbsp;`, which would hide `May 24, 2025&nbsp;·&nbsp;9:15 PM` from the
/// whitespace-separated patterns.
fn serialized_markup(document: &Html) -> String {
    document
        .root_element()
        .html()
        .replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
}

// ==============================
// Resolver
// ==============================

/// Resolves a post's publish instant. Never fails; the last resort is the
/// current time.
#[derive(Clone)]
pub struct TimestampResolver {
    pages: Option<Arc<dyn PageSource>>,
}

impl TimestampResolver {
    /// Resolver that may fetch the post page when `pubDate` is unusable.
    pub fn new(pages: Arc<dyn PageSource>) -> Self {
        Self { pages: Some(pages) }
    }

    /// Resolver that never touches the network.
    pub fn offline() -> Self {
        Self { pages: None }
    }

    pub async fn resolve(&self, pub_date: &str, guid: &str, link: &str) -> DateTime<FixedOffset> {
        if !strip_cdata(pub_date).is_empty() {
            match parse_pub_date(pub_date) {
                Ok(ts) => return ts,
                Err(err) => tracing::warn!(%guid, error = %err, "feed.timestamp.pub_date_unparsed"),
            }
        } else {
            tracing::warn!(%guid, "feed.timestamp.pub_date_missing");
        }

        if let Some(ts) = self.from_page(guid, link).await {
            return ts;
        }

        tracing::debug!(%guid, "feed.timestamp.now_fallback");
        Utc::now().fixed_offset()
    }

    async fn from_page(&self, guid: &str, link: &str) -> Option<DateTime<FixedOffset>> {
        let pages = self.pages.as_ref()?;
        if link.is_empty() {
            return None;
        }
        match pages.fetch_page(link).await {
            Ok(html) => {
                let found = extract_page_time(&html);
                match found {
                    Some(ts) => tracing::info!(%guid, %link, timestamp = %ts.to_rfc3339(), "feed.timestamp.from_page"),
                    None => tracing::debug!(%guid, %link, "feed.timestamp.page_without_time"),
                }
                found
            }
            Err(err) => {
                tracing::warn!(%guid, %link, error = %err, "feed.timestamp.page_fetch_failed");
                None
            }
        }
    }
}

// ==============================
// Display
// ==============================

/// Renders instants in a fixed display zone, e.g.
/// `2025年05月24日 21:15 (洛杉矶时间)`.
#[derive(Debug, Clone)]
pub struct DisplayClock {
    tz: Tz,
    label: String,
    pattern: String,
}

impl Default for DisplayClock {
    fn default() -> Self {
        Self {
            tz: Tz::America__Los_Angeles,
            label: "洛杉矶时间".to_string(),
            pattern: "%Y年%m月%d日 %H:%M".to_string(),
        }
    }
}

impl DisplayClock {
    /// `timezone` is an IANA name such as `America/Los_Angeles`.
    pub fn new(
        timezone: &str,
        label: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Result<Self, FeedError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|e| FeedError::Parse(format!("unknown timezone {timezone:?}: {e}")))?;
        Ok(Self {
            tz,
            label: label.into(),
            pattern: pattern.into(),
        })
    }

    /// Empty string when the pattern cannot be rendered.
    pub fn format(&self, ts: &DateTime<FixedOffset>) -> String {
        let local = ts.with_timezone(&self.tz);
        let mut out = String::new();
        if write!(out, "{}", local.format(&self.pattern)).is_err() {
            tracing::debug!(pattern = %self.pattern, "feed.timestamp.format_failed");
            return String::new();
        }
        if !self.label.is_empty() {
            out.push_str(" (");
            out.push_str(&self.label);
            out.push(')');
        }
        out
    }
}
