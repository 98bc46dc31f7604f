//! Best-guess image for a post.
//!
//! Feed metadata and the description are scanned first. The post page can be
//! consulted as a last resort, but only when a [`PageSource`] is attached.
use crate::clean::parse_selector;
use crate::error::FeedError;
use crate::page::PageSource;
use crate::types::{Enclosure, MediaContent};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, LazyLock};
use url::Url;

/// What the feed strategies get to look at.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageInputs<'a> {
    pub enclosure: Option<&'a Enclosure>,
    pub media: Option<&'a MediaContent>,
    pub description: &'a str,
}

type FeedStrategy = fn(&ImageInputs<'_>) -> Option<String>;

const FEED_STRATEGIES: &[FeedStrategy] = &[
    image_enclosure,
    media_content,
    img_tag,
    bare_https_image,
    bare_http_image,
];

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];
const IMAGE_KEYWORDS: &[&str] = &["media", "image", "photo"];

/// Tried in order on the post page; the first one is the OpenGraph tag.
const PAGE_IMAGE_SELECTORS: &[&str] = &[
    r#"meta[property="og:image"]"#,
    r#"img[src*="media"]"#,
    r#"img[src*="image"]"#,
    r#"img[src*="photo"]"#,
    ".post-content img",
    ".media-wrapper img",
    r#"img[alt*="Image"]"#,
    "img",
];

static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img[^>]+src=["']([^"']+)["'][^>]*>"#).unwrap());

static BARE_HTTPS_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https://[^\s<>"]+\.(?:jpg|jpeg|png|gif|webp)"#).unwrap()
});

static BARE_HTTP_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)http://[^\s<>"]+\.(?:jpg|jpeg|png|gif|webp)"#).unwrap()
});

fn image_enclosure(inputs: &ImageInputs<'_>) -> Option<String> {
    inputs
        .enclosure
        .filter(|e| e.mime_type.starts_with("image") && !e.url.is_empty())
        .map(|e| e.url.clone())
}

fn media_content(inputs: &ImageInputs<'_>) -> Option<String> {
    inputs
        .media?
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

fn img_tag(inputs: &ImageInputs<'_>) -> Option<String> {
    IMG_TAG
        .captures(inputs.description)
        .map(|caps| caps[1].to_string())
}

fn bare_https_image(inputs: &ImageInputs<'_>) -> Option<String> {
    BARE_HTTPS_IMAGE
        .find(inputs.description)
        .map(|m| m.as_str().to_string())
}

fn bare_http_image(inputs: &ImageInputs<'_>) -> Option<String> {
    BARE_HTTP_IMAGE
        .find(inputs.description)
        .map(|m| m.as_str().to_string())
}

/// Image found in the feed entry alone, without network access.
pub fn locate_in_feed(inputs: &ImageInputs<'_>) -> Option<String> {
    FEED_STRATEGIES.iter().find_map(|strategy| strategy(inputs))
}

/// Heuristic used for page candidates: an image extension or an
/// image-ish path segment anywhere in the URL.
pub fn is_valid_image_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
        || IMAGE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

pub struct ImageLocator {
    base_origin: Url,
    pages: Option<Arc<dyn PageSource>>,
    page_selectors: Vec<Selector>,
}

impl ImageLocator {
    /// `base_origin` anchors relative image paths, e.g. `https://trumpstruth.org`.
    pub fn new(base_origin: &str) -> Result<Self, FeedError> {
        let base_origin = Url::parse(base_origin)
            .map_err(|e| FeedError::Parse(format!("base origin {base_origin:?}: {e}")))?;
        if !base_origin.origin().is_tuple() {
            return Err(FeedError::Parse(format!(
                "base origin {base_origin} has no host"
            )));
        }
        let page_selectors = PAGE_IMAGE_SELECTORS
            .iter()
            .map(|src| parse_selector(src))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            base_origin,
            pages: None,
            page_selectors,
        })
    }

    /// Enable the post-page fallback. Off unless called; every miss costs a
    /// request.
    pub fn with_page_fallback(mut self, pages: Arc<dyn PageSource>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn page_fallback_enabled(&self) -> bool {
        self.pages.is_some()
    }

    pub async fn locate(
        &self,
        enclosure: Option<&Enclosure>,
        media: Option<&MediaContent>,
        description: &str,
        link: &str,
    ) -> Option<String> {
        let inputs = ImageInputs {
            enclosure,
            media,
            description,
        };
        if let Some(found) = locate_in_feed(&inputs) {
            return Some(found);
        }

        let pages = self.pages.as_ref()?;
        if link.is_empty() {
            return None;
        }
        match pages.fetch_page(link).await {
            Ok(html) => {
                let found = self.extract_page_image(&html);
                if let Some(url) = &found {
                    tracing::info!(%link, image = %url, "feed.image.from_page");
                }
                found
            }
            Err(err) => {
                tracing::warn!(%link, error = %err, "feed.image.page_fetch_failed");
                None
            }
        }
    }

    /// Scan post-page HTML: OpenGraph first, then `<img>` candidates.
    pub fn extract_page_image(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        self.page_selectors.iter().find_map(|selector| {
            document
                .select(selector)
                .filter_map(|el| {
                    let el = el.value();
                    if el.name() == "meta" {
                        el.attr("content")
                    } else {
                        el.attr("src").or_else(|| el.attr("data-src"))
                    }
                })
                .find(|candidate| is_valid_image_url(candidate))
                .map(|candidate| self.normalize_url(candidate))
        })
    }

    /// Make a page-relative image URL absolute.
    ///
    /// ```
    /// use postwatch_feed::image::ImageLocator;
    ///
    /// let locator = ImageLocator::new("https://trumpstruth.org").unwrap();
    /// assert_eq!(locator.normalize_url("/media/x.png"), "https://trumpstruth.org/media/x.png");
    /// assert_eq!(locator.normalize_url("//cdn.test/a.jpg"), "https://cdn.test/a.jpg");
    /// ```
    pub fn normalize_url(&self, url: &str) -> String {
        if url.starts_with("http") {
            return url.to_string();
        }
        if url.starts_with("//") {
            return format!("https:{url}");
        }
        let origin = self.base_origin.origin().ascii_serialization();
        if url.starts_with('/') {
            format!("{origin}{url}")
        } else {
            format!("{origin}/{url}")
        }
    }
}
