//! HTML description -> plain text.
//!
//! Anchors become inline `[text](href)` references, paragraphs are unwrapped,
//! and each surviving line is separated by a blank line.
use crate::error::FeedError;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Leftovers some feeds leak into item text, removed in order.
static ARTIFACTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"\[CDATA\[", r"\]\]", r"RT:\s*https://\S+"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// Parse a CSS selector, mapping the borrowed parser error into [`FeedError`].
pub(crate) fn parse_selector(src: &str) -> Result<Selector, FeedError> {
    Selector::parse(src).map_err(|e| FeedError::Selector {
        selector: src.to_string(),
        message: e.to_string(),
    })
}

/// Clean a description fragment.
///
/// Never fails: if the fragment cannot be processed it is returned as given.
pub fn clean(html: &str) -> String {
    match try_clean(html) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(error = %err, "feed.clean.failed");
            html.to_string()
        }
    }
}

fn try_clean(html: &str) -> Result<String, FeedError> {
    let ellipsis = parse_selector("span.ellipsis")?;
    let unwrapped = html.replace("<![CDATA[", "").replace("]]>", "");
    let fragment = Html::parse_fragment(&unwrapped);

    let mut text = String::with_capacity(unwrapped.len());
    render(fragment.root_element(), &ellipsis, &mut text);

    let lines: Vec<String> = text
        .split('\n')
        .map(|line| WHITESPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    let mut joined = lines.join("\n\n");

    for pattern in ARTIFACTS.iter() {
        joined = pattern.replace_all(&joined, "").into_owned();
    }
    Ok(joined.trim().to_string())
}

fn render(element: ElementRef<'_>, ellipsis: &Selector, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let href = child.value().attr("href").filter(|h| !h.is_empty());
                match (child.value().name(), href) {
                    ("a", Some(href)) => {
                        let display = child
                            .select(ellipsis)
                            .next()
                            .map(|span| format!("{}......", span.text().collect::<String>()))
                            .unwrap_or_else(|| href.to_string());
                        out.push_str(&format!(" [{display}]({href})"));
                    }
                    // paragraphs and anything else contribute their children in place
                    _ => render(child, ellipsis, out),
                }
            }
            _ => {}
        }
    }
}
