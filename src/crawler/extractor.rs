//! HTML metadata and link extraction
//!
//! This module parses fetched HTML to extract the page title, the meta
//! description, and the raw set of anchor hrefs. Extraction never fails:
//! malformed markup degrades to empty results, and link filtering happens
//! later in `url::filter`.

use scraper::{Html, Selector};
use std::collections::BTreeSet;

/// Metadata and raw links extracted from one HTML page
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// Trimmed text of the first `<title>` element, or empty
    pub title: String,

    /// Trimmed `content` of `<meta name="description">`, or empty
    pub summary: String,

    /// Deduplicated, trimmed, non-empty href values of all anchors
    pub hrefs: BTreeSet<String>,
}

/// Parses HTML content and extracts title, summary, and raw hrefs
///
/// The hrefs are returned exactly as written in the markup; resolving and
/// filtering them against the crawl scope is the caller's job.
pub fn extract_page(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    ExtractedPage {
        title: extract_title(&document),
        summary: extract_summary(&document),
        hrefs: extract_hrefs(&document),
    }
}

/// Extracts the trimmed text content of the first title element
fn extract_title(document: &Html) -> String {
    if let Ok(selector) = Selector::parse("title") {
        document
            .select(&selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    } else {
        String::new()
    }
}

/// Extracts the trimmed content attribute of the description meta tag
fn extract_summary(document: &Html) -> String {
    if let Ok(selector) = Selector::parse(r#"meta[name="description"]"#) {
        document
            .select(&selector)
            .next()
            .and_then(|element| element.value().attr("content"))
            .map(|content| content.trim().to_string())
            .unwrap_or_default()
    } else {
        String::new()
    }
}

/// Collects every non-empty anchor href, trimmed and deduplicated
fn extract_hrefs(document: &Html) -> BTreeSet<String> {
    let mut hrefs = BTreeSet::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                let href = href.trim();
                if !href.is_empty() {
                    hrefs.insert(href.to_string());
                }
            }
        }
    }

    hrefs
}
