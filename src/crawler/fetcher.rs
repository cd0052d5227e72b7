//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the shared HTTP client with a descriptive user agent
//! - Single-attempt GET requests with timeout
//! - Content-Type checking
//! - Error classification
//!
//! There are no retries: a page gets exactly one fetch per dequeue, and
//! any failure is reported to the caller as a typed error.

use crate::config::{CrawlerConfig, UserAgentConfig};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// A fetch failure, classified for the engine's failure handling
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Fetch failed: request timed out")]
    Timeout,

    #[error("Fetch failed: HTTP status {0}")]
    HttpStatus(u16),

    #[error("Skipped non-HTML content (Content-Type: {0})")]
    NotHtml(String),

    #[error("Fetch failed: {0}")]
    Network(String),
}

/// A successfully fetched HTML page
#[derive(Debug)]
pub struct FetchedPage {
    /// Decoded page body
    pub body: String,

    /// Content-Type header value as received
    pub content_type: String,
}

/// Builds the HTTP client shared by all crawl runs
///
/// The client carries a `Name/Version (+ContactURL; ContactEmail)` user
/// agent, applies the configured timeout to connects and full requests,
/// and follows redirects transparently (reqwest's default policy).
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{} (+{}; {})",
        user_agent.crawler_name,
        user_agent.crawler_version,
        user_agent.contact_url,
        user_agent.contact_email
    );

    let timeout = Duration::from_secs(crawler.request_timeout_secs);

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a single URL, returning the decoded body on success
///
/// # Failure classification
///
/// | Condition | Result |
/// |-----------|--------|
/// | Timeout | `FetchError::Timeout` |
/// | Non-2xx final status | `FetchError::HttpStatus` |
/// | Content-Type without `text/html` | `FetchError::NotHtml` |
/// | DNS / connect / TLS / body read error | `FetchError::Network` |
///
/// Body decoding honors the charset in the Content-Type header and falls
/// back to lossy UTF-8 when it is absent or wrong.
pub async fn fetch_page(client: &Client, url: &str) -> Result<FetchedPage, FetchError> {
    let response = client.get(url).send().await.map_err(classify_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !is_html_content_type(&content_type) {
        return Err(FetchError::NotHtml(content_type));
    }

    let body = response.text().await.map_err(classify_error)?;

    Ok(FetchedPage { body, content_type })
}

/// Returns true if a Content-Type header value denotes an HTML document
fn is_html_content_type(content_type: &str) -> bool {
    content_type.to_lowercase().contains("text/html")
}

fn classify_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(error.to_string())
    }
}
