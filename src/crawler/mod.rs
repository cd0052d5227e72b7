//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - Single-attempt HTTP fetching with timeout and error classification
//! - HTML metadata and link extraction
//! - The breadth-first crawl engine with page/depth limits
//! - Structured progress observation

mod engine;
mod extractor;
mod fetcher;
mod observer;

pub use engine::{start_crawl, CrawlEngine, CrawlHandle, CrawlOptions};
pub use extractor::{extract_page, ExtractedPage};
pub use fetcher::{build_http_client, fetch_page, FetchError, FetchedPage};
pub use observer::{CollectingObserver, CrawlEvent, CrawlObserver, TracingObserver};
