//! Storage traits and error types
//!
//! This module defines the trait interface for the page store and
//! associated error types.

use crate::state::PageStatus;
use crate::storage::{PageRecord, PageSearchHit, RunRecord, RunSummary};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for page store implementations
///
/// All page mutations go through the transition methods below. Each one
/// issues a single-row update naming exactly the fields that change, so
/// writes to unrelated fields from concurrent runs are never clobbered.
/// Every mutation refreshes `updated_at`.
pub trait PageStore {
    // ===== Run Management =====

    /// Creates a new crawl run in the Running state
    ///
    /// # Arguments
    ///
    /// * `seed_url` - The URL the run starts from
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, seed_url: &str, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    /// Marks a run as failed with a finish timestamp
    fn fail_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Page Management =====

    /// Gets the page for `url`, creating it as Pending if absent
    ///
    /// A newly created page starts Pending with empty metadata and is
    /// associated with `run_id`. For an existing page only the run
    /// association is refreshed; status and metadata are left untouched.
    ///
    /// # Returns
    ///
    /// The page record and whether it was created by this call
    fn get_or_create_page(
        &mut self,
        url: &str,
        domain: &str,
        run_id: i64,
    ) -> StorageResult<(PageRecord, bool)>;

    /// Gets a page by ID
    fn get_page(&self, page_id: i64) -> StorageResult<PageRecord>;

    /// Gets a page by URL
    fn get_page_by_url(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    // ===== Status Transitions =====

    /// Status → Processing; clears error_message
    fn mark_processing(&mut self, page_id: i64) -> StorageResult<()>;

    /// Status → Completed; stores title (truncated to the store's bound),
    /// summary, and html_content; clears error_message
    fn mark_completed(
        &mut self,
        page_id: i64,
        title: &str,
        summary: &str,
        html_content: &str,
    ) -> StorageResult<()>;

    /// Status → Failed; stores the error and clears html_content
    fn mark_failed(&mut self, page_id: i64, error: &str) -> StorageResult<()>;

    /// Status → Pending; clears title, summary, html_content, and
    /// error_message, and re-points the page at `run_id`
    ///
    /// Used when a previously-terminal page re-enters a new run's frontier.
    fn reset_to_pending(&mut self, page_id: i64, run_id: i64) -> StorageResult<()>;

    /// Status → Completed, but only if the page is currently Processing
    ///
    /// A no-op otherwise. Used at the end of a run to close out a seed the
    /// loop never revisited after its own fetch.
    fn complete_if_processing(&mut self, page_id: i64) -> StorageResult<()>;

    // ===== Queries =====

    /// Aggregates page counts for one run
    fn run_summary(&self, run_id: i64) -> StorageResult<RunSummary>;

    /// Searches completed pages by keyword in title or summary
    ///
    /// The match is a case-insensitive substring; `domain` optionally
    /// narrows the result to one site (case-insensitive equality).
    fn search_pages(
        &self,
        keyword: &str,
        domain: Option<&str>,
    ) -> StorageResult<Vec<PageSearchHit>>;

    /// Counts pages in a given status across the whole store
    fn count_pages_by_status(&self, status: PageStatus) -> StorageResult<u64>;

    /// Gets total page count across the whole store
    fn count_total_pages(&self) -> StorageResult<u64>;
}
