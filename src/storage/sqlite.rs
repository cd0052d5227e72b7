//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the PageStore
//! trait. Every status transition is a single-row UPDATE, so concurrent
//! runs sharing the store interleave at row granularity only.

use crate::state::PageStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PageStore, StorageError, StorageResult};
use crate::storage::{PageRecord, PageSearchHit, RunRecord, RunStatus, RunSummary, MAX_TITLE_LEN};
use crate::CrawlError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite page store backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn row_to_page(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
        Ok(PageRecord {
            id: row.get(0)?,
            url: row.get(1)?,
            domain: row.get(2)?,
            title: row.get(3)?,
            summary: row.get(4)?,
            html_content: row.get(5)?,
            status: PageStatus::from_db_string(&row.get::<_, String>(6)?)
                .unwrap_or(PageStatus::Failed),
            error_message: row.get(7)?,
            crawled_at: row.get(8)?,
            updated_at: row.get(9)?,
            last_run_id: row.get(10)?,
        })
    }
}

const PAGE_COLUMNS: &str = "id, url, domain, title, summary, html_content, status, \
                            error_message, crawled_at, updated_at, last_run_id";

impl PageStore for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, seed_url: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (seed_url, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![seed_url, now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let mut stmt = self.conn.prepare(
            "SELECT id, seed_url, started_at, finished_at, config_hash, status
             FROM runs WHERE id = ?1",
        )?;

        let run = stmt
            .query_row(params![run_id], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    seed_url: row.get(1)?,
                    started_at: row.get(2)?,
                    finished_at: row.get(3)?,
                    config_hash: row.get(4)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
                        .unwrap_or(RunStatus::Running),
                })
            })
            .map_err(|_| StorageError::RunNotFound(run_id))?;

        Ok(run)
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    fn fail_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Failed.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Page Management =====

    fn get_or_create_page(
        &mut self,
        url: &str,
        domain: &str,
        run_id: i64,
    ) -> StorageResult<(PageRecord, bool)> {
        if let Some(existing) = self.get_page_by_url(url)? {
            // Keep the run association current; everything else is the
            // caller's business (reset_to_pending handles stale pages)
            let now = Utc::now().to_rfc3339();
            self.conn.execute(
                "UPDATE pages SET last_run_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![run_id, now, existing.id],
            )?;
            let page = self.get_page(existing.id)?;
            return Ok((page, false));
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO pages (url, domain, status, crawled_at, updated_at, last_run_id)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
            params![url, domain, PageStatus::Pending.to_db_string(), now, run_id],
        )?;

        let page = self.get_page(self.conn.last_insert_rowid())?;
        Ok((page, true))
    }

    fn get_page(&self, page_id: i64) -> StorageResult<PageRecord> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS))?;

        let page = stmt
            .query_row(params![page_id], Self::row_to_page)
            .map_err(|_| StorageError::PageNotFound(format!("Page ID {}", page_id)))?;

        Ok(page)
    }

    fn get_page_by_url(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM pages WHERE url = ?1", PAGE_COLUMNS))?;

        let page = stmt
            .query_row(params![url], Self::row_to_page)
            .optional()?;

        Ok(page)
    }

    // ===== Status Transitions =====

    fn mark_processing(&mut self, page_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE pages SET status = ?1, error_message = NULL, updated_at = ?2 WHERE id = ?3",
            params![PageStatus::Processing.to_db_string(), now, page_id],
        )?;
        Ok(())
    }

    fn mark_completed(
        &mut self,
        page_id: i64,
        title: &str,
        summary: &str,
        html_content: &str,
    ) -> StorageResult<()> {
        let title: String = title.chars().take(MAX_TITLE_LEN).collect();
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE pages SET status = ?1, title = ?2, summary = ?3, html_content = ?4,
             error_message = NULL, updated_at = ?5 WHERE id = ?6",
            params![
                PageStatus::Completed.to_db_string(),
                title,
                summary,
                html_content,
                now,
                page_id
            ],
        )?;
        Ok(())
    }

    fn mark_failed(&mut self, page_id: i64, error: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE pages SET status = ?1, error_message = ?2, html_content = NULL,
             updated_at = ?3 WHERE id = ?4",
            params![PageStatus::Failed.to_db_string(), error, now, page_id],
        )?;
        Ok(())
    }

    fn reset_to_pending(&mut self, page_id: i64, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE pages SET status = ?1, title = '', summary = '', html_content = NULL,
             error_message = NULL, last_run_id = ?2, updated_at = ?3 WHERE id = ?4",
            params![PageStatus::Pending.to_db_string(), run_id, now, page_id],
        )?;
        Ok(())
    }

    fn complete_if_processing(&mut self, page_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE pages SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                PageStatus::Completed.to_db_string(),
                now,
                page_id,
                PageStatus::Processing.to_db_string()
            ],
        )?;
        Ok(())
    }

    // ===== Queries =====

    fn run_summary(&self, run_id: i64) -> StorageResult<RunSummary> {
        // Ensure the run exists so a bad ID is an error, not an empty summary
        self.get_run(run_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM pages WHERE last_run_id = ?1 GROUP BY status",
        )?;

        let mut status_counts: HashMap<PageStatus, u64> = HashMap::new();
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status_str, count) = row?;
            if let Some(status) = PageStatus::from_db_string(&status_str) {
                status_counts.insert(status, count as u64);
            }
        }

        let total_pages: u64 = status_counts.values().sum();
        let is_processing = status_counts
            .iter()
            .any(|(status, count)| status.is_active() && *count > 0);

        Ok(RunSummary {
            run_id,
            total_pages,
            status_counts,
            is_processing,
        })
    }

    fn search_pages(
        &self,
        keyword: &str,
        domain: Option<&str>,
    ) -> StorageResult<Vec<PageSearchHit>> {
        let pattern = format!("%{}%", keyword.to_lowercase());

        let base = "SELECT url, title, summary, domain, updated_at FROM pages
                    WHERE status = 'completed'
                    AND (LOWER(title) LIKE ?1 OR LOWER(summary) LIKE ?1)";

        let map_row = |row: &Row<'_>| {
            Ok(PageSearchHit {
                url: row.get(0)?,
                title: row.get(1)?,
                summary: row.get(2)?,
                domain: row.get(3)?,
                updated_at: row.get(4)?,
            })
        };

        let mut hits = Vec::new();
        match domain {
            Some(d) => {
                let sql = format!(
                    "{} AND LOWER(domain) = LOWER(?2) ORDER BY updated_at DESC",
                    base
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![pattern, d], map_row)?;
                for row in rows {
                    hits.push(row?);
                }
            }
            None => {
                let sql = format!("{} ORDER BY updated_at DESC", base);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![pattern], map_row)?;
                for row in rows {
                    hits.push(row?);
                }
            }
        }

        Ok(hits)
    }

    fn count_pages_by_status(&self, status: PageStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_total_pages(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_run() -> (SqliteStorage, i64) {
        let mut store = SqliteStorage::new_in_memory().unwrap();
        let run_id = store.create_run("https://x.test/", "hash").unwrap();
        (store, run_id)
    }

    #[test]
    fn test_create_and_get_run() {
        let (store, run_id) = store_with_run();
        let run = store.get_run(run_id).unwrap();

        assert_eq!(run.seed_url, "https://x.test/");
        assert_eq!(run.config_hash, "hash");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_complete_run_sets_finish_timestamp() {
        let (mut store, run_id) = store_with_run();
        store.complete_run(run_id).unwrap();

        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_get_missing_run() {
        let (store, _) = store_with_run();
        assert!(matches!(
            store.get_run(999),
            Err(StorageError::RunNotFound(999))
        ));
    }

    #[test]
    fn test_create_page_starts_pending() {
        let (mut store, run_id) = store_with_run();
        let (page, created) = store
            .get_or_create_page("https://x.test/", "x.test", run_id)
            .unwrap();

        assert!(created);
        assert_eq!(page.url, "https://x.test/");
        assert_eq!(page.domain, "x.test");
        assert_eq!(page.status, PageStatus::Pending);
        assert_eq!(page.title, "");
        assert_eq!(page.summary, "");
        assert!(page.html_content.is_none());
        assert!(page.error_message.is_none());
        assert_eq!(page.last_run_id, Some(run_id));
    }

    #[test]
    fn test_get_or_create_existing_refreshes_run_only() {
        let (mut store, run_id) = store_with_run();
        let (page, _) = store
            .get_or_create_page("https://x.test/", "x.test", run_id)
            .unwrap();
        store
            .mark_completed(page.id, "Title", "Summary", "<html></html>")
            .unwrap();

        let run2 = store.create_run("https://x.test/", "hash").unwrap();
        let (again, created) = store
            .get_or_create_page("https://x.test/", "x.test", run2)
            .unwrap();

        assert!(!created);
        assert_eq!(again.id, page.id);
        assert_eq!(again.last_run_id, Some(run2));
        // Metadata untouched; resetting is a separate explicit operation
        assert_eq!(again.status, PageStatus::Completed);
        assert_eq!(again.title, "Title");
    }

    #[test]
    fn test_mark_completed_stores_metadata_and_clears_error() {
        let (mut store, run_id) = store_with_run();
        let (page, _) = store
            .get_or_create_page("https://x.test/", "x.test", run_id)
            .unwrap();
        store.mark_failed(page.id, "boom").unwrap();
        store
            .mark_completed(page.id, "Title", "Summary", "<html>body</html>")
            .unwrap();

        let page = store.get_page(page.id).unwrap();
        assert_eq!(page.status, PageStatus::Completed);
        assert_eq!(page.title, "Title");
        assert_eq!(page.summary, "Summary");
        assert_eq!(page.html_content.as_deref(), Some("<html>body</html>"));
        assert!(page.error_message.is_none());
    }

    #[test]
    fn test_mark_completed_truncates_title() {
        let (mut store, run_id) = store_with_run();
        let (page, _) = store
            .get_or_create_page("https://x.test/", "x.test", run_id)
            .unwrap();

        let long_title = "t".repeat(MAX_TITLE_LEN + 50);
        store
            .mark_completed(page.id, &long_title, "", "<html></html>")
            .unwrap();

        let page = store.get_page(page.id).unwrap();
        assert_eq!(page.title.chars().count(), MAX_TITLE_LEN);
    }

    #[test]
    fn test_mark_failed_sets_error_and_clears_content() {
        let (mut store, run_id) = store_with_run();
        let (page, _) = store
            .get_or_create_page("https://x.test/", "x.test", run_id)
            .unwrap();
        store
            .mark_completed(page.id, "Title", "Summary", "<html></html>")
            .unwrap();
        store.mark_failed(page.id, "HTTP 500").unwrap();

        let page = store.get_page(page.id).unwrap();
        assert_eq!(page.status, PageStatus::Failed);
        assert_eq!(page.error_message.as_deref(), Some("HTTP 500"));
        assert!(page.html_content.is_none());
        // Title and summary are not touched by a failure
        assert_eq!(page.title, "Title");
        assert_eq!(page.summary, "Summary");
    }

    #[test]
    fn test_reset_to_pending_clears_everything() {
        let (mut store, run_id) = store_with_run();
        let (page, _) = store
            .get_or_create_page("https://x.test/", "x.test", run_id)
            .unwrap();
        store
            .mark_completed(page.id, "Title", "Summary", "<html></html>")
            .unwrap();

        let run2 = store.create_run("https://x.test/", "hash").unwrap();
        store.reset_to_pending(page.id, run2).unwrap();

        let page = store.get_page(page.id).unwrap();
        assert_eq!(page.status, PageStatus::Pending);
        assert_eq!(page.title, "");
        assert_eq!(page.summary, "");
        assert!(page.html_content.is_none());
        assert!(page.error_message.is_none());
        assert_eq!(page.last_run_id, Some(run2));
    }

    #[test]
    fn test_complete_if_processing_only_touches_processing_pages() {
        let (mut store, run_id) = store_with_run();
        let (a, _) = store
            .get_or_create_page("https://x.test/a", "x.test", run_id)
            .unwrap();
        let (b, _) = store
            .get_or_create_page("https://x.test/b", "x.test", run_id)
            .unwrap();

        store.mark_processing(a.id).unwrap();
        store.mark_failed(b.id, "boom").unwrap();

        store.complete_if_processing(a.id).unwrap();
        store.complete_if_processing(b.id).unwrap();

        assert_eq!(store.get_page(a.id).unwrap().status, PageStatus::Completed);
        assert_eq!(store.get_page(b.id).unwrap().status, PageStatus::Failed);
    }

    #[test]
    fn test_crawled_at_immutable_updated_at_refreshed() {
        let (mut store, run_id) = store_with_run();
        let (page, _) = store
            .get_or_create_page("https://x.test/", "x.test", run_id)
            .unwrap();

        store.mark_processing(page.id).unwrap();
        let after = store.get_page(page.id).unwrap();

        assert_eq!(after.crawled_at, page.crawled_at);
        assert!(after.updated_at >= page.updated_at);
    }

    #[test]
    fn test_run_summary_counts_and_processing_flag() {
        let (mut store, run_id) = store_with_run();
        let (seed, _) = store
            .get_or_create_page("https://x.test/", "x.test", run_id)
            .unwrap();
        let (a, _) = store
            .get_or_create_page("https://x.test/a", "x.test", run_id)
            .unwrap();
        let (b, _) = store
            .get_or_create_page("https://x.test/b", "x.test", run_id)
            .unwrap();

        store.mark_completed(seed.id, "", "", "<html></html>").unwrap();
        store.mark_failed(a.id, "timeout").unwrap();
        store.mark_processing(b.id).unwrap();

        let summary = store.run_summary(run_id).unwrap();
        assert_eq!(summary.total_pages, 3);
        assert_eq!(summary.status_counts.get(&PageStatus::Completed), Some(&1));
        assert_eq!(summary.status_counts.get(&PageStatus::Failed), Some(&1));
        assert_eq!(summary.status_counts.get(&PageStatus::Processing), Some(&1));
        assert!(summary.is_processing);

        store.mark_completed(b.id, "", "", "<html></html>").unwrap();
        let summary = store.run_summary(run_id).unwrap();
        assert!(!summary.is_processing);
    }

    #[test]
    fn test_run_summary_scoped_to_run() {
        let (mut store, run_id) = store_with_run();
        store
            .get_or_create_page("https://x.test/", "x.test", run_id)
            .unwrap();

        let other_run = store.create_run("https://y.test/", "hash").unwrap();
        store
            .get_or_create_page("https://y.test/", "y.test", other_run)
            .unwrap();

        let summary = store.run_summary(run_id).unwrap();
        assert_eq!(summary.total_pages, 1);
    }

    #[test]
    fn test_search_matches_title_and_summary_case_insensitive() {
        let (mut store, run_id) = store_with_run();
        let (a, _) = store
            .get_or_create_page("https://x.test/a", "x.test", run_id)
            .unwrap();
        let (b, _) = store
            .get_or_create_page("https://x.test/b", "x.test", run_id)
            .unwrap();
        store
            .mark_completed(a.id, "Rust Guide", "", "<html></html>")
            .unwrap();
        store
            .mark_completed(b.id, "Other", "all about RUST here", "<html></html>")
            .unwrap();

        let hits = store.search_pages("rust", None).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_excludes_non_completed() {
        let (mut store, run_id) = store_with_run();
        let (a, _) = store
            .get_or_create_page("https://x.test/a", "x.test", run_id)
            .unwrap();
        store.mark_failed(a.id, "err").unwrap();

        // Failed pages have empty titles anyway, but be explicit: nothing
        // non-completed is searchable
        let hits = store.search_pages("", None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_domain_filter() {
        let (mut store, run_id) = store_with_run();
        let (a, _) = store
            .get_or_create_page("https://x.test/a", "x.test", run_id)
            .unwrap();
        let (b, _) = store
            .get_or_create_page("https://y.test/b", "y.test", run_id)
            .unwrap();
        store
            .mark_completed(a.id, "shared term", "", "<html></html>")
            .unwrap();
        store
            .mark_completed(b.id, "shared term", "", "<html></html>")
            .unwrap();

        let hits = store.search_pages("shared", Some("X.TEST")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].domain, "x.test");
    }

    #[test]
    fn test_counts() {
        let (mut store, run_id) = store_with_run();
        let (a, _) = store
            .get_or_create_page("https://x.test/a", "x.test", run_id)
            .unwrap();
        store
            .get_or_create_page("https://x.test/b", "x.test", run_id)
            .unwrap();
        store.mark_completed(a.id, "", "", "<html></html>").unwrap();

        assert_eq!(store.count_total_pages().unwrap(), 2);
        assert_eq!(
            store.count_pages_by_status(PageStatus::Completed).unwrap(),
            1
        );
        assert_eq!(
            store.count_pages_by_status(PageStatus::Pending).unwrap(),
            1
        );
    }
}
