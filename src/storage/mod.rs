//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Page record persistence and status transitions
//! - Crawl run tracking
//! - Summary and search queries for external collaborators

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{PageStore, StorageError, StorageResult};

use crate::state::PageStatus;
use std::collections::HashMap;

/// Maximum number of characters stored in a page title
///
/// Longer titles are truncated on save.
pub const MAX_TITLE_LEN: usize = 511;

/// Represents a page in the database
///
/// `url` is the unique identity key; `domain` is captured once when the
/// record is created and never recomputed. `html_content` is non-NULL
/// exactly when the most recent fetch of the page succeeded.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub summary: String,
    pub html_content: Option<String>,
    pub status: PageStatus,
    pub error_message: Option<String>,
    pub crawled_at: String,
    pub updated_at: String,
    pub last_run_id: Option<i64>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub seed_url: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Aggregated view of the pages belonging to one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub total_pages: u64,
    pub status_counts: HashMap<PageStatus, u64>,
    /// True while any page of the run is still Pending or Processing
    pub is_processing: bool,
}

/// A search result row over completed pages
#[derive(Debug, Clone)]
pub struct PageSearchHit {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub domain: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }
}
