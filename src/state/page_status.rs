/// Page status definitions for tracking crawl progress
///
/// This module defines all possible statuses a page can be in during the
/// crawl process.
use std::fmt;

/// Represents the current status of a page in the crawl process
///
/// A page starts as `Pending` when it is discovered, moves to `Processing`
/// when a run dequeues it for fetching, and ends the run as either
/// `Completed` or `Failed`. A terminal page that is rediscovered as a link
/// in a later run is reset back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageStatus {
    /// Page has been discovered and is waiting to be fetched
    Pending,

    /// Page is currently being fetched and parsed
    Processing,

    /// Page was successfully fetched; metadata and content are stored
    Completed,

    /// Page fetch or processing failed; error_message holds the reason
    Failed,
}

impl PageStatus {
    /// Returns true if this status is terminal for a single run
    ///
    /// Terminal pages may still be reopened by a future run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the page is still owed work by some run
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible page statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Processing,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
