//! Error types for column detection and column store operations.
//!
//! Malformed drawing data is never an error: bad operand counts, curves and
//! degenerate polygons are skipped during extraction. The variants here cover
//! host collaborator failures (unreadable documents), invalid configuration,
//! and edits that address a column which does not exist.
//!
//! # Examples
//!
//! ```
//! use planscan_core::{ColumnStore, PlanscanError};
//!
//! let mut store = ColumnStore::new();
//! match store.delete_column(0, "C-1") {
//!     Ok(removed) => println!("removed {}", removed.id),
//!     Err(PlanscanError::ColumnNotFound { page, id }) => {
//!         println!("nothing to delete: {id} on page {page}");
//!     }
//!     Err(e) => eprintln!("Other error: {e}"),
//! }
//! ```

use thiserror::Error;

/// Errors surfaced by the planscan core.
#[derive(Error, Debug)]
pub enum PlanscanError {
    /// The page source (PDF document, operation list provider) could not
    /// produce page geometry.
    ///
    /// This is the only failure the detection pipeline reports for a page;
    /// it is shown to the user and never aborts the surrounding application.
    #[error("Page source error: {reason}")]
    Source {
        /// What the host collaborator failed to do
        reason: String,
    },

    /// A page index beyond the document's page count was requested.
    #[error("Page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange {
        /// Requested page (0-indexed)
        page: usize,
        /// Number of pages in the document
        page_count: usize,
    },

    /// Invalid detection configuration or render scale.
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Which value is invalid and why
        reason: String,
    },

    /// A delete or update addressed a column that is not on the page.
    #[error("Column {id} not found on page {page}")]
    ColumnNotFound {
        /// Page the caller addressed
        page: usize,
        /// Column id the caller addressed
        id: String,
    },

    /// A background detection or save task failed to run to completion.
    #[error("Background task failed: {reason}")]
    Task {
        /// Description of the failure (join error, closed channel)
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PlanscanError {
    /// Build a [`PlanscanError::Source`] from anything displayable.
    #[inline]
    pub fn source_failure(reason: impl std::fmt::Display) -> Self {
        Self::Source {
            reason: reason.to_string(),
        }
    }

    /// Build a [`PlanscanError::Config`] from anything displayable.
    #[inline]
    pub fn config(reason: impl std::fmt::Display) -> Self {
        Self::Config {
            reason: reason.to_string(),
        }
    }

    #[inline]
    pub fn column_not_found(page: usize, id: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            page,
            id: id.into(),
        }
    }

    /// Returns true if the host collaborator failed (unreadable document or page).
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_source_error(&self) -> bool {
        matches!(self, Self::Source { .. } | Self::PageOutOfRange { .. })
    }

    /// Returns true if this error is a configuration error (user-fixable).
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if an edit addressed an unknown column.
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ColumnNotFound { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlanscanError>;
