//! Error types for the audit engine.
//!
//! - `AuditError`: every failure the engine can surface
//! - `NavigationCause`: why a page could not be reached
//! - `Result<T>`: Type alias for Results using AuditError
//!
//! Check and inspector failures are normally converted into data
//! (`CheckResult` errors, unauditable pages); only validation,
//! infrastructure and defect errors leave `run_audit`.

use std::fmt;
use thiserror::Error;

use crate::domain::models::CheckCategory;

// ============================================================================
// DOMAIN ERROR TYPE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationCause {
    /// No response within the navigation timeout
    Timeout,
    /// DNS, connection or protocol failure
    Unreachable(String),
}

impl fmt::Display for NavigationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationCause::Timeout => f.write_str("timed out"),
            NavigationCause::Unreachable(reason) => write!(f, "unreachable: {reason}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    /// Page did not respond in time or could not be reached
    #[error("Navigation failed for {url}: {cause}")]
    Navigation { url: String, cause: NavigationCause },

    /// Page loaded but signal extraction failed
    #[error("Render failed for {url}: {message}")]
    Render { url: String, message: String },

    /// A check module failed internally
    #[error("Check {category} failed: {message}")]
    CheckExecution { category: CheckCategory, message: String },

    /// Bad input to the orchestration service
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Inconsistent input reached the aggregator (a defect)
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// The browser automation capability could not be used
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    /// Every requested page was unauditable
    #[error("No auditable pages for clinic {clinic_id}")]
    NoAuditablePages { clinic_id: String },

    #[error("Audit cancelled")]
    Cancelled,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AuditError {
    pub fn navigation_timeout(url: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            cause: NavigationCause::Timeout,
        }
    }

    pub fn unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            cause: NavigationCause::Unreachable(reason.into()),
        }
    }

    pub fn render(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Only navigation timeouts are worth a retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuditError::Navigation {
                cause: NavigationCause::Timeout,
                ..
            }
        )
    }

    /// Errors that abort a whole run instead of marking one page unauditable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuditError::BrowserUnavailable(_) | AuditError::Cancelled | AuditError::Aggregation(_)
        )
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(error: sqlx::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Result type alias using AuditError.
pub type Result<T> = std::result::Result<T, AuditError>;
