//! Error types for the setup verification

use std::path::PathBuf;

use thiserror::Error;

use crate::runner::VerificationReport;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    DriverNotFound,

    #[error("Playwright driver error: {0}")]
    Driver(String),

    #[error("Server at {url} did not respond after {attempts} attempts")]
    ServerUnavailable { url: String, attempts: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl VerifyError {
    /// Short machine-readable name, used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::Navigation { .. } => "navigation",
            VerifyError::Timeout(_) => "timeout",
            VerifyError::Assertion(_) => "assertion",
            VerifyError::ElementNotFound(_) => "element_not_found",
            VerifyError::DriverNotFound => "driver_not_found",
            VerifyError::Driver(_) => "driver",
            VerifyError::ServerUnavailable { .. } => "server_unavailable",
            VerifyError::Io(_) => "io",
            VerifyError::Json(_) => "json",
            VerifyError::Http(_) => "http",
        }
    }
}

pub type VerifyResult<T> = Result<T, VerifyError>;

/// A failed run: the original error, plus whatever diagnostics were captured
/// before the session was released.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct VerificationFailure {
    #[source]
    pub error: VerifyError,

    /// Error screenshot, if one could be captured
    pub diagnostic: Option<PathBuf>,

    pub report: VerificationReport,
}
