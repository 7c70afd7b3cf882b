//! Violation Reporter
//!
//! Delivers classified violations to the backend. Hard violations go through
//! a single-flight evidence path (upload lock, tail capture, multipart
//! upload); soft violations are sent immediately as lightweight events.

mod http;
mod lock;
mod reporter;
mod transport;

pub use http::HttpTransport;
pub use lock::UploadLock;
pub use reporter::{ReportOutcome, ReportRecord, ReporterConfig, SkipReason, ViolationReporter};
pub use transport::{EventReport, EvidenceReport, LogTransport, MemoryTransport, ViolationTransport};

use thiserror::Error;

/// Reporter error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ReportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
