//! Integrity Events
//!
//! Shared data model for the integrity monitoring pipeline:
//! - Violation kinds and their wire tags
//! - Soft / hard severity and upload-lock families
//! - Immutable violation records
//! - Evidence blobs assembled by the rolling recorder

mod evidence;
mod violation;

pub use evidence::EvidenceBlob;
pub use violation::{LockFamily, Severity, Violation, ViolationBuilder, ViolationKind};

use thiserror::Error;

/// Event model errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Unknown violation type: {0}")]
    UnknownKind(String),
}
