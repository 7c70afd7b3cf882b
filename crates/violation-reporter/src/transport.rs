//! Backend transport boundary

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use integrity_events::EvidenceBlob;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::ReportError;

/// Lightweight structured event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventReport {
    #[serde(rename = "type")]
    pub violation_type: String,
    pub meta: Map<String, Value>,
}

/// Evidence-bearing submission
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceReport {
    pub violation_type: String,
    pub meta: Map<String, Value>,
    pub evidence: EvidenceBlob,
}

/// Delivery of reports to the backend
#[async_trait]
pub trait ViolationTransport: Send + Sync {
    async fn send_event(&self, report: EventReport) -> Result<(), ReportError>;

    async fn send_evidence(&self, report: EvidenceReport) -> Result<(), ReportError>;
}

#[async_trait]
impl<T: ViolationTransport + ?Sized> ViolationTransport for Arc<T> {
    async fn send_event(&self, report: EventReport) -> Result<(), ReportError> {
        (**self).send_event(report).await
    }

    async fn send_evidence(&self, report: EvidenceReport) -> Result<(), ReportError> {
        (**self).send_evidence(report).await
    }
}

/// Logs reports instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl ViolationTransport for LogTransport {
    async fn send_event(&self, report: EventReport) -> Result<(), ReportError> {
        info!("Violation event {}: {}", report.violation_type, serde_json::Value::Object(report.meta));
        Ok(())
    }

    async fn send_evidence(&self, report: EvidenceReport) -> Result<(), ReportError> {
        info!(
            "Violation evidence {}: {} bytes of {} ({} segments)",
            report.violation_type,
            report.evidence.len(),
            report.evidence.mime_type,
            report.evidence.segment_count
        );
        Ok(())
    }
}

/// Keeps reports in memory; can be switched to fail every request
#[derive(Debug, Default)]
pub struct MemoryTransport {
    events: Mutex<Vec<EventReport>>,
    uploads: Mutex<Vec<EvidenceReport>>,
    failing: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<EventReport> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn uploads(&self) -> Vec<EvidenceReport> {
        self.uploads.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn check(&self) -> Result<(), ReportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReportError::Status {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ViolationTransport for MemoryTransport {
    async fn send_event(&self, report: EventReport) -> Result<(), ReportError> {
        self.check()?;
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(report);
        Ok(())
    }

    async fn send_evidence(&self, report: EvidenceReport) -> Result<(), ReportError> {
        self.check()?;
        self.uploads.lock().unwrap_or_else(PoisonError::into_inner).push(report);
        Ok(())
    }
}
