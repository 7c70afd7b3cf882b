//! Violation reporter implementation

use std::sync::Arc;

use chrono::Utc;
use integrity_events::{EvidenceBlob, LockFamily, Violation, ViolationKind};
use rolling_recorder::RecorderHandle;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::lock::UploadLock;
use crate::transport::{EventReport, EvidenceReport, ViolationTransport};
use crate::ReportError;

/// Reporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Endpoint for lightweight JSON events
    pub event_url: Option<String>,
    /// Endpoint for multipart evidence uploads
    pub upload_url: Option<String>,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Per-request timeout (ms)
    pub timeout_ms: u64,
    /// Exam session the reports belong to
    pub session_id: String,
    /// Inbox capacity for violations awaiting a report
    pub inbox_capacity: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            event_url: None,
            upload_url: None,
            auth_token: None,
            timeout_ms: 30_000,
            session_id: "local".to_string(),
            inbox_capacity: 64,
        }
    }
}

impl ReporterConfig {
    pub fn validate(&self) -> Result<(), ReportError> {
        if self.timeout_ms == 0 {
            return Err(ReportError::Config("timeout_ms must be positive".into()));
        }
        if self.inbox_capacity == 0 {
            return Err(ReportError::Config("inbox_capacity must be positive".into()));
        }
        if self.event_url.is_some() != self.upload_url.is_some() {
            return Err(ReportError::Config("event_url and upload_url must be set together".into()));
        }
        Ok(())
    }

    /// Whether a backend is configured
    pub fn has_backend(&self) -> bool {
        self.event_url.is_some() && self.upload_url.is_some()
    }
}

/// Why a violation was not reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another evidence cycle holds the upload lock
    LockBusy,
}

/// Result of reporting one violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Sent with its evidence, or as a soft event
    Delivered,
    /// Hard violation sent as a plain event because no evidence was captured
    DeliveredWithoutEvidence,
    Skipped(SkipReason),
    Failed(ReportError),
}

/// Outcome published for every reported violation
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub violation_id: Uuid,
    pub kind: ViolationKind,
    pub outcome: ReportOutcome,
}

struct Inner {
    transport: Arc<dyn ViolationTransport>,
    recorder: RecorderHandle,
    lock: UploadLock,
    session_id: String,
    records: broadcast::Sender<ReportRecord>,
}

/// Cloneable reporter shared by the violation sources
#[derive(Clone)]
pub struct ViolationReporter {
    inner: Arc<Inner>,
}

impl ViolationReporter {
    pub fn new(config: &ReporterConfig, transport: Arc<dyn ViolationTransport>, recorder: RecorderHandle) -> Self {
        info!(
            "Creating violation reporter (session {}, evidence {})",
            config.session_id,
            if recorder.is_available() { "enabled" } else { "unavailable" }
        );
        let (records, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                transport,
                recorder,
                lock: UploadLock::new(),
                session_id: config.session_id.clone(),
                records,
            }),
        }
    }

    pub fn upload_lock(&self) -> &UploadLock {
        &self.inner.lock
    }

    /// Subscribe to report outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<ReportRecord> {
        self.inner.records.subscribe()
    }

    /// Report one violation.
    ///
    /// Hard violations take the upload lock for their family, wait for the
    /// recorder's tail capture and upload the evidence. The lock is released
    /// on every path. Failures are logged and never retried.
    pub async fn report(&self, violation: Violation) -> ReportOutcome {
        let violation_id = violation.id();
        let kind = violation.kind();

        let outcome = match violation.severity().lock_family() {
            Some(family) => self.report_with_evidence(violation, family).await,
            None => self.report_event(&violation, None).await,
        };

        match &outcome {
            ReportOutcome::Failed(e) => {
                error!("Failed to report {} ({}): {}", kind, violation_id, e);
                metrics::counter!("proctor_reports_failed_total").increment(1);
            }
            ReportOutcome::Skipped(reason) => {
                info!("Skipped {} ({}): {:?}", kind, violation_id, reason);
            }
            _ => debug!("Reported {} ({}): {:?}", kind, violation_id, outcome),
        }

        let _ = self.inner.records.send(ReportRecord {
            violation_id,
            kind,
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn report_with_evidence(&self, violation: Violation, family: LockFamily) -> ReportOutcome {
        let Some(_permit) = self.inner.lock.try_acquire(family) else {
            return ReportOutcome::Skipped(SkipReason::LockBusy);
        };

        let recorder = &self.inner.recorder;
        let evidence = recorder
            .capture_evidence(recorder.default_tail())
            .await
            .filter(|blob| !blob.is_empty());

        let Some(evidence) = evidence else {
            warn!("No evidence captured for {}; sending event only", violation.kind());
            return self.report_event(&violation, Some("unavailable")).await;
        };

        let report = self.evidence_report(&violation, evidence);
        match self.inner.transport.send_evidence(report).await {
            Ok(()) => ReportOutcome::Delivered,
            Err(e) => ReportOutcome::Failed(e),
        }
    }

    async fn report_event(&self, violation: &Violation, evidence_status: Option<&str>) -> ReportOutcome {
        let mut meta = self.metadata(violation);
        let degraded = evidence_status.is_some();
        if let Some(status) = evidence_status {
            meta.insert("evidence".into(), Value::String(status.to_string()));
        }

        let report = EventReport {
            violation_type: violation.kind().as_str().to_string(),
            meta,
        };
        match self.inner.transport.send_event(report).await {
            Ok(()) if degraded => ReportOutcome::DeliveredWithoutEvidence,
            Ok(()) => ReportOutcome::Delivered,
            Err(e) => ReportOutcome::Failed(e),
        }
    }

    fn evidence_report(&self, violation: &Violation, evidence: EvidenceBlob) -> EvidenceReport {
        let mut meta = self.metadata(violation);
        meta.insert("mime_type".into(), Value::String(evidence.mime_type.clone()));
        meta.insert("segment_count".into(), Value::from(evidence.segment_count));
        meta.insert("evidence_duration_ms".into(), Value::from(evidence.duration_ms));
        EvidenceReport {
            violation_type: violation.kind().as_str().to_string(),
            meta,
            evidence,
        }
    }

    fn metadata(&self, violation: &Violation) -> Map<String, Value> {
        let mut meta = violation.metadata();
        meta.insert("session_id".into(), Value::String(self.inner.session_id.clone()));
        meta.insert("reported_at".into(), Value::String(Utc::now().to_rfc3339()));
        meta
    }

    /// Report every violation received on `inbox`, one task each.
    ///
    /// Returns once the inbox closes and in-flight reports finish. Aborting
    /// the task aborts the in-flight reports too.
    pub async fn run(self, mut inbox: mpsc::Receiver<Violation>) {
        info!("Violation reporter running");
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                received = inbox.recv() => match received {
                    Some(violation) => {
                        let reporter = self.clone();
                        tasks.spawn(async move { reporter.report(violation).await });
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Report task ended abnormally: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Report task ended abnormally: {}", e);
            }
        }
        info!("Violation reporter inbox closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use integrity_events::Severity;
    use rolling_recorder::{RecorderConfig, SyntheticEncoder};
    use std::time::Duration;
    use tokio::time::sleep;

    fn reporter(transport: &Arc<MemoryTransport>, recorder: RecorderHandle) -> ViolationReporter {
        let config = ReporterConfig {
            session_id: "exam-42".into(),
            ..Default::default()
        };
        ViolationReporter::new(&config, transport.clone(), recorder)
    }

    fn recorder() -> RecorderHandle {
        RecorderHandle::start(&RecorderConfig::default(), SyntheticEncoder::webm()).unwrap()
    }

    fn hard(kind: ViolationKind) -> Violation {
        Violation::builder(kind, 2000.0).detail("face_count", 0).build()
    }

    fn clipboard() -> Violation {
        Violation::builder(ViolationKind::ClipboardAttempt, 10.0)
            .detail("action", "paste")
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_violation_bypasses_lock_and_recorder() {
        let transport = Arc::new(MemoryTransport::new());
        let recorder = recorder();
        let reporter = reporter(&transport, recorder.clone());

        // Hold the lock: a soft violation must not need it
        let _permit = reporter.upload_lock().try_acquire(LockFamily::Evidence).unwrap();
        let outcome = reporter.report(clipboard()).await;

        assert_eq!(outcome, ReportOutcome::Delivered);
        assert!(!recorder.is_capturing());
        assert!(transport.uploads().is_empty());
        let events = transport.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].violation_type, "CLIPBOARD_ATTEMPT");
        assert_eq!(events[0].meta["session_id"], "exam-42");
        assert_eq!(events[0].meta["severity"], Severity::Soft.as_str());
        assert!(events[0].meta.contains_key("reported_at"));
        recorder.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_violation_uploads_tail_evidence() {
        let transport = Arc::new(MemoryTransport::new());
        let recorder = recorder();
        let reporter = reporter(&transport, recorder.clone());
        sleep(Duration::from_millis(20_500)).await;

        let outcome = reporter.report(hard(ViolationKind::FaceMissing)).await;
        assert_eq!(outcome, ReportOutcome::Delivered);

        let uploads = transport.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].violation_type, "FACE_MISSING");
        assert_eq!(uploads[0].evidence.segment_count, 25);
        assert_eq!(uploads[0].meta["segment_count"], 25);
        assert_eq!(uploads[0].meta["face_count"], 0);
        assert!(!reporter.upload_lock().is_held(LockFamily::Evidence));
        recorder.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_hard_violation_is_skipped() {
        let transport = Arc::new(MemoryTransport::new());
        let recorder = recorder();
        let reporter = reporter(&transport, recorder.clone());
        sleep(Duration::from_millis(3_500)).await;

        let first = {
            let reporter = reporter.clone();
            tokio::spawn(async move { reporter.report(hard(ViolationKind::FaceMissing)).await })
        };
        sleep(Duration::from_millis(100)).await;
        assert!(reporter.upload_lock().is_held(LockFamily::Evidence));

        let second = reporter.report(hard(ViolationKind::GazeAway)).await;
        assert_eq!(second, ReportOutcome::Skipped(SkipReason::LockBusy));

        assert_eq!(first.await.unwrap(), ReportOutcome::Delivered);
        assert_eq!(transport.uploads().len(), 1);
        recorder.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_upload_releases_lock() {
        let transport = Arc::new(MemoryTransport::new());
        let recorder = recorder();
        let reporter = reporter(&transport, recorder.clone());
        sleep(Duration::from_millis(2_500)).await;

        transport.set_failing(true);
        let outcome = reporter.report(hard(ViolationKind::MultipleFaces)).await;
        assert!(matches!(outcome, ReportOutcome::Failed(ReportError::Status { status: 503, .. })));
        assert!(!reporter.upload_lock().is_held(LockFamily::Evidence));

        transport.set_failing(false);
        let outcome = reporter.report(hard(ViolationKind::MultipleFaces)).await;
        assert_eq!(outcome, ReportOutcome::Delivered);
        recorder.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_recorder_sends_event_only() {
        let transport = Arc::new(MemoryTransport::new());
        let reporter = reporter(&transport, RecorderHandle::disabled());

        let outcome = reporter.report(hard(ViolationKind::GazeAway)).await;
        assert_eq!(outcome, ReportOutcome::DeliveredWithoutEvidence);
        let events = transport.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].meta["evidence"], "unavailable");
        assert!(!reporter.upload_lock().is_held(LockFamily::Evidence));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_inbox_until_closed() {
        let transport = Arc::new(MemoryTransport::new());
        let reporter = reporter(&transport, RecorderHandle::disabled());
        let mut records = reporter.subscribe();
        let (tx, rx) = mpsc::channel(8);

        let actor = tokio::spawn(reporter.run(rx));
        tx.send(clipboard()).await.unwrap();
        tx.send(hard(ViolationKind::FaceMissing)).await.unwrap();
        drop(tx);
        actor.await.unwrap();

        assert_eq!(transport.events().len(), 2);
        let mut outcomes = vec![records.recv().await.unwrap().outcome, records.recv().await.unwrap().outcome];
        outcomes.sort_by_key(|outcome| matches!(outcome, ReportOutcome::DeliveredWithoutEvidence));
        assert_eq!(outcomes, vec![ReportOutcome::Delivered, ReportOutcome::DeliveredWithoutEvidence]);
    }

    #[test]
    fn test_config_urls_must_pair() {
        let config = ReporterConfig {
            event_url: Some("http://localhost/events".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(ReporterConfig::default().validate().is_ok());
        assert!(!ReporterConfig::default().has_backend());
    }
}
