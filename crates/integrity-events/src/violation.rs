//! Violation records

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{EventError, EvidenceBlob};

/// Violation types reported to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// No face in front of the camera
    FaceMissing,

    /// More than one face in frame
    MultipleFaces,

    /// Candidate looking away from the screen
    GazeAway,

    /// Exam tab/window moved to the background
    TabHidden,

    /// Window lost focus while still visible
    WindowBlur,

    /// Fullscreen mode left
    FullscreenExit,

    /// Copy, cut, or paste attempted
    ClipboardAttempt,
}

impl ViolationKind {
    /// All kinds, vision kinds first
    pub const ALL: [ViolationKind; 7] = [
        ViolationKind::FaceMissing,
        ViolationKind::MultipleFaces,
        ViolationKind::GazeAway,
        ViolationKind::TabHidden,
        ViolationKind::WindowBlur,
        ViolationKind::FullscreenExit,
        ViolationKind::ClipboardAttempt,
    ];

    /// Get wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::FaceMissing => "FACE_MISSING",
            ViolationKind::MultipleFaces => "MULTIPLE_FACES",
            ViolationKind::GazeAway => "GAZE_AWAY",
            ViolationKind::TabHidden => "TAB_HIDDEN",
            ViolationKind::WindowBlur => "WINDOW_BLUR",
            ViolationKind::FullscreenExit => "FULLSCREEN_EXIT",
            ViolationKind::ClipboardAttempt => "CLIPBOARD_ATTEMPT",
        }
    }

    /// Severity used when the producer does not override it.
    ///
    /// Camera-derived conditions need video evidence; environment signals are
    /// discrete user actions reported without it.
    pub fn default_severity(&self) -> Severity {
        match self {
            ViolationKind::FaceMissing | ViolationKind::MultipleFaces | ViolationKind::GazeAway => {
                Severity::Hard
            }
            _ => Severity::Soft,
        }
    }

    /// Whether the kind is produced by the camera pipeline
    pub fn is_vision(&self) -> bool {
        matches!(
            self,
            ViolationKind::FaceMissing | ViolationKind::MultipleFaces | ViolationKind::GazeAway
        )
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViolationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EventError::UnknownKind(s.to_string()))
    }
}

/// Violation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported immediately, no evidence, no upload lock
    Soft,
    /// Requires an evidence capture under the upload lock
    Hard,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Soft => "soft",
            Severity::Hard => "hard",
        }
    }

    /// Upload-lock family, `None` for violations that bypass the lock
    pub fn lock_family(&self) -> Option<LockFamily> {
        match self {
            Severity::Soft => None,
            Severity::Hard => Some(LockFamily::Evidence),
        }
    }
}

/// Group of violation types sharing one upload lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockFamily {
    /// Every evidence-bearing violation
    Evidence,
}

/// A classified violation.
///
/// Immutable once built; attaching evidence produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    id: Uuid,
    kind: ViolationKind,
    /// Video-relative timestamp (ms)
    timestamp_ms: f64,
    confidence: f32,
    severity: Severity,
    details: Map<String, Value>,
    #[serde(skip)]
    evidence: Option<EvidenceBlob>,
}

impl Violation {
    /// Start building a violation with the kind's default severity
    pub fn builder(kind: ViolationKind, timestamp_ms: f64) -> ViolationBuilder {
        ViolationBuilder {
            kind,
            timestamp_ms,
            confidence: 1.0,
            severity: kind.default_severity(),
            details: Map::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    pub fn timestamp_ms(&self) -> f64 {
        self.timestamp_ms
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    pub fn evidence(&self) -> Option<&EvidenceBlob> {
        self.evidence.as_ref()
    }

    /// Check if the violation must go through the evidence path
    pub fn requires_evidence(&self) -> bool {
        self.severity == Severity::Hard
    }

    /// Return a copy of this violation carrying `evidence`
    pub fn with_evidence(self, evidence: EvidenceBlob) -> Self {
        Self {
            evidence: Some(evidence),
            ..self
        }
    }

    /// Metadata sent alongside the violation type
    pub fn metadata(&self) -> Map<String, Value> {
        let mut meta = self.details.clone();
        meta.insert("violation_id".into(), Value::String(self.id.to_string()));
        meta.insert("timestamp_ms".into(), Value::from(self.timestamp_ms));
        meta.insert("confidence".into(), Value::from(f64::from(self.confidence)));
        meta.insert("severity".into(), Value::String(self.severity.as_str().into()));
        meta
    }
}

/// Builder for [`Violation`]
#[derive(Debug, Clone)]
pub struct ViolationBuilder {
    kind: ViolationKind,
    timestamp_ms: f64,
    confidence: f32,
    severity: Severity,
    details: Map<String, Value>,
}

impl ViolationBuilder {
    /// Set confidence, clamped to [0, 1]
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach a metadata entry
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Violation {
        Violation {
            id: Uuid::new_v4(),
            kind: self.kind,
            timestamp_ms: self.timestamp_ms,
            confidence: self.confidence,
            severity: self.severity,
            details: self.details,
            evidence: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags_round_trip_through_from_str() {
        assert_eq!("CLIPBOARD_ATTEMPT".parse::<ViolationKind>(), Ok(ViolationKind::ClipboardAttempt));
        assert!("SMILING".parse::<ViolationKind>().is_err());
        let json = serde_json::to_string(&ViolationKind::GazeAway).unwrap();
        assert_eq!(json, "\"GAZE_AWAY\"");
    }

    #[test]
    fn test_default_severity() {
        assert_eq!(ViolationKind::FaceMissing.default_severity(), Severity::Hard);
        assert_eq!(ViolationKind::ClipboardAttempt.default_severity(), Severity::Soft);
        assert_eq!(Severity::Soft.lock_family(), None);
        assert_eq!(Severity::Hard.lock_family(), Some(LockFamily::Evidence));
    }

    #[test]
    fn test_confidence_is_clamped() {
        let v = Violation::builder(ViolationKind::GazeAway, 10.0).confidence(1.7).build();
        assert_eq!(v.confidence(), 1.0);
        let v = Violation::builder(ViolationKind::GazeAway, 10.0).confidence(-0.3).build();
        assert_eq!(v.confidence(), 0.0);
    }

    #[test]
    fn test_with_evidence_keeps_identity() {
        let v = Violation::builder(ViolationKind::FaceMissing, 2000.0)
            .detail("face_count", 0)
            .build();
        let id = v.id();
        let blob = EvidenceBlob::new("video/webm", vec![1, 2, 3], 3, 3000);
        let v = v.with_evidence(blob);
        assert_eq!(v.id(), id);
        assert_eq!(v.evidence().map(|e| e.len()), Some(3));
    }

    #[test]
    fn test_metadata_contains_details_and_identity() {
        let v = Violation::builder(ViolationKind::MultipleFaces, 4200.0)
            .detail("face_count", 2)
            .build();
        let meta = v.metadata();
        assert_eq!(meta["face_count"], 2);
        assert_eq!(meta["severity"], "hard");
        assert_eq!(meta["violation_id"], v.id().to_string());
    }
}
