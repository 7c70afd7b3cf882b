//! Debounced violation classifier

use integrity_events::Violation;
use tracing::{debug, info};

use crate::config::ClassifierConfig;
use crate::landmarks::FaceLandmarks;
use crate::pose::{PoseEstimate, PoseEstimator};
use crate::state::{ConditionKind, ConditionTimer, Emission};

/// Raw per-frame signals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameObservation {
    /// Number of faces detected
    pub face_count: usize,
    /// Pose of the primary face, if exactly one is visible
    pub pose: Option<PoseEstimate>,
}

impl FrameObservation {
    /// Build an observation from provider output
    pub fn from_faces(faces: &[FaceLandmarks], estimator: &PoseEstimator) -> Self {
        let pose = match faces {
            [single] => Some(estimator.estimate(single)),
            _ => None,
        };
        Self {
            face_count: faces.len(),
            pose,
        }
    }
}

/// Result of classifying one frame
#[derive(Debug, Clone, Default)]
pub struct ClassifierOutput {
    pub pose: Option<PoseEstimate>,
    pub violation: Option<Violation>,
}

/// Hysteresis filter over the per-frame signals.
///
/// Precedence per frame: zero faces, then multiple faces, then gaze. A frame
/// showing a higher-precedence condition does not evaluate the gaze timer.
pub struct ViolationClassifier {
    config: ClassifierConfig,
    estimator: PoseEstimator,
    face_missing: ConditionTimer,
    multiple_faces: ConditionTimer,
    gaze_away: ConditionTimer,
}

impl ViolationClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        info!(
            "Creating violation classifier: debounce={}ms, reemit={}ms, yaw>{}, pitch>{}",
            config.debounce_ms, config.reemit_interval_ms, config.gaze.yaw, config.gaze.pitch
        );
        Self {
            estimator: PoseEstimator::new(config.gaze),
            config,
            face_missing: ConditionTimer::Inactive,
            multiple_faces: ConditionTimer::Inactive,
            gaze_away: ConditionTimer::Inactive,
        }
    }

    pub fn estimator(&self) -> &PoseEstimator {
        &self.estimator
    }

    /// Classify provider output for one frame
    pub fn process_faces(&mut self, faces: &[FaceLandmarks], timestamp_ms: f64) -> ClassifierOutput {
        let observation = FrameObservation::from_faces(faces, &self.estimator);
        self.process(observation, timestamp_ms)
    }

    /// Classify one observation
    pub fn process(&mut self, observation: FrameObservation, timestamp_ms: f64) -> ClassifierOutput {
        let debounce = self.config.debounce_ms as f64;
        let reemit = self.config.reemit_interval_ms as f64;

        let fired = match observation.face_count {
            0 => {
                self.multiple_faces.observe(false, timestamp_ms, debounce, reemit);
                self.face_missing
                    .observe(true, timestamp_ms, debounce, reemit)
                    .map(|e| (ConditionKind::FaceMissing, e))
            }
            1 => {
                self.face_missing.observe(false, timestamp_ms, debounce, reemit);
                self.multiple_faces.observe(false, timestamp_ms, debounce, reemit);
                let away = observation.pose.map(|p| p.is_looking_away).unwrap_or(false);
                self.gaze_away
                    .observe(away, timestamp_ms, debounce, reemit)
                    .map(|e| (ConditionKind::GazeAway, e))
            }
            _ => {
                self.face_missing.observe(false, timestamp_ms, debounce, reemit);
                self.multiple_faces
                    .observe(true, timestamp_ms, debounce, reemit)
                    .map(|e| (ConditionKind::MultipleFaces, e))
            }
        };

        let violation = fired.map(|(kind, emission)| self.build_violation(kind, emission, &observation, timestamp_ms));

        ClassifierOutput {
            pose: observation.pose,
            violation,
        }
    }

    fn build_violation(
        &self,
        kind: ConditionKind,
        emission: Emission,
        observation: &FrameObservation,
        timestamp_ms: f64,
    ) -> Violation {
        let mut builder = Violation::builder(kind.violation_kind(), timestamp_ms)
            .detail("face_count", observation.face_count as u64)
            .detail("duration_ms", emission.duration_ms.round())
            .detail("repeat", emission.repeat);

        let confidence = match (kind, observation.pose) {
            (ConditionKind::GazeAway, Some(estimate)) => {
                builder = builder
                    .detail("yaw", estimate.pose.yaw)
                    .detail("pitch", estimate.pose.pitch);
                let deviation = self.config.gaze.deviation(estimate.pose.yaw, estimate.pose.pitch);
                (deviation / 2.0).clamp(0.5, 1.0)
            }
            _ => 1.0,
        };

        if emission.repeat == 0 {
            info!("{} confirmed after {:.0}ms", kind.violation_kind(), emission.duration_ms);
        } else {
            debug!(
                "{} still active ({:.0}ms, repeat {})",
                kind.violation_kind(),
                emission.duration_ms,
                emission.repeat
            );
        }

        builder.confidence(confidence).build()
    }

    /// Hysteresis timer for a condition kind
    pub fn timer(&self, kind: ConditionKind) -> &ConditionTimer {
        match kind {
            ConditionKind::FaceMissing => &self.face_missing,
            ConditionKind::MultipleFaces => &self.multiple_faces,
            ConditionKind::GazeAway => &self.gaze_away,
        }
    }

    /// Return every condition to inactive
    pub fn reset(&mut self) {
        self.face_missing = ConditionTimer::Inactive;
        self.multiple_faces = ConditionTimer::Inactive;
        self.gaze_away = ConditionTimer::Inactive;
    }
}

impl Default for ViolationClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
