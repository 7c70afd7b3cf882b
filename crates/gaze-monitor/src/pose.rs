//! Head pose estimation from facial landmarks

use serde::{Deserialize, Serialize};

use crate::config::GazeThresholds;
use crate::landmarks::{index, FaceLandmarks, MIN_LANDMARKS};

/// Head pose as normalized ratios (not degrees)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Nose offset from the cheek midpoint over inter-cheek distance
    pub yaw: f32,
    /// Nose offset from the head/chin midpoint over face height
    pub pitch: f32,
    /// Cheek line tilt (radians)
    pub roll: f32,
}

/// Pose plus the derived look-away flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub pose: HeadPose,
    pub is_looking_away: bool,
}

impl PoseEstimate {
    /// Neutral pose, used when landmarks are insufficient
    pub fn neutral() -> Self {
        Self::default()
    }
}

/// Geometric head pose estimator.
///
/// Pure function of the landmarks; a face with too few points or degenerate
/// geometry yields the neutral pose instead of an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseEstimator {
    thresholds: GazeThresholds,
}

impl PoseEstimator {
    pub fn new(thresholds: GazeThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> GazeThresholds {
        self.thresholds
    }

    /// Estimate head pose for one face
    pub fn estimate(&self, face: &FaceLandmarks) -> PoseEstimate {
        if face.len() < MIN_LANDMARKS {
            return PoseEstimate::neutral();
        }

        let (Some(nose), Some(left), Some(right), Some(top), Some(chin)) = (
            face.get(index::NOSE_TIP),
            face.get(index::LEFT_CHEEK),
            face.get(index::RIGHT_CHEEK),
            face.get(index::TOP_OF_HEAD),
            face.get(index::CHIN),
        ) else {
            return PoseEstimate::neutral();
        };

        let face_width = left.distance_xy(right);
        let face_height = top.distance_xy(chin);
        if face_width <= f32::EPSILON || face_height <= f32::EPSILON {
            return PoseEstimate::neutral();
        }

        let mid_x = (left.x + right.x) / 2.0;
        let mid_y = (top.y + chin.y) / 2.0;

        let pose = HeadPose {
            yaw: (nose.x - mid_x) / face_width,
            pitch: (nose.y - mid_y) / face_height,
            roll: (right.y - left.y).atan2(right.x - left.x),
        };

        PoseEstimate {
            pose,
            is_looking_away: self.thresholds.is_looking_away(pose.yaw, pose.pitch),
        }
    }
}
