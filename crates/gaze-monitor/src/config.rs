//! Classifier configuration

use serde::{Deserialize, Serialize};

use crate::VisionError;

/// Look-away thresholds, as ratios of face width/height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeThresholds {
    /// Maximum |yaw| before the candidate counts as looking away
    pub yaw: f32,
    /// Maximum |pitch| before the candidate counts as looking away
    pub pitch: f32,
}

impl Default for GazeThresholds {
    fn default() -> Self {
        Self { yaw: 0.25, pitch: 0.20 }
    }
}

impl GazeThresholds {
    pub fn is_looking_away(&self, yaw: f32, pitch: f32) -> bool {
        yaw.abs() > self.yaw || pitch.abs() > self.pitch
    }

    /// Largest threshold-normalized deviation (1.0 = on the threshold)
    pub fn deviation(&self, yaw: f32, pitch: f32) -> f32 {
        (yaw.abs() / self.yaw).max(pitch.abs() / self.pitch)
    }
}

/// Violation classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// How long a condition must hold before it is confirmed (milliseconds)
    pub debounce_ms: u64,

    /// Minimum spacing between repeated emissions of a confirmed condition
    /// (milliseconds, 0 disables repeats)
    pub reemit_interval_ms: u64,

    /// Look-away thresholds
    pub gaze: GazeThresholds,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            reemit_interval_ms: 5000,
            gaze: GazeThresholds::default(),
        }
    }
}

impl ClassifierConfig {
    /// Create strict config (shorter debounce, tighter cone)
    pub fn strict() -> Self {
        Self {
            debounce_ms: 1000,
            reemit_interval_ms: 3000,
            gaze: GazeThresholds { yaw: 0.18, pitch: 0.15 },
        }
    }

    /// Create lenient config (longer debounce, wider cone)
    pub fn lenient() -> Self {
        Self {
            debounce_ms: 4000,
            reemit_interval_ms: 10_000,
            gaze: GazeThresholds { yaw: 0.35, pitch: 0.30 },
        }
    }

    pub fn validate(&self) -> Result<(), VisionError> {
        if self.debounce_ms == 0 {
            return Err(VisionError::Config("debounce_ms must be positive".into()));
        }
        if !(self.gaze.yaw > 0.0 && self.gaze.pitch > 0.0) {
            return Err(VisionError::Config("gaze thresholds must be positive".into()));
        }
        Ok(())
    }
}
