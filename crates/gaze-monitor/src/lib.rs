//! Gaze Monitor
//!
//! Per-frame candidate state analysis from facial landmarks:
//! - Landmark provider boundary (face mesh model is external)
//! - Head pose estimation (yaw, pitch, roll as normalized ratios)
//! - Debounced FACE_MISSING / MULTIPLE_FACES / GAZE_AWAY classification

pub mod classifier;
pub mod config;
pub mod landmarks;
pub mod pose;
pub mod state;

pub use classifier::{ClassifierOutput, FrameObservation, ViolationClassifier};
pub use config::{ClassifierConfig, GazeThresholds};
pub use landmarks::{FaceLandmarks, Landmark, LandmarkProvider, ScriptedProvider, StaticFaceProvider};
pub use pose::{HeadPose, PoseEstimate, PoseEstimator};
pub use state::{ConditionKind, ConditionTimer, Emission};

use thiserror::Error;

/// Vision error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VisionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
