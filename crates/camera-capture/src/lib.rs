//! Camera Capture Library for the Integrity Pipeline
//!
//! Boundary to the live camera stream the pipeline watches:
//! - Decoded RGB frames handed to the offload worker by move
//! - A `VideoSource` trait the capture loop pulls from
//! - Acquisition errors kept distinct from per-frame failures
//! - A deterministic synthetic source for tests and dry runs

pub mod frame;
pub mod synthetic;

pub use frame::VideoFrame;
pub use synthetic::SyntheticSource;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera device available: {0}")]
    NoDevice(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Camera stream stopped")]
    Stopped,
}

impl CameraError {
    /// Check if the error happened while acquiring the stream
    /// (as opposed to a single bad frame)
    pub fn is_initialization(&self) -> bool {
        matches!(self, CameraError::PermissionDenied | CameraError::NoDevice(_) | CameraError::Format(_))
    }
}

/// A live video stream the capture loop can pull frames from
pub trait VideoSource: Send {
    /// Grab the current frame.
    ///
    /// Returns `Ok(None)` when the stream has not produced a new frame since
    /// the last call.
    fn grab_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Whether playback is paused
    fn is_paused(&self) -> bool;

    /// Stop all media tracks. Calling it twice is harmless.
    fn stop(&mut self);
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn grab_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        (**self).grab_frame()
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device identifier (e.g., "/dev/video0")
    pub device: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Frame rate the camera is opened at
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl CameraConfig {
    /// Check the requested stream shape
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::Format(format!("{}x{}", self.width, self.height)));
        }
        if self.fps == 0 {
            return Err(CameraError::Format("fps must be positive".into()));
        }
        Ok(())
    }
}
