//! Capture Loop for Frame Submission
//!
//! Pulls frames from the live video source at the display refresh rate and
//! hands them to the offload worker without blocking. A new frame is only
//! submitted once the previous one has been acknowledged; ticks in between
//! are skipped, never queued.

mod clock;
mod scheduler;

pub use clock::FrameClock;
pub use scheduler::{CaptureConfig, CaptureLoop, CaptureStats};

use thiserror::Error;

/// Capture loop configuration errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Invalid refresh rate: {0} Hz")]
    InvalidRefreshRate(f64),
}
