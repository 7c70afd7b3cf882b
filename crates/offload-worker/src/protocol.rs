//! Worker message protocol

use camera_capture::VideoFrame;
use gaze_monitor::PoseEstimate;
use integrity_events::Violation;
use tokio::sync::oneshot;

/// Protocol version stamped on every envelope
pub const PROTOCOL_VERSION: u16 = 1;

/// Completion signal for one submitted frame
pub type FrameAck = oneshot::Sender<()>;

/// Versioned message wrapper
#[derive(Debug)]
pub struct Envelope<T> {
    pub version: u16,
    pub body: T,
}

impl<T> Envelope<T> {
    /// Wrap a message with the current protocol version
    pub fn new(body: T) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            body,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

/// Main context -> worker
#[derive(Debug)]
pub enum WorkerRequest {
    /// Process one frame. Ownership of the bitmap moves to the worker;
    /// `ack` fires once processing (or dropping) is done.
    ProcessFrame {
        frame: VideoFrame,
        timestamp_ms: f64,
        ack: FrameAck,
    },
    /// Clear classifier state
    Reset,
    /// Stop the worker loop
    Shutdown,
}

/// Worker -> main context
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Landmark provider initialized, frames will be processed
    Ready,
    /// Landmark provider could not be created; frames will be dropped
    InitFailed { reason: String },
    /// Pose of the primary face for the last processed frame
    PoseUpdate { pose: PoseEstimate, timestamp_ms: f64 },
    /// Confirmed (or repeated) violation
    Violation(Violation),
    /// A single frame was skipped by the provider
    FrameDropped { reason: String },
    /// Protocol-level problem, e.g. a version mismatch
    Error { reason: String },
}

