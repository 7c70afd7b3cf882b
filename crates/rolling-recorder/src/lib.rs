//! Rolling Buffer Recorder
//!
//! Keeps the last N encoded video segments in memory and, when a violation
//! triggers a capture, keeps recording for a fixed tail before splicing
//! everything into one evidence blob.

mod buffer;
mod codec;
mod driver;
mod recorder;

pub use buffer::{EncodedSegment, SegmentRing};
pub use codec::{select_codec, MediaEncoder, SyntheticEncoder, DEFAULT_CODEC_PREFERENCES};
pub use driver::{CaptureRequest, RecorderConfig, RecorderHandle};
pub use recorder::{CaptureCallback, FinalizedCapture, RecorderState, RollingRecorder};

use thiserror::Error;

/// Recorder error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("No supported codec among {0:?}")]
    NoSupportedCodec(Vec<String>),

    #[error("Encoder failed: {0}")]
    Encoder(String),

    #[error("Capture already in progress")]
    CaptureInProgress,

    #[error("Recorder stopped")]
    Stopped,

    #[error("Invalid recorder configuration: {0}")]
    Config(String),
}
