//! Proctor Integrity Pipeline
//!
//! Wires the capture loop, offload worker, rolling recorder, environment
//! monitor and violation reporter into one pipeline, and provides the
//! configuration and telemetry setup used by the `proctor-pipeline` binary.

mod config;
mod pipeline;
mod telemetry;

pub use config::{PipelineConfig, TelemetryConfig};
pub use pipeline::{
    CameraOpener, Pipeline, PipelineComponents, PipelineNotification, PipelineSummary, ProviderFactory,
};
pub use telemetry::{init_logging, install_metrics_exporter};

use camera_capture::CameraError;
use capture_loop::CaptureError;
use gaze_monitor::VisionError;
use offload_worker::WorkerError;
use rolling_recorder::RecorderError;
use thiserror::Error;
use violation_reporter::ReportError;

/// Pipeline error types
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Camera could not be acquired; reported to the host, never as a violation
    #[error("Camera initialization failed: {0}")]
    Camera(#[from] CameraError),

    #[error("Classifier configuration error: {0}")]
    Vision(#[from] VisionError),

    #[error("Capture loop error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Reporter error: {0}")]
    Report(#[from] ReportError),

    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),
}

impl From<::config::ConfigError> for PipelineError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
