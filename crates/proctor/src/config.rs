//! Pipeline configuration

use std::path::Path;

use ::config::{Config, ConfigBuilder, Environment, File, FileFormat};
use ::config::builder::DefaultState;
use camera_capture::CameraConfig;
use capture_loop::CaptureConfig;
use offload_worker::WorkerConfig;
use rolling_recorder::RecorderConfig;
use serde::{Deserialize, Serialize};
use tracing::info;
use violation_reporter::ReporterConfig;

use crate::PipelineError;

/// Environment variable prefix, e.g. `PROCTOR__RECORDER__BUFFER_SEGMENTS=20`
const ENV_PREFIX: &str = "PROCTOR";
const ENV_SEPARATOR: &str = "__";

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
    /// Prometheus listen address, exporter disabled when unset
    pub metrics_listen: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_listen: None,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub worker: WorkerConfig,
    pub recorder: RecorderConfig,
    pub reporter: ReporterConfig,
    pub telemetry: TelemetryConfig,
}

impl PipelineConfig {
    /// Load defaults, then the optional file, then `PROCTOR__*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        Self::build(builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        ))
    }

    /// Parse a TOML document, without environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self, PipelineError> {
        Self::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, PipelineError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.camera
            .validate()
            .map_err(|e| PipelineError::Config(format!("camera: {}", e)))?;
        self.capture.tick_interval()?;
        self.worker.classifier.validate()?;
        if self.worker.request_capacity == 0 || self.worker.event_capacity == 0 {
            return Err(PipelineError::Config("worker channel capacities must be positive".into()));
        }
        self.recorder.validate()?;
        self.reporter.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.refresh_hz, 60.0);
        assert_eq!(config.worker.classifier.debounce_ms, 2000);
        assert_eq!(config.recorder.buffer_segments, 15);
        assert_eq!(config.recorder.tail_segments, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [recorder]
            buffer_segments = 20

            [worker.classifier]
            debounce_ms = 1500

            [reporter]
            session_id = "exam-7"
            "#,
        )
        .unwrap();
        assert_eq!(config.recorder.buffer_segments, 20);
        assert_eq!(config.recorder.segment_ms, 1000);
        assert_eq!(config.worker.classifier.debounce_ms, 1500);
        assert_eq!(config.worker.classifier.reemit_interval_ms, 5000);
        assert_eq!(config.reporter.session_id, "exam-7");
    }

    #[test]
    fn test_rejects_long_tail() {
        let err = PipelineConfig::from_toml_str("[recorder]\ntail_segments = 500\n").unwrap_err();
        assert!(matches!(err, PipelineError::Recorder(_)));
    }

    #[test]
    fn test_rejects_zero_refresh_rate() {
        let err = PipelineConfig::from_toml_str("[capture]\nrefresh_hz = 0.0\n").unwrap_err();
        assert!(matches!(err, PipelineError::Capture(_)));
    }

    #[test]
    fn test_environment_overrides() {
        std::env::set_var("PROCTOR__RECORDER__TAIL_SEGMENTS", "4");
        let config = PipelineConfig::load(None).unwrap();
        std::env::remove_var("PROCTOR__RECORDER__TAIL_SEGMENTS");
        assert_eq!(config.recorder.tail_segments, 4);
    }
}
