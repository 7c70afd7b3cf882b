//! Logging and metrics setup

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;
use crate::PipelineError;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| PipelineError::Telemetry(e.to_string()))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| PipelineError::Telemetry(e.to_string()))
}

/// Serve Prometheus metrics on `listen`. Must run inside a tokio runtime.
pub fn install_metrics_exporter(listen: &str) -> Result<(), PipelineError> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| PipelineError::Telemetry(format!("invalid metrics address {}: {}", listen, e)))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| PipelineError::Telemetry(e.to_string()))?;
    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}
