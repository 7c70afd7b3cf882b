//! Proctor Integrity Pipeline - Main Entry Point
//!
//! Usage: `proctor-pipeline [CONFIG_FILE] [RUN_SECONDS]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use proctor::{init_logging, install_metrics_exporter, Pipeline, PipelineComponents, PipelineConfig, PipelineNotification};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use violation_reporter::{HttpTransport, LogTransport, ViolationTransport};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let run_for = args
        .next()
        .map(|secs| secs.parse::<u64>())
        .transpose()
        .context("run duration must be a whole number of seconds")?
        .map(Duration::from_secs);

    let config = PipelineConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.telemetry)?;
    if let Some(listen) = &config.telemetry.metrics_listen {
        install_metrics_exporter(listen)?;
    }

    info!("=== Proctor Integrity Pipeline v{} ===", env!("CARGO_PKG_VERSION"));

    let transport: Arc<dyn ViolationTransport> = if config.reporter.has_backend() {
        Arc::new(HttpTransport::new(&config.reporter)?)
    } else {
        warn!("No backend configured; violations are only logged");
        Arc::new(LogTransport)
    };

    let mut pipeline = Pipeline::start(config, PipelineComponents::synthetic(transport))?;
    let mut notifications = pipeline.subscribe();
    if !pipeline.enter_fullscreen() {
        warn!("Continuing without fullscreen");
    }

    let shutdown = async {
        match run_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Ctrl-C handler failed: {}", e);
                }
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            notification = notifications.recv() => match notification {
                Ok(PipelineNotification::PoseUpdate { .. }) => {}
                Ok(notification) => info!("{:?}", notification),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    let summary = pipeline.stop().await;
    info!("Shutdown complete: {:?}", summary);
    Ok(())
}
