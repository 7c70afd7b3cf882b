//! Capture loop implementation

use std::time::Duration;

use camera_capture::{CameraError, VideoSource};
use offload_worker::{Envelope, RequestSender, WorkerRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::FrameClock;
use crate::CaptureError;

/// Accepted refresh rates (Hz)
const MIN_REFRESH_HZ: f64 = 1.0;
const MAX_REFRESH_HZ: f64 = 1000.0;

/// Configuration for the capture loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Display refresh rate the loop ticks at (Hz)
    pub refresh_hz: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { refresh_hz: 60.0 }
    }
}

impl CaptureConfig {
    /// Interval between ticks
    pub fn tick_interval(&self) -> Result<Duration, CaptureError> {
        if !(MIN_REFRESH_HZ..=MAX_REFRESH_HZ).contains(&self.refresh_hz) {
            return Err(CaptureError::InvalidRefreshRate(self.refresh_hz));
        }
        Ok(Duration::from_secs_f64(1.0 / self.refresh_hz))
    }
}

/// Loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames handed to the worker
    pub submitted: u64,
    /// Ticks skipped because the previous frame was still in flight
    pub skipped_busy: u64,
    /// Ticks skipped because the source had nothing new or was paused
    pub skipped_no_frame: u64,
    /// Frames that failed to decode
    pub failed: u64,
}

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Display-paced frame pump feeding the offload worker
pub struct CaptureLoop<S> {
    config: CaptureConfig,
    source: Option<S>,
    requests: RequestSender,
    running: Option<RunningLoop>,
    stats_tx: watch::Sender<CaptureStats>,
    clock_origin: Instant,
}

impl<S: VideoSource + 'static> CaptureLoop<S> {
    /// Create a loop over `source`, submitting to the worker inbox `requests`
    pub fn new(config: CaptureConfig, source: S, requests: RequestSender) -> Self {
        let (stats_tx, _) = watch::channel(CaptureStats::default());
        Self {
            config,
            source: Some(source),
            requests,
            running: None,
            stats_tx,
            clock_origin: Instant::now(),
        }
    }

    /// Stamp frames relative to `origin` instead of loop creation
    pub fn with_clock_origin(mut self, origin: Instant) -> Self {
        self.clock_origin = origin;
        self
    }

    /// Start pumping frames. Starting a running loop is a no-op.
    ///
    /// Returns `true` if a new loop was started.
    pub fn start(&mut self) -> Result<bool, CaptureError> {
        if self.is_running() {
            debug!("Capture loop already running");
            return Ok(false);
        }
        let period = self.config.tick_interval()?;
        let Some(source) = self.source.take() else {
            warn!("Capture loop cannot restart: video source was released");
            return Ok(false);
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let pump = FramePump {
            source,
            requests: self.requests.clone(),
            stats_tx: self.stats_tx.clone(),
            stats: *self.stats_tx.borrow(),
            clock: FrameClock::with_origin(self.clock_origin),
        };
        let task = tokio::spawn(pump.run(period, stop_rx));

        info!("Capture loop started at {:.1} Hz", self.config.refresh_hz);
        self.running = Some(RunningLoop { stop_tx, task });
        Ok(true)
    }

    /// Cancel the next tick and stop the source's tracks. Safe to call twice.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(true);
            info!("Capture loop stopping");
        }
        self.release_source();
    }

    /// Stop and wait for the loop task to finish
    pub async fn shutdown(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(true);
            if let Err(e) = running.task.await {
                warn!("Capture loop task ended abnormally: {}", e);
            }
        }
        self.release_source();
    }

    /// A loop that never started still owns the source
    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
            debug!("Released unused video source");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|running| !running.task.is_finished())
            .unwrap_or(false)
    }

    /// Snapshot of the loop counters
    pub fn stats(&self) -> CaptureStats {
        *self.stats_tx.borrow()
    }

    /// Subscribe to counter updates
    pub fn watch_stats(&self) -> watch::Receiver<CaptureStats> {
        self.stats_tx.subscribe()
    }
}

impl<S> Drop for CaptureLoop<S> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(true);
        }
    }
}

struct FramePump<S> {
    source: S,
    requests: RequestSender,
    stats_tx: watch::Sender<CaptureStats>,
    stats: CaptureStats,
    clock: FrameClock,
}

enum Tick {
    Continue,
    Halt,
}

impl<S: VideoSource> FramePump<S> {
    async fn run(mut self, period: Duration, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut clock = self.clock.clone();
        let mut in_flight: Option<oneshot::Receiver<()>> = None;

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Tick::Halt = self.tick(&mut clock, &mut in_flight) {
                        break;
                    }
                    self.stats_tx.send_replace(self.stats);
                }
            }
        }

        self.source.stop();
        self.stats_tx.send_replace(self.stats);
        info!(
            "Capture loop stopped ({} submitted, {} skipped busy, {} failed)",
            self.stats.submitted, self.stats.skipped_busy, self.stats.failed
        );
    }

    fn tick(&mut self, clock: &mut FrameClock, in_flight: &mut Option<oneshot::Receiver<()>>) -> Tick {
        if let Some(done) = in_flight.as_mut() {
            match done.try_recv() {
                Ok(()) | Err(TryRecvError::Closed) => *in_flight = None,
                Err(TryRecvError::Empty) => {
                    self.stats.skipped_busy += 1;
                    metrics::counter!("proctor_frames_skipped_total", "reason" => "busy").increment(1);
                    return Tick::Continue;
                }
            }
        }

        if self.source.is_paused() {
            self.stats.skipped_no_frame += 1;
            return Tick::Continue;
        }

        let frame = match self.source.grab_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.stats.skipped_no_frame += 1;
                return Tick::Continue;
            }
            Err(CameraError::Stopped) => {
                warn!("Video source stopped; ending capture loop");
                return Tick::Halt;
            }
            Err(e) => {
                warn!("Frame grab failed: {}", e);
                self.stats.failed += 1;
                metrics::counter!("proctor_frames_failed_total").increment(1);
                return Tick::Continue;
            }
        };

        let (ack, done) = oneshot::channel();
        let request = WorkerRequest::ProcessFrame {
            frame,
            timestamp_ms: clock.next_timestamp(),
            ack,
        };

        match self.requests.try_send(Envelope::new(request)) {
            Ok(()) => {
                *in_flight = Some(done);
                self.stats.submitted += 1;
                metrics::counter!("proctor_frames_submitted_total").increment(1);
                Tick::Continue
            }
            Err(TrySendError::Full(_)) => {
                self.stats.skipped_busy += 1;
                metrics::counter!("proctor_frames_skipped_total", "reason" => "inbox_full").increment(1);
                Tick::Continue
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Worker inbox closed; ending capture loop");
                Tick::Halt
            }
        }
    }
}
