//! Segment encoder driver
//!
//! Owns the encoder on its own tokio interval and feeds each flushed slice
//! into the shared [`RollingRecorder`]. Capture callbacks run after the
//! recorder lock is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use integrity_events::EvidenceBlob;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::buffer::DEFAULT_CAPACITY;
use crate::codec::{select_codec, MediaEncoder, DEFAULT_CODEC_PREFERENCES};
use crate::recorder::{CaptureCallback, FinalizedCapture, RollingRecorder};
use crate::RecorderError;

/// Longest accepted tail (segments)
const MAX_TAIL_SEGMENTS: u32 = 120;

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Duration of one encoded slice (ms)
    pub segment_ms: u64,
    /// Ring capacity while idle
    pub buffer_segments: usize,
    /// Segments recorded after a trigger before finalizing
    pub tail_segments: u32,
    /// Encodings probed in order
    pub codec_preferences: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            segment_ms: 1000,
            buffer_segments: DEFAULT_CAPACITY,
            tail_segments: 10,
            codec_preferences: DEFAULT_CODEC_PREFERENCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.segment_ms == 0 {
            return Err(RecorderError::Config("segment_ms must be positive".into()));
        }
        if self.buffer_segments == 0 {
            return Err(RecorderError::Config("buffer_segments must be positive".into()));
        }
        if self.tail_segments > MAX_TAIL_SEGMENTS {
            return Err(RecorderError::Config(format!(
                "tail_segments {} exceeds {}",
                self.tail_segments, MAX_TAIL_SEGMENTS
            )));
        }
        if self.codec_preferences.is_empty() {
            return Err(RecorderError::Config("codec_preferences is empty".into()));
        }
        Ok(())
    }

    /// Memory bound while idle (ms of footage)
    pub fn buffer_duration_ms(&self) -> u64 {
        self.segment_ms * self.buffer_segments as u64
    }
}

/// Result of asking for a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRequest {
    /// Callback stored; it runs once the tail completes
    Accepted,
    /// Another capture is pending; the callback was dropped
    AlreadyCapturing,
    /// Recording is disabled or stopped; the callback was dropped
    Unavailable,
}

struct Shared {
    recorder: Arc<Mutex<RollingRecorder>>,
    stop_tx: watch::Sender<bool>,
    stopped: AtomicBool,
    default_tail: u32,
}

impl Shared {
    fn recorder(&self) -> MutexGuard<'_, RollingRecorder> {
        lock(&self.recorder)
    }

    /// The stopped check happens under the recorder lock so a concurrent
    /// `stop` cannot leave a callback behind.
    fn trigger_capture(&self, tail_segments: u32, callback: CaptureCallback) -> CaptureRequest {
        let result = self.recorder().trigger_capture(tail_segments, callback);
        match result {
            Ok(finished) => {
                if let Some(finished) = finished {
                    finished.deliver();
                }
                CaptureRequest::Accepted
            }
            Err(RecorderError::Stopped) => CaptureRequest::Unavailable,
            Err(_) => CaptureRequest::AlreadyCapturing,
        }
    }
}

fn lock(recorder: &Mutex<RollingRecorder>) -> MutexGuard<'_, RollingRecorder> {
    recorder.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle to a running recorder.
///
/// A handle created without a usable codec is disabled: every capture
/// request reports [`CaptureRequest::Unavailable`].
#[derive(Clone)]
pub struct RecorderHandle {
    shared: Option<Arc<Shared>>,
}

impl RecorderHandle {
    /// Probe codecs, start the encoder and spawn the segment driver.
    ///
    /// Must be called within a tokio runtime. Codec or encoder start failures
    /// are logged and yield a disabled handle; only invalid configuration is
    /// an error.
    pub fn start<E: MediaEncoder>(config: &RecorderConfig, mut encoder: E) -> Result<Self, RecorderError> {
        config.validate()?;
        info!(
            "Creating rolling recorder ({} x {} ms, tail {})",
            config.buffer_segments, config.segment_ms, config.tail_segments
        );

        let Some(mime_type) = select_codec(&config.codec_preferences, &encoder) else {
            let err = RecorderError::NoSupportedCodec(config.codec_preferences.clone());
            error!("Evidence recording disabled: {}", err);
            return Ok(Self::disabled());
        };
        if let Err(e) = encoder.start(&mime_type) {
            error!("Evidence recording disabled: {}", e);
            return Ok(Self::disabled());
        }

        let recorder = Arc::new(Mutex::new(RollingRecorder::new(config.buffer_segments, mime_type)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let driver = SegmentDriver {
            recorder: recorder.clone(),
            encoder,
            segment_ms: config.segment_ms,
        };
        tokio::spawn(driver.run(stop_rx));

        Ok(Self {
            shared: Some(Arc::new(Shared {
                recorder,
                stop_tx,
                stopped: AtomicBool::new(false),
                default_tail: config.tail_segments,
            })),
        })
    }

    /// Handle with recording disabled
    pub fn disabled() -> Self {
        Self { shared: None }
    }

    /// Whether captures can currently be requested
    pub fn is_available(&self) -> bool {
        self.shared
            .as_ref()
            .map(|shared| !shared.stopped.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Start a capture ending `tail_segments` slices from now
    pub fn trigger_capture(&self, tail_segments: u32, callback: CaptureCallback) -> CaptureRequest {
        let Some(shared) = self.shared.as_ref() else {
            debug!("Capture requested while recording is disabled");
            return CaptureRequest::Unavailable;
        };
        shared.trigger_capture(tail_segments, callback)
    }

    /// Trigger a capture and wait for its evidence.
    ///
    /// `None` when recording is unavailable, another capture is pending, or
    /// the recorder is stopped before the tail completes.
    pub async fn capture_evidence(&self, tail_segments: u32) -> Option<EvidenceBlob> {
        let (tx, rx) = oneshot::channel();
        let callback: CaptureCallback = Box::new(move |blob| {
            let _ = tx.send(blob);
        });
        match self.trigger_capture(tail_segments, callback) {
            CaptureRequest::Accepted => rx.await.ok(),
            _ => None,
        }
    }

    /// Configured tail length
    pub fn default_tail(&self) -> u32 {
        self.shared.as_ref().map(|shared| shared.default_tail).unwrap_or(0)
    }

    pub fn buffer_len(&self) -> usize {
        self.shared
            .as_ref()
            .map(|shared| shared.recorder().buffer_len())
            .unwrap_or(0)
    }

    pub fn is_capturing(&self) -> bool {
        self.shared
            .as_ref()
            .map(|shared| shared.recorder().is_capturing())
            .unwrap_or(false)
    }

    /// Selected encoding, `None` when disabled
    pub fn mime_type(&self) -> Option<String> {
        self.shared
            .as_ref()
            .map(|shared| shared.recorder().mime_type().to_string())
    }

    /// Stop encoding and force the recorder idle without running a pending
    /// callback. Safe to call more than once.
    pub fn stop(&self) {
        let Some(shared) = self.shared.as_ref() else {
            return;
        };
        if shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = shared.stop_tx.send(true);
        shared.recorder().stop();
        metrics::gauge!("proctor_recorder_buffer_segments").set(0.0);
        info!("Rolling recorder stopped");
    }
}

struct SegmentDriver<E> {
    recorder: Arc<Mutex<RollingRecorder>>,
    encoder: E,
    segment_ms: u64,
}

impl<E: MediaEncoder> SegmentDriver<E> {
    async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_millis(self.segment_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; a slice ends one period later.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.flush(),
            }
        }

        self.encoder.stop();
        debug!("Segment driver stopped");
    }

    fn flush(&mut self) {
        let data = match self.encoder.flush_segment() {
            Ok(Some(data)) => data,
            Ok(None) => return,
            Err(e) => {
                warn!("Segment flush failed: {}", e);
                return;
            }
        };

        let finished: Option<FinalizedCapture> = {
            let mut recorder = lock(&self.recorder);
            let finished = recorder.push_segment(data, self.segment_ms);
            metrics::gauge!("proctor_recorder_buffer_segments").set(recorder.buffer_len() as f64);
            finished
        };
        if let Some(finished) = finished {
            finished.deliver();
        }
    }
}
