//! Worker thread and its handle

use std::thread::JoinHandle;

use gaze_monitor::{ClassifierConfig, LandmarkProvider, ViolationClassifier, VisionError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::{Envelope, WorkerEvent, WorkerRequest, PROTOCOL_VERSION};
use crate::WorkerError;

/// Sending half of the worker inbox
pub type RequestSender = mpsc::Sender<Envelope<WorkerRequest>>;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Inbox capacity (frames never queue; this only covers control messages)
    pub request_capacity: usize,
    /// Outbound event channel capacity
    pub event_capacity: usize,
    /// Classifier tuning
    pub classifier: ClassifierConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            request_capacity: 4,
            event_capacity: 64,
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Counters returned when the worker shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub violations_emitted: u64,
}

/// Handle owned by the main context
pub struct WorkerHandle {
    requests: RequestSender,
    thread: Option<JoinHandle<WorkerStats>>,
}

impl WorkerHandle {
    /// Inbox sender for the capture loop
    pub fn sender(&self) -> RequestSender {
        self.requests.clone()
    }

    /// Ask the worker to clear classifier state
    pub async fn reset(&self) -> Result<(), WorkerError> {
        self.requests
            .send(Envelope::new(WorkerRequest::Reset))
            .await
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Stop the worker and wait for its thread to exit
    pub async fn terminate(mut self) -> Result<WorkerStats, WorkerError> {
        if self.requests.send(Envelope::new(WorkerRequest::Shutdown)).await.is_err() {
            debug!("Worker inbox already closed");
        }
        let Some(thread) = self.thread.take() else {
            return Ok(WorkerStats::default());
        };
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|_| WorkerError::Panicked)?
            .map_err(|_| WorkerError::Panicked)
    }
}

/// Spawner for the offload worker
pub struct OffloadWorker;

impl OffloadWorker {
    /// Spawn the worker thread.
    ///
    /// `factory` runs on the worker thread; its success is reported as
    /// [`WorkerEvent::Ready`], its failure as [`WorkerEvent::InitFailed`].
    pub fn spawn<P, F>(
        config: WorkerConfig,
        factory: F,
    ) -> Result<(WorkerHandle, mpsc::Receiver<WorkerEvent>), WorkerError>
    where
        P: LandmarkProvider + 'static,
        F: FnOnce() -> Result<P, VisionError> + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel(config.request_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));

        let thread = std::thread::Builder::new()
            .name("offload-worker".into())
            .spawn(move || {
                let provider = match factory() {
                    Ok(provider) => {
                        info!("Offload worker ready");
                        let _ = event_tx.blocking_send(WorkerEvent::Ready);
                        Some(provider)
                    }
                    Err(e) => {
                        error!("Landmark provider failed to initialize: {}", e);
                        let _ = event_tx.blocking_send(WorkerEvent::InitFailed { reason: e.to_string() });
                        None
                    }
                };
                WorkerLoop {
                    provider,
                    classifier: ViolationClassifier::new(config.classifier),
                    events: event_tx,
                    stats: WorkerStats::default(),
                }
                .run(request_rx)
            })
            .map_err(|e| WorkerError::Bootstrap(e.to_string()))?;

        Ok((
            WorkerHandle {
                requests: request_tx,
                thread: Some(thread),
            },
            event_rx,
        ))
    }
}

struct WorkerLoop<P> {
    provider: Option<P>,
    classifier: ViolationClassifier,
    events: mpsc::Sender<WorkerEvent>,
    stats: WorkerStats,
}

impl<P: LandmarkProvider> WorkerLoop<P> {
    fn run(mut self, mut requests: mpsc::Receiver<Envelope<WorkerRequest>>) -> WorkerStats {
        while let Some(envelope) = requests.blocking_recv() {
            if !envelope.is_compatible() {
                warn!(
                    "Rejecting worker message with protocol version {} (expected {})",
                    envelope.version, PROTOCOL_VERSION
                );
                if let WorkerRequest::ProcessFrame { ack, .. } = envelope.body {
                    self.stats.frames_dropped += 1;
                    let _ = ack.send(());
                }
                let _ = self.events.blocking_send(WorkerEvent::Error {
                    reason: format!("unsupported protocol version {}", envelope.version),
                });
                continue;
            }

            match envelope.body {
                WorkerRequest::ProcessFrame { frame, timestamp_ms, ack } => {
                    self.process(&frame, timestamp_ms);
                    drop(frame);
                    let _ = ack.send(());
                }
                WorkerRequest::Reset => {
                    debug!("Resetting classifier state");
                    self.classifier.reset();
                }
                WorkerRequest::Shutdown => break,
            }
        }

        info!(
            "Offload worker stopped ({} processed, {} dropped)",
            self.stats.frames_processed, self.stats.frames_dropped
        );
        self.stats
    }

    fn process(&mut self, frame: &camera_capture::VideoFrame, timestamp_ms: f64) {
        let Some(provider) = self.provider.as_mut() else {
            self.stats.frames_dropped += 1;
            return;
        };

        let faces = match provider.detect(frame, timestamp_ms) {
            Ok(faces) => faces,
            Err(e) => {
                debug!("Frame {} dropped: {}", frame.sequence, e);
                self.stats.frames_dropped += 1;
                metrics::counter!("proctor_frames_failed_total").increment(1);
                let _ = self.events.try_send(WorkerEvent::FrameDropped { reason: e.to_string() });
                return;
            }
        };

        let output = self.classifier.process_faces(&faces, timestamp_ms);
        self.stats.frames_processed += 1;

        if let Some(pose) = output.pose {
            // Presentation only; lossy under load.
            let _ = self.events.try_send(WorkerEvent::PoseUpdate { pose, timestamp_ms });
        }
        if let Some(violation) = output.violation {
            self.stats.violations_emitted += 1;
            metrics::counter!("proctor_violations_total", "kind" => violation.kind().as_str()).increment(1);
            if self.events.blocking_send(WorkerEvent::Violation(violation)).is_err() {
                warn!("Violation dropped: event receiver closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::VideoFrame;
    use gaze_monitor::{FaceLandmarks, ScriptedProvider};
    use integrity_events::ViolationKind;
    use tokio::sync::oneshot;

    fn frame(sequence: u64) -> VideoFrame {
        VideoFrame::from_raw(vec![0; 4 * 4 * 3], 4, 4, sequence).unwrap()
    }

    async fn submit(sender: &RequestSender, sequence: u64, timestamp_ms: f64) {
        let (ack, done) = oneshot::channel();
        sender
            .send(Envelope::new(WorkerRequest::ProcessFrame {
                frame: frame(sequence),
                timestamp_ms,
                ack,
            }))
            .await
            .unwrap();
        done.await.unwrap();
    }

    fn violations(events: &mut mpsc::Receiver<WorkerEvent>) -> Vec<(ViolationKind, f64)> {
        let mut found = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let WorkerEvent::Violation(v) = event {
                found.push((v.kind(), v.timestamp_ms()));
            }
        }
        found
    }

    #[tokio::test]
    async fn test_ready_then_face_missing() {
        let provider = ScriptedProvider::new().repeat(Vec::new(), 30);
        let (handle, mut events) = OffloadWorker::spawn(WorkerConfig::default(), move || Ok(provider)).unwrap();
        assert!(matches!(events.recv().await, Some(WorkerEvent::Ready)));

        let sender = handle.sender();
        for i in 0..30u64 {
            submit(&sender, i, i as f64 * 100.0).await;
        }

        assert_eq!(violations(&mut events), vec![(ViolationKind::FaceMissing, 2000.0)]);
        let stats = handle.terminate().await.unwrap();
        assert_eq!(stats.frames_processed, 30);
        assert_eq!(stats.violations_emitted, 1);
    }

    #[tokio::test]
    async fn test_reset_restarts_debounce() {
        let provider = ScriptedProvider::new().repeat(Vec::new(), 40);
        let (handle, mut events) = OffloadWorker::spawn(WorkerConfig::default(), move || Ok(provider)).unwrap();
        assert!(matches!(events.recv().await, Some(WorkerEvent::Ready)));

        let sender = handle.sender();
        for i in 0..10u64 {
            submit(&sender, i, i as f64 * 100.0).await;
        }
        handle.reset().await.unwrap();
        for i in 10..40u64 {
            submit(&sender, i, i as f64 * 100.0).await;
        }

        // Onset restarts at 1000 ms instead of confirming at 2000 ms
        assert_eq!(violations(&mut events), vec![(ViolationKind::FaceMissing, 3000.0)]);
        let stats = handle.terminate().await.unwrap();
        assert_eq!(stats.frames_processed, 40);
    }

    #[tokio::test]
    async fn test_init_failure_drops_frames_but_acks() {
        let (handle, mut events) = OffloadWorker::spawn(WorkerConfig::default(), || {
            Err::<ScriptedProvider, _>(VisionError::ModelLoad("missing face mesh".into()))
        })
        .unwrap();
        assert!(matches!(events.recv().await, Some(WorkerEvent::InitFailed { .. })));

        submit(&handle.sender(), 0, 0.0).await;
        let stats = handle.terminate().await.unwrap();
        assert_eq!(stats.frames_processed, 0);
        assert_eq!(stats.frames_dropped, 1);
    }

    #[tokio::test]
    async fn test_provider_error_does_not_touch_classifier() {
        let mut provider = ScriptedProvider::new().repeat(Vec::new(), 19);
        provider = provider
            .then(Err(VisionError::Inference("tensor shape".into())))
            .then(Ok(Vec::new()));
        let (handle, mut events) = OffloadWorker::spawn(WorkerConfig::default(), move || Ok(provider)).unwrap();
        events.recv().await;

        let sender = handle.sender();
        for i in 0..19u64 {
            submit(&sender, i, i as f64 * 100.0).await;
        }
        submit(&sender, 19, 1950.0).await;
        submit(&sender, 20, 2000.0).await;

        let mut dropped = 0;
        let mut fired = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                WorkerEvent::FrameDropped { .. } => dropped += 1,
                WorkerEvent::Violation(v) => fired.push(v.timestamp_ms()),
                _ => {}
            }
        }
        assert_eq!(dropped, 1);
        assert_eq!(fired, vec![2000.0]);
        handle.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_version_mismatch_is_reported() {
        let (handle, mut events) =
            OffloadWorker::spawn(WorkerConfig::default(), || Ok(ScriptedProvider::new())).unwrap();
        events.recv().await;

        let (ack, done) = oneshot::channel();
        handle
            .sender()
            .send(Envelope {
                version: PROTOCOL_VERSION + 1,
                body: WorkerRequest::ProcessFrame {
                    frame: frame(0),
                    timestamp_ms: 0.0,
                    ack,
                },
            })
            .await
            .unwrap();
        done.await.unwrap();

        assert!(matches!(events.recv().await, Some(WorkerEvent::Error { .. })));
        handle.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_pose_updates_for_single_face() {
        let provider = ScriptedProvider::new().repeat(vec![FaceLandmarks::synthetic(0.3, 0.0)], 1);
        let (handle, mut events) = OffloadWorker::spawn(WorkerConfig::default(), move || Ok(provider)).unwrap();
        events.recv().await;

        submit(&handle.sender(), 0, 0.0).await;
        match events.recv().await {
            Some(WorkerEvent::PoseUpdate { pose, .. }) => assert!(pose.is_looking_away),
            other => panic!("expected pose update, got {:?}", other),
        }
        handle.terminate().await.unwrap();
    }
}
