//! Pipeline assembly and lifecycle

use std::sync::Arc;

use camera_capture::{CameraConfig, CameraError, SyntheticSource, VideoSource};
use capture_loop::{CaptureLoop, CaptureStats};
use environment_monitor::{
    EnvironmentMonitor, FullscreenController, HostEvent, MonitorOutcome, SimulatedFullscreen,
};
use gaze_monitor::{LandmarkProvider, PoseEstimate, StaticFaceProvider, VisionError};
use integrity_events::{Violation, ViolationKind};
use offload_worker::{OffloadWorker, WorkerEvent, WorkerHandle, WorkerStats};
use rolling_recorder::{MediaEncoder, RecorderHandle, SyntheticEncoder};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use violation_reporter::{ReportOutcome, ReportRecord, ViolationReporter, ViolationTransport};

use crate::config::PipelineConfig;
use crate::PipelineError;

/// Opens the camera once, before anything else starts
pub type CameraOpener = Box<dyn FnOnce(&CameraConfig) -> Result<Box<dyn VideoSource>, CameraError> + Send>;

/// Builds the landmark provider on the worker thread
pub type ProviderFactory = Box<dyn FnOnce() -> Result<Box<dyn LandmarkProvider>, VisionError> + Send>;

type SharedCapture = Arc<Mutex<CaptureLoop<Box<dyn VideoSource>>>>;

/// Status pushed to the host UI
#[derive(Debug, Clone)]
pub enum PipelineNotification {
    /// Detection is running
    Ready,
    /// Detection is disabled; recording and environment checks continue
    InitFailed { reason: String },
    PoseUpdate { pose: PoseEstimate, timestamp_ms: f64 },
    Violation(Violation),
    /// A hard violation was reported without video evidence
    EvidenceUnavailable { violation_id: Uuid, kind: ViolationKind },
}

/// External collaborators the pipeline runs against
pub struct PipelineComponents {
    pub camera: CameraOpener,
    pub landmarks: ProviderFactory,
    pub encoder: Box<dyn MediaEncoder>,
    pub transport: Arc<dyn ViolationTransport>,
    pub fullscreen: Box<dyn FullscreenController>,
}

impl PipelineComponents {
    /// Synthetic camera, static face, synthetic WebM encoder
    pub fn synthetic(transport: Arc<dyn ViolationTransport>) -> Self {
        Self {
            camera: Box::new(|config| {
                SyntheticSource::open(config).map(|source| Box::new(source) as Box<dyn VideoSource>)
            }),
            landmarks: Box::new(|| Ok(Box::new(StaticFaceProvider::new()) as Box<dyn LandmarkProvider>)),
            encoder: Box::new(SyntheticEncoder::webm()),
            transport,
            fullscreen: Box::new(SimulatedFullscreen::new()),
        }
    }

    pub fn with_camera<S, F>(mut self, open: F) -> Self
    where
        S: VideoSource + 'static,
        F: FnOnce(&CameraConfig) -> Result<S, CameraError> + Send + 'static,
    {
        self.camera = Box::new(move |config| open(config).map(|source| Box::new(source) as Box<dyn VideoSource>));
        self
    }

    pub fn with_landmarks<P, F>(mut self, factory: F) -> Self
    where
        P: LandmarkProvider + 'static,
        F: FnOnce() -> Result<P, VisionError> + Send + 'static,
    {
        self.landmarks = Box::new(move || factory().map(|provider| Box::new(provider) as Box<dyn LandmarkProvider>));
        self
    }

    pub fn with_encoder<E: MediaEncoder>(mut self, encoder: E) -> Self {
        self.encoder = Box::new(encoder);
        self
    }

    pub fn with_fullscreen<C: FullscreenController + 'static>(mut self, fullscreen: C) -> Self {
        self.fullscreen = Box::new(fullscreen);
        self
    }
}

/// Counters collected on shutdown
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSummary {
    pub capture: CaptureStats,
    /// `None` if the worker could not be joined
    pub worker: Option<WorkerStats>,
}

/// Running integrity pipeline
pub struct Pipeline {
    capture: SharedCapture,
    worker: Option<WorkerHandle>,
    recorder: RecorderHandle,
    reporter: ViolationReporter,
    monitor: EnvironmentMonitor<Box<dyn FullscreenController>>,
    notifications: broadcast::Sender<PipelineNotification>,
    router: JoinHandle<()>,
    reporter_task: JoinHandle<()>,
}

impl Pipeline {
    /// Acquire the camera and start every component.
    ///
    /// Must be called within a tokio runtime. Only configuration errors, a
    /// failed camera and a worker thread that cannot be spawned are fatal; an
    /// unsupported codec or a failing landmark provider degrade the pipeline.
    pub fn start(config: PipelineConfig, components: PipelineComponents) -> Result<Self, PipelineError> {
        config.validate()?;
        info!("Starting integrity pipeline (session {})", config.reporter.session_id);

        let source = (components.camera)(&config.camera).map_err(|e| {
            error!("Camera unavailable: {}", e);
            PipelineError::Camera(e)
        })?;

        // Vision and environment violations share one timeline
        let session_origin = Instant::now();
        let recorder = RecorderHandle::start(&config.recorder, components.encoder)?;
        let reporter = ViolationReporter::new(&config.reporter, components.transport, recorder.clone());
        let (inbox_tx, inbox_rx) = mpsc::channel(config.reporter.inbox_capacity);
        let reporter_task = tokio::spawn(reporter.clone().run(inbox_rx));

        let (worker, events) = OffloadWorker::spawn(config.worker.clone(), components.landmarks)?;
        let capture: SharedCapture = Arc::new(Mutex::new(
            CaptureLoop::new(config.capture.clone(), source, worker.sender()).with_clock_origin(session_origin),
        ));

        let mut monitor =
            EnvironmentMonitor::new(inbox_tx.clone(), components.fullscreen).with_clock_origin(session_origin);
        monitor.attach();

        let (notifications, _) = broadcast::channel(256);
        let router = Router {
            capture: capture.clone(),
            reporter_inbox: inbox_tx,
            notifications: notifications.clone(),
        };
        let router = tokio::spawn(router.run(events, reporter.subscribe()));

        Ok(Self {
            capture,
            worker: Some(worker),
            recorder,
            reporter,
            monitor,
            notifications,
            router,
            reporter_task,
        })
    }

    /// Subscribe to host notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineNotification> {
        self.notifications.subscribe()
    }

    /// Forward a host window event to the environment monitor
    pub fn handle_host_event(&mut self, event: HostEvent) -> MonitorOutcome {
        self.monitor.handle(event)
    }

    pub fn enter_fullscreen(&mut self) -> bool {
        self.monitor.enter_fullscreen()
    }

    pub fn exit_fullscreen(&mut self) -> bool {
        self.monitor.exit_fullscreen()
    }

    pub fn recorder(&self) -> &RecorderHandle {
        &self.recorder
    }

    pub fn reporter(&self) -> &ViolationReporter {
        &self.reporter
    }

    pub async fn is_capturing(&self) -> bool {
        self.capture.lock().await.is_running()
    }

    pub async fn capture_stats(&self) -> CaptureStats {
        self.capture.lock().await.stats()
    }

    /// Stop capture, terminate the worker, force the recorder idle without
    /// running pending callbacks, and detach the environment monitor.
    pub async fn stop(mut self) -> PipelineSummary {
        info!("Stopping integrity pipeline");
        self.router.abort();

        let capture = {
            let mut capture = self.capture.lock().await;
            capture.shutdown().await;
            capture.stats()
        };

        let worker = match self.worker.take() {
            Some(worker) => match worker.terminate().await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("Worker did not shut down cleanly: {}", e);
                    None
                }
            },
            None => None,
        };

        self.recorder.stop();
        self.monitor.detach();
        self.reporter_task.abort();

        info!(
            "Integrity pipeline stopped ({} frames submitted, {} skipped busy)",
            capture.submitted, capture.skipped_busy
        );
        PipelineSummary { capture, worker }
    }
}

/// Routes worker events and report outcomes to their consumers
struct Router {
    capture: SharedCapture,
    reporter_inbox: mpsc::Sender<Violation>,
    notifications: broadcast::Sender<PipelineNotification>,
}

impl Router {
    async fn run(self, mut events: mpsc::Receiver<WorkerEvent>, mut records: broadcast::Receiver<ReportRecord>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.on_worker_event(event).await,
                    None => {
                        debug!("Worker event channel closed");
                        break;
                    }
                },
                record = records.recv() => match record {
                    Ok(record) => self.on_report(record),
                    Err(RecvError::Lagged(missed)) => warn!("Missed {} report outcomes", missed),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    async fn on_worker_event(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::Ready => {
                match self.capture.lock().await.start() {
                    Ok(_) => info!("Detection ready; capture loop running"),
                    Err(e) => error!("Capture loop failed to start: {}", e),
                }
                self.notify(PipelineNotification::Ready);
            }
            WorkerEvent::InitFailed { reason } => {
                error!("Detection disabled: {}", reason);
                self.notify(PipelineNotification::InitFailed { reason });
            }
            WorkerEvent::PoseUpdate { pose, timestamp_ms } => {
                self.notify(PipelineNotification::PoseUpdate { pose, timestamp_ms });
            }
            WorkerEvent::Violation(violation) => {
                self.notify(PipelineNotification::Violation(violation.clone()));
                if let Err(e) = self.reporter_inbox.try_send(violation) {
                    warn!("Violation not queued for reporting: {}", e);
                }
            }
            WorkerEvent::FrameDropped { reason } => debug!("Frame dropped: {}", reason),
            WorkerEvent::Error { reason } => warn!("Worker error: {}", reason),
        }
    }

    fn on_report(&self, record: ReportRecord) {
        if record.outcome == ReportOutcome::DeliveredWithoutEvidence {
            self.notify(PipelineNotification::EvidenceUnavailable {
                violation_id: record.violation_id,
                kind: record.kind,
            });
        }
    }

    fn notify(&self, notification: PipelineNotification) {
        // No subscribers is fine
        let _ = self.notifications.send(notification);
    }
}
