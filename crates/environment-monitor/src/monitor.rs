//! Environment monitor implementation

use integrity_events::{Violation, ViolationKind};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::{Disposition, HostEvent, MonitorOutcome};
use crate::fullscreen::FullscreenController;
use crate::MonitorError;

/// Monitor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub violations: u64,
    pub suppressed: u64,
    /// Violations lost to a full or closed reporter inbox
    pub undelivered: u64,
}

/// Watches host signals while attached and forwards violations to the reporter
pub struct EnvironmentMonitor<F> {
    outbox: mpsc::Sender<Violation>,
    fullscreen: F,
    attached: bool,
    exiting_fullscreen: bool,
    origin: Instant,
    stats: MonitorStats,
}

impl<F: FullscreenController> EnvironmentMonitor<F> {
    /// Create a detached monitor delivering into `outbox`
    pub fn new(outbox: mpsc::Sender<Violation>, fullscreen: F) -> Self {
        info!("Creating environment monitor");
        Self {
            outbox,
            fullscreen,
            attached: false,
            exiting_fullscreen: false,
            origin: Instant::now(),
            stats: MonitorStats::default(),
        }
    }

    /// Stamp violations relative to `origin`, the session clock the
    /// capture loop also uses
    pub fn with_clock_origin(mut self, origin: Instant) -> Self {
        self.origin = origin;
        self
    }

    /// Start observing host events
    pub fn attach(&mut self) {
        if !self.attached {
            self.attached = true;
            info!("Environment monitor attached");
        }
    }

    /// Stop observing; later events pass through untouched
    pub fn detach(&mut self) {
        if self.attached {
            self.attached = false;
            info!("Environment monitor detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Enter fullscreen; `false` if the host refused
    pub fn enter_fullscreen(&mut self) -> bool {
        match self.fullscreen.request_fullscreen() {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not enter fullscreen: {}", e);
                false
            }
        }
    }

    /// Leave fullscreen without it counting as a violation
    pub fn exit_fullscreen(&mut self) -> bool {
        self.exiting_fullscreen = true;
        match self.fullscreen.exit_fullscreen() {
            Ok(()) => true,
            Err(e) => {
                self.exiting_fullscreen = false;
                warn!("Could not exit fullscreen: {}", e);
                false
            }
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.is_fullscreen()
    }

    /// Classify one host event and forward any violation it produces
    pub fn handle(&mut self, event: HostEvent) -> MonitorOutcome {
        if !self.attached {
            return MonitorOutcome::allow();
        }

        let timestamp_ms = self.origin.elapsed().as_secs_f64() * 1000.0;
        let (disposition, violation) = match event {
            HostEvent::VisibilityChanged { hidden: true } => (
                Disposition::Allow,
                Some(Violation::builder(ViolationKind::TabHidden, timestamp_ms).build()),
            ),
            HostEvent::VisibilityChanged { hidden: false } | HostEvent::WindowFocus => (Disposition::Allow, None),
            // A hidden document already produced TabHidden
            HostEvent::WindowBlur { document_hidden } => (
                Disposition::Allow,
                (!document_hidden).then(|| Violation::builder(ViolationKind::WindowBlur, timestamp_ms).build()),
            ),
            HostEvent::FullscreenChanged { active: true } => {
                self.exiting_fullscreen = false;
                (Disposition::Allow, None)
            }
            HostEvent::FullscreenChanged { active: false } => {
                if std::mem::take(&mut self.exiting_fullscreen) {
                    debug!("Programmatic fullscreen exit");
                    (Disposition::Allow, None)
                } else {
                    (
                        Disposition::Allow,
                        Some(Violation::builder(ViolationKind::FullscreenExit, timestamp_ms).build()),
                    )
                }
            }
            HostEvent::Clipboard(action) => (
                Disposition::Suppress,
                Some(
                    Violation::builder(ViolationKind::ClipboardAttempt, timestamp_ms)
                        .detail("action", action.as_str())
                        .build(),
                ),
            ),
            HostEvent::ContextMenu => (Disposition::Suppress, None),
        };

        if disposition == Disposition::Suppress {
            self.stats.suppressed += 1;
        }
        if let Some(violation) = &violation {
            self.forward(violation.clone());
        }
        MonitorOutcome {
            disposition,
            violation,
        }
    }

    fn forward(&mut self, violation: Violation) {
        let kind = violation.kind();
        self.stats.violations += 1;
        metrics::counter!("proctor_violations_total", "kind" => kind.as_str()).increment(1);
        info!("Environment violation: {}", kind);

        match self.outbox.try_send(violation) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => warn!("Reporter inbox full; dropping {}", kind),
            Err(TrySendError::Closed(_)) => warn!("Dropping {}: {}", kind, MonitorError::InboxClosed),
        }
        self.stats.undelivered += 1;
    }
}
