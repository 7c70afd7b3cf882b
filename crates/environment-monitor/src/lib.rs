//! Environment Monitor
//!
//! Turns discrete host signals (tab visibility, window focus, fullscreen
//! changes, clipboard access) into soft violations delivered straight to the
//! reporter. Clipboard and context-menu events are suppressed.

mod events;
mod fullscreen;
mod monitor;

pub use events::{ClipboardAction, Disposition, HostEvent, MonitorOutcome};
pub use fullscreen::{FullscreenController, SimulatedFullscreen};
pub use monitor::{EnvironmentMonitor, MonitorStats};

use thiserror::Error;

/// Environment monitor error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Fullscreen request denied: {0}")]
    FullscreenDenied(String),

    #[error("Reporter inbox closed")]
    InboxClosed,
}
