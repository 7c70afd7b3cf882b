//! Host signals and monitor outcomes

use integrity_events::Violation;
use serde::{Deserialize, Serialize};

/// Clipboard operation attempted by the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

impl ClipboardAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Cut => "cut",
            Self::Paste => "paste",
        }
    }
}

/// Signal raised by the host window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostEvent {
    /// Document visibility changed
    VisibilityChanged { hidden: bool },
    /// Window lost focus; `document_hidden` is the visibility at that moment
    WindowBlur { document_hidden: bool },
    WindowFocus,
    /// Fullscreen state changed
    FullscreenChanged { active: bool },
    Clipboard(ClipboardAction),
    ContextMenu,
}

/// What the host should do with the event's default action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Allow,
    /// Prevent the default action
    Suppress,
}

/// Result of handling one host event
#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    pub disposition: Disposition,
    pub violation: Option<Violation>,
}

impl MonitorOutcome {
    pub(crate) fn allow() -> Self {
        Self {
            disposition: Disposition::Allow,
            violation: None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.disposition == Disposition::Suppress
    }
}
