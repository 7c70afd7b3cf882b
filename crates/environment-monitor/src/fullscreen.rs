//! Fullscreen control boundary

use tracing::debug;

use crate::MonitorError;

/// Host capability to enter and leave fullscreen
pub trait FullscreenController: Send {
    fn request_fullscreen(&mut self) -> Result<(), MonitorError>;

    fn exit_fullscreen(&mut self) -> Result<(), MonitorError>;

    fn is_fullscreen(&self) -> bool;
}

impl<C: FullscreenController + ?Sized> FullscreenController for Box<C> {
    fn request_fullscreen(&mut self) -> Result<(), MonitorError> {
        (**self).request_fullscreen()
    }

    fn exit_fullscreen(&mut self) -> Result<(), MonitorError> {
        (**self).exit_fullscreen()
    }

    fn is_fullscreen(&self) -> bool {
        (**self).is_fullscreen()
    }
}

/// In-process fullscreen state, optionally denying requests
#[derive(Debug, Default, Clone)]
pub struct SimulatedFullscreen {
    active: bool,
    deny: bool,
}

impl SimulatedFullscreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller whose requests are always refused
    pub fn denying() -> Self {
        Self {
            active: false,
            deny: true,
        }
    }
}

impl FullscreenController for SimulatedFullscreen {
    fn request_fullscreen(&mut self) -> Result<(), MonitorError> {
        if self.deny {
            return Err(MonitorError::FullscreenDenied("request refused by host".into()));
        }
        self.active = true;
        debug!("Entered fullscreen");
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> Result<(), MonitorError> {
        if !self.active {
            return Err(MonitorError::FullscreenDenied("not in fullscreen".into()));
        }
        self.active = false;
        debug!("Exited fullscreen");
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.active
    }
}
