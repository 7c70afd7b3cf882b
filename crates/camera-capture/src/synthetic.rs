//! Synthetic video source
//!
//! Produces a deterministic gradient pattern. Used by the demo binary and by
//! tests that need a camera without hardware.

use std::collections::HashSet;

use image::{Rgb, RgbImage};
use tracing::{debug, info};

use crate::{CameraConfig, CameraError, VideoFrame, VideoSource};

/// Test-pattern camera
pub struct SyntheticSource {
    width: u32,
    height: u32,
    next_sequence: u64,
    paused: bool,
    stopped: bool,
    /// Sequence numbers that fail to decode
    fail_on: HashSet<u64>,
}

impl SyntheticSource {
    /// Open a synthetic stream with the configured shape
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        config.validate()?;
        info!(
            "Opened synthetic camera {} ({}x{} @ {}fps)",
            config.device, config.width, config.height, config.fps
        );
        Ok(Self {
            width: config.width,
            height: config.height,
            next_sequence: 0,
            paused: false,
            stopped: false,
            fail_on: HashSet::new(),
        })
    }

    /// Make the frame with this sequence number fail to decode
    pub fn fail_frame(&mut self, sequence: u64) {
        self.fail_on.insert(sequence);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn render(&self, sequence: u64) -> RgbImage {
        let shift = (sequence % 256) as u32;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                (shift % 256) as u8,
            ])
        })
    }
}

impl VideoSource for SyntheticSource {
    fn grab_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.stopped {
            return Err(CameraError::Stopped);
        }
        if self.paused {
            return Ok(None);
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.fail_on.remove(&sequence) {
            return Err(CameraError::Decode(format!("synthetic failure at frame {}", sequence)));
        }

        Ok(Some(VideoFrame::new(self.render(sequence), sequence)))
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn stop(&mut self) {
        if !self.stopped {
            debug!("Stopping synthetic camera tracks");
            self.stopped = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> CameraConfig {
        CameraConfig {
            width: 8,
            height: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_frames_are_sequenced() {
        let mut source = SyntheticSource::open(&small()).unwrap();
        let a = source.grab_frame().unwrap().unwrap();
        let b = source.grab_frame().unwrap().unwrap();
        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
        assert_eq!(b.width(), 8);
    }

    #[test]
    fn test_paused_source_yields_nothing() {
        let mut source = SyntheticSource::open(&small()).unwrap();
        source.set_paused(true);
        assert!(source.grab_frame().unwrap().is_none());
        assert!(source.is_paused());
    }

    #[test]
    fn test_scripted_decode_failure_then_recovery() {
        let mut source = SyntheticSource::open(&small()).unwrap();
        source.fail_frame(1);
        assert!(source.grab_frame().is_ok());
        assert!(matches!(source.grab_frame(), Err(CameraError::Decode(_))));
        assert_eq!(source.grab_frame().unwrap().unwrap().sequence, 2);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut source = SyntheticSource::open(&small()).unwrap();
        source.stop();
        source.stop();
        assert!(source.is_stopped());
        assert_eq!(source.grab_frame().unwrap_err(), CameraError::Stopped);
    }
}
