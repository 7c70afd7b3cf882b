//! Codec probe and segment encoder boundary

use tracing::{debug, info};

use crate::RecorderError;

/// Encodings probed in order; the first supported one wins
pub const DEFAULT_CODEC_PREFERENCES: &[&str] = &[
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
    "video/mp4",
];

/// Continuous video encoder producing time-sliced segments
pub trait MediaEncoder: Send + 'static {
    /// Whether the encoder can produce `mime_type`
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Begin encoding with the selected type
    fn start(&mut self, mime_type: &str) -> Result<(), RecorderError>;

    /// Close the current slice and return its bytes, `None` if nothing was encoded
    fn flush_segment(&mut self) -> Result<Option<Vec<u8>>, RecorderError>;

    /// Stop encoding; safe to call more than once
    fn stop(&mut self);
}

impl<E: MediaEncoder + ?Sized> MediaEncoder for Box<E> {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        (**self).is_type_supported(mime_type)
    }

    fn start(&mut self, mime_type: &str) -> Result<(), RecorderError> {
        (**self).start(mime_type)
    }

    fn flush_segment(&mut self) -> Result<Option<Vec<u8>>, RecorderError> {
        (**self).flush_segment()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// First entry of `preferences` the encoder supports
pub fn select_codec<E: MediaEncoder + ?Sized>(preferences: &[String], encoder: &E) -> Option<String> {
    let selected = preferences
        .iter()
        .find(|mime| encoder.is_type_supported(mime))
        .cloned();
    match &selected {
        Some(mime) => info!("Selected recording codec {}", mime),
        None => debug!("No supported codec among {:?}", preferences),
    }
    selected
}

/// Deterministic encoder emitting fixed-size segments
#[derive(Debug, Clone)]
pub struct SyntheticEncoder {
    supported: Vec<String>,
    segment_bytes: usize,
    active: Option<String>,
    produced: u64,
}

impl SyntheticEncoder {
    pub fn new(supported: Vec<String>, segment_bytes: usize) -> Self {
        Self {
            supported,
            segment_bytes,
            active: None,
            produced: 0,
        }
    }

    /// Supports plain WebM only
    pub fn webm() -> Self {
        Self::new(vec!["video/webm".to_string()], 1024)
    }

    /// Supports nothing; recording ends up disabled
    pub fn unsupported() -> Self {
        Self::new(Vec::new(), 0)
    }

    pub fn segments_produced(&self) -> u64 {
        self.produced
    }

    pub fn active_type(&self) -> Option<&str> {
        self.active.as_deref()
    }
}

impl MediaEncoder for SyntheticEncoder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|s| s == mime_type)
    }

    fn start(&mut self, mime_type: &str) -> Result<(), RecorderError> {
        if !self.is_type_supported(mime_type) {
            return Err(RecorderError::Encoder(format!("unsupported type {}", mime_type)));
        }
        self.active = Some(mime_type.to_string());
        Ok(())
    }

    fn flush_segment(&mut self) -> Result<Option<Vec<u8>>, RecorderError> {
        if self.active.is_none() {
            return Ok(None);
        }
        let fill = (self.produced % 251) as u8;
        self.produced += 1;
        Ok(Some(vec![fill; self.segment_bytes]))
    }

    fn stop(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> Vec<String> {
        DEFAULT_CODEC_PREFERENCES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_first_supported() {
        let encoder = SyntheticEncoder::new(vec!["video/mp4".into(), "video/webm;codecs=vp8".into()], 8);
        assert_eq!(select_codec(&prefs(), &encoder).as_deref(), Some("video/webm;codecs=vp8"));
    }

    #[test]
    fn test_select_none_when_unsupported() {
        assert_eq!(select_codec(&prefs(), &SyntheticEncoder::unsupported()), None);
    }

    #[test]
    fn test_encoder_emits_only_while_started() {
        let mut encoder = SyntheticEncoder::webm();
        assert_eq!(encoder.flush_segment().unwrap(), None);
        encoder.start("video/webm").unwrap();
        assert_eq!(encoder.flush_segment().unwrap().map(|s| s.len()), Some(1024));
        encoder.stop();
        encoder.stop();
        assert_eq!(encoder.flush_segment().unwrap(), None);
        assert_eq!(encoder.segments_produced(), 1);
    }

    #[test]
    fn test_start_rejects_unsupported_type() {
        let mut encoder = SyntheticEncoder::webm();
        assert!(matches!(encoder.start("video/mp4"), Err(RecorderError::Encoder(_))));
    }
}
