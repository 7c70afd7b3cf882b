//! Video frame types

use std::time::Instant;

use image::RgbImage;

/// Decoded RGB still frame.
///
/// Frames are moved into worker messages; the sender keeps no copy.
#[derive(Debug)]
pub struct VideoFrame {
    /// RGB bitmap
    pub image: RgbImage,
    /// Frame sequence number
    pub sequence: u64,
    /// When the frame was grabbed
    pub captured_at: Instant,
}

impl VideoFrame {
    /// Create a new video frame from a bitmap
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Create a frame from raw RGB bytes (width * height * 3)
    pub fn from_raw(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|image| Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_checks_size() {
        assert!(VideoFrame::from_raw(vec![0; 12], 2, 2, 0).is_some());
        assert!(VideoFrame::from_raw(vec![0; 11], 2, 2, 0).is_none());
    }

    #[test]
    fn test_pixel_access() {
        let frame = VideoFrame::from_raw(vec![255; 2 * 2 * 3], 2, 2, 7).unwrap();
        assert_eq!(frame.get_pixel(1, 1), Some([255, 255, 255]));
        assert_eq!(frame.get_pixel(2, 0), None);
        assert_eq!(frame.sequence, 7);
    }
}
