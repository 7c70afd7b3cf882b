//! Facial landmark types and the provider boundary

use std::collections::VecDeque;

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::VisionError;

/// Number of points in a full face mesh
pub const MIN_LANDMARKS: usize = 468;

/// Face mesh indices used for pose estimation
pub mod index {
    pub const NOSE_TIP: usize = 1;
    pub const TOP_OF_HEAD: usize = 10;
    pub const CHIN: usize = 152;
    pub const LEFT_CHEEK: usize = 234;
    pub const RIGHT_CHEEK: usize = 454;
}

/// Normalized 3-D landmark (x, y in [0, 1] of the frame)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Planar distance to another landmark
    pub fn distance_xy(&self, other: &Landmark) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Ordered landmark set for one detected face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    points: Vec<Landmark>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    /// Build a full mesh whose key points describe the given pose ratios.
    ///
    /// Cheeks sit 0.4 apart and top-of-head/chin 0.6 apart, so the nose
    /// offset encodes `yaw` and `pitch` exactly.
    pub fn synthetic(yaw: f32, pitch: f32) -> Self {
        let mut points = vec![Landmark::new(0.5, 0.5, 0.0); MIN_LANDMARKS];
        points[index::LEFT_CHEEK] = Landmark::new(0.3, 0.5, 0.0);
        points[index::RIGHT_CHEEK] = Landmark::new(0.7, 0.5, 0.0);
        points[index::TOP_OF_HEAD] = Landmark::new(0.5, 0.2, 0.0);
        points[index::CHIN] = Landmark::new(0.5, 0.8, 0.0);
        points[index::NOSE_TIP] = Landmark::new(0.5 + yaw * 0.4, 0.5 + pitch * 0.6, -0.05);
        Self { points }
    }

    /// Frontal face looking straight at the camera
    pub fn frontal() -> Self {
        Self::synthetic(0.0, 0.0)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Landmark> {
        self.points.get(idx)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

/// Face landmark detector.
///
/// Given one frame and a monotonic timestamp, returns zero or more faces.
pub trait LandmarkProvider: Send {
    fn detect(&mut self, frame: &VideoFrame, timestamp_ms: f64) -> Result<Vec<FaceLandmarks>, VisionError>;
}

impl LandmarkProvider for Box<dyn LandmarkProvider> {
    fn detect(&mut self, frame: &VideoFrame, timestamp_ms: f64) -> Result<Vec<FaceLandmarks>, VisionError> {
        (**self).detect(frame, timestamp_ms)
    }
}

/// Mock provider that always sees one frontal face.
///
/// Stands in when no face mesh model is wired into the build.
#[derive(Debug, Default)]
pub struct StaticFaceProvider {
    face: FaceLandmarks,
}

impl StaticFaceProvider {
    pub fn new() -> Self {
        warn!("No landmark model configured. Using static frontal face.");
        Self {
            face: FaceLandmarks::frontal(),
        }
    }
}

impl LandmarkProvider for StaticFaceProvider {
    fn detect(&mut self, _frame: &VideoFrame, _timestamp_ms: f64) -> Result<Vec<FaceLandmarks>, VisionError> {
        if self.face.is_empty() {
            self.face = FaceLandmarks::frontal();
        }
        Ok(vec![self.face.clone()])
    }
}

/// Provider replaying a fixed script of detections, one per frame.
///
/// Once the script runs out it keeps reporting zero faces.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: VecDeque<Result<Vec<FaceLandmarks>, VisionError>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one frame's detection result
    pub fn then(mut self, result: Result<Vec<FaceLandmarks>, VisionError>) -> Self {
        self.script.push_back(result);
        self
    }

    /// Queue `frames` frames each seeing `faces`
    pub fn repeat(mut self, faces: Vec<FaceLandmarks>, frames: usize) -> Self {
        for _ in 0..frames {
            self.script.push_back(Ok(faces.clone()));
        }
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl LandmarkProvider for ScriptedProvider {
    fn detect(&mut self, _frame: &VideoFrame, _timestamp_ms: f64) -> Result<Vec<FaceLandmarks>, VisionError> {
        self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> VideoFrame {
        VideoFrame::from_raw(vec![0; 12], 2, 2, 0).unwrap()
    }

    #[test]
    fn test_synthetic_mesh_is_complete() {
        let face = FaceLandmarks::synthetic(0.1, -0.1);
        assert_eq!(face.len(), MIN_LANDMARKS);
        let nose = face.get(index::NOSE_TIP).unwrap();
        assert!((nose.x - 0.54).abs() < 1e-6);
        assert!((nose.y - 0.44).abs() < 1e-6);
    }

    #[test]
    fn test_scripted_provider_replays_then_reports_empty() {
        let mut provider = ScriptedProvider::new()
            .repeat(vec![FaceLandmarks::frontal()], 2)
            .then(Err(VisionError::Inference("gpu lost".into())));

        assert_eq!(provider.detect(&frame(), 0.0).unwrap().len(), 1);
        assert_eq!(provider.detect(&frame(), 1.0).unwrap().len(), 1);
        assert!(provider.detect(&frame(), 2.0).is_err());
        assert!(provider.detect(&frame(), 3.0).unwrap().is_empty());
    }
}
