//! Monotonic frame timestamps

use tokio::time::Instant;

/// Smallest step between two consecutive timestamps (ms)
const MIN_STEP_MS: f64 = 0.001;

/// Milliseconds since the session origin, strictly increasing
#[derive(Debug, Clone)]
pub struct FrameClock {
    origin: Instant,
    last_ms: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_origin(Instant::now())
    }

    /// Clock sharing an origin with other session components
    pub fn with_origin(origin: Instant) -> Self {
        Self { origin, last_ms: None }
    }

    /// Timestamp for the next frame
    pub fn next_timestamp(&mut self) -> f64 {
        let mut now = self.origin.elapsed().as_secs_f64() * 1000.0;
        if let Some(last) = self.last_ms {
            if now <= last {
                now = last + MIN_STEP_MS;
            }
        }
        self.last_ms = Some(now);
        now
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
