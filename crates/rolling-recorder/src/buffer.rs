//! Bounded Segment Ring

use std::collections::VecDeque;

/// Default ring capacity (15 one-second segments)
pub const DEFAULT_CAPACITY: usize = 15;

/// One time-sliced chunk of encoded video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSegment {
    /// Arrival order
    pub sequence: u64,
    /// Encoded bytes
    pub data: Vec<u8>,
    /// Slice duration (ms)
    pub duration_ms: u64,
}

/// FIFO of recent segments, newest last.
///
/// Eviction can be suspended so a capture in progress keeps its pre-trigger
/// history while the tail is appended.
#[derive(Debug)]
pub struct SegmentRing {
    segments: VecDeque<EncodedSegment>,
    capacity: usize,
    total_written: u64,
    total_evicted: u64,
}

impl SegmentRing {
    /// Create a ring holding at most `capacity` segments while evicting
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            segments: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
            total_evicted: 0,
        }
    }

    /// Append a segment; with `evict`, drop the oldest beyond capacity
    pub fn push(&mut self, segment: EncodedSegment, evict: bool) {
        self.segments.push_back(segment);
        self.total_written += 1;
        if evict {
            while self.segments.len() > self.capacity {
                self.segments.pop_front();
                self.total_evicted += 1;
            }
        }
    }

    /// Remove and return every segment, oldest first
    pub fn drain(&mut self) -> Vec<EncodedSegment> {
        self.segments.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Duration currently buffered (ms)
    pub fn duration_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.duration_ms).sum()
    }

    /// Buffered bytes
    pub fn byte_len(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }

    /// Total segments ever pushed
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Total segments evicted by the FIFO policy
    pub fn total_evicted(&self) -> u64 {
        self.total_evicted
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(sequence: u64) -> EncodedSegment {
        EncodedSegment {
            sequence,
            data: vec![sequence as u8; 4],
            duration_ms: 1000,
        }
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut ring = SegmentRing::new(3);
        for i in 0..5 {
            ring.push(segment(i), true);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.total_evicted(), 2);
        let kept: Vec<u64> = ring.drain().iter().map(|s| s.sequence).collect();
        assert_eq!(kept, vec![2, 3, 4]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_suspended_eviction_grows_past_capacity() {
        let mut ring = SegmentRing::new(2);
        for i in 0..5 {
            ring.push(segment(i), false);
        }
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.duration_ms(), 5000);
        assert_eq!(ring.byte_len(), 20);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let ring = SegmentRing::new(0);
        assert_eq!(ring.capacity(), 1);
    }
}
