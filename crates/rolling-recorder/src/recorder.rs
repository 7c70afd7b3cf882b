//! Capture state machine over the segment ring

use std::fmt;

use integrity_events::EvidenceBlob;
use tracing::{debug, info, warn};

use crate::buffer::{EncodedSegment, SegmentRing};
use crate::RecorderError;

/// Receives the assembled evidence exactly once
pub type CaptureCallback = Box<dyn FnOnce(EvidenceBlob) + Send + 'static>;

/// Recorder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Normal ring accumulation
    Idle,
    /// Triggered; waiting for `remaining` tail segments
    Capturing { remaining: u32 },
}

/// A finished capture whose callback has not run yet.
///
/// Delivered outside of any lock held around the recorder.
pub struct FinalizedCapture {
    blob: EvidenceBlob,
    callback: CaptureCallback,
}

impl FinalizedCapture {
    pub fn blob(&self) -> &EvidenceBlob {
        &self.blob
    }

    /// Invoke the capture callback with the blob
    pub fn deliver(self) {
        (self.callback)(self.blob)
    }
}

impl fmt::Debug for FinalizedCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalizedCapture").field("blob", &self.blob).finish_non_exhaustive()
    }
}

/// Rolling buffer recorder: IDLE -> CAPTURING -> FINALIZE -> IDLE
pub struct RollingRecorder {
    ring: SegmentRing,
    state: RecorderState,
    callback: Option<CaptureCallback>,
    mime_type: String,
    next_sequence: u64,
    stopped: bool,
}

impl RollingRecorder {
    pub fn new(capacity: usize, mime_type: impl Into<String>) -> Self {
        Self {
            ring: SegmentRing::new(capacity),
            state: RecorderState::Idle,
            callback: None,
            mime_type: mime_type.into(),
            next_sequence: 0,
            stopped: false,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, RecorderState::Capturing { .. })
    }

    pub fn buffer_len(&self) -> usize {
        self.ring.len()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Append one encoded slice.
    ///
    /// Returns the finished capture when this segment completes a tail.
    /// Segments arriving after [`stop`](Self::stop) are discarded.
    pub fn push_segment(&mut self, data: Vec<u8>, duration_ms: u64) -> Option<FinalizedCapture> {
        if self.stopped {
            return None;
        }
        let segment = EncodedSegment {
            sequence: self.next_sequence,
            data,
            duration_ms,
        };
        self.next_sequence += 1;

        match self.state {
            RecorderState::Idle => {
                self.ring.push(segment, true);
                None
            }
            RecorderState::Capturing { remaining } => {
                self.ring.push(segment, false);
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    self.finalize()
                } else {
                    self.state = RecorderState::Capturing { remaining };
                    None
                }
            }
        }
    }

    /// Begin a capture that finalizes after `tail_segments` more segments.
    ///
    /// Rejected while another capture is in progress; the rejected callback
    /// is dropped and the pending one is left untouched. A zero tail
    /// finalizes immediately with what is buffered. A stopped recorder
    /// rejects every trigger.
    pub fn trigger_capture(
        &mut self,
        tail_segments: u32,
        callback: CaptureCallback,
    ) -> Result<Option<FinalizedCapture>, RecorderError> {
        if self.stopped {
            debug!("Capture triggered after stop; ignoring");
            return Err(RecorderError::Stopped);
        }
        if self.is_capturing() {
            warn!("Capture already in progress; ignoring new trigger");
            metrics::counter!("proctor_captures_rejected_total").increment(1);
            return Err(RecorderError::CaptureInProgress);
        }

        info!(
            "Capture triggered: {} buffered segments + {} tail",
            self.ring.len(),
            tail_segments
        );
        self.callback = Some(callback);
        self.state = RecorderState::Capturing {
            remaining: tail_segments,
        };

        if tail_segments == 0 {
            return Ok(self.finalize());
        }
        Ok(None)
    }

    fn finalize(&mut self) -> Option<FinalizedCapture> {
        let segments = self.ring.drain();
        self.state = RecorderState::Idle;

        let segment_count = segments.len();
        let duration_ms: u64 = segments.iter().map(|s| s.duration_ms).sum();
        let mut data = Vec::with_capacity(segments.iter().map(|s| s.data.len()).sum());
        for segment in segments {
            data.extend_from_slice(&segment.data);
        }

        debug!("Capture finalized: {} segments, {} bytes", segment_count, data.len());
        let blob = EvidenceBlob::new(self.mime_type.clone(), data, segment_count, duration_ms);
        self.callback.take().map(|callback| FinalizedCapture { blob, callback })
    }

    /// Drop all buffered state and any pending callback without invoking it.
    ///
    /// Terminal: later segments and triggers are ignored.
    pub fn stop(&mut self) {
        self.stopped = true;
        if self.callback.take().is_some() {
            debug!("Discarding pending capture callback");
        }
        self.ring.clear();
        self.state = RecorderState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn counting_callback(calls: &Arc<AtomicUsize>, sink: &Arc<Mutex<Vec<EvidenceBlob>>>) -> CaptureCallback {
        let calls = calls.clone();
        let sink = sink.clone();
        Box::new(move |blob| {
            calls.fetch_add(1, Ordering::SeqCst);
            sink.lock().unwrap().push(blob);
        })
    }

    fn push(recorder: &mut RollingRecorder, n: usize) -> Vec<FinalizedCapture> {
        (0..n).filter_map(|_| recorder.push_segment(vec![0xAB; 8], 1000)).collect()
    }

    #[test]
    fn test_buffer_holds_most_recent_segments() {
        let mut recorder = RollingRecorder::new(15, "video/webm");
        assert!(push(&mut recorder, 20).is_empty());
        assert_eq!(recorder.buffer_len(), 15);
    }

    #[test]
    fn test_tail_capture_spans_history_plus_tail() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = RollingRecorder::new(15, "video/webm");
        push(&mut recorder, 20);

        let immediate = recorder.trigger_capture(10, counting_callback(&calls, &sink)).unwrap();
        assert!(immediate.is_none());

        let mut finished = push(&mut recorder, 9);
        assert!(finished.is_empty());
        assert_eq!(recorder.buffer_len(), 24);

        finished.extend(push(&mut recorder, 1));
        assert_eq!(finished.len(), 1);
        assert_eq!(recorder.buffer_len(), 0);
        assert_eq!(recorder.state(), RecorderState::Idle);

        finished.into_iter().for_each(FinalizedCapture::deliver);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let blobs = sink.lock().unwrap();
        let blob = &blobs[0];
        assert_eq!(blob.segment_count, 25);
        assert_eq!(blob.duration_ms, 25_000);
        assert_eq!(blob.len(), 25 * 8);
    }

    #[test]
    fn test_second_trigger_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rejected_calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = RollingRecorder::new(5, "video/webm");

        recorder.trigger_capture(3, counting_callback(&calls, &sink)).unwrap();
        let second = recorder.trigger_capture(1, counting_callback(&rejected_calls, &sink));
        assert_eq!(second.unwrap_err(), RecorderError::CaptureInProgress);
        assert_eq!(recorder.state(), RecorderState::Capturing { remaining: 3 });

        push(&mut recorder, 3).into_iter().for_each(FinalizedCapture::deliver);
        push(&mut recorder, 5).into_iter().for_each(FinalizedCapture::deliver);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(rejected_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_tail_finalizes_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = RollingRecorder::new(5, "video/mp4");
        push(&mut recorder, 2);
        let finished = recorder.trigger_capture(0, counting_callback(&calls, &sink)).unwrap();
        let finished = finished.expect("finalized");
        assert_eq!(finished.blob().segment_count, 2);
        finished.deliver();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!recorder.is_capturing());
    }

    #[test]
    fn test_stop_discards_pending_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = RollingRecorder::new(5, "video/webm");
        push(&mut recorder, 4);
        recorder.trigger_capture(2, counting_callback(&calls, &sink)).unwrap();
        recorder.stop();
        recorder.stop();

        assert_eq!(recorder.buffer_len(), 0);
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(push(&mut recorder, 4).is_empty());
        assert_eq!(recorder.buffer_len(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trigger_after_stop_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = RollingRecorder::new(5, "video/webm");
        push(&mut recorder, 3);
        recorder.stop();

        let result = recorder.trigger_capture(0, counting_callback(&calls, &sink));
        assert_eq!(result.unwrap_err(), RecorderError::Stopped);
        assert!(recorder.is_stopped());
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Segment,
        Trigger(u32),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![4 => Just(Step::Segment), 1 => (0u32..12).prop_map(Step::Trigger)]
    }

    proptest! {
        #[test]
        fn prop_buffer_bounded_while_idle(capacity in 1usize..20, steps in proptest::collection::vec(step(), 0..300)) {
            let mut recorder = RollingRecorder::new(capacity, "video/webm");
            let delivered = Arc::new(AtomicUsize::new(0));
            let mut accepted = 0usize;
            for step in steps {
                let finished = match step {
                    Step::Segment => recorder.push_segment(vec![1, 2, 3], 1000),
                    Step::Trigger(tail) => {
                        let delivered = delivered.clone();
                        match recorder.trigger_capture(tail, Box::new(move |_| { delivered.fetch_add(1, Ordering::SeqCst); })) {
                            Ok(finished) => { accepted += 1; finished }
                            Err(_) => None,
                        }
                    }
                };
                if let Some(finished) = finished {
                    prop_assert_eq!(recorder.buffer_len(), 0);
                    finished.deliver();
                }
                if !recorder.is_capturing() {
                    prop_assert!(recorder.buffer_len() <= capacity);
                }
            }
            let pending = usize::from(recorder.is_capturing());
            prop_assert_eq!(delivered.load(Ordering::SeqCst) + pending, accepted);
        }
    }
}
