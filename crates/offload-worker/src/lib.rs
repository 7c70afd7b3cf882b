//! Offload Worker
//!
//! Runs landmark detection, pose estimation, and violation classification on
//! a dedicated thread. The interactive side talks to it only through
//! versioned messages; frames are moved in, status events come back out.

mod protocol;
mod worker;

pub use protocol::{Envelope, FrameAck, WorkerEvent, WorkerRequest, PROTOCOL_VERSION};
pub use worker::{OffloadWorker, RequestSender, WorkerConfig, WorkerHandle, WorkerStats};

use thiserror::Error;

/// Errors at the worker boundary
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker bootstrap failed: {0}")]
    Bootstrap(String),
    #[error("Worker inbox closed")]
    Disconnected,
    #[error("Worker thread panicked")]
    Panicked,
}
