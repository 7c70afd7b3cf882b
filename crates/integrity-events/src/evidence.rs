//! Evidence blobs

use serde::{Deserialize, Serialize};

/// Assembled video evidence attached to a hard violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBlob {
    /// Container/codec the segments were encoded with
    pub mime_type: String,
    /// Concatenated segment bytes
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Number of segments spliced into the blob
    pub segment_count: usize,
    /// Covered duration (ms)
    pub duration_ms: u64,
}

impl EvidenceBlob {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>, segment_count: usize, duration_ms: u64) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
            segment_count,
            duration_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File name used for multipart uploads
    pub fn file_name(&self) -> &'static str {
        if self.mime_type.starts_with("video/mp4") {
            "evidence.mp4"
        } else {
            "evidence.webm"
        }
    }
}
