//! Media chunks

use bytes::Bytes;

/// One interval's worth of encoded audio/video
///
/// Cheap to clone: the payload is reference-counted, so fanning a chunk
/// out to every destination shares one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChunk {
    /// Position in the capture, starting at 0
    pub sequence: u64,
    /// Milliseconds since capture started
    pub timestamp: u64,
    /// Opaque encoded payload
    pub data: Bytes,
}

impl MediaChunk {
    /// Create a new chunk
    pub fn new(sequence: u64, timestamp: u64, data: Bytes) -> Self {
        Self {
            sequence,
            timestamp,
            data,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
