//! Capture device seams and the scoped capture handle

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::error::MediaError;

use super::chunk::MediaChunk;

/// A local capture device (camera + microphone, screen, file, ...)
#[async_trait]
pub trait MediaDevice: Send + Sync + 'static {
    /// Open the device and start recording
    async fn acquire(&self) -> Result<Box<dyn MediaSource>, MediaError>;
}

/// A recording in progress
#[async_trait]
pub trait MediaSource: Send {
    /// Wait for the next encoded payload.
    ///
    /// Returns `Ok(None)` once the source has ended.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, MediaError>;

    /// Stop recording and release the device
    fn release(&mut self);
}

/// Exclusively owned capture handle
///
/// Numbers and timestamps the payloads of a [`MediaSource`], and releases
/// the source exactly once: on [`release`](Self::release) or on drop,
/// whichever comes first.
pub struct MediaCapture {
    source: Option<Box<dyn MediaSource>>,
    next_sequence: u64,
    started_at: Instant,
    bytes_produced: u64,
}

impl MediaCapture {
    /// Acquire a device and wrap the resulting source
    pub async fn acquire(device: &dyn MediaDevice) -> Result<Self, MediaError> {
        let source = device.acquire().await?;
        Ok(Self::new(source))
    }

    /// Wrap an already-acquired source
    pub fn new(source: Box<dyn MediaSource>) -> Self {
        Self {
            source: Some(source),
            next_sequence: 0,
            started_at: Instant::now(),
            bytes_produced: 0,
        }
    }

    /// Next chunk, or `Ok(None)` when the source ended or was released
    pub async fn next_chunk(&mut self) -> Result<Option<MediaChunk>, MediaError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        let Some(data) = source.next_chunk().await? else {
            return Ok(None);
        };

        let chunk = MediaChunk::new(
            self.next_sequence,
            u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            data,
        );
        self.next_sequence += 1;
        self.bytes_produced += chunk.len() as u64;

        Ok(Some(chunk))
    }

    /// Number of chunks produced so far
    pub fn chunks_produced(&self) -> u64 {
        self.next_sequence
    }

    /// Number of payload bytes produced so far
    pub fn bytes_produced(&self) -> u64 {
        self.bytes_produced
    }

    /// Whether the source is still held
    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Release the source. Subsequent calls do nothing.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            tracing::debug!(chunks = self.next_sequence, "Media source released");
        }
    }
}

impl Drop for MediaCapture {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCapture")
            .field("active", &self.is_active())
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}
