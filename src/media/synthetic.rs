//! Built-in media devices
//!
//! - [`SyntheticDevice`]: a test pattern generator, useful for exercising
//!   relays without a camera
//! - [`ReaderDevice`]: chunks any `AsyncRead` (an encoder's stdout, a
//!   recorded file) at a fixed cadence

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::error::MediaError;

use super::source::{MediaDevice, MediaSource};
use super::DEFAULT_CHUNK_INTERVAL;

/// Bytes of sequence header at the start of each synthetic payload
const SEQUENCE_HEADER_SIZE: usize = 8;

/// Ticker that first fires one period after start, like a recorder
/// delivering its first timeslice.
fn chunk_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Generates numbered payloads at a fixed interval
///
/// Each payload starts with its sequence number (u64, big-endian) followed
/// by filler bytes, so a relay can tell chunks apart.
#[derive(Debug)]
pub struct SyntheticDevice {
    interval: Duration,
    chunk_size: usize,
    limit: Option<u64>,
    active: Arc<AtomicUsize>,
}

impl SyntheticDevice {
    /// Create a device producing `chunk_size`-byte payloads every `interval`
    pub fn new(interval: Duration, chunk_size: usize) -> Self {
        Self {
            interval,
            chunk_size: chunk_size.max(SEQUENCE_HEADER_SIZE),
            limit: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// End each recording after `count` chunks
    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    /// Number of recordings currently holding the device
    pub fn active_captures(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_INTERVAL, 1024)
    }
}

/// Read the sequence number embedded in a synthetic payload
pub fn sequence_of(payload: &[u8]) -> Option<u64> {
    let header: [u8; SEQUENCE_HEADER_SIZE] = payload.get(..SEQUENCE_HEADER_SIZE)?.try_into().ok()?;
    Some(u64::from_be_bytes(header))
}

#[async_trait]
impl MediaDevice for SyntheticDevice {
    async fn acquire(&self) -> Result<Box<dyn MediaSource>, MediaError> {
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticSource {
            ticker: chunk_ticker(self.interval),
            chunk_size: self.chunk_size,
            limit: self.limit,
            sequence: 0,
            active: Some(Arc::clone(&self.active)),
        }))
    }
}

struct SyntheticSource {
    ticker: Interval,
    chunk_size: usize,
    limit: Option<u64>,
    sequence: u64,
    active: Option<Arc<AtomicUsize>>,
}

#[async_trait]
impl MediaSource for SyntheticSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, MediaError> {
        if self.active.is_none() || self.limit.is_some_and(|limit| self.sequence >= limit) {
            return Ok(None);
        }

        self.ticker.tick().await;

        let mut buf = BytesMut::with_capacity(self.chunk_size);
        buf.put_u64(self.sequence);
        buf.put_bytes((self.sequence & 0xff) as u8, self.chunk_size - SEQUENCE_HEADER_SIZE);
        self.sequence += 1;

        Ok(Some(buf.freeze()))
    }

    fn release(&mut self) {
        if let Some(active) = self.active.take() {
            active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Chunks an `AsyncRead` at a fixed cadence
///
/// On every tick, whatever is available (up to `max_chunk_size` bytes) is
/// read as one chunk. The reader can only be recorded once; acquiring the
/// device a second time fails.
pub struct ReaderDevice<R> {
    reader: Mutex<Option<R>>,
    interval: Duration,
    max_chunk_size: usize,
}

impl<R> ReaderDevice<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    pub fn new(reader: R, interval: Duration, max_chunk_size: usize) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            interval,
            max_chunk_size: max_chunk_size.max(1),
        }
    }
}

impl<R> std::fmt::Debug for ReaderDevice<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderDevice")
            .field("interval", &self.interval)
            .field("max_chunk_size", &self.max_chunk_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R> MediaDevice for ReaderDevice<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    async fn acquire(&self) -> Result<Box<dyn MediaSource>, MediaError> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| MediaError::Unavailable("reader lock poisoned".into()))?
            .take()
            .ok_or_else(|| MediaError::Unavailable("reader already consumed".into()))?;

        Ok(Box::new(ReaderSource {
            reader: Some(reader),
            ticker: chunk_ticker(self.interval),
            tick_taken: false,
            buf: vec![0; self.max_chunk_size],
        }))
    }
}

struct ReaderSource<R> {
    reader: Option<R>,
    ticker: Interval,
    /// A tick was consumed by a read that has not completed yet
    tick_taken: bool,
    buf: Vec<u8>,
}

#[async_trait]
impl<R> MediaSource for ReaderSource<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, MediaError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        // The pump may drop this future while the read is pending
        if !self.tick_taken {
            self.ticker.tick().await;
            self.tick_taken = true;
        }

        let n = reader
            .read(&mut self.buf)
            .await
            .map_err(|e| MediaError::Capture(e.to_string()))?;
        self.tick_taken = false;

        if n == 0 {
            return Ok(None);
        }

        Ok(Some(Bytes::copy_from_slice(&self.buf[..n])))
    }

    fn release(&mut self) {
        self.reader.take();
    }
}
