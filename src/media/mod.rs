//! Local media capture
//!
//! This module provides:
//! - [`MediaChunk`], the immutable unit that is fanned out to destinations
//! - the [`MediaDevice`]/[`MediaSource`] seams to a capture backend
//! - [`MediaCapture`], the scoped handle a session owns while live
//! - built-in devices for test patterns and byte streams

use std::time::Duration;

pub mod chunk;
pub mod source;
pub mod synthetic;

pub use chunk::MediaChunk;
pub use source::{MediaCapture, MediaDevice, MediaSource};
pub use synthetic::{ReaderDevice, SyntheticDevice};

/// Recorder timeslice used when none is configured
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(25);
