//! Session pump
//!
//! One task per live session. It pulls chunks from the capture and offers
//! each one to every destination, handles channel state events, and
//! reopens failed destinations when the retry policy allows. Fan-out and
//! event handling share this task, so they never interleave.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelConfig, ChannelEvent, ChannelState, DestinationChannel};
use crate::error::MediaError;
use crate::media::{MediaCapture, MediaChunk};
use crate::platform::{Endpoint, Platform, StreamKey};
use crate::relay::RelayTransport;
use crate::stats::{DestinationStats, SessionStats};

use super::config::RetryPolicy;
use super::event::SessionEvent;
use super::fanout::Shared;

/// Opens destination channels that report to the session's event queue
pub(super) struct ChannelOpener {
    transport: Arc<dyn RelayTransport>,
    config: ChannelConfig,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelOpener {
    pub(super) fn new(
        transport: Arc<dyn RelayTransport>,
        config: ChannelConfig,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            transport,
            config,
            events,
        }
    }

    fn open(&self, platform: Platform, endpoint: &Endpoint, key: &StreamKey) -> DestinationChannel {
        DestinationChannel::open(
            platform,
            endpoint.clone(),
            key.clone(),
            Arc::clone(&self.transport),
            self.config.clone(),
            self.events.clone(),
        )
    }
}

/// One selected platform and its current channel
struct Destination {
    endpoint: Endpoint,
    /// Copy taken when the session started; reconnects reuse it
    key: StreamKey,
    channel: DestinationChannel,
    /// Consecutive failures since the destination was last ready
    failures: u32,
    reconnects: u32,
}

/// The channel set of a live session
#[derive(Default)]
pub(super) struct DestinationSet {
    destinations: HashMap<Platform, Destination>,
    chunks_produced: u64,
    bytes_produced: u64,
}

impl DestinationSet {
    /// Open one channel per target without waiting for any of them
    pub(super) fn open(
        opener: &ChannelOpener,
        targets: impl IntoIterator<Item = (Platform, Endpoint, StreamKey)>,
    ) -> Self {
        let destinations = targets
            .into_iter()
            .map(|(platform, endpoint, key)| {
                let channel = opener.open(platform, &endpoint, &key);
                let destination = Destination {
                    endpoint,
                    key,
                    channel,
                    failures: 0,
                    reconnects: 0,
                };
                (platform, destination)
            })
            .collect();

        Self {
            destinations,
            ..Self::default()
        }
    }

    pub(super) fn len(&self) -> usize {
        self.destinations.len()
    }

    pub(super) fn states(&self) -> HashMap<Platform, ChannelState> {
        self.destinations
            .iter()
            .map(|(platform, d)| (*platform, d.channel.state()))
            .collect()
    }

    pub(super) fn stats(&self, duration: Duration) -> SessionStats {
        let destinations = self
            .destinations
            .iter()
            .map(|(platform, d)| {
                let stats = DestinationStats {
                    state: d.channel.state(),
                    reconnects: d.reconnects,
                    channel: d.channel.stats(),
                };
                (*platform, stats)
            })
            .collect();

        SessionStats {
            chunks_produced: self.chunks_produced,
            bytes_produced: self.bytes_produced,
            duration,
            destinations,
        }
    }

    /// Offer a chunk to every destination, ready or not
    fn fan_out(&mut self, chunk: &MediaChunk) -> usize {
        self.chunks_produced += 1;
        self.bytes_produced += chunk.len() as u64;

        self.destinations
            .values()
            .filter(|d| d.channel.send(chunk))
            .count()
    }

    /// Close and drop every channel; returns how many there were
    fn close_all(&mut self) -> usize {
        let count = self.destinations.len();
        for (_, destination) in self.destinations.drain() {
            destination.channel.close();
        }
        count
    }
}

/// Returns the session to `Idle` when the pump finishes, however it ends
struct Settle {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for Settle {
    fn drop(&mut self) {
        self.shared.finish(self.generation);
    }
}

enum Exit {
    Stopped,
    MediaEnded,
    MediaFailed(MediaError),
}

/// The task driving a live session
pub(super) struct Pump {
    pub(super) generation: u64,
    pub(super) capture: MediaCapture,
    pub(super) channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
    pub(super) dispatcher: Dispatcher,
}

impl Pump {
    pub(super) async fn run(self) {
        let Pump {
            generation,
            mut capture,
            mut channel_events,
            dispatcher,
        } = self;
        let _settle = Settle {
            shared: Arc::clone(&dispatcher.shared),
            generation,
        };
        let (retry_tx, mut retry_rx) = mpsc::unbounded_channel();

        let exit = loop {
            tokio::select! {
                biased;

                _ = dispatcher.cancel.cancelled() => break Exit::Stopped,

                Some(event) = channel_events.recv() => {
                    dispatcher.on_channel_event(event, &retry_tx).await;
                }

                Some((platform, channel_id)) = retry_rx.recv() => {
                    dispatcher.reopen(platform, channel_id).await;
                }

                chunk = capture.next_chunk() => match chunk {
                    Ok(Some(chunk)) => dispatcher.fan_out(chunk).await,
                    Ok(None) => break Exit::MediaEnded,
                    Err(e) => break Exit::MediaFailed(e),
                },
            }
        };

        dispatcher.teardown(&mut capture).await;

        match exit {
            Exit::Stopped => {}
            Exit::MediaEnded => {
                tracing::info!("Media source ended, stopping session");
                dispatcher.shared.emit(SessionEvent::MediaEnded);
            }
            Exit::MediaFailed(e) => {
                tracing::warn!(error = %e, "Media source failed, stopping session");
                dispatcher.shared.emit(SessionEvent::MediaFailed(e));
            }
        }
    }
}

/// Routes chunks and channel events to the destination set
pub(super) struct Dispatcher {
    pub(super) shared: Arc<Shared>,
    pub(super) destinations: Arc<RwLock<DestinationSet>>,
    pub(super) opener: ChannelOpener,
    pub(super) retry: RetryPolicy,
    pub(super) cancel: CancellationToken,
}

impl Dispatcher {
    async fn fan_out(&self, chunk: MediaChunk) {
        let queued = self.destinations.write().await.fan_out(&chunk);
        tracing::trace!(sequence = chunk.sequence, queued = queued, "Chunk fanned out");
    }

    async fn on_channel_event(
        &self,
        event: ChannelEvent,
        retry_tx: &mpsc::UnboundedSender<(Platform, u64)>,
    ) {
        self.shared.emit(SessionEvent::Channel(event.clone()));

        let mut set = self.destinations.write().await;
        let Some(destination) = set.destinations.get_mut(&event.platform) else {
            return;
        };
        // Events from a channel that has since been replaced
        if destination.channel.id() != event.channel_id {
            return;
        }

        match event.to {
            ChannelState::Ready => destination.failures = 0,
            ChannelState::Failed => {
                destination.failures += 1;
                let attempt = destination.failures;

                match self.retry.delay_for(attempt) {
                    Some(delay) => {
                        tracing::info!(
                            platform = %event.platform,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Scheduling reconnect"
                        );
                        self.shared.emit(SessionEvent::Reconnecting {
                            platform: event.platform,
                            attempt,
                            delay,
                        });
                        self.schedule_reopen(event.platform, event.channel_id, delay, retry_tx.clone());
                    }
                    None if self.retry.is_enabled() => {
                        tracing::warn!(
                            platform = %event.platform,
                            attempts = attempt - 1,
                            "Reconnects exhausted, destination stays failed"
                        );
                        self.shared.emit(SessionEvent::GaveUp {
                            platform: event.platform,
                            attempts: attempt - 1,
                        });
                    }
                    None => {}
                }
            }
            _ => {}
        }
    }

    fn schedule_reopen(
        &self,
        platform: Platform,
        channel_id: u64,
        delay: Duration,
        retry_tx: mpsc::UnboundedSender<(Platform, u64)>,
    ) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = retry_tx.send((platform, channel_id));
                }
            }
        });
    }

    /// Replace a failed channel with a fresh one
    async fn reopen(&self, platform: Platform, failed_id: u64) {
        let mut set = self.destinations.write().await;
        let Some(destination) = set.destinations.get_mut(&platform) else {
            return;
        };
        if destination.channel.id() != failed_id {
            return;
        }

        let channel = self.opener.open(platform, &destination.endpoint, &destination.key);
        destination.reconnects += 1;

        tracing::info!(
            platform = %platform,
            attempt = destination.failures,
            channel_id = channel.id(),
            "Reconnecting destination"
        );

        // The failed channel stays failed when closed
        drop(std::mem::replace(&mut destination.channel, channel));
    }

    async fn teardown(&self, capture: &mut MediaCapture) {
        let closed = self.destinations.write().await.close_all();
        capture.release();

        tracing::info!(
            channels = closed,
            chunks = capture.chunks_produced(),
            bytes = capture.bytes_produced(),
            "Session torn down"
        );
    }
}
