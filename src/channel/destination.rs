//! Destination channel
//!
//! A `DestinationChannel` owns one relay connection for one platform. The
//! handle is synchronous and never blocks; a spawned connection task does
//! all socket I/O:
//!
//! ```text
//!   FanoutSession                         connection task
//!   ─────────────                         ───────────────
//!   send(chunk) ──► [state == Ready?] ──► send queue ──► writer ──► relay
//!   close()     ──► state = Closed, cancel ────────────► shutdown
//!                                        reader ◄── key-ack / error / EOF
//! ```
//!
//! The key is written by the connection task before it publishes
//! `KeySent`, and the handle only queues media once it observes `Ready`,
//! so the key always precedes media on the wire. The task writes the key
//! once per channel; reconnecting means opening a new channel.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::media::MediaChunk;
use crate::platform::{Endpoint, Platform, StreamKey};
use crate::relay::{
    ClientMessage, RelayConnection, RelayReader, RelayTransport, RelayWriter, ServerMessage,
};
use crate::stats::{ChannelCounters, ChannelStats};

use super::config::{AckPolicy, ChannelConfig};
use super::event::ChannelEvent;
use super::state::ChannelState;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Shared, guarded channel state
///
/// Every transition is a compare-and-set under the watch lock, and its
/// event is emitted under the same lock so observers see transitions in
/// order.
struct StateCell {
    platform: Platform,
    channel_id: u64,
    tx: watch::Sender<ChannelState>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl StateCell {
    fn get(&self) -> ChannelState {
        *self.tx.borrow()
    }

    fn transition(&self, to: ChannelState, error: Option<RelayError>) -> bool {
        self.tx.send_if_modified(|state| {
            if !state.can_transition_to(to) {
                return false;
            }

            let from = *state;
            *state = to;

            match &error {
                Some(e) => tracing::warn!(
                    platform = %self.platform,
                    channel_id = self.channel_id,
                    from = %from,
                    error = %e,
                    "Channel failed"
                ),
                None => tracing::debug!(
                    platform = %self.platform,
                    channel_id = self.channel_id,
                    from = %from,
                    to = %to,
                    "Channel state changed"
                ),
            }

            // The owner may already be gone; nothing else to notify then
            let _ = self.events.send(ChannelEvent {
                platform: self.platform,
                channel_id: self.channel_id,
                from,
                to,
                error: error.clone(),
            });
            true
        })
    }

    fn fail(&self, error: RelayError) {
        self.transition(ChannelState::Failed, Some(error));
    }
}

/// One socket connection to one relay endpoint
pub struct DestinationChannel {
    platform: Platform,
    endpoint: Endpoint,
    cell: Arc<StateCell>,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    counters: Arc<ChannelCounters>,
}

impl DestinationChannel {
    /// Open a channel and start connecting in the background.
    ///
    /// Must be called from within a tokio runtime. State transitions are
    /// reported on `events`.
    pub fn open(
        platform: Platform,
        endpoint: Endpoint,
        key: StreamKey,
        transport: Arc<dyn RelayTransport>,
        config: ChannelConfig,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        let channel_id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        let (state_tx, _) = watch::channel(ChannelState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.send_queue_capacity.max(1));

        let cell = Arc::new(StateCell {
            platform,
            channel_id,
            tx: state_tx,
            events,
        });
        let cancel = CancellationToken::new();
        let counters = Arc::new(ChannelCounters::new());

        tracing::info!(
            platform = %platform,
            endpoint = %endpoint,
            channel_id = channel_id,
            key = %key,
            "Opening destination channel"
        );

        let task = ConnectionTask {
            endpoint: endpoint.clone(),
            key,
            transport,
            config,
            cell: Arc::clone(&cell),
            outbound: outbound_rx,
            cancel: cancel.clone(),
            counters: Arc::clone(&counters),
        };
        tokio::spawn(task.run());

        Self {
            platform,
            endpoint,
            cell,
            outbound: outbound_tx,
            cancel,
            counters,
        }
    }

    /// Destination platform
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Relay endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Unique id, also carried by this channel's events
    pub fn id(&self) -> u64 {
        self.cell.channel_id
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.cell.get()
    }

    /// Watch the channel state
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.cell.tx.subscribe()
    }

    /// Counters for this channel
    pub fn stats(&self) -> ChannelStats {
        self.counters.snapshot()
    }

    /// Offer a chunk to this destination.
    ///
    /// Queues the chunk if the channel is `Ready`; otherwise, or if the send
    /// queue is full, the chunk is silently dropped for this destination.
    /// Returns whether the chunk was queued.
    pub fn send(&self, chunk: &MediaChunk) -> bool {
        self.counters.record_offered();

        if !self.state().is_ready() {
            self.counters.record_skipped();
            return false;
        }

        match self.outbound.try_send(chunk.data.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!(
                    platform = %self.platform,
                    sequence = chunk.sequence,
                    "Send queue full, dropping chunk"
                );
                self.counters.record_dropped();
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.record_dropped();
                false
            }
        }
    }

    /// Close the channel and release its socket. Idempotent.
    ///
    /// A channel that already failed stays `Failed`.
    pub fn close(&self) {
        self.cell.transition(ChannelState::Closed, None);
        self.cancel.cancel();
    }
}

impl Drop for DestinationChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DestinationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationChannel")
            .field("platform", &self.platform)
            .field("endpoint", &self.endpoint)
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Background half of a channel: owns the socket
struct ConnectionTask {
    endpoint: Endpoint,
    key: StreamKey,
    transport: Arc<dyn RelayTransport>,
    config: ChannelConfig,
    cell: Arc<StateCell>,
    outbound: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
    counters: Arc<ChannelCounters>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let Some(connection) = self.connect().await else {
            return;
        };
        let RelayConnection {
            mut writer,
            mut reader,
        } = connection;

        if self.handshake(writer.as_mut(), reader.as_mut()).await {
            self.stream(writer.as_mut(), reader.as_mut()).await;
        }

        writer.shutdown().await;
        tracing::debug!(
            platform = %self.cell.platform,
            channel_id = self.cell.channel_id,
            state = %self.cell.get(),
            "Relay connection released"
        );
    }

    /// Run `fut` unless the channel is closed first
    async fn until_closed<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    async fn connect(&self) -> Option<RelayConnection> {
        let connect = self.transport.connect(&self.endpoint);

        let result = match self.config.connect_timeout {
            Some(limit) => {
                let attempt = tokio::time::timeout(limit, connect);
                match self.until_closed(attempt).await? {
                    Ok(result) => result,
                    Err(_) => Err(RelayError::ConnectTimeout),
                }
            }
            None => self.until_closed(connect).await?,
        };

        match result {
            Ok(connection) => Some(connection),
            Err(e) => {
                self.cell.fail(e);
                None
            }
        }
    }

    /// Write the key and wait for readiness. Returns false if the channel
    /// ended along the way.
    async fn handshake(
        &self,
        writer: &mut dyn RelayWriter,
        reader: &mut dyn RelayReader,
    ) -> bool {
        let key = ClientMessage::SendKey(self.key.clone());
        match self.until_closed(writer.write(key)).await {
            None => return false,
            Some(Err(e)) => {
                self.cell.fail(e);
                return false;
            }
            Some(Ok(())) => {}
        }

        if !self.cell.transition(ChannelState::KeySent, None) {
            return false;
        }

        if let AckPolicy::AwaitAck { timeout } = self.config.ack_policy {
            let ack = tokio::time::timeout(timeout, reader.read());
            match self.until_closed(ack).await {
                None => return false,
                Some(Err(_)) => {
                    tracing::debug!(
                        platform = %self.cell.platform,
                        "No key ack from relay, promoting to ready"
                    );
                }
                Some(Ok(Ok(Some(ServerMessage::KeyAck)))) => {
                    tracing::debug!(platform = %self.cell.platform, "Relay acknowledged key");
                }
                Some(Ok(other)) => {
                    self.cell.fail(unexpected(other));
                    return false;
                }
            }
        }

        self.cell.transition(ChannelState::Ready, None)
    }

    async fn stream(&mut self, writer: &mut dyn RelayWriter, reader: &mut dyn RelayReader) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return,

                data = self.outbound.recv() => {
                    // Handle dropped without close(): Drop already closed us
                    let Some(data) = data else { return };
                    let len = data.len();

                    match self.until_closed(writer.write(ClientMessage::BinaryStream(data))).await {
                        None => return,
                        Some(Ok(())) => self.counters.record_sent(len),
                        Some(Err(e)) => {
                            self.cell.fail(e);
                            return;
                        }
                    }
                }

                msg = reader.read() => match msg {
                    // Late ack after timeout promotion
                    Ok(Some(ServerMessage::KeyAck)) => {}
                    other => {
                        self.cell.fail(unexpected(other));
                        return;
                    }
                },
            }
        }
    }
}

/// Map anything other than a key ack from the relay to a failure
fn unexpected(msg: Result<Option<ServerMessage>, RelayError>) -> RelayError {
    match msg {
        Ok(Some(ServerMessage::Error(message))) => RelayError::Remote(message),
        Ok(Some(ServerMessage::KeyAck)) => RelayError::Protocol("unexpected key ack".into()),
        Ok(None) => RelayError::RemoteClosed,
        Err(e) => e,
    }
}
