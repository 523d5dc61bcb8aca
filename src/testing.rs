//! In-memory test doubles for the transport, key API and media seams

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{KeyError, MediaError, RelayError};
use crate::keys::{KeyApi, UserId};
use crate::media::{MediaDevice, MediaSource};
use crate::platform::{Endpoint, Platform, StreamKey};
use crate::relay::{
    ClientMessage, RelayConnection, RelayReader, RelayTransport, RelayWriter, ServerMessage,
};

/// Upper bound on polling iterations in the wait helpers
const MAX_POLLS: usize = 10_000;

/// How a mock relay endpoint behaves
#[derive(Debug, Clone, Default)]
pub struct RelayBehavior {
    connect_delay: Duration,
    refuse: bool,
    ack: bool,
    reject: Option<String>,
    stall_media: bool,
}

impl RelayBehavior {
    /// Fail every connection attempt
    pub fn refuse(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Take this long to establish a connection
    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Answer the key with a key-ack
    pub fn ack(mut self) -> Self {
        self.ack = true;
        self
    }

    /// Answer the key with an error frame
    pub fn reject(mut self, message: &str) -> Self {
        self.reject = Some(message.to_string());
        self
    }

    /// Never complete media writes
    pub fn stall_media(mut self) -> Self {
        self.stall_media = true;
        self
    }
}

#[derive(Default)]
struct ConnectionLog {
    messages: Mutex<Vec<ClientMessage>>,
    dropped: CancellationToken,
    released: AtomicBool,
}

#[derive(Default)]
struct EndpointState {
    behavior: RelayBehavior,
    attempts: usize,
    connections: Vec<Arc<ConnectionLog>>,
}

/// Relay transport that records every frame per endpoint
#[derive(Clone, Default)]
pub struct MockTransport {
    endpoints: Arc<Mutex<HashMap<Endpoint, EndpointState>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_transport(&self) -> Arc<dyn RelayTransport> {
        Arc::new(self.clone())
    }

    pub fn set_behavior(&self, endpoint: &Endpoint, behavior: RelayBehavior) {
        self.with_endpoint(endpoint, |state| state.behavior = behavior);
    }

    /// All frames received on `endpoint`, across connections
    pub fn messages(&self, endpoint: &Endpoint) -> Vec<ClientMessage> {
        self.connection_messages(endpoint).into_iter().flatten().collect()
    }

    /// Frames received on `endpoint`, one list per connection
    pub fn connection_messages(&self, endpoint: &Endpoint) -> Vec<Vec<ClientMessage>> {
        self.with_endpoint(endpoint, |state| {
            state
                .connections
                .iter()
                .map(|c| c.messages.lock().unwrap().clone())
                .collect()
        })
    }

    /// Media payloads received on `endpoint`
    pub fn payloads(&self, endpoint: &Endpoint) -> Vec<Bytes> {
        self.messages(endpoint)
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::BinaryStream(data) => Some(data),
                ClientMessage::SendKey(_) => None,
            })
            .collect()
    }

    /// Connection attempts made to `endpoint`
    pub fn connect_attempts(&self, endpoint: &Endpoint) -> usize {
        self.with_endpoint(endpoint, |state| state.attempts)
    }

    /// Simulate the relay dropping every open connection
    pub fn drop_connections(&self, endpoint: &Endpoint) {
        self.with_endpoint(endpoint, |state| {
            for connection in &state.connections {
                connection.dropped.cancel();
            }
        });
    }

    /// Whether every connection to `endpoint` was shut down by the client
    pub fn all_released(&self, endpoint: &Endpoint) -> bool {
        self.with_endpoint(endpoint, |state| {
            state
                .connections
                .iter()
                .all(|c| c.released.load(Ordering::SeqCst))
        })
    }

    pub async fn wait_for_messages(&self, endpoint: &Endpoint, count: usize) {
        for _ in 0..MAX_POLLS {
            if self.messages(endpoint).len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("{endpoint} never received {count} messages");
    }

    pub async fn wait_for_release(&self, endpoint: &Endpoint) {
        for _ in 0..MAX_POLLS {
            if !self.connection_messages(endpoint).is_empty() && self.all_released(endpoint) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("connections to {endpoint} were never released");
    }

    fn with_endpoint<T>(&self, endpoint: &Endpoint, f: impl FnOnce(&mut EndpointState) -> T) -> T {
        let mut endpoints = self.endpoints.lock().unwrap();
        f(endpoints.entry(endpoint.clone()).or_default())
    }
}

#[async_trait]
impl RelayTransport for MockTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<RelayConnection, RelayError> {
        let behavior = self.with_endpoint(endpoint, |state| {
            state.attempts += 1;
            state.behavior.clone()
        });

        if !behavior.connect_delay.is_zero() {
            tokio::time::sleep(behavior.connect_delay).await;
        }
        if behavior.refuse {
            return Err(RelayError::Connect("connection refused".into()));
        }

        let log = Arc::new(ConnectionLog::default());
        self.with_endpoint(endpoint, |state| state.connections.push(Arc::clone(&log)));

        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Ok(RelayConnection {
            writer: Box::new(MockWriter {
                log: Arc::clone(&log),
                behavior,
                replies: replies_tx,
            }),
            reader: Box::new(MockReader {
                log,
                replies: replies_rx,
            }),
        })
    }
}

struct MockWriter {
    log: Arc<ConnectionLog>,
    behavior: RelayBehavior,
    replies: mpsc::UnboundedSender<ServerMessage>,
}

#[async_trait]
impl RelayWriter for MockWriter {
    async fn write(&mut self, msg: ClientMessage) -> Result<(), RelayError> {
        if self.log.dropped.is_cancelled() {
            return Err(RelayError::Io("connection reset".into()));
        }
        if self.behavior.stall_media && !msg.is_key() {
            self.log.dropped.cancelled().await;
            return Err(RelayError::Io("connection reset".into()));
        }

        let is_key = msg.is_key();
        self.log.messages.lock().unwrap().push(msg);

        if is_key {
            if let Some(message) = &self.behavior.reject {
                let _ = self.replies.send(ServerMessage::Error(message.clone()));
            } else if self.behavior.ack {
                let _ = self.replies.send(ServerMessage::KeyAck);
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.log.released.store(true, Ordering::SeqCst);
    }
}

struct MockReader {
    log: Arc<ConnectionLog>,
    replies: mpsc::UnboundedReceiver<ServerMessage>,
}

#[async_trait]
impl RelayReader for MockReader {
    async fn read(&mut self) -> Result<Option<ServerMessage>, RelayError> {
        tokio::select! {
            _ = self.log.dropped.cancelled() => Ok(None),
            reply = self.replies.recv() => Ok(reply),
        }
    }
}

/// Key API backed by fixed maps
#[derive(Debug, Default)]
pub struct MockKeyApi {
    keys: HashMap<Platform, StreamKey>,
    failures: HashMap<Platform, KeyError>,
    store_failure: Option<KeyError>,
    stored: Mutex<Vec<(Platform, StreamKey)>>,
}

impl MockKeyApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, platform: Platform, key: &str) -> Self {
        self.keys.insert(platform, StreamKey::new(key));
        self
    }

    pub fn with_failure(mut self, platform: Platform, error: KeyError) -> Self {
        self.failures.insert(platform, error);
        self
    }

    pub fn fail_stores(mut self, error: KeyError) -> Self {
        self.store_failure = Some(error);
        self
    }

    pub fn stored(&self) -> Vec<(Platform, StreamKey)> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyApi for MockKeyApi {
    async fn fetch_key(&self, _user: &UserId, platform: Platform) -> Result<Option<StreamKey>, KeyError> {
        if let Some(error) = self.failures.get(&platform) {
            return Err(error.clone());
        }
        Ok(self.keys.get(&platform).cloned())
    }

    async fn store_key(&self, _user: &UserId, platform: Platform, key: &StreamKey) -> Result<(), KeyError> {
        if let Some(error) = &self.store_failure {
            return Err(error.clone());
        }
        self.stored.lock().unwrap().push((platform, key.clone()));
        Ok(())
    }
}

/// Scriptable capture device
#[derive(Debug, Default)]
pub struct MockDevice {
    acquire_delay: Duration,
    unavailable: bool,
    fail_after: Option<u64>,
    interval: Duration,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl MockDevice {
    /// Produce a chunk every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Take this long to open the device
    pub fn acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Refuse to open
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Fail the recording after `count` chunks
    pub fn fail_after(mut self, count: u64) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevice for MockDevice {
    async fn acquire(&self) -> Result<Box<dyn MediaSource>, MediaError> {
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }
        if self.unavailable {
            return Err(MediaError::Unavailable("permission denied".into()));
        }

        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSource {
            interval: self.interval,
            fail_after: self.fail_after,
            produced: 0,
            released: Arc::clone(&self.released),
        }))
    }
}

struct MockSource {
    interval: Duration,
    fail_after: Option<u64>,
    produced: u64,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl MediaSource for MockSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, MediaError> {
        tokio::time::sleep(self.interval).await;

        if self.fail_after.is_some_and(|limit| self.produced >= limit) {
            return Err(MediaError::Capture("encoder crashed".into()));
        }

        self.produced += 1;
        Ok(Some(Bytes::from(self.produced.to_be_bytes().to_vec())))
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
