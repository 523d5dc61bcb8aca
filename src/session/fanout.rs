//! Fan-out session
//!
//! A `FanoutSession` owns the media capture and one destination channel
//! per selected platform for the duration of one broadcast:
//!
//! ```text
//!                                      ┌──► DestinationChannel (YouTube)  ──► relay
//!   MediaDevice ──► MediaCapture ──► pump ──► DestinationChannel (Twitch)   ──► relay
//!                                      └──► DestinationChannel (Facebook) ──► relay
//! ```
//!
//! Starting is all-or-nothing: every precondition is checked before the
//! first channel is opened. Once live, destination failures are isolated;
//! the session stays live until `stop()` or until the media source ends.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelState;
use crate::error::{ConfigError, Error, Result};
use crate::keys::StreamKeyStore;
use crate::media::{MediaCapture, MediaDevice};
use crate::platform::{Platform, StreamKey};
use crate::relay::RelayTransport;
use crate::stats::SessionStats;

use super::check::{self, RelayCheck};
use super::config::SessionConfig;
use super::event::SessionEvent;
use super::pump::{ChannelOpener, DestinationSet, Dispatcher, Pump};
use super::state::SessionState;

/// What the session currently holds
enum Phase {
    Idle,
    Starting {
        generation: u64,
        cancel: CancellationToken,
    },
    Live(LiveSession),
    Stopping {
        generation: u64,
    },
}

struct LiveSession {
    generation: u64,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
    destinations: Arc<RwLock<DestinationSet>>,
    started_at: Instant,
}

/// State shared between the session handle and its pump
pub(super) struct Shared {
    phase: Mutex<Phase>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    next_generation: AtomicU64,
}

impl Shared {
    fn new(event_capacity: usize) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            phase: Mutex::new(Phase::Idle),
            state,
            events,
            next_generation: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Session state changed");
        }
    }

    /// Publish an event; having no subscribers is fine
    pub(super) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Idle -> Starting
    fn begin_start(&self) -> Result<(u64, CancellationToken)> {
        let mut phase = self.lock();
        if !matches!(*phase, Phase::Idle) {
            return Err(Error::InvalidState(*self.state.borrow()));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *phase = Phase::Starting {
            generation,
            cancel: cancel.clone(),
        };
        self.set_state(SessionState::Starting);
        Ok((generation, cancel))
    }

    /// Starting -> Idle, if this start attempt is still the current one
    fn abort_start(&self, generation: u64) {
        let mut phase = self.lock();
        if matches!(*phase, Phase::Starting { generation: g, .. } if g == generation) {
            *phase = Phase::Idle;
            self.set_state(SessionState::Idle);
        }
    }

    /// Starting -> Live. Hands the pump back if the start was cancelled.
    fn commit(
        &self,
        generation: u64,
        pump: Pump,
        destinations: Arc<RwLock<DestinationSet>>,
    ) -> std::result::Result<(), Pump> {
        let mut phase = self.lock();
        let cancel = match &*phase {
            Phase::Starting {
                generation: g,
                cancel,
            } if *g == generation && !cancel.is_cancelled() => cancel.clone(),
            _ => return Err(pump),
        };

        *phase = Phase::Live(LiveSession {
            generation,
            cancel,
            pump: tokio::spawn(pump.run()),
            destinations,
            started_at: Instant::now(),
        });
        self.set_state(SessionState::Live);
        Ok(())
    }

    /// Live or Stopping -> Idle once the pump of `generation` has torn down
    pub(super) fn finish(&self, generation: u64) {
        let mut phase = self.lock();
        let current = match &*phase {
            Phase::Live(live) => live.generation,
            Phase::Stopping { generation } => *generation,
            Phase::Idle | Phase::Starting { .. } => return,
        };
        if current == generation {
            *phase = Phase::Idle;
            self.set_state(SessionState::Idle);
        }
    }
}

/// Resets a start attempt to `Idle` unless it was committed
struct StartGuard<'a> {
    shared: &'a Shared,
    generation: u64,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.abort_start(self.generation);
        }
    }
}

/// Streams one media source to several platforms at once
pub struct FanoutSession {
    keys: Arc<StreamKeyStore>,
    device: Arc<dyn MediaDevice>,
    transport: Arc<dyn RelayTransport>,
    config: SessionConfig,
    shared: Arc<Shared>,
}

impl FanoutSession {
    /// Create an idle session with default configuration
    pub fn new(
        keys: Arc<StreamKeyStore>,
        device: Arc<dyn MediaDevice>,
        transport: Arc<dyn RelayTransport>,
    ) -> Self {
        Self::with_config(keys, device, transport, SessionConfig::default())
    }

    /// Create an idle session with custom configuration
    pub fn with_config(
        keys: Arc<StreamKeyStore>,
        device: Arc<dyn MediaDevice>,
        transport: Arc<dyn RelayTransport>,
        config: SessionConfig,
    ) -> Self {
        let shared = Arc::new(Shared::new(config.event_capacity));
        Self {
            keys,
            device,
            transport,
            config,
            shared,
        }
    }

    /// Get the session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Try every platform's relay without sending a key.
    ///
    /// Independent of the session state; a live session is not disturbed.
    pub async fn check_relays(&self) -> HashMap<Platform, RelayCheck> {
        check::check_relays(&self.config, self.transport.as_ref()).await
    }

    /// Go live on the selected platforms.
    ///
    /// Fails without opening any channel if the selection is empty, if any
    /// selected platform has no cached key, or if the media device cannot
    /// be acquired. Channels are opened without waiting for them to become
    /// ready; chunks produced before a channel is ready are dropped for
    /// that channel only.
    pub async fn start<I>(&self, selected: I) -> Result<()>
    where
        I: IntoIterator<Item = Platform>,
    {
        let selected: BTreeSet<Platform> = selected.into_iter().collect();

        let (generation, cancel) = self.shared.begin_start()?;
        let mut guard = StartGuard {
            shared: &self.shared,
            generation,
            armed: true,
        };

        let targets = self.resolve_keys(&selected)?;

        let capture = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            capture = MediaCapture::acquire(self.device.as_ref()) => capture?,
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let opener = ChannelOpener::new(
            Arc::clone(&self.transport),
            self.config.channel.clone(),
            events_tx,
        );
        let destinations = DestinationSet::open(
            &opener,
            targets
                .into_iter()
                .map(|(platform, key)| (platform, self.config.endpoint_for(platform), key)),
        );
        let channels = destinations.len();
        let destinations = Arc::new(RwLock::new(destinations));

        let pump = Pump {
            generation,
            capture,
            channel_events: events_rx,
            dispatcher: Dispatcher {
                shared: Arc::clone(&self.shared),
                destinations: Arc::clone(&destinations),
                opener,
                retry: self.config.retry.clone(),
                cancel,
            },
        };

        if self.shared.commit(generation, pump, destinations).is_err() {
            tracing::debug!("Start cancelled before going live");
            return Err(Error::Cancelled);
        }
        guard.disarm();

        tracing::info!(platforms = ?selected, channels = channels, "Session live");
        Ok(())
    }

    /// Stop streaming and release every channel and the media source.
    ///
    /// Does nothing on an idle session. A pending `start()` is cancelled
    /// and this waits until it has unwound. The pump performs the final
    /// transition to `Idle`, so dropping this future part-way still lets
    /// the session come to rest.
    pub async fn stop(&self) {
        let mut state_rx = self.shared.state.subscribe();

        let live = {
            let mut phase = self.shared.lock();
            match std::mem::replace(&mut *phase, Phase::Idle) {
                Phase::Idle => return,
                Phase::Live(live) => {
                    *phase = Phase::Stopping {
                        generation: live.generation,
                    };
                    self.shared.set_state(SessionState::Stopping);
                    live.cancel.cancel();
                    Some(live)
                }
                other => {
                    if let Phase::Starting { cancel, .. } = &other {
                        cancel.cancel();
                    }
                    *phase = other;
                    None
                }
            }
        };

        let Some(live) = live else {
            let _ = state_rx.wait_for(|s| *s == SessionState::Idle).await;
            return;
        };

        tracing::info!("Stopping session");
        if let Err(e) = live.pump.await {
            tracing::error!(error = %e, "Session pump panicked");
        }
        self.shared.finish(live.generation);
        tracing::info!("Session stopped");
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Watch lifecycle state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Receive channel, reconnect and media events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// State of every destination channel; empty unless live
    pub async fn channel_states(&self) -> HashMap<Platform, ChannelState> {
        match self.live_destinations() {
            Some((destinations, _)) => destinations.read().await.states(),
            None => HashMap::new(),
        }
    }

    /// Session counters; zeroed unless live
    pub async fn stats(&self) -> SessionStats {
        match self.live_destinations() {
            Some((destinations, started_at)) => {
                destinations.read().await.stats(started_at.elapsed())
            }
            None => SessionStats::default(),
        }
    }

    fn live_destinations(&self) -> Option<(Arc<RwLock<DestinationSet>>, Instant)> {
        match &*self.shared.lock() {
            Phase::Live(live) => Some((Arc::clone(&live.destinations), live.started_at)),
            _ => None,
        }
    }

    /// Cached key for every selected platform, or the full list of those
    /// without one
    fn resolve_keys(&self, selected: &BTreeSet<Platform>) -> Result<Vec<(Platform, StreamKey)>> {
        if selected.is_empty() {
            return Err(ConfigError::NoPlatformsSelected.into());
        }

        let cached = self.keys.snapshot();
        let mut resolved = Vec::with_capacity(selected.len());
        let mut missing = Vec::new();

        for &platform in selected {
            match cached.get(&platform) {
                Some(key) => resolved.push((platform, key.clone())),
                None => missing.push(platform),
            }
        }

        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Refusing to start without stream keys");
            return Err(ConfigError::MissingKeys(missing).into());
        }
        Ok(resolved)
    }
}

impl Drop for FanoutSession {
    fn drop(&mut self) {
        match &*self.shared.lock() {
            Phase::Starting { cancel, .. } => cancel.cancel(),
            Phase::Live(live) => live.cancel.cancel(),
            Phase::Idle | Phase::Stopping { .. } => {}
        }
    }
}

impl std::fmt::Debug for FanoutSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSession")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
