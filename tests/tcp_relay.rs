//! Channels and sessions against real TCP relays on loopback

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use multistream::channel::{AckPolicy, ChannelConfig, ChannelState, DestinationChannel};
use multistream::media::synthetic::sequence_of;
use multistream::relay::{ClientMessage, ServerCodec, ServerMessage};
use multistream::{
    check_relays, Endpoint, FanoutSession, HttpKeyApi, MediaChunk, Platform, RelayError,
    SessionConfig, SessionState, StreamKey, StreamKeyStore, SyntheticDevice, TcpTransport,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy)]
enum RelayMode {
    /// Never answers
    Silent,
    /// Acknowledges the key
    Ack,
    /// Hangs up right after reading the key
    CloseAfterKey,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Start a relay on an ephemeral port; every frame it reads is forwarded
/// to the returned receiver.
async fn spawn_relay(mode: RelayMode) -> (Endpoint, mpsc::UnboundedReceiver<ClientMessage>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut framed = Framed::new(socket, ServerCodec::new());
                while let Some(Ok(msg)) = framed.next().await {
                    let is_key = msg.is_key();
                    let _ = tx.send(msg);

                    if is_key {
                        match mode {
                            RelayMode::Silent => {}
                            RelayMode::Ack => {
                                let _ = framed.send(ServerMessage::KeyAck).await;
                            }
                            RelayMode::CloseAfterKey => return,
                        }
                    }
                }
            });
        }
    });

    (Endpoint::new("127.0.0.1", port), rx)
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<ClientMessage>) -> ClientMessage {
    timeout(WAIT, rx.recv())
        .await
        .expect("relay received nothing")
        .expect("relay stopped")
}

fn open_channel(
    endpoint: Endpoint,
    config: ChannelConfig,
) -> (DestinationChannel, mpsc::UnboundedReceiver<multistream::ChannelEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let channel = DestinationChannel::open(
        Platform::Twitch,
        endpoint,
        StreamKey::new("live_0123456789abcdef"),
        Arc::new(TcpTransport::new()),
        config,
        tx,
    );
    (channel, rx)
}

async fn wait_for_state(channel: &DestinationChannel, state: ChannelState) {
    let mut rx = channel.subscribe();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .expect("state not reached")
        .unwrap();
}

#[tokio::test]
async fn channel_sends_key_then_media() {
    init_tracing();
    let (endpoint, mut relay) = spawn_relay(RelayMode::Ack).await;

    let config = ChannelConfig::default().ack_policy(AckPolicy::AwaitAck { timeout: WAIT });
    let (channel, _events) = open_channel(endpoint, config);
    wait_for_state(&channel, ChannelState::Ready).await;

    for sequence in 0..3u64 {
        let chunk = MediaChunk::new(sequence, 0, Bytes::from(vec![sequence as u8; 16]));
        assert!(channel.send(&chunk));
    }

    assert_eq!(
        next_message(&mut relay).await,
        ClientMessage::SendKey(StreamKey::new("live_0123456789abcdef"))
    );
    for sequence in 0..3u8 {
        assert_eq!(
            next_message(&mut relay).await,
            ClientMessage::BinaryStream(Bytes::from(vec![sequence; 16]))
        );
    }

    channel.close();
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn silent_relay_is_promoted_after_ack_timeout() {
    init_tracing();
    let (endpoint, mut relay) = spawn_relay(RelayMode::Silent).await;

    let config = ChannelConfig::default().ack_policy(AckPolicy::AwaitAck {
        timeout: Duration::from_millis(100),
    });
    let (channel, _events) = open_channel(endpoint, config);

    assert!(next_message(&mut relay).await.is_key());
    wait_for_state(&channel, ChannelState::Ready).await;
}

#[tokio::test]
async fn relay_hangup_fails_channel() {
    init_tracing();
    let (endpoint, _relay) = spawn_relay(RelayMode::CloseAfterKey).await;

    let config = ChannelConfig::default().ack_policy(AckPolicy::AwaitAck { timeout: WAIT });
    let (channel, mut events) = open_channel(endpoint, config);

    wait_for_state(&channel, ChannelState::Failed).await;
    let failure = loop {
        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        if event.is_failure() {
            break event;
        }
    };
    assert!(matches!(
        failure.error,
        Some(RelayError::RemoteClosed | RelayError::Io(_))
    ));
}

#[tokio::test]
async fn refused_connection_fails_channel() {
    init_tracing();
    // Reserve a port, then free it so nothing is listening
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let (channel, mut events) = open_channel(
        Endpoint::new("127.0.0.1", port),
        ChannelConfig::default(),
    );

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.from, ChannelState::Connecting);
    assert_eq!(event.to, ChannelState::Failed);
    assert!(matches!(event.error, Some(RelayError::Connect(_))));
    assert_eq!(channel.state(), ChannelState::Failed);
}

#[tokio::test]
async fn session_fans_out_to_every_relay() {
    init_tracing();
    let (youtube, mut youtube_relay) = spawn_relay(RelayMode::Ack).await;
    let (twitch, mut twitch_relay) = spawn_relay(RelayMode::Silent).await;

    let keys = HashMap::from([
        (Platform::YouTube, StreamKey::new("abcd-efgh-ijkl-mnop-qrst")),
        (Platform::Twitch, StreamKey::new("live_0123456789abcdef")),
    ]);
    let store = StreamKeyStore::with_keys(Arc::new(HttpKeyApi::new().unwrap()), keys);

    let config = SessionConfig::default()
        .endpoint(Platform::YouTube, youtube)
        .endpoint(Platform::Twitch, twitch)
        .channel(ChannelConfig::default().ack_policy(AckPolicy::AwaitAck {
            timeout: Duration::from_millis(50),
        }));

    let session = FanoutSession::with_config(
        Arc::new(store),
        Arc::new(SyntheticDevice::new(Duration::from_millis(10), 256)),
        Arc::new(TcpTransport::new()),
        config,
    );

    session.start([Platform::YouTube, Platform::Twitch]).await.unwrap();
    assert_eq!(session.state(), SessionState::Live);

    for relay in [&mut youtube_relay, &mut twitch_relay] {
        assert!(next_message(relay).await.is_key());

        let mut last = None;
        for _ in 0..5 {
            let ClientMessage::BinaryStream(payload) = next_message(relay).await else {
                panic!("key sent twice");
            };
            assert_eq!(payload.len(), 256);

            let sequence = sequence_of(&payload).unwrap();
            assert!(last.map_or(true, |l| sequence > l));
            last = Some(sequence);
        }
    }

    session.stop().await;
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn relay_check_connects_without_sending_a_key() {
    init_tracing();
    let (youtube, mut youtube_relay) = spawn_relay(RelayMode::Silent).await;
    let refused = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port())
    };

    let config = SessionConfig::default()
        .endpoint(Platform::YouTube, youtube.clone())
        .endpoint(Platform::Twitch, refused.clone())
        .endpoint(Platform::Facebook, refused)
        .channel(ChannelConfig::default().connect_timeout(Duration::from_secs(2)));

    let results = check_relays(&config, &TcpTransport::new()).await;

    assert_eq!(results[&Platform::YouTube].endpoint, youtube);
    assert!(results[&Platform::YouTube].is_reachable());
    for platform in [Platform::Twitch, Platform::Facebook] {
        assert!(matches!(
            results[&platform].result,
            Err(RelayError::Connect(_))
        ));
    }

    // The relay saw a connection but never a frame
    assert!(timeout(Duration::from_millis(200), youtube_relay.recv())
        .await
        .is_err());
}
