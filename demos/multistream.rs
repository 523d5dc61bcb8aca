//! Multistream demo with local relays
//!
//! Run with: cargo run --example multistream [SECONDS]
//!
//! Starts one loopback relay per platform, then streams a synthetic test
//! pattern to all of them for SECONDS (default 5) or until Ctrl+C. Each
//! relay prints what it receives; session statistics are printed as JSON
//! when the session stops.
//!
//! The Twitch relay refuses to acknowledge keys, so its channel is
//! promoted to ready by the ack timeout. The Facebook relay hangs up after
//! two seconds to show that a failing destination does not disturb the
//! others, and that the retry policy reconnects it.
//!
//! Set RUST_LOG=multistream=trace to see every chunk.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

use multistream::media::synthetic::sequence_of;
use multistream::relay::{ClientMessage, ServerCodec, ServerMessage};
use multistream::{
    AckPolicy, ChannelConfig, Endpoint, FanoutSession, HttpKeyApi, Platform, RetryPolicy,
    SessionConfig, SessionEvent, StreamKey, StreamKeyStore, SyntheticDevice, TcpTransport,
};

/// How a demo relay treats its clients
#[derive(Clone, Copy)]
struct RelayOptions {
    ack: bool,
    hang_up_after: Option<Duration>,
}

async fn spawn_relay(platform: Platform, options: RelayOptions) -> std::io::Result<Endpoint> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        while let Ok((socket, peer)) = listener.accept().await {
            println!("[{platform} relay] Connection from {peer}");
            tokio::spawn(serve(platform, options, Framed::new(socket, ServerCodec::new())));
        }
    });

    Ok(Endpoint::new("127.0.0.1", port))
}

async fn serve(
    platform: Platform,
    options: RelayOptions,
    mut framed: Framed<tokio::net::TcpStream, ServerCodec>,
) {
    let hang_up = async {
        match options.hang_up_after {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(hang_up);

    let mut chunks = 0u64;
    loop {
        tokio::select! {
            _ = &mut hang_up => {
                println!("[{platform} relay] Hanging up after {chunks} chunks");
                return;
            }
            frame = framed.next() => match frame {
                Some(Ok(ClientMessage::SendKey(key))) => {
                    println!("[{platform} relay] Key {key} -> {}", platform.rtmp_base_url());
                    if options.ack {
                        let _ = framed.send(ServerMessage::KeyAck).await;
                    }
                }
                Some(Ok(ClientMessage::BinaryStream(payload))) => {
                    chunks += 1;
                    if chunks % 40 == 1 {
                        println!(
                            "[{platform} relay] Chunk #{} ({} bytes)",
                            sequence_of(&payload).unwrap_or_default(),
                            payload.len()
                        );
                    }
                }
                Some(Err(e)) => {
                    println!("[{platform} relay] Protocol error: {e}");
                    return;
                }
                None => {
                    println!("[{platform} relay] Client left after {chunks} chunks");
                    return;
                }
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let seconds: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse().map_err(|_| format!("Invalid duration: '{arg}'"))?,
        None => 5,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("multistream=info".parse()?),
        )
        .init();

    let relays = [
        (Platform::YouTube, RelayOptions { ack: true, hang_up_after: None }),
        (Platform::Twitch, RelayOptions { ack: false, hang_up_after: None }),
        (
            Platform::Facebook,
            RelayOptions {
                ack: true,
                hang_up_after: Some(Duration::from_secs(2)),
            },
        ),
    ];

    let mut config = SessionConfig::default()
        .channel(ChannelConfig::default().ack_policy(AckPolicy::AwaitAck {
            timeout: Duration::from_millis(250),
        }))
        .retry(RetryPolicy::exponential(3));
    for (platform, options) in relays {
        config = config.endpoint(platform, spawn_relay(platform, options).await?);
    }

    // Keys would normally come from StreamKeyStore::refresh
    let keys = HashMap::from([
        (Platform::YouTube, StreamKey::new("abcd-efgh-ijkl-mnop-qrst")),
        (Platform::Twitch, StreamKey::new("live_123456789_abcdefghijklmnop")),
        (Platform::Facebook, StreamKey::new("FB-1234567890-ABCDEFGHIJKLMNOPQRSTU")),
    ]);
    let store = StreamKeyStore::with_keys(Arc::new(HttpKeyApi::new()?), keys);

    let session = FanoutSession::with_config(
        Arc::new(store),
        Arc::new(SyntheticDevice::default()),
        Arc::new(TcpTransport::new()),
        config,
    );

    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Channel(e) => match e.error {
                    Some(error) => println!("{}: {} -> {} ({error})", e.platform, e.from, e.to),
                    None => println!("{}: {} -> {}", e.platform, e.from, e.to),
                },
                SessionEvent::Reconnecting { platform, attempt, delay } => {
                    println!("{platform}: reconnect #{attempt} in {delay:?}");
                }
                other => println!("{other:?}"),
            }
        }
    });

    for (platform, check) in session.check_relays().await {
        match check.result {
            Ok(elapsed) => println!("{platform} relay at {} reachable in {elapsed:?}", check.endpoint),
            Err(e) => println!("{platform} relay at {} unreachable: {e}", check.endpoint),
        }
    }

    session.start(Platform::ALL).await?;
    println!("Live on {} platforms for {seconds}s (Ctrl+C to stop early)", Platform::ALL.len());

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = tokio::signal::ctrl_c() => println!("Interrupted"),
    }

    let stats = session.stats().await;
    session.stop().await;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
