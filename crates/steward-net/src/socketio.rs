//! Socket.IO push channel over a raw websocket.
//!
//! The connection loop runs in a dedicated tokio task per subscription.
//! It performs the Engine.IO handshake, joins the namespace, answers
//! heartbeats and forwards `new_notification` payloads. Dropped connections
//! are retried with exponential backoff until the subscription is closed or
//! the server explicitly disconnects the client.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use steward_shared::constants::{
    ENGINE_IO_VERSION, EVENT_NEW_NOTIFICATION, MAX_RECONNECT_DELAY_SECS, RECIPIENT_QUERY_PARAM,
    RECONNECT_BASE_DELAY_SECS, SOCKET_IO_PATH,
};
use steward_shared::protocol::{EnginePacket, SocketPacket};
use steward_shared::RecipientId;

use crate::channel::{ChannelEvent, PushConnector, Subscription, SubscriptionCloser, CHANNEL_CAPACITY};
use crate::error::ChannelError;

/// How long to wait for the Engine.IO `open` packet after the websocket upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connector speaking Socket.IO to the notification server.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    origin: Url,
}

impl SocketIoConnector {
    /// `origin` is the push-channel origin, e.g. `http://localhost:5000`.
    pub fn new(origin: &str) -> Result<Self, ChannelError> {
        let origin = Url::parse(origin.trim()).map_err(|e| ChannelError::InvalidUrl(format!("{origin}: {e}")))?;
        match origin.scheme() {
            "http" | "https" | "ws" | "wss" => Ok(Self { origin }),
            other => Err(ChannelError::InvalidUrl(format!("unsupported scheme {other:?}"))),
        }
    }
}

/// Build the websocket URL for a recipient and the namespace to join.
///
/// A path on the origin names the Socket.IO namespace, as in the browser
/// client; the transport always lives under `/socket.io/`.
pub fn socket_endpoint(origin: &Url, recipient: RecipientId) -> Result<(Url, String), ChannelError> {
    let mut url = origin.clone();
    let scheme = match origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ChannelError::InvalidUrl(format!("unsupported scheme {other:?}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::InvalidUrl(origin.to_string()))?;

    let namespace = match origin.path().trim_end_matches('/') {
        "" => "/".to_string(),
        path => path.to_string(),
    };

    url.set_path(SOCKET_IO_PATH);
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket")
        .append_pair(RECIPIENT_QUERY_PARAM, &recipient.to_string());

    Ok((url, namespace))
}

impl PushConnector for SocketIoConnector {
    fn subscribe(&self, recipient: RecipientId) -> Result<Subscription, ChannelError> {
        let (url, namespace) = socket_endpoint(&self.origin, recipient)?;
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        info!(recipient = %recipient, url = %url, "Opening notification channel");

        let task = tokio::spawn(connection_loop(url, namespace, event_tx, shutdown_rx));
        let abort = task.abort_handle();

        let closer = SubscriptionCloser::new(move || {
            let _ = shutdown_tx.send(());
            abort.abort();
            debug!(recipient = %recipient, "Notification channel closed");
        });

        Ok(Subscription::new(event_rx, closer))
    }
}

/// Why a single connection ended without a transport error.
#[derive(Debug, PartialEq, Eq)]
enum ConnectionEnd {
    /// Engine.IO close or websocket close; worth reconnecting.
    Closed,
    /// The server disconnected us from the namespace; do not reconnect.
    ServerDisconnect,
    /// Nobody is listening to the subscription any more.
    ReceiverGone,
}

async fn connection_loop(
    url: Url,
    namespace: String,
    event_tx: mpsc::Sender<ChannelEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut attempts = 0u32;

    loop {
        let result = tokio::select! {
            r = run_connection(&url, &namespace, &event_tx, &mut attempts) => r,
            _ = &mut shutdown_rx => break,
        };

        let reason = match result {
            Ok(ConnectionEnd::ServerDisconnect) => {
                info!(url = %url, "Server closed the notification namespace");
                let _ = event_tx
                    .send(ChannelEvent::Disconnected {
                        reason: "io server disconnect".into(),
                    })
                    .await;
                break;
            }
            Ok(ConnectionEnd::ReceiverGone) => break,
            Ok(ConnectionEnd::Closed) => "transport close".to_string(),
            Err(e) => {
                warn!(url = %url, error = %e, "Notification channel connection failed");
                e.to_string()
            }
        };

        if event_tx.send(ChannelEvent::Disconnected { reason }).await.is_err() {
            break;
        }

        attempts = attempts.saturating_add(1);
        let delay = backoff_delay(attempts);
        debug!(attempts, delay_secs = delay.as_secs(), "Reconnecting notification channel");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => break,
        }
    }
}

/// Exponential backoff for the `attempts`-th retry (1-based): base * 2^(attempts - 1), capped.
fn backoff_delay(attempts: u32) -> Duration {
    let secs = RECONNECT_BASE_DELAY_SECS
        .saturating_mul(1 << attempts.saturating_sub(1).min(6))
        .min(MAX_RECONNECT_DELAY_SECS);
    Duration::from_secs(secs)
}

async fn run_connection(
    url: &Url,
    namespace: &str,
    event_tx: &mpsc::Sender<ChannelEvent>,
    attempts: &mut u32,
) -> Result<ConnectionEnd, ChannelError> {
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    let handshake = match tokio::time::timeout(HANDSHAKE_TIMEOUT, read.next()).await {
        Err(_) => return Err(ChannelError::Timeout(HANDSHAKE_TIMEOUT.as_millis() as u64)),
        Ok(None) => return Ok(ConnectionEnd::Closed),
        Ok(Some(frame)) => match frame? {
            Message::Text(text) => match EnginePacket::decode(&text)? {
                EnginePacket::Open(handshake) => handshake,
                other => return Err(ChannelError::Handshake(format!("expected open packet, got {other:?}"))),
            },
            other => return Err(ChannelError::Handshake(format!("expected text frame, got {other:?}"))),
        },
    };

    debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "Engine.IO session opened");

    let join = EnginePacket::Message(SocketPacket::Connect {
        namespace: namespace.to_string(),
        data: None,
    });
    write.send(Message::Text(join.encode().into())).await?;

    // The server pings every `ping_interval`; silence beyond that plus the
    // grace period means the connection is dead.
    let liveness_ms = handshake.ping_interval + handshake.ping_timeout;
    let liveness = Duration::from_millis(liveness_ms);

    loop {
        let frame = match tokio::time::timeout(liveness, read.next()).await {
            Err(_) => return Err(ChannelError::Timeout(liveness_ms)),
            Ok(None) => return Ok(ConnectionEnd::Closed),
            Ok(Some(frame)) => frame?,
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Ping(data) => {
                write.send(Message::Pong(data)).await?;
                continue;
            }
            Message::Close(_) => return Ok(ConnectionEnd::Closed),
            _ => continue,
        };

        let packet = match EnginePacket::decode(&text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Ignoring undecodable frame");
                continue;
            }
        };

        match packet {
            EnginePacket::Ping(data) => {
                write.send(Message::Text(EnginePacket::Pong(data).encode().into())).await?;
            }
            EnginePacket::Close => return Ok(ConnectionEnd::Closed),
            EnginePacket::Message(socket_packet) => {
                if let Some(end) = handle_socket_packet(socket_packet, namespace, event_tx, attempts).await? {
                    return Ok(end);
                }
            }
            EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
    }
}

async fn handle_socket_packet(
    packet: SocketPacket,
    namespace: &str,
    event_tx: &mpsc::Sender<ChannelEvent>,
    attempts: &mut u32,
) -> Result<Option<ConnectionEnd>, ChannelError> {
    match packet {
        SocketPacket::Connect { namespace: ns, .. } if ns == namespace => {
            *attempts = 0;
            info!(namespace = %ns, "Connected to notification channel");
            if event_tx.send(ChannelEvent::Connected).await.is_err() {
                return Ok(Some(ConnectionEnd::ReceiverGone));
            }
        }
        SocketPacket::ConnectError { namespace: ns, data } if ns == namespace => {
            let detail = data.map(|d| d.to_string()).unwrap_or_default();
            return Err(ChannelError::Handshake(format!("namespace {ns} rejected: {detail}")));
        }
        SocketPacket::Disconnect { namespace: ns } if ns == namespace => {
            return Ok(Some(ConnectionEnd::ServerDisconnect));
        }
        SocketPacket::Event {
            namespace: ns, name, args, ..
        } if ns == namespace && name == EVENT_NEW_NOTIFICATION => {
            for payload in args.into_iter().take(1) {
                if event_tx.send(ChannelEvent::Notification(payload)).await.is_err() {
                    return Ok(Some(ConnectionEnd::ReceiverGone));
                }
            }
        }
        other => {
            debug!(packet = ?other, "Unhandled Socket.IO packet");
        }
    }
    Ok(None)
}
