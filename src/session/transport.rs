//! WebSocket transport shared by the provider clients.
//!
//! The pump owns the socket after the setup frame has been sent. It forwards
//! queued outbound frames, answers pings, sends heartbeats, and decodes every
//! inbound frame in arrival order through the provider's [`FrameDecoder`].

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::events::SessionEvent;
use super::link::SessionLink;
use super::state::SessionState;
use crate::error::{Result, VoiceError};

pub(crate) type RealtimeWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    /// The provider acknowledged the setup message.
    SetupComplete,
    Event(SessionEvent),
}

/// Provider-specific inbound framing. Each frame is decoded independently.
pub(crate) trait FrameDecoder: Send + Sync + 'static {
    fn decode(&self, payload: &Value) -> Vec<Inbound>;
}

pub(crate) struct PumpHandle {
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}

/// Open the socket with extra request headers.
pub(crate) async fn connect(url: &str, headers: &[(&'static str, String)]) -> Result<RealtimeWebSocket> {
    let mut request = url.into_client_request().map_err(|error| {
        VoiceError::Configuration(format!("Invalid realtime websocket URL: {error}"))
    })?;
    for (name, value) in headers {
        let value = HeaderValue::from_str(value).map_err(|error| {
            VoiceError::Configuration(format!("Invalid realtime header '{name}': {error}"))
        })?;
        request.headers_mut().insert(*name, value);
    }

    connect_async(request)
        .await
        .map(|(socket, _)| socket)
        .map_err(map_connect_error)
}

/// Send one JSON frame directly on the socket (used for setup, before the pump runs).
pub(crate) async fn send_json(socket: &mut RealtimeWebSocket, value: &Value) -> Result<()> {
    let text = serde_json::to_string(value)?;
    socket
        .send(Message::Text(text.into()))
        .await
        .map_err(|error| VoiceError::Transport(format!("Realtime setup send failed: {error}")))
}

enum PumpOutcome {
    Shutdown,
    Disconnected(String),
}

pub(crate) async fn run_pump<D: FrameDecoder>(
    mut socket: RealtimeWebSocket,
    link: Arc<SessionLink>,
    decoder: D,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    heartbeat_interval: Duration,
) {
    let outcome = pump_frames(
        &mut socket,
        &link,
        &decoder,
        &mut outbound_rx,
        &events_tx,
        &mut shutdown_rx,
        heartbeat_interval,
    )
    .await;

    link.detach();
    if let PumpOutcome::Disconnected(message) = outcome {
        warn!(session_id = %link.session_id(), %message, "realtime transport lost");
        link.transition(SessionState::Error);
        let _ = events_tx.send(SessionEvent::Error { message });
    }
    let _ = events_tx.send(SessionEvent::Closed);
}

async fn pump_frames<D: FrameDecoder>(
    socket: &mut RealtimeWebSocket,
    link: &SessionLink,
    decoder: &D,
    outbound_rx: &mut mpsc::UnboundedReceiver<Message>,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
    heartbeat_interval: Duration,
) -> PumpOutcome {
    let mut heartbeat = heartbeat_timer(heartbeat_interval);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = socket.send(Message::Close(None)).await;
                    return PumpOutcome::Shutdown;
                }
            }
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    let _ = socket.send(Message::Close(None)).await;
                    return PumpOutcome::Shutdown;
                };
                if let Err(error) = socket.send(message).await {
                    return PumpOutcome::Disconnected(format!("Realtime websocket send failed: {error}"));
                }
            }
            _ = next_heartbeat(&mut heartbeat) => {
                if let Err(error) = socket.send(Message::Ping(Default::default())).await {
                    return PumpOutcome::Disconnected(format!("Realtime heartbeat failed: {error}"));
                }
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(message)) => {
                        if let Err(error) = handle_frame(socket, link, decoder, events_tx, message).await {
                            return PumpOutcome::Disconnected(format!("Realtime websocket closed: {error}"));
                        }
                    }
                    Some(Err(error)) => {
                        return PumpOutcome::Disconnected(format!("Realtime websocket receive failed: {error}"));
                    }
                    None => {
                        return PumpOutcome::Disconnected("Realtime websocket closed by server".into());
                    }
                }
            }
        }
    }
}

/// A zero period disables the heartbeat.
fn heartbeat_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut timer = time::interval_at(time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn next_heartbeat(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn handle_frame<D: FrameDecoder>(
    socket: &mut RealtimeWebSocket,
    link: &SessionLink,
    decoder: &D,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
    message: Message,
) -> std::result::Result<(), WsError> {
    match message {
        Message::Text(text) => dispatch_payload(&text, link, decoder, events_tx),
        // Some providers deliver JSON in binary frames.
        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => dispatch_payload(text, link, decoder, events_tx),
            Err(_) => warn!(session_id = %link.session_id(), "dropping non-UTF-8 binary frame"),
        },
        Message::Ping(payload) => socket.send(Message::Pong(payload)).await?,
        Message::Pong(_) | Message::Frame(_) => {}
        Message::Close(_) => return Err(WsError::ConnectionClosed),
    }
    Ok(())
}

fn dispatch_payload<D: FrameDecoder>(
    payload: &str,
    link: &SessionLink,
    decoder: &D,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
) {
    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(error) => {
            warn!(session_id = %link.session_id(), %error, "dropping malformed realtime frame");
            return;
        }
    };

    for inbound in decoder.decode(&value) {
        match inbound {
            Inbound::SetupComplete => {
                debug!(session_id = %link.session_id(), "setup acknowledged");
                link.transition(SessionState::Active);
            }
            Inbound::Event(event) => {
                if let SessionEvent::ToolCalls(calls) = &event {
                    link.register_calls(calls.iter().map(|call| call.call_id.as_str()));
                }
                let _ = events_tx.send(event);
            }
        }
    }
}

fn map_connect_error(error: WsError) -> VoiceError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if matches!(status, 401 | 403) {
                VoiceError::Authentication(format!(
                    "Realtime websocket authentication failed with status {status}"
                ))
            } else {
                VoiceError::api(
                    status,
                    format!("Realtime websocket handshake failed with status {status}"),
                )
            }
        }
        WsError::Io(error) => VoiceError::Transport(format!("Realtime connection failed: {error}")),
        WsError::Url(error) => {
            VoiceError::Configuration(format!("Invalid realtime websocket URL: {error}"))
        }
        other => VoiceError::Transport(format!("Realtime websocket connect failed: {other}")),
    }
}
