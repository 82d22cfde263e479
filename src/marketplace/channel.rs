//! Realtime channel adapter over a websocket connection.
//!
//! One connection is opened per authenticated user and reused across
//! session open/close cycles; sessions only subscribe and unsubscribe to
//! per-booking topics on it. A background task owns the socket: outgoing
//! frames arrive over an unbounded channel, incoming frames are parsed
//! into `ChannelEvent`s and handed to a callback.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
};
use tokio_tungstenite::{connect_async, tungstenite};

use crate::{
    domain::{
        events::ChannelEvent,
        message::{BookingId, UserId},
    },
    usecases::contracts::{ChannelError, ChatChannel},
};

const CHANNEL_CONNECTED: &str = "CHANNEL_CONNECTED";
const CHANNEL_STOPPED: &str = "CHANNEL_STOPPED";
const CHANNEL_READ_FAILED: &str = "CHANNEL_READ_FAILED";
const CHANNEL_WRITE_FAILED: &str = "CHANNEL_WRITE_FAILED";

/// Both naming schemes appear in the wild: the canonical topic and a
/// "private-" prefixed variant from older backend deployments.
const TOPIC_PREFIX: &str = "booking.";
const PRIVATE_TOPIC_PREFIX: &str = "private-booking.";

#[derive(Debug)]
pub struct WsChatChannel {
    frame_tx: mpsc::UnboundedSender<String>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl WsChatChannel {
    pub fn connect<F>(
        handle: &Handle,
        ws_url: &str,
        on_event: F,
    ) -> Result<Self, ChannelConnectError>
    where
        F: Fn(ChannelEvent) + Send + 'static,
    {
        let (socket, _response) = handle
            .block_on(connect_async(ws_url))
            .map_err(ChannelConnectError::Handshake)?;

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        handle.spawn(run_socket(socket, frame_rx, stop_rx, on_event));

        tracing::info!(code = CHANNEL_CONNECTED, ws_url, "realtime channel connected");

        Ok(Self {
            frame_tx,
            stop_tx: Some(stop_tx),
        })
    }

    fn push_frame(&self, frame: Value) -> Result<(), ChannelError> {
        self.frame_tx
            .send(frame.to_string())
            .map_err(|_| ChannelError::NotConnected)
    }
}

impl Drop for WsChatChannel {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
    }
}

impl ChatChannel for WsChatChannel {
    fn subscribe(&mut self, token: &str, booking_id: BookingId) -> Result<(), ChannelError> {
        self.push_frame(json!({
            "event": "subscribe",
            "data": { "channel": topic(booking_id), "auth": token },
        }))
    }

    fn unsubscribe(&mut self, booking_id: BookingId) -> Result<(), ChannelError> {
        self.push_frame(json!({
            "event": "unsubscribe",
            "data": { "channel": topic(booking_id) },
        }))
    }

    fn whisper_typing(
        &mut self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<(), ChannelError> {
        self.push_frame(json!({
            "event": "typing",
            "channel": topic(booking_id),
            "data": { "user_id": user_id },
        }))
    }
}

async fn run_socket<S, F>(
    socket: tokio_tungstenite::WebSocketStream<S>,
    mut frame_rx: mpsc::UnboundedReceiver<String>,
    mut stop_rx: watch::Receiver<bool>,
    on_event: F,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    F: Fn(ChannelEvent),
{
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    tracing::info!(code = CHANNEL_STOPPED, "realtime channel stopped");
                    return;
                }
            }
            frame = frame_rx.recv() => {
                let Some(frame) = frame else { return };
                if let Err(error) = write.send(tungstenite::Message::text(frame)).await {
                    tracing::warn!(
                        code = CHANNEL_WRITE_FAILED,
                        error = %error,
                        "outgoing channel frame not delivered"
                    );
                    on_event(ChannelEvent::ConnectionLost);
                    return;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(event) = parse_frame(text.as_str()) {
                            on_event(event);
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        on_event(ChannelEvent::ConnectionLost);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::warn!(
                            code = CHANNEL_READ_FAILED,
                            error = %error,
                            "realtime channel read failed"
                        );
                        on_event(ChannelEvent::ConnectionLost);
                        return;
                    }
                }
            }
        }
    }
}

fn topic(booking_id: BookingId) -> String {
    format!("{TOPIC_PREFIX}{booking_id}")
}

fn parse_topic(channel: &str) -> Option<BookingId> {
    channel
        .strip_prefix(PRIVATE_TOPIC_PREFIX)
        .or_else(|| channel.strip_prefix(TOPIC_PREFIX))?
        .parse()
        .ok()
}

/// Maps one wire frame to a `ChannelEvent`.
///
/// `message.sent` must be handled with and without the leading-dot
/// namespace variant: backend broadcasts are not consistent about it.
fn parse_frame(text: &str) -> Option<ChannelEvent> {
    let frame: Value = serde_json::from_str(text).ok()?;
    let event = frame.get("event")?.as_str()?;
    let booking_id = frame
        .get("channel")
        .and_then(Value::as_str)
        .and_then(parse_topic)?;
    let data = frame.get("data").cloned().unwrap_or(Value::Null);

    match event {
        "subscription_succeeded" => Some(ChannelEvent::Subscribed { booking_id }),
        "subscription_error" => Some(ChannelEvent::SubscriptionRejected {
            booking_id,
            reason: data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("subscription rejected")
                .to_owned(),
        }),
        "message.sent" | ".message.sent" => Some(ChannelEvent::Message {
            booking_id,
            payload: data,
        }),
        "typing" => data
            .get("user_id")
            .and_then(Value::as_i64)
            .map(|user_id| ChannelEvent::Typing {
                booking_id,
                user_id,
            }),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ChannelConnectError {
    Handshake(tungstenite::Error),
}

impl std::fmt::Display for ChannelConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handshake(source) => write!(f, "websocket handshake failed: {source}"),
        }
    }
}

impl std::error::Error for ChannelConnectError {}
