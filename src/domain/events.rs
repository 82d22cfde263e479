use super::message::{BookingId, UserId};

/// Events pushed by the realtime channel for booking topics.
///
/// `Message` carries the raw broadcast payload: field names differ between
/// delivery paths, so normalization happens at ingestion, not here.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Subscribed {
        booking_id: BookingId,
    },
    SubscriptionRejected {
        booking_id: BookingId,
        reason: String,
    },
    Message {
        booking_id: BookingId,
        payload: serde_json::Value,
    },
    /// Ephemeral whisper; never persisted, never part of history.
    Typing {
        booking_id: BookingId,
        user_id: UserId,
    },
    ConnectionLost,
}

/// Events driving the chat shell loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Tick,
    QuitRequested,
    InputLine(String),
    Channel(ChannelEvent),
}
