use crate::domain::message::{BookingId, ChatMessage, MessageId, UserId};

/// Bearer credentials read from the local persisted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub bearer: String,
    pub user_id: UserId,
}

/// Source of the persisted auth session.
///
/// Implementations must re-read backing storage on every call so a token
/// refresh or logout elsewhere is respected by the next `open`.
pub trait TokenSource {
    fn read_token(&self) -> Option<AuthToken>;
}

impl<T: TokenSource + ?Sized> TokenSource for &T {
    fn read_token(&self) -> Option<AuthToken> {
        (*self).read_token()
    }
}

/// Errors at the marketplace REST API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatApiError {
    /// Token rejected by the backend.
    Unauthorized,
    /// Booking does not exist or the user is not a participant.
    BookingNotFound,
    /// Transport failure or server error.
    Unavailable,
    /// Response body did not match any tolerated shape.
    InvalidData,
}

/// The booking-chat REST endpoints.
pub trait ChatApi {
    fn fetch_history(
        &self,
        token: &str,
        booking_id: BookingId,
    ) -> Result<Vec<ChatMessage>, ChatApiError>;

    fn send_message(
        &self,
        token: &str,
        booking_id: BookingId,
        body: &str,
    ) -> Result<ChatMessage, ChatApiError>;

    fn mark_read(
        &self,
        token: &str,
        booking_id: BookingId,
        message_id: MessageId,
    ) -> Result<(), ChatApiError>;

    fn signal_typing(&self, token: &str, booking_id: BookingId) -> Result<(), ChatApiError>;

    fn unread_count(&self, token: &str, booking_id: BookingId) -> Result<u64, ChatApiError>;
}

impl<T: ChatApi + ?Sized> ChatApi for &T {
    fn fetch_history(
        &self,
        token: &str,
        booking_id: BookingId,
    ) -> Result<Vec<ChatMessage>, ChatApiError> {
        (*self).fetch_history(token, booking_id)
    }

    fn send_message(
        &self,
        token: &str,
        booking_id: BookingId,
        body: &str,
    ) -> Result<ChatMessage, ChatApiError> {
        (*self).send_message(token, booking_id, body)
    }

    fn mark_read(
        &self,
        token: &str,
        booking_id: BookingId,
        message_id: MessageId,
    ) -> Result<(), ChatApiError> {
        (*self).mark_read(token, booking_id, message_id)
    }

    fn signal_typing(&self, token: &str, booking_id: BookingId) -> Result<(), ChatApiError> {
        (*self).signal_typing(token, booking_id)
    }

    fn unread_count(&self, token: &str, booking_id: BookingId) -> Result<u64, ChatApiError> {
        (*self).unread_count(token, booking_id)
    }
}

/// Errors at the realtime channel boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The underlying connection is gone.
    NotConnected,
}

/// Per-booking topics on the process-wide realtime connection.
///
/// The connection itself outlives any single session; sessions only
/// subscribe and unsubscribe to `booking.{id}` topics on it. Join results
/// arrive asynchronously as `ChannelEvent`s, not as return values here.
pub trait ChatChannel {
    fn subscribe(&mut self, token: &str, booking_id: BookingId) -> Result<(), ChannelError>;

    fn unsubscribe(&mut self, booking_id: BookingId) -> Result<(), ChannelError>;

    /// Emits the ephemeral `typing` whisper on the booking topic.
    fn whisper_typing(&mut self, booking_id: BookingId, user_id: UserId)
        -> Result<(), ChannelError>;
}
