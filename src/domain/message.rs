use chrono::{DateTime, Utc};

pub type BookingId = i64;
pub type MessageId = i64;
pub type UserId = i64;

/// One durable chat message scoped to a booking.
///
/// `id` is server-assigned; the session never fabricates ids locally.
/// `read_at` is set once the receiver has acknowledged the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub booking_id: BookingId,
    pub sender_id: UserId,
    pub receiver_id: Option<UserId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn is_from(&self, user_id: UserId) -> bool {
        self.sender_id == user_id
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}
