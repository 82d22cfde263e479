use super::message::{BookingId, ChatMessage, MessageId};

/// Lifecycle of the live-update subscription for the open booking.
///
/// `Failed` is terminal for one `open` attempt; a fresh `open` restarts
/// from `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Disconnected,
    Connecting,
    Subscribed,
    Failed,
}

impl SubscriptionState {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Disconnected => "SUBSCRIPTION_DISCONNECTED",
            Self::Connecting => "SUBSCRIPTION_CONNECTING",
            Self::Subscribed => "SUBSCRIPTION_SUBSCRIBED",
            Self::Failed => "SUBSCRIPTION_FAILED",
        }
    }
}

/// In-memory view of one booking's conversation.
///
/// The message list is ordered by arrival, not by server timestamp: a live
/// event can land before the REST response for the same message. Dedup by
/// id is the correctness backstop, so `insert_if_absent` is the only way
/// to grow the list after the history load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatSessionState {
    booking_id: Option<BookingId>,
    messages: Vec<ChatMessage>,
    subscription: SubscriptionState,
}

impl ChatSessionState {
    pub fn booking_id(&self) -> Option<BookingId> {
        self.booking_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn subscription(&self) -> SubscriptionState {
        self.subscription
    }

    pub fn is_open(&self) -> bool {
        self.booking_id.is_some()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.messages.iter().any(|message| message.id == id)
    }

    /// Starts a session for `booking_id`, discarding any previous state.
    pub fn begin(&mut self, booking_id: BookingId) {
        self.booking_id = Some(booking_id);
        self.messages.clear();
        self.subscription = SubscriptionState::Disconnected;
    }

    /// Replaces the list with the fetched history, deduped by id.
    pub fn set_history(&mut self, messages: Vec<ChatMessage>) {
        self.messages.clear();
        for message in messages {
            if !self.contains(message.id) {
                self.messages.push(message);
            }
        }
    }

    /// Appends `message` unless an entry with the same id already exists.
    /// Returns whether the message was inserted.
    pub fn insert_if_absent(&mut self, message: ChatMessage) -> bool {
        if self.contains(message.id) {
            return false;
        }

        self.messages.push(message);
        true
    }

    pub fn mark_connecting(&mut self) {
        self.subscription = SubscriptionState::Connecting;
    }

    pub fn mark_subscribed(&mut self) {
        self.subscription = SubscriptionState::Subscribed;
    }

    pub fn mark_failed(&mut self) {
        self.subscription = SubscriptionState::Failed;
    }

    pub fn mark_disconnected(&mut self) {
        self.subscription = SubscriptionState::Disconnected;
    }

    /// Tears the session down. Idempotent.
    pub fn clear(&mut self) {
        self.booking_id = None;
        self.messages.clear();
        self.subscription = SubscriptionState::Disconnected;
    }
}
