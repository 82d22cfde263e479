//! The realtime chat session for one booking.
//!
//! Combines the pull source (REST history) and the push source (channel
//! events) into a single deduplicated, arrival-ordered message list, and
//! exposes the send / mark-read / typing operations. Ordering is arrival
//! order by design: the backend supplies no per-booking sequence number,
//! so dedup by id is the correctness backstop, not global ordering.

use std::collections::HashSet;

use serde_json::Value;

use crate::domain::{
    composer::ComposerState,
    events::ChannelEvent,
    message::{BookingId, ChatMessage, MessageId},
    session_state::{ChatSessionState, SubscriptionState},
    typing::TypingIndicator,
};

use super::{
    contracts::{AuthToken, ChatApi, ChatApiError, ChatChannel, TokenSource},
    normalize,
};

const HISTORY_FETCH_FAILED: &str = "CHAT_HISTORY_FETCH_FAILED";
const SUBSCRIBE_FAILED: &str = "CHAT_SUBSCRIBE_FAILED";
const UNSUBSCRIBE_FAILED: &str = "CHAT_UNSUBSCRIBE_FAILED";
const MARK_READ_FAILED: &str = "CHAT_MARK_READ_FAILED";
const TYPING_SIGNAL_FAILED: &str = "CHAT_TYPING_SIGNAL_FAILED";
const SUBSCRIPTION_REJECTED: &str = "CHAT_SUBSCRIPTION_REJECTED";
const STALE_EVENT_DISCARDED: &str = "CHAT_STALE_EVENT_DISCARDED";
const MALFORMED_EVENT_DISCARDED: &str = "CHAT_MALFORMED_EVENT_DISCARDED";
const CONNECTION_LOST: &str = "CHAT_CONNECTION_LOST";

/// Errors surfaced to the UI when opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenSessionError {
    /// No persisted token; fatal, no network call is attempted.
    AuthMissing,
    /// History load failed; recoverable, the caller may reopen.
    HistoryFetchFailed(ChatApiError),
}

/// Errors surfaced to the UI when sending a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMessageError {
    /// Text was empty after trimming; no API call was issued.
    EmptyMessage,
    /// No session is open.
    SessionClosed,
    /// The write was rejected; the text has been restored to the composer.
    SendFailed(ChatApiError),
}

/// Owns the lifecycle of one booking's chat.
///
/// Only one session is active per user at a time; opening a new booking
/// tears the previous subscription down first so no topic is delivered
/// twice. Events for any other booking are discarded on arrival.
pub struct RealtimeChatSession<A, C, T> {
    api: A,
    channel: C,
    tokens: T,
    auth: Option<AuthToken>,
    state: ChatSessionState,
    composer: ComposerState,
    typing: TypingIndicator,
    marked_read: HashSet<MessageId>,
}

impl<A, C, T> RealtimeChatSession<A, C, T>
where
    A: ChatApi,
    C: ChatChannel,
    T: TokenSource,
{
    pub fn new(api: A, channel: C, tokens: T) -> Self {
        Self {
            api,
            channel,
            tokens,
            auth: None,
            state: ChatSessionState::default(),
            composer: ComposerState::default(),
            typing: TypingIndicator::default(),
            marked_read: HashSet::new(),
        }
    }

    pub fn booking_id(&self) -> Option<BookingId> {
        self.state.booking_id()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.state.messages()
    }

    pub fn subscription(&self) -> SubscriptionState {
        self.state.subscription()
    }

    pub fn draft(&self) -> &str {
        self.composer.draft()
    }

    pub fn peer_typing(&self, now_ms: u128) -> bool {
        self.typing.is_active(now_ms)
    }

    /// Opens the chat for `booking_id`: loads history, marks unread
    /// messages from the other participant read, and subscribes to the
    /// booking topic.
    ///
    /// The token is re-read from the persisted session on every call so a
    /// logout or refresh elsewhere is respected. A history failure leaves
    /// the session open with an empty list for a retry; a subscribe
    /// failure is logged and leaves the loaded history visible without
    /// live updates.
    pub fn open(&mut self, booking_id: BookingId) -> Result<(), OpenSessionError> {
        let auth = self
            .tokens
            .read_token()
            .ok_or(OpenSessionError::AuthMissing)?;

        self.teardown();
        self.auth = Some(auth.clone());
        self.state.begin(booking_id);

        let history = self
            .api
            .fetch_history(&auth.bearer, booking_id)
            .map_err(|error| {
                tracing::warn!(
                    code = HISTORY_FETCH_FAILED,
                    booking_id,
                    error = ?error,
                    "history fetch failed; session stays open for retry"
                );
                OpenSessionError::HistoryFetchFailed(error)
            })?;

        self.state.set_history(history);

        let unread: Vec<MessageId> = self
            .state
            .messages()
            .iter()
            .filter(|message| !message.is_from(auth.user_id) && !message.is_read())
            .map(|message| message.id)
            .collect();
        for message_id in unread {
            self.issue_mark_read(message_id);
        }

        self.state.mark_connecting();
        if let Err(error) = self.channel.subscribe(&auth.bearer, booking_id) {
            tracing::warn!(
                code = SUBSCRIBE_FAILED,
                booking_id,
                error = ?error,
                "channel subscribe failed; live updates disabled until reopen"
            );
            self.state.mark_failed();
        }

        Ok(())
    }

    /// Unsubscribes and discards in-memory state. Idempotent.
    pub fn close(&mut self) {
        self.teardown();
        self.auth = None;
        self.composer.clear();
    }

    /// Sends `text` to the open booking. On success the server-returned
    /// message joins the list unless a live event already delivered it.
    /// On failure the text is restored to the composer for a retry; no
    /// optimistic message is ever shown.
    pub fn send(&mut self, text: &str) -> Result<ChatMessage, SendMessageError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SendMessageError::EmptyMessage);
        }

        let (auth, booking_id) = match (&self.auth, self.state.booking_id()) {
            (Some(auth), Some(booking_id)) => (auth.clone(), booking_id),
            _ => return Err(SendMessageError::SessionClosed),
        };

        match self.api.send_message(&auth.bearer, booking_id, trimmed) {
            Ok(message) => {
                self.composer.clear();
                self.state.insert_if_absent(message.clone());
                Ok(message)
            }
            Err(error) => {
                self.composer.restore(trimmed);
                Err(SendMessageError::SendFailed(error))
            }
        }
    }

    /// Ingests one raw push payload for `topic_booking_id`.
    ///
    /// Returns whether a new message joined the list. Duplicates by id are
    /// dropped; a newly inserted message from the other participant gets a
    /// best-effort mark-read call.
    pub fn ingest_incoming(&mut self, topic_booking_id: BookingId, payload: &Value) -> bool {
        let Some(current) = self.state.booking_id() else {
            return false;
        };

        let Some(message) = normalize::normalize_message(payload, topic_booking_id) else {
            tracing::warn!(
                code = MALFORMED_EVENT_DISCARDED,
                booking_id = topic_booking_id,
                "discarding push payload that matches no known shape"
            );
            return false;
        };

        if message.booking_id != current {
            tracing::debug!(
                code = STALE_EVENT_DISCARDED,
                event_booking_id = message.booking_id,
                current_booking_id = current,
                "discarding event for a booking that is no longer open"
            );
            return false;
        }

        let from_peer = self
            .auth
            .as_ref()
            .is_some_and(|auth| !message.is_from(auth.user_id));
        let unread = !message.is_read();
        let message_id = message.id;

        if !self.state.insert_if_absent(message) {
            return false;
        }

        if from_peer && unread {
            self.issue_mark_read(message_id);
        }

        true
    }

    /// Marks one message read. Best-effort: failures are logged, never
    /// retried, never surfaced. At most one call is issued per id for the
    /// lifetime of the session.
    pub fn mark_read(&mut self, message_id: MessageId) {
        self.issue_mark_read(message_id);
    }

    /// Emits the typing whisper on the channel and informs the API for
    /// server-side presence. Both are best-effort.
    pub fn signal_typing(&mut self) {
        let (auth, booking_id) = match (&self.auth, self.state.booking_id()) {
            (Some(auth), Some(booking_id)) => (auth.clone(), booking_id),
            _ => return,
        };

        if let Err(error) = self.channel.whisper_typing(booking_id, auth.user_id) {
            tracing::debug!(
                code = TYPING_SIGNAL_FAILED,
                booking_id,
                error = ?error,
                "typing whisper not delivered"
            );
        }

        if let Err(error) = self.api.signal_typing(&auth.bearer, booking_id) {
            tracing::debug!(
                code = TYPING_SIGNAL_FAILED,
                booking_id,
                error = ?error,
                "typing presence call failed"
            );
        }
    }

    /// Routes one channel event into the session. Events scoped to any
    /// booking other than the open one are discarded.
    pub fn handle_channel_event(&mut self, event: ChannelEvent, now_ms: u128) {
        match event {
            ChannelEvent::Subscribed { booking_id } if self.is_current(booking_id) => {
                self.state.mark_subscribed();
            }
            ChannelEvent::SubscriptionRejected { booking_id, reason }
                if self.is_current(booking_id) =>
            {
                tracing::warn!(
                    code = SUBSCRIPTION_REJECTED,
                    booking_id,
                    reason,
                    "channel join rejected; history stays visible without live updates"
                );
                self.state.mark_failed();
            }
            ChannelEvent::Message { booking_id, payload } if self.is_current(booking_id) => {
                self.ingest_incoming(booking_id, &payload);
            }
            ChannelEvent::Typing { booking_id, user_id } if self.is_current(booking_id) => {
                let from_peer = self
                    .auth
                    .as_ref()
                    .is_some_and(|auth| auth.user_id != user_id);
                if from_peer {
                    self.typing.signal(now_ms);
                }
            }
            ChannelEvent::ConnectionLost => {
                tracing::warn!(
                    code = CONNECTION_LOST,
                    "realtime connection lost; live updates stop until reopen"
                );
                self.state.mark_disconnected();
                self.typing.clear();
            }
            other => {
                tracing::debug!(
                    code = STALE_EVENT_DISCARDED,
                    event = ?other,
                    "discarding event for a booking that is no longer open"
                );
            }
        }
    }

    fn is_current(&self, booking_id: BookingId) -> bool {
        self.state.booking_id() == Some(booking_id)
    }

    fn issue_mark_read(&mut self, message_id: MessageId) {
        let (auth, booking_id) = match (&self.auth, self.state.booking_id()) {
            (Some(auth), Some(booking_id)) => (auth.clone(), booking_id),
            _ => return,
        };

        // One attempt per id, even if it fails: mark-read is best-effort.
        if !self.marked_read.insert(message_id) {
            return;
        }

        if let Err(error) = self.api.mark_read(&auth.bearer, booking_id, message_id) {
            tracing::warn!(
                code = MARK_READ_FAILED,
                booking_id,
                message_id,
                error = ?error,
                "mark-read call failed; not retrying"
            );
        }
    }

    fn teardown(&mut self) {
        if let Some(previous) = self.state.booking_id() {
            if let Err(error) = self.channel.unsubscribe(previous) {
                tracing::debug!(
                    code = UNSUBSCRIBE_FAILED,
                    booking_id = previous,
                    error = ?error,
                    "unsubscribe on teardown failed"
                );
            }
        }

        self.state.clear();
        self.typing.clear();
        self.marked_read.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use crate::domain::message::UserId;
    use crate::usecases::contracts::ChannelError;

    use super::*;

    const ME: UserId = 7;
    const PEER: UserId = 8;
    const BOOKING: BookingId = 42;

    fn message(id: MessageId, sender_id: UserId, read: bool) -> ChatMessage {
        let created_at = Utc.timestamp_opt(1_760_000_000 + id, 0).unwrap();
        ChatMessage {
            id,
            booking_id: BOOKING,
            sender_id,
            receiver_id: None,
            body: format!("message {id}"),
            created_at,
            read_at: read.then_some(created_at),
        }
    }

    fn payload(id: MessageId, sender_id: UserId) -> Value {
        json!({
            "id": id,
            "booking_id": BOOKING,
            "sender_id": sender_id,
            "message": format!("message {id}"),
            "created_at": 1_760_000_000 + id,
        })
    }

    #[derive(Default)]
    struct StubApi {
        histories: HashMap<BookingId, Vec<ChatMessage>>,
        history_error: Option<ChatApiError>,
        send_result: Option<Result<ChatMessage, ChatApiError>>,
        mark_read_error: Option<ChatApiError>,
        typing_error: Option<ChatApiError>,
        history_calls: RefCell<Vec<BookingId>>,
        mark_read_calls: RefCell<Vec<MessageId>>,
        typing_calls: RefCell<usize>,
        send_calls: RefCell<Vec<String>>,
    }

    impl ChatApi for &StubApi {
        fn fetch_history(
            &self,
            _token: &str,
            booking_id: BookingId,
        ) -> Result<Vec<ChatMessage>, ChatApiError> {
            self.history_calls.borrow_mut().push(booking_id);
            if let Some(error) = &self.history_error {
                return Err(error.clone());
            }
            Ok(self.histories.get(&booking_id).cloned().unwrap_or_default())
        }

        fn send_message(
            &self,
            _token: &str,
            _booking_id: BookingId,
            body: &str,
        ) -> Result<ChatMessage, ChatApiError> {
            self.send_calls.borrow_mut().push(body.to_owned());
            self.send_result
                .clone()
                .expect("send_result must be configured")
        }

        fn mark_read(
            &self,
            _token: &str,
            _booking_id: BookingId,
            message_id: MessageId,
        ) -> Result<(), ChatApiError> {
            self.mark_read_calls.borrow_mut().push(message_id);
            match &self.mark_read_error {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        fn signal_typing(
            &self,
            _token: &str,
            _booking_id: BookingId,
        ) -> Result<(), ChatApiError> {
            *self.typing_calls.borrow_mut() += 1;
            match &self.typing_error {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        fn unread_count(&self, _token: &str, _booking_id: BookingId) -> Result<u64, ChatApiError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct StubChannel {
        subscribe_error: Option<ChannelError>,
        subscribes: RefCell<Vec<BookingId>>,
        unsubscribes: RefCell<Vec<BookingId>>,
        whispers: RefCell<Vec<(BookingId, UserId)>>,
    }

    impl ChatChannel for &StubChannel {
        fn subscribe(&mut self, _token: &str, booking_id: BookingId) -> Result<(), ChannelError> {
            self.subscribes.borrow_mut().push(booking_id);
            match &self.subscribe_error {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        fn unsubscribe(&mut self, booking_id: BookingId) -> Result<(), ChannelError> {
            self.unsubscribes.borrow_mut().push(booking_id);
            Ok(())
        }

        fn whisper_typing(
            &mut self,
            booking_id: BookingId,
            user_id: UserId,
        ) -> Result<(), ChannelError> {
            self.whispers.borrow_mut().push((booking_id, user_id));
            Ok(())
        }
    }

    struct StubTokens {
        token: Option<AuthToken>,
    }

    impl StubTokens {
        fn logged_in() -> Self {
            Self {
                token: Some(AuthToken {
                    bearer: "test-bearer".to_owned(),
                    user_id: ME,
                }),
            }
        }

        fn logged_out() -> Self {
            Self { token: None }
        }
    }

    impl TokenSource for &StubTokens {
        fn read_token(&self) -> Option<AuthToken> {
            self.token.clone()
        }
    }

    fn session<'a>(
        api: &'a StubApi,
        channel: &'a StubChannel,
        tokens: &'a StubTokens,
    ) -> RealtimeChatSession<&'a StubApi, &'a StubChannel, &'a StubTokens> {
        RealtimeChatSession::new(api, channel, tokens)
    }

    #[test]
    fn open_without_token_is_fatal_and_makes_no_network_call() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_out();
        let mut chat = session(&api, &channel, &tokens);

        let result = chat.open(BOOKING);

        assert_eq!(result, Err(OpenSessionError::AuthMissing));
        assert!(api.history_calls.borrow().is_empty());
        assert!(channel.subscribes.borrow().is_empty());
    }

    #[test]
    fn open_loads_history_and_starts_subscription() {
        let mut api = StubApi::default();
        api.histories
            .insert(BOOKING, vec![message(1, PEER, true), message(2, ME, false)]);
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);

        chat.open(BOOKING).expect("open must succeed");

        assert_eq!(chat.booking_id(), Some(BOOKING));
        assert_eq!(chat.messages().len(), 2);
        assert_eq!(chat.subscription(), SubscriptionState::Connecting);
        assert_eq!(*channel.subscribes.borrow(), vec![BOOKING]);
    }

    #[test]
    fn open_marks_only_unread_peer_messages_read() {
        let mut api = StubApi::default();
        api.histories.insert(
            BOOKING,
            vec![
                message(1, PEER, false),
                message(2, PEER, true),
                message(3, ME, false),
                message(4, PEER, false),
            ],
        );
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);

        chat.open(BOOKING).expect("open must succeed");

        assert_eq!(*api.mark_read_calls.borrow(), vec![1, 4]);
    }

    #[test]
    fn open_history_failure_is_recoverable() {
        let mut api = StubApi::default();
        api.history_error = Some(ChatApiError::Unavailable);
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);

        let result = chat.open(BOOKING);

        assert_eq!(
            result,
            Err(OpenSessionError::HistoryFetchFailed(
                ChatApiError::Unavailable
            ))
        );
        // Session stays open with an empty list; no subscription yet.
        assert_eq!(chat.booking_id(), Some(BOOKING));
        assert!(chat.messages().is_empty());
        assert!(channel.subscribes.borrow().is_empty());
    }

    #[test]
    fn subscribe_failure_keeps_history_visible() {
        let mut api = StubApi::default();
        api.histories.insert(BOOKING, vec![message(1, PEER, true)]);
        let channel = StubChannel {
            subscribe_error: Some(ChannelError::NotConnected),
            ..StubChannel::default()
        };
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);

        chat.open(BOOKING).expect("open must not propagate subscribe failure");

        assert_eq!(chat.messages().len(), 1);
        assert_eq!(chat.subscription(), SubscriptionState::Failed);
    }

    #[test]
    fn reopening_unsubscribes_previous_topic_and_swaps_history() {
        let mut api = StubApi::default();
        api.histories.insert(BOOKING, vec![message(1, PEER, true)]);
        let mut other = message(9, PEER, true);
        other.booking_id = 43;
        api.histories.insert(43, vec![other]);
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);

        chat.open(BOOKING).expect("first open must succeed");
        chat.open(43).expect("second open must succeed");

        assert_eq!(*channel.unsubscribes.borrow(), vec![BOOKING]);
        assert_eq!(*channel.subscribes.borrow(), vec![BOOKING, 43]);
        let ids: Vec<MessageId> = chat.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn duplicate_live_event_after_history_is_dropped() {
        let mut api = StubApi::default();
        api.histories
            .insert(BOOKING, vec![message(1, PEER, true), message(2, PEER, true)]);
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        let inserted = chat.ingest_incoming(BOOKING, &payload(2, PEER));

        assert!(!inserted);
        assert_eq!(chat.messages().len(), 2);
    }

    #[test]
    fn live_event_racing_the_send_response_dedupes_by_id() {
        let mut api = StubApi::default();
        api.send_result = Some(Ok(message(101, ME, false)));
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.send("Hello").expect("send must succeed");
        chat.ingest_incoming(BOOKING, &payload(101, ME));

        let ids: Vec<MessageId> = chat.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![101]);
    }

    #[test]
    fn blank_sends_are_no_ops() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        assert_eq!(chat.send(""), Err(SendMessageError::EmptyMessage));
        assert_eq!(chat.send("   "), Err(SendMessageError::EmptyMessage));
        assert!(api.send_calls.borrow().is_empty());
    }

    #[test]
    fn send_requires_an_open_session() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);

        assert_eq!(chat.send("Hello"), Err(SendMessageError::SessionClosed));
    }

    #[test]
    fn failed_send_restores_composer_and_adds_nothing() {
        let mut api = StubApi::default();
        api.send_result = Some(Err(ChatApiError::Unavailable));
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        let result = chat.send("  See you at noon  ");

        assert_eq!(
            result,
            Err(SendMessageError::SendFailed(ChatApiError::Unavailable))
        );
        assert_eq!(chat.draft(), "See you at noon");
        assert!(chat.messages().is_empty());
    }

    #[test]
    fn successful_send_clears_composer() {
        let mut api = StubApi::default();
        api.send_result = Some(Ok(message(101, ME, false)));
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.send("Hello").expect("send must succeed");

        assert_eq!(chat.draft(), "");
        assert!(api.send_calls.borrow().contains(&"Hello".to_owned()));
    }

    #[test]
    fn peer_message_is_marked_read_exactly_once() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.ingest_incoming(BOOKING, &payload(5, PEER));
        chat.ingest_incoming(BOOKING, &payload(5, PEER));
        chat.ingest_incoming(BOOKING, &payload(5, PEER));

        assert_eq!(*api.mark_read_calls.borrow(), vec![5]);
    }

    #[test]
    fn own_messages_are_never_marked_read() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.ingest_incoming(BOOKING, &payload(6, ME));

        assert!(api.mark_read_calls.borrow().is_empty());
    }

    #[test]
    fn already_read_peer_messages_are_not_marked_again() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        let mut read_payload = payload(7, PEER);
        read_payload["is_read"] = json!(true);
        chat.ingest_incoming(BOOKING, &read_payload);

        assert!(api.mark_read_calls.borrow().is_empty());
    }

    #[test]
    fn mark_read_failure_is_swallowed_and_not_retried() {
        let mut api = StubApi::default();
        api.mark_read_error = Some(ChatApiError::Unavailable);
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        assert!(chat.ingest_incoming(BOOKING, &payload(8, PEER)));
        chat.ingest_incoming(BOOKING, &payload(8, PEER));

        assert_eq!(*api.mark_read_calls.borrow(), vec![8]);
    }

    #[test]
    fn malformed_payload_is_discarded() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        let inserted = chat.ingest_incoming(BOOKING, &json!({ "unexpected": true }));

        assert!(!inserted);
        assert!(chat.messages().is_empty());
    }

    #[test]
    fn events_for_other_bookings_are_discarded() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.handle_channel_event(
            ChannelEvent::Message {
                booking_id: 43,
                payload: payload(1, PEER),
            },
            0,
        );
        chat.handle_channel_event(
            ChannelEvent::Typing {
                booking_id: 43,
                user_id: PEER,
            },
            10_000,
        );

        assert!(chat.messages().is_empty());
        assert!(!chat.peer_typing(10_000));
    }

    #[test]
    fn stale_booking_id_inside_payload_is_discarded() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        let mut stale = payload(1, PEER);
        stale["booking_id"] = json!(43);

        assert!(!chat.ingest_incoming(BOOKING, &stale));
        assert!(chat.messages().is_empty());
    }

    #[test]
    fn subscription_ack_moves_state_to_subscribed() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.handle_channel_event(ChannelEvent::Subscribed { booking_id: BOOKING }, 0);

        assert_eq!(chat.subscription(), SubscriptionState::Subscribed);
    }

    #[test]
    fn subscription_rejection_keeps_messages_visible() {
        let mut api = StubApi::default();
        api.histories.insert(BOOKING, vec![message(1, PEER, true)]);
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.handle_channel_event(
            ChannelEvent::SubscriptionRejected {
                booking_id: BOOKING,
                reason: "forbidden".to_owned(),
            },
            0,
        );

        assert_eq!(chat.subscription(), SubscriptionState::Failed);
        assert_eq!(chat.messages().len(), 1);
    }

    #[test]
    fn connection_loss_disconnects_and_clears_typing() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");
        chat.handle_channel_event(ChannelEvent::Subscribed { booking_id: BOOKING }, 0);
        chat.handle_channel_event(
            ChannelEvent::Typing {
                booking_id: BOOKING,
                user_id: PEER,
            },
            10_000,
        );

        chat.handle_channel_event(ChannelEvent::ConnectionLost, 10_500);

        assert_eq!(chat.subscription(), SubscriptionState::Disconnected);
        assert!(!chat.peer_typing(10_500));
    }

    #[test]
    fn peer_typing_expires_and_rearms() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.handle_channel_event(
            ChannelEvent::Typing {
                booking_id: BOOKING,
                user_id: PEER,
            },
            10_000,
        );
        assert!(chat.peer_typing(12_999));
        assert!(!chat.peer_typing(13_000));

        chat.handle_channel_event(
            ChannelEvent::Typing {
                booking_id: BOOKING,
                user_id: PEER,
            },
            12_000,
        );
        assert!(chat.peer_typing(14_999));
    }

    #[test]
    fn own_typing_whisper_does_not_arm_the_indicator() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.handle_channel_event(
            ChannelEvent::Typing {
                booking_id: BOOKING,
                user_id: ME,
            },
            10_000,
        );

        assert!(!chat.peer_typing(10_000));
    }

    #[test]
    fn signal_typing_whispers_and_informs_api() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.signal_typing();

        assert_eq!(*channel.whispers.borrow(), vec![(BOOKING, ME)]);
        assert_eq!(*api.typing_calls.borrow(), 1);
    }

    #[test]
    fn signal_typing_on_closed_session_is_a_no_op() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);

        chat.signal_typing();

        assert!(channel.whispers.borrow().is_empty());
        assert_eq!(*api.typing_calls.borrow(), 0);
    }

    #[test]
    fn close_unsubscribes_and_is_idempotent() {
        let mut api = StubApi::default();
        api.histories.insert(BOOKING, vec![message(1, PEER, true)]);
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        chat.close();
        chat.close();

        assert_eq!(chat.booking_id(), None);
        assert!(chat.messages().is_empty());
        assert_eq!(chat.subscription(), SubscriptionState::Disconnected);
        assert_eq!(*channel.unsubscribes.borrow(), vec![BOOKING]);
    }

    #[test]
    fn token_is_reread_on_each_open() {
        let api = StubApi::default();
        let channel = StubChannel::default();
        let tokens = StubTokens::logged_in();
        let mut chat = session(&api, &channel, &tokens);
        chat.open(BOOKING).expect("open must succeed");

        // Logout elsewhere: the next open must fail fast.
        let logged_out = StubTokens::logged_out();
        let mut chat = session(&api, &channel, &logged_out);
        assert_eq!(chat.open(BOOKING), Err(OpenSessionError::AuthMissing));
    }
}
