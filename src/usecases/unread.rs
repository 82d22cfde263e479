//! Use case for querying a booking's unread message count.

use crate::domain::message::BookingId;

use super::contracts::{ChatApi, ChatApiError, TokenSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnreadCountError {
    /// No persisted token; no network call is attempted.
    AuthMissing,
    Unauthorized,
    BookingNotFound,
    TemporarilyUnavailable,
    DataContractViolation,
}

pub fn fetch_unread_count(
    api: &dyn ChatApi,
    tokens: &dyn TokenSource,
    booking_id: BookingId,
) -> Result<u64, UnreadCountError> {
    let auth = tokens.read_token().ok_or(UnreadCountError::AuthMissing)?;

    api.unread_count(&auth.bearer, booking_id)
        .map_err(map_source_error)
}

fn map_source_error(error: ChatApiError) -> UnreadCountError {
    match error {
        ChatApiError::Unauthorized => UnreadCountError::Unauthorized,
        ChatApiError::BookingNotFound => UnreadCountError::BookingNotFound,
        ChatApiError::Unavailable => UnreadCountError::TemporarilyUnavailable,
        ChatApiError::InvalidData => UnreadCountError::DataContractViolation,
    }
}
