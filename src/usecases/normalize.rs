//! Normalization of heterogeneous wire payloads into domain messages.
//!
//! The broadcast channel and the write API do not agree on field names,
//! so every field is resolved through a fixed, ordered fallback chain.
//! Keeping the chains here, as pure functions, contains the ambiguity in
//! one testable place instead of scattering duck-typed lookups around.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::domain::message::{BookingId, ChatMessage};

const ID_KEYS: &[&str] = &["id", "message_id", "data.id"];
const BOOKING_KEYS: &[&str] = &["booking_id", "bookingId", "data.booking_id"];
const SENDER_KEYS: &[&str] = &["sender_id", "senderId", "from_id", "user_id"];
const RECEIVER_KEYS: &[&str] = &["receiver_id", "receiverId", "to_id"];
const BODY_KEYS: &[&str] = &["message", "body", "text"];
const CREATED_KEYS: &[&str] = &["created_at", "createdAt", "timestamp"];
const READ_KEYS: &[&str] = &["readAt", "read_at", "data.read_at"];

/// Server timestamps arrive either as RFC 3339 or in this legacy format.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maps one message payload to a `ChatMessage`.
///
/// `fallback_booking_id` covers broadcast payloads that omit the booking
/// id because the topic already scopes them. Payloads missing an id,
/// sender, body, or timestamp are rejected as malformed.
pub fn normalize_message(payload: &Value, fallback_booking_id: BookingId) -> Option<ChatMessage> {
    let id = lookup(payload, ID_KEYS).and_then(as_i64)?;
    let sender_id = lookup(payload, SENDER_KEYS).and_then(as_i64)?;
    let body = lookup(payload, BODY_KEYS).and_then(Value::as_str)?.to_owned();
    let created_at = lookup(payload, CREATED_KEYS).and_then(as_timestamp)?;

    Some(ChatMessage {
        id,
        booking_id: lookup(payload, BOOKING_KEYS)
            .and_then(as_i64)
            .unwrap_or(fallback_booking_id),
        sender_id,
        receiver_id: lookup(payload, RECEIVER_KEYS).and_then(as_i64),
        body,
        created_at,
        read_at: resolve_read_at(payload, created_at),
    })
}

/// Unwraps a message-history response body.
///
/// Tolerated envelopes: `{data:{data:[...]}}`, `{data:{messages:[...]}}`,
/// `{messages:[...]}`. Malformed entries are skipped.
pub fn history_messages(body: &Value, booking_id: BookingId) -> Option<Vec<ChatMessage>> {
    let entries = lookup(body, &["data.data", "data.messages", "messages"])?.as_array()?;

    Some(
        entries
            .iter()
            .filter_map(|entry| normalize_message(entry, booking_id))
            .collect(),
    )
}

/// Unwraps a send-message response body (`{data: message}` or
/// `{message: message}`).
pub fn sent_message(body: &Value, booking_id: BookingId) -> Option<ChatMessage> {
    lookup(body, &["data", "message"])
        .filter(|entry| entry.is_object())
        .and_then(|entry| normalize_message(entry, booking_id))
}

/// Unwraps an unread-count response body (`{data:{unread_count}}`,
/// `{data: number}`, or `{unread_count}`).
pub fn unread_count(body: &Value) -> Option<u64> {
    lookup(body, &["data.unread_count", "data", "unread_count"]).and_then(Value::as_u64)
}

/// Resolves the read receipt: direct `readAt`, then nested `data.read_at`,
/// then the boolean `is_read` flag, which maps to `created_at` when true.
fn resolve_read_at(payload: &Value, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(value) = lookup(payload, READ_KEYS) {
        return as_timestamp(value);
    }

    match lookup(payload, &["is_read"]).and_then(Value::as_bool) {
        Some(true) => Some(created_at),
        _ => None,
    }
}

/// Returns the first non-null value reachable through any of `paths`.
/// A dot in a path descends into nested objects.
fn lookup<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    for path in paths {
        let mut current = value;
        let mut found = true;

        for segment in path.split('.') {
            match current.get(segment) {
                Some(next) => current = next,
                None => {
                    found = false;
                    break;
                }
            }
        }

        if found && !current.is_null() {
            return Some(current);
        }
    }

    None
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, LEGACY_TIMESTAMP_FORMAT)
                    .map(|naive| naive.and_utc())
                    .ok()
            }),
        Value::Number(number) => {
            let raw = number.as_i64()?;
            // Heuristic: values this large can only be milliseconds.
            if raw >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}
