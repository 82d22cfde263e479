//! Plain-text rendering of the conversation transcript.
//!
//! Inserts a date separator whenever the day changes and prefixes each
//! message with its time and sender. Times are rendered in UTC, matching
//! the server clock the timestamps come from.

use chrono::NaiveDate;

use crate::domain::message::{ChatMessage, UserId};

pub const TYPING_NOTICE: &str = "~ the other participant is typing...";

pub fn transcript_lines(messages: &[ChatMessage], me: UserId) -> Vec<String> {
    let mut lines = Vec::new();
    let mut prev_date: Option<NaiveDate> = None;

    for message in messages {
        let date = message.created_at.date_naive();
        if prev_date != Some(date) {
            lines.push(date_separator(date));
            prev_date = Some(date);
        }

        lines.push(message_line(message, me));
    }

    lines
}

pub fn message_line(message: &ChatMessage, me: UserId) -> String {
    format!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M"),
        sender_label(message, me),
        message.body
    )
}

fn sender_label(message: &ChatMessage, me: UserId) -> String {
    if message.is_from(me) {
        "you".to_owned()
    } else {
        format!("user {}", message.sender_id)
    }
}

fn date_separator(date: NaiveDate) -> String {
    format!("--- {} ---", date.format("%-d %b %Y"))
}
