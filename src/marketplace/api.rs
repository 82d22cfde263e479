//! HTTP adapter for the marketplace booking-chat endpoints.
//!
//! Bridges the async `reqwest` client into the synchronous session core by
//! blocking on a shared runtime handle. Response envelopes vary between
//! backend versions, so bodies go through the tolerant unwrappers in
//! `usecases::normalize`.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::runtime::Handle;

use crate::{
    domain::message::{BookingId, ChatMessage, MessageId},
    infra::{config::ApiConfig, error::AppError},
    usecases::{
        contracts::{ChatApi, ChatApiError},
        normalize,
    },
};

const API_REQUEST_FAILED: &str = "MARKETPLACE_API_REQUEST_FAILED";
const API_BODY_REJECTED: &str = "MARKETPLACE_API_BODY_REJECTED";

pub struct HttpChatApi {
    handle: Handle,
    http: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(handle: Handle, config: &ApiConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(AppError::HttpClientInit)?;

        Ok(Self {
            handle,
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn get_json(&self, token: &str, url: String) -> Result<Value, ChatApiError> {
        self.handle.block_on(async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|error| map_transport_error(&url, &error))?;

            parse_body(response).await
        })
    }

    fn post_json(&self, token: &str, url: String, body: Value) -> Result<Value, ChatApiError> {
        self.handle.block_on(async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .map_err(|error| map_transport_error(&url, &error))?;

            parse_body(response).await
        })
    }
}

impl ChatApi for HttpChatApi {
    fn fetch_history(
        &self,
        token: &str,
        booking_id: BookingId,
    ) -> Result<Vec<ChatMessage>, ChatApiError> {
        let body = self.get_json(token, chat_url(&self.base_url, booking_id, ""))?;

        normalize::history_messages(&body, booking_id).ok_or_else(|| {
            tracing::warn!(
                code = API_BODY_REJECTED,
                booking_id,
                "history response matched no tolerated envelope"
            );
            ChatApiError::InvalidData
        })
    }

    fn send_message(
        &self,
        token: &str,
        booking_id: BookingId,
        body: &str,
    ) -> Result<ChatMessage, ChatApiError> {
        let response = self.post_json(
            token,
            chat_url(&self.base_url, booking_id, ""),
            json!({ "booking_id": booking_id, "message": body }),
        )?;

        normalize::sent_message(&response, booking_id).ok_or_else(|| {
            tracing::warn!(
                code = API_BODY_REJECTED,
                booking_id,
                "send response matched no tolerated envelope"
            );
            ChatApiError::InvalidData
        })
    }

    fn mark_read(
        &self,
        token: &str,
        booking_id: BookingId,
        message_id: MessageId,
    ) -> Result<(), ChatApiError> {
        self.post_json(
            token,
            chat_url(&self.base_url, booking_id, "/mark-read"),
            json!({ "message_id": message_id }),
        )
        .map(|_| ())
    }

    fn signal_typing(&self, token: &str, booking_id: BookingId) -> Result<(), ChatApiError> {
        self.post_json(
            token,
            chat_url(&self.base_url, booking_id, "/typing"),
            json!({}),
        )
        .map(|_| ())
    }

    fn unread_count(&self, token: &str, booking_id: BookingId) -> Result<u64, ChatApiError> {
        let body = self.get_json(token, chat_url(&self.base_url, booking_id, "/unread-count"))?;

        normalize::unread_count(&body).ok_or(ChatApiError::InvalidData)
    }
}

fn chat_url(base_url: &str, booking_id: BookingId, suffix: &str) -> String {
    format!("{base_url}/bookings/{booking_id}/chat{suffix}")
}

async fn parse_body(response: reqwest::Response) -> Result<Value, ChatApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(map_status(status));
    }

    // mark-read and typing have no required response body.
    let bytes = response.bytes().await.map_err(|_| ChatApiError::Unavailable)?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&bytes).map_err(|_| ChatApiError::InvalidData)
}

fn map_status(status: StatusCode) -> ChatApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChatApiError::Unauthorized,
        StatusCode::NOT_FOUND => ChatApiError::BookingNotFound,
        _ => ChatApiError::Unavailable,
    }
}

fn map_transport_error(url: &str, error: &reqwest::Error) -> ChatApiError {
    tracing::warn!(
        code = API_REQUEST_FAILED,
        url,
        error = %error,
        "marketplace API request failed"
    );
    ChatApiError::Unavailable
}
