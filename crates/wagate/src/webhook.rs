// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound provider event ingestion.
//!
//! Normalises the event kind, writes an event-log row for every
//! invocation, extracts and persists message content for text events,
//! deduplicates, and hands a normalised event to the rule engine. The
//! handler always answers 200 so the upstream never retries an event the
//! gateway already recorded.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use wagate_core::{ChatKind, EVENT_MESSAGES_UPSERT, NormalizedEvent, normalize_event_type, truncate_chars};
use wagate_storage::models::{InsertOutcome, NewEvent, NewMessage};
use wagate_storage::queries;

use crate::state::AppState;

/// Provider event envelope. The `data` payload varies by kind and is kept
/// loose.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub data: Value,
}

/// POST /webhook/evolution
///
/// Errors are logged, never propagated: the response is 200 regardless of
/// downstream outcome.
pub async fn post_webhook(
    State(state): State<AppState>,
    Json(envelope): Json<WebhookEnvelope>,
) -> StatusCode {
    if let Err(e) = ingest(&state, envelope).await {
        warn!(error = %e, "webhook ingestion failed");
    }
    StatusCode::OK
}

async fn ingest(state: &AppState, envelope: WebhookEnvelope) -> Result<(), wagate_core::WagateError> {
    let event_type = normalize_event_type(&envelope.event);
    let data = &envelope.data;

    let chat_id = extract_chat_id(data);
    let sender_id = extract_sender_id(data);
    let text = extract_text(data);
    let from_me = data
        .pointer("/key/fromMe")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    // One event-log row per invocation, message or not, self-sent or not.
    queries::events::insert_event(
        &state.db,
        NewEvent {
            event_type: event_type.clone(),
            instance: envelope.instance.clone(),
            chat_id: chat_id.clone(),
            sender_id: sender_id.clone(),
            summary: summarize(&event_type, data, &text, from_me),
            raw: serde_json::to_string(data).ok(),
        },
    )
    .await?;

    if event_type == EVENT_MESSAGES_UPSERT {
        ingest_message(state, &envelope, chat_id, sender_id, text, from_me).await
    } else {
        // Non-message kinds still reach the engine so rules subscribing
        // to them can fire. Many carry no chat; the scope fields stay
        // empty then.
        let chat_id = chat_id.unwrap_or_default();
        let event = NormalizedEvent {
            event_type,
            chat_kind: ChatKind::from_chat_id(&chat_id),
            chat_id,
            sender_id: sender_id.unwrap_or_default(),
            sender_name: None,
            text: String::new(),
            provider_message_id: None,
        };
        state.engine.handle_event(&event, None).await?;
        Ok(())
    }
}

async fn ingest_message(
    state: &AppState,
    envelope: &WebhookEnvelope,
    chat_id: Option<String>,
    sender_id: Option<String>,
    text: Option<String>,
    from_me: bool,
) -> Result<(), wagate_core::WagateError> {
    if from_me {
        debug!("self-sent message, skipped");
        return Ok(());
    }
    let Some(chat_id) = chat_id else {
        debug!("message event without chat id, skipped");
        return Ok(());
    };
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        debug!(chat_id = chat_id.as_str(), "message without extractable text, skipped");
        return Ok(());
    };

    let data = &envelope.data;
    let provider_message_id = data
        .pointer("/key/id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let sender_id = sender_id.unwrap_or_else(|| chat_id.clone());
    let sender_name = data
        .get("pushName")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    let chat_kind = ChatKind::from_chat_id(&chat_id);

    let outcome = queries::messages::insert_message(
        &state.db,
        NewMessage {
            provider_message_id: provider_message_id.clone(),
            chat_id: chat_id.clone(),
            sender_id: sender_id.clone(),
            sender_name: sender_name.clone(),
            text: text.clone(),
            message_type: message_kind(data).to_string(),
            raw: serde_json::to_string(data).ok(),
        },
    )
    .await?;
    let message_row_id = match outcome {
        InsertOutcome::Inserted(id) => id,
        InsertOutcome::Duplicate => {
            debug!(
                provider_message_id = provider_message_id.as_deref().unwrap_or(""),
                "duplicate message, skipped"
            );
            return Ok(());
        }
    };

    // On first sight of a direct chat the push name is the chat's name;
    // in groups it names the sender, so the id stands in.
    let name_hint = match chat_kind {
        ChatKind::Direct => sender_name.as_deref(),
        ChatKind::Group => None,
    };
    queries::chats::record_chat_activity(&state.db, &chat_id, name_hint).await?;

    let event = NormalizedEvent {
        event_type: EVENT_MESSAGES_UPSERT.to_string(),
        chat_id,
        chat_kind,
        sender_id,
        sender_name,
        text,
        provider_message_id,
    };
    state.engine.handle_event(&event, Some(&message_row_id)).await?;
    queries::messages::mark_message_processed(&state.db, &message_row_id).await?;
    Ok(())
}

/// Chat id from the message key.
fn extract_chat_id(data: &Value) -> Option<String> {
    data.pointer("/key/remoteJid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Sender id: the participant in groups, the chat itself in direct
/// conversations.
fn extract_sender_id(data: &Value) -> Option<String> {
    data.pointer("/key/participant")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| extract_chat_id(data))
}

/// Message text, from the first present of: conversation, extended text,
/// image caption, video caption.
fn extract_text(data: &Value) -> Option<String> {
    const PATHS: &[&str] = &[
        "/message/conversation",
        "/message/extendedTextMessage/text",
        "/message/imageMessage/caption",
        "/message/videoMessage/caption",
    ];
    PATHS
        .iter()
        .find_map(|path| data.pointer(path).and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Provider message kind for the stored row.
fn message_kind(data: &Value) -> &'static str {
    let message = data.get("message");
    let has = |key: &str| message.and_then(|m| m.get(key)).is_some();
    if has("imageMessage") {
        "image"
    } else if has("videoMessage") {
        "video"
    } else if has("audioMessage") {
        "audio"
    } else if has("documentMessage") {
        "document"
    } else {
        "text"
    }
}

/// Short per-kind summary for the event log.
fn summarize(event_type: &str, data: &Value, text: &Option<String>, from_me: bool) -> String {
    match event_type {
        EVENT_MESSAGES_UPSERT => {
            let body = text.as_deref().unwrap_or("<no text>");
            let head = truncate_chars(body, 120);
            if from_me {
                format!("[sent] {head}")
            } else {
                head
            }
        }
        "CONNECTION_UPDATE" => {
            let conn_state = data
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            format!("connection: {conn_state}")
        }
        "QRCODE_UPDATED" => "qr code updated".to_string(),
        other => other.to_ascii_lowercase().replace('_', " "),
    }
}
