// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestrator-facing send endpoint.
//!
//! Home Assistant's notify platform posts here; targets may be bare
//! phone numbers, and an optional title becomes a bold prefix line.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use wagate_evolution::MediaKind;

use crate::api::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub message: String,
    pub target: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub data: NotifyData,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotifyData {
    /// Image URL to send after the text.
    #[serde(default)]
    pub image: Option<String>,
    /// Document URL to send after the text.
    #[serde(default)]
    pub document: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub status: &'static str,
    pub message_id: String,
}

/// Normalise a notify target into a JID: anything without `@` has its
/// non-digits stripped and the direct-chat suffix appended.
fn normalize_target(target: &str) -> String {
    if target.contains('@') {
        target.to_string()
    } else {
        let digits: String = target.chars().filter(char::is_ascii_digit).collect();
        format!("{digits}@s.whatsapp.net")
    }
}

/// POST /api/notify/send
pub async fn post_send(
    State(state): State<AppState>,
    Json(body): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>, ApiError> {
    let to = normalize_target(&body.target);
    let text = match body.title {
        Some(ref title) if !title.is_empty() => format!("*{title}*\n\n{}", body.message),
        _ => body.message.clone(),
    };

    let instance = state.instance().to_string();
    let message_id = state.evolution.send_text(&instance, &to, &text).await?;

    // Attachments follow the text message.
    if let Some(ref image) = body.data.image {
        state
            .evolution
            .send_media(&instance, &to, image, MediaKind::Image, None)
            .await?;
    }
    if let Some(ref document) = body.data.document {
        state
            .evolution
            .send_media(&instance, &to, document, MediaKind::Document, None)
            .await?;
    }

    Ok(Json(NotifyResponse {
        status: "sent",
        message_id,
    }))
}
