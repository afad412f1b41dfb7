// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp provider endpoints: instance lifecycle, chats, sending.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::warn;
use wagate_core::{ChatKind, WagateError};
use wagate_evolution::{EnsureOutcome, MediaKind};
use wagate_storage::models::Chat;
use wagate_storage::queries;

use crate::api::ApiError;
use crate::state::AppState;
use crate::sync::{StartOutcome, SyncProgress};

#[derive(Debug, Serialize)]
pub struct WaStatusResponse {
    pub instance_name: String,
    pub evolution_status: String,
    pub evolution_connected: bool,
}

/// GET /api/wa/status
///
/// An unreachable provider reads as disconnected rather than an error;
/// this endpoint backs the UI's connection badge.
pub async fn get_status(State(state): State<AppState>) -> Json<WaStatusResponse> {
    let instance = state.instance().to_string();
    match state.evolution.connection_status(&instance).await {
        Ok(status) => Json(WaStatusResponse {
            instance_name: instance,
            evolution_status: status.state.as_str().to_string(),
            evolution_connected: status.state == wagate_core::ConnectionState::Connected,
        }),
        Err(e) => {
            warn!(error = %e, "provider status unavailable");
            Json(WaStatusResponse {
                instance_name: instance,
                evolution_status: "disconnected".to_string(),
                evolution_connected: false,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnsureInstanceRequest {
    /// Instance to ensure; defaults to the configured one.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnsureInstanceResponse {
    pub instance_name: String,
    pub status: &'static str,
}

/// POST /api/wa/instances
pub async fn post_instances(
    State(state): State<AppState>,
    Json(body): Json<EnsureInstanceRequest>,
) -> Result<Json<EnsureInstanceResponse>, ApiError> {
    let name = body.name.unwrap_or_else(|| state.instance().to_string());
    let outcome = state.evolution.ensure_instance(&name).await?;
    Ok(Json(EnsureInstanceResponse {
        instance_name: name,
        status: match outcome {
            EnsureOutcome::Created => "created",
            EnsureOutcome::AlreadyExists => "exists",
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub qr: String,
    pub qr_type: wagate_evolution::QrKind,
    pub expires_in: u64,
}

/// POST /api/wa/instances/{name}/connect
pub async fn post_connect(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let qr = state.evolution.request_qr(&name).await?;
    Ok(Json(ConnectResponse {
        qr: qr.payload,
        qr_type: qr.kind,
        expires_in: qr.ttl_seconds,
    }))
}

#[derive(Debug, Serialize)]
pub struct InstanceStatusResponse {
    pub state: String,
    pub phone: Option<String>,
}

/// GET /api/wa/instances/{name}/status
pub async fn get_instance_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<InstanceStatusResponse>, ApiError> {
    let status = state.evolution.connection_status(&name).await?;
    Ok(Json(InstanceStatusResponse {
        state: status.state.as_str().to_string(),
        phone: status.phone,
    }))
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub status: &'static str,
}

/// POST /api/wa/instances/{name}/disconnect
pub async fn post_disconnect(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    state.evolution.disconnect(&name).await?;
    Ok(Json(DisconnectResponse {
        status: "disconnected",
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatListQuery {
    /// `group` or `direct`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<Chat>,
    pub total: usize,
}

/// GET /api/wa/chats?type=&enabled=
pub async fn get_chats(
    State(state): State<AppState>,
    Query(query): Query<ChatListQuery>,
) -> Result<Json<ChatListResponse>, ApiError> {
    let kind = match query.kind.as_deref() {
        None | Some("") => None,
        Some("group") => Some(ChatKind::Group),
        Some("direct") => Some(ChatKind::Direct),
        Some(other) => {
            return Err(WagateError::Validation(format!(
                "unknown chat type `{other}` (expected group or direct)"
            ))
            .into());
        }
    };
    let chats = queries::chats::list_chats(&state.db, kind, query.enabled).await?;
    Ok(Json(ChatListResponse {
        total: chats.len(),
        chats,
    }))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub status: &'static str,
}

/// POST /api/wa/chats/refresh
///
/// Returns immediately; progress is exposed on the status endpoint.
pub async fn post_chats_refresh(State(state): State<AppState>) -> Json<RefreshResponse> {
    Json(RefreshResponse {
        status: match state.sync.start() {
            StartOutcome::Started => "started",
            StartOutcome::AlreadyRunning => "already_running",
        },
    })
}

/// GET /api/wa/chats/refresh/status
pub async fn get_refresh_status(State(state): State<AppState>) -> Json<SyncProgress> {
    Json(state.sync.progress())
}

#[derive(Debug, Deserialize)]
pub struct PatchChatRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct PatchChatResponse {
    pub id: String,
    pub enabled: bool,
}

/// PATCH /api/wa/chats/{id}
pub async fn patch_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchChatRequest>,
) -> Result<Json<PatchChatResponse>, ApiError> {
    let found = queries::chats::set_chat_enabled(&state.db, &id, body.enabled).await?;
    if !found {
        return Err(WagateError::NotFound(format!("chat `{id}`")).into());
    }
    Ok(Json(PatchChatResponse {
        id,
        enabled: body.enabled,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub message_id: String,
}

/// POST /api/wa/send
pub async fn post_send(
    State(state): State<AppState>,
    Json(body): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let instance = state.instance().to_string();
    let message_id = state.evolution.send_text(&instance, &body.to, &body.text).await?;
    Ok(Json(SendResponse { message_id }))
}

#[derive(Debug, Deserialize)]
pub struct SendMediaRequest {
    pub to: String,
    pub media_url: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// POST /api/wa/send-media
pub async fn post_send_media(
    State(state): State<AppState>,
    Json(body): Json<SendMediaRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let instance = state.instance().to_string();
    let kind = MediaKind::parse(body.media_type.as_deref().unwrap_or("image"));
    let message_id = state
        .evolution
        .send_media(&instance, &body.to, &body.media_url, kind, body.caption.as_deref())
        .await?;
    Ok(Json(SendResponse { message_id }))
}
