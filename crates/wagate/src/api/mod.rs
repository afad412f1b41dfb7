// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Management API surface built on axum.
//!
//! Routes are grouped by concern; all handlers share [`AppState`] and map
//! errors through [`ApiError`].

pub mod ha;
pub mod health;
pub mod logs;
pub mod notify;
pub mod rules;
pub mod wa;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use wagate_core::WagateError;

use crate::state::AppState;
use crate::webhook;

/// Build the full management + webhook router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::get_health))
        // WhatsApp provider surface.
        .route("/api/wa/status", get(wa::get_status))
        .route("/api/wa/instances", post(wa::post_instances))
        .route("/api/wa/instances/{name}/connect", post(wa::post_connect))
        .route("/api/wa/instances/{name}/status", get(wa::get_instance_status))
        .route("/api/wa/instances/{name}/disconnect", post(wa::post_disconnect))
        .route("/api/wa/chats", get(wa::get_chats))
        .route("/api/wa/chats/refresh", post(wa::post_chats_refresh))
        .route("/api/wa/chats/refresh/status", get(wa::get_refresh_status))
        .route("/api/wa/chats/{id}", patch(wa::patch_chat))
        .route("/api/wa/send", post(wa::post_send))
        .route("/api/wa/send-media", post(wa::post_send_media))
        // Home Assistant surface.
        .route("/api/ha/status", get(ha::get_status))
        .route("/api/ha/scripts", get(ha::get_scripts))
        .route("/api/ha/automations", get(ha::get_automations))
        .route("/api/ha/entities", get(ha::get_entities))
        .route("/api/ha/services/{domain}", get(ha::get_service_details))
        .route("/api/ha/allowed-services", get(ha::get_allowed_services))
        .route("/api/ha/call-service", post(ha::post_call_service))
        // Rule set.
        .route("/api/rules", get(rules::get_rules).put(rules::put_rules))
        .route("/api/rules/validate", post(rules::post_validate))
        .route("/api/rules/test", post(rules::post_test))
        .route("/api/rules/reload", post(rules::post_reload))
        // Logs.
        .route("/api/logs/messages", get(logs::get_messages))
        .route("/api/logs/rules", get(logs::get_rule_fires))
        .route("/api/logs/events", get(logs::get_events))
        // Orchestrator-facing send.
        .route("/api/notify/send", post(notify::post_send))
        // Inbound provider events.
        .route("/webhook/evolution", post(webhook::post_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error body returned by every failing handler.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Wrapper mapping [`WagateError`] onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(pub WagateError);

impl From<WagateError> for ApiError {
    fn from(e: WagateError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WagateError::Validation(_) | WagateError::Config(_) => StatusCode::BAD_REQUEST,
            WagateError::PolicyRefused { .. } => StatusCode::FORBIDDEN,
            WagateError::NotFound(_) => StatusCode::NOT_FOUND,
            WagateError::Provider { .. } | WagateError::Orchestrator { .. } => {
                StatusCode::BAD_GATEWAY
            }
            WagateError::Storage { .. } | WagateError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
