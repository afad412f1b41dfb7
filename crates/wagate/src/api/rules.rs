// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule set endpoints: fetch, save, validate, test, reload.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::info;
use wagate_core::{ChatKind, EvaluatedRule, NormalizedEvent};
use wagate_rules::validate::{ValidationReport, validate_yaml};
use wagate_storage::queries;

use crate::api::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub yaml: String,
    pub version: i64,
    pub updated_at: Option<String>,
}

/// GET /api/rules
pub async fn get_rules(State(state): State<AppState>) -> Result<Json<RulesResponse>, ApiError> {
    let row = queries::ruleset::get_ruleset(&state.db).await?;
    Ok(Json(match row {
        Some(row) => RulesResponse {
            yaml: row.yaml,
            version: row.version,
            updated_at: Some(row.updated_at),
        },
        None => RulesResponse {
            yaml: String::new(),
            version: 0,
            updated_at: None,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct SaveRulesRequest {
    pub yaml: String,
}

#[derive(Debug, Serialize)]
pub struct SaveRulesResponse {
    pub status: &'static str,
    pub version: i64,
    pub rule_count: usize,
}

/// PUT /api/rules
///
/// Invalid documents are rejected with 400 and the full validation
/// report; nothing is persisted and the engine cache is untouched.
pub async fn put_rules(
    State(state): State<AppState>,
    Json(body): Json<SaveRulesRequest>,
) -> Result<Response, ApiError> {
    let report = validate_yaml(&body.yaml);
    if !report.valid {
        return Ok((StatusCode::BAD_REQUEST, Json(report)).into_response());
    }

    let version = queries::ruleset::put_ruleset(&state.db, &body.yaml).await?;
    let rule_count = state.engine.install_yaml(&body.yaml)?;
    info!(version, rules = rule_count, "rule set saved");

    Ok(Json(SaveRulesResponse {
        status: "saved",
        version,
        rule_count,
    })
    .into_response())
}

/// POST /api/rules/validate
pub async fn post_validate(Json(body): Json<SaveRulesRequest>) -> Json<ValidationReport> {
    Json(validate_yaml(&body.yaml))
}

#[derive(Debug, Deserialize)]
pub struct TestRulesRequest {
    pub message: TestMessage,
}

/// A synthetic message for dry-run evaluation.
#[derive(Debug, Deserialize)]
pub struct TestMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_test_chat")]
    pub chat_id: String,
    #[serde(default = "default_test_sender")]
    pub sender_id: String,
    #[serde(default = "default_test_event")]
    pub event_type: String,
}

fn default_test_chat() -> String {
    "49170000000@s.whatsapp.net".to_string()
}

fn default_test_sender() -> String {
    "49170000000@s.whatsapp.net".to_string()
}

fn default_test_event() -> String {
    "MESSAGES_UPSERT".to_string()
}

#[derive(Debug, Serialize)]
pub struct TestRulesResponse {
    pub matched_rules: Vec<EvaluatedRule>,
    pub actions_preview: Vec<String>,
}

/// POST /api/rules/test
///
/// Dry run: no actions execute, no cooldowns are read or written, and no
/// store rows are created.
pub async fn post_test(
    State(state): State<AppState>,
    Json(body): Json<TestRulesRequest>,
) -> Json<TestRulesResponse> {
    let msg = body.message;
    let event = NormalizedEvent {
        event_type: wagate_core::normalize_event_type(&msg.event_type),
        chat_kind: ChatKind::from_chat_id(&msg.chat_id),
        chat_id: msg.chat_id,
        sender_id: msg.sender_id,
        sender_name: None,
        text: msg.text,
        provider_message_id: None,
    };
    let (matched_rules, actions_preview) = state.engine.test_message(&event);
    Json(TestRulesResponse {
        matched_rules,
        actions_preview,
    })
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: &'static str,
    pub rule_count: usize,
}

/// POST /api/rules/reload
pub async fn post_reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let rule_count = state.engine.load_from_store().await?;
    Ok(Json(ReloadResponse {
        status: "reloaded",
        rule_count,
    }))
}
