// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Paged log endpoints: messages, rule fires, webhook events.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use wagate_storage::models::{EventLogEntry, Page, RuleFire, StoredMessage};
use wagate_storage::queries;

use crate::api::ApiError;
use crate::state::AppState;

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// GET /api/logs/messages?page=&limit=&chat_id=
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Page<StoredMessage>>, ApiError> {
    let page =
        queries::messages::list_messages(&state.db, query.page, query.limit, query.chat_id).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct RuleFiresQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub rule_id: Option<String>,
}

/// GET /api/logs/rules?page=&limit=&rule_id=
pub async fn get_rule_fires(
    State(state): State<AppState>,
    Query(query): Query<RuleFiresQuery>,
) -> Result<Json<Page<RuleFire>>, ApiError> {
    let page =
        queries::rule_fires::list_rule_fires(&state.db, query.page, query.limit, query.rule_id)
            .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub event_type: Option<String>,
}

/// GET /api/logs/events?page=&limit=&event_type=
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Page<EventLogEntry>>, ApiError> {
    let event_type = query
        .event_type
        .filter(|t| !t.is_empty())
        .map(|t| wagate_core::normalize_event_type(&t));
    let page = queries::events::list_events(&state.db, query.page, query.limit, event_type).await?;
    Ok(Json(page))
}
