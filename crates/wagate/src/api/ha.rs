// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Home Assistant endpoints, including the allow-list-guarded service
//! call.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use wagate_hass::{EntitySummary, HassStatus};

use crate::api::ApiError;
use crate::state::AppState;

/// GET /api/ha/status
pub async fn get_status(State(state): State<AppState>) -> Json<HassStatus> {
    Json(state.hass.status().await)
}

#[derive(Debug, Serialize)]
pub struct EntityListResponse {
    pub entities: Vec<EntitySummary>,
}

/// GET /api/ha/scripts
pub async fn get_scripts(
    State(state): State<AppState>,
) -> Result<Json<EntityListResponse>, ApiError> {
    Ok(Json(EntityListResponse {
        entities: state.hass.list_scripts().await?,
    }))
}

/// GET /api/ha/automations
pub async fn get_automations(
    State(state): State<AppState>,
) -> Result<Json<EntityListResponse>, ApiError> {
    Ok(Json(EntityListResponse {
        entities: state.hass.list_automations().await?,
    }))
}

/// GET /api/ha/entities
pub async fn get_entities(
    State(state): State<AppState>,
) -> Result<Json<EntityListResponse>, ApiError> {
    Ok(Json(EntityListResponse {
        entities: state.hass.list_entities().await?,
    }))
}

#[derive(Debug, Serialize)]
pub struct ServiceDetailsResponse {
    pub domain: String,
    pub services: Option<serde_json::Value>,
}

/// GET /api/ha/services/{domain}
pub async fn get_service_details(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<ServiceDetailsResponse>, ApiError> {
    let services = state.hass.service_details(&domain).await?;
    Ok(Json(ServiceDetailsResponse { domain, services }))
}

#[derive(Debug, Serialize)]
pub struct AllowedServicesResponse {
    pub allowed_services: Vec<String>,
}

/// GET /api/ha/allowed-services
pub async fn get_allowed_services(State(state): State<AppState>) -> Json<AllowedServicesResponse> {
    Json(AllowedServicesResponse {
        allowed_services: state.config.hass.allowed_services.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CallServiceRequest {
    pub service: String,
    #[serde(default)]
    pub target: serde_json::Value,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct CallServiceResponse {
    pub service: String,
    pub result: serde_json::Value,
}

/// POST /api/ha/call-service
///
/// Refused services return 403 and never reach Home Assistant.
pub async fn post_call_service(
    State(state): State<AppState>,
    Json(body): Json<CallServiceRequest>,
) -> Result<Json<CallServiceResponse>, ApiError> {
    let result = state
        .hass
        .call_service(
            &body.service,
            &body.target,
            &body.data,
            &state.config.hass.allowed_services,
        )
        .await?;
    Ok(Json(CallServiceResponse {
        service: body.service,
        result,
    }))
}
