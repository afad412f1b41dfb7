// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Home Assistant REST API.
//!
//! Service invocation is guarded by an allow-list: a service name not on
//! the list is refused before any network I/O happens.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::debug;
use wagate_config::model::HassConfig;
use wagate_core::WagateError;

/// Summary of one Home Assistant entity.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntitySummary {
    pub entity_id: String,
    pub state: String,
    pub friendly_name: Option<String>,
}

/// Reachability report for the orchestrator.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HassStatus {
    pub available: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct StateEntry {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ServiceDomainEntry {
    domain: String,
    services: serde_json::Value,
}

/// HTTP client for Home Assistant communication.
#[derive(Debug, Clone)]
pub struct HassClient {
    client: reqwest::Client,
    base_url: String,
}

impl HassClient {
    /// Creates a new Home Assistant client from configuration.
    pub fn new(config: &HassConfig) -> Result<Self, WagateError> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = config.token {
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| WagateError::Config(format!("invalid hass token: {e}")))?,
            );
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WagateError::Orchestrator {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Call a service, merging `target` and `data` into the service
    /// payload.
    ///
    /// The service name must be present in `allow_list`; otherwise the
    /// call fails with a policy-refused error and never reaches Home
    /// Assistant.
    pub async fn call_service(
        &self,
        service: &str,
        target: &serde_json::Value,
        data: &serde_json::Value,
        allow_list: &[String],
    ) -> Result<serde_json::Value, WagateError> {
        if !allow_list.iter().any(|allowed| allowed == service) {
            return Err(WagateError::PolicyRefused {
                service: service.to_string(),
            });
        }

        let (domain, name) = service.split_once('.').ok_or_else(|| {
            WagateError::Validation(format!("service `{service}` is not a domain.service name"))
        })?;

        // The REST API takes one flat payload; target fields (entity_id
        // and friends) sit next to the service data.
        let mut payload = serde_json::Map::new();
        if let Some(obj) = data.as_object() {
            payload.extend(obj.clone());
        }
        if let Some(obj) = target.as_object() {
            payload.extend(obj.clone());
        }

        debug!(service, "calling home assistant service");
        let response = self
            .client
            .post(self.url(&format!("/api/services/{domain}/{name}")))
            .json(&serde_json::Value::Object(payload))
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("service call", status, response).await);
        }
        response.json().await.map_err(|e| WagateError::Orchestrator {
            message: format!("failed to parse service response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// List `script.*` entities.
    pub async fn list_scripts(&self) -> Result<Vec<EntitySummary>, WagateError> {
        Ok(self
            .states()
            .await?
            .into_iter()
            .filter(|e| e.entity_id.starts_with("script."))
            .collect())
    }

    /// List `automation.*` entities.
    pub async fn list_automations(&self) -> Result<Vec<EntitySummary>, WagateError> {
        Ok(self
            .states()
            .await?
            .into_iter()
            .filter(|e| e.entity_id.starts_with("automation."))
            .collect())
    }

    /// List all entities.
    pub async fn list_entities(&self) -> Result<Vec<EntitySummary>, WagateError> {
        self.states().await
    }

    async fn states(&self) -> Result<Vec<EntitySummary>, WagateError> {
        let response = self
            .client
            .get(self.url("/api/states"))
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("states listing", status, response).await);
        }
        let states: Vec<StateEntry> =
            response.json().await.map_err(|e| WagateError::Orchestrator {
                message: format!("failed to parse states: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(states
            .into_iter()
            .map(|s| EntitySummary {
                friendly_name: s
                    .attributes
                    .get("friendly_name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                entity_id: s.entity_id,
                state: s.state,
            })
            .collect())
    }

    /// The services a domain exposes, as reported by Home Assistant.
    pub async fn service_details(
        &self,
        domain: &str,
    ) -> Result<Option<serde_json::Value>, WagateError> {
        let response = self
            .client
            .get(self.url("/api/services"))
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("services listing", status, response).await);
        }
        let domains: Vec<ServiceDomainEntry> =
            response.json().await.map_err(|e| WagateError::Orchestrator {
                message: format!("failed to parse services: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(domains
            .into_iter()
            .find(|d| d.domain == domain)
            .map(|d| d.services))
    }

    /// Whether the Home Assistant API answers at all.
    pub async fn status(&self) -> HassStatus {
        match self.client.get(self.url("/api/")).send().await {
            Ok(response) if response.status().is_success() => {
                let message = response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                    .unwrap_or_else(|| "API running.".to_string());
                HassStatus {
                    available: true,
                    message,
                }
            }
            Ok(response) => HassStatus {
                available: false,
                message: format!("API returned {}", response.status()),
            },
            Err(e) => HassStatus {
                available: false,
                message: format!("unreachable: {e}"),
            },
        }
    }
}

fn transport_err(e: reqwest::Error) -> WagateError {
    WagateError::Orchestrator {
        message: format!("HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

async fn status_err(
    operation: &str,
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> WagateError {
    let body = response.text().await.unwrap_or_default();
    WagateError::Orchestrator {
        message: format!("{operation} returned {status}: {body}"),
        source: None,
    }
}
