// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Evolution API.
//!
//! Wraps the upstream REST surface the gateway consumes: instance
//! lifecycle, QR retrieval, status, catalogue listing (with endpoint
//! fall-backs), sending, and webhook/settings configuration.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};
use wagate_config::model::EvolutionConfig;
use wagate_core::{ChatKind, ConnectionState, WagateError};

use crate::types::{
    CatalogEntry, ConnectResponse, ConnectionStateResponse, ContactInfo, EnsureOutcome, GroupInfo,
    InstanceSettings, InstanceStatus, MediaKind, QrCode, QrKind, SendResponse,
};

/// How long a QR payload from the upstream stays scannable before it
/// rotates.
const QR_TTL_SECONDS: u64 = 40;

/// HTTP client for Evolution API communication.
///
/// Timeouts are generous because catalogue listing endpoints stream large
/// responses; callers needing a bound rely on their own cancellation.
#[derive(Debug, Clone)]
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
}

impl EvolutionClient {
    /// Creates a new Evolution API client from configuration.
    pub fn new(config: &EvolutionConfig) -> Result<Self, WagateError> {
        let mut headers = HeaderMap::new();
        if let Some(ref key) = config.api_key {
            headers.insert(
                "apikey",
                HeaderValue::from_str(key)
                    .map_err(|e| WagateError::Config(format!("invalid evolution api key: {e}")))?,
            );
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WagateError::Provider {
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

    /// Ensure the named instance exists upstream. Idempotent: an instance
    /// name that is already taken reports `AlreadyExists`.
    pub async fn ensure_instance(&self, name: &str) -> Result<EnsureOutcome, WagateError> {
        let body = serde_json::json!({
            "instanceName": name,
            "qrcode": true,
            "integration": "WHATSAPP-BAILEYS",
        });
        let response = self
            .client
            .post(self.url("/instance/create"))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        if status.is_success() {
            debug!(instance = name, "instance created");
            return Ok(EnsureOutcome::Created);
        }
        // The upstream reports a taken name as 403 (older builds: 409).
        if status.as_u16() == 403 || status.as_u16() == 409 {
            debug!(instance = name, "instance already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }
        Err(status_err("instance create", status, response).await)
    }

    /// Request a QR (or pairing) code for an unauthenticated instance.
    pub async fn request_qr(&self, name: &str) -> Result<QrCode, WagateError> {
        let response = self
            .client
            .get(self.url(&format!("/instance/connect/{name}")))
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("instance connect", status, response).await);
        }
        let body: ConnectResponse = parse_json(response).await?;

        if let Some(base64) = body.base64 {
            return Ok(QrCode {
                payload: base64,
                kind: QrKind::Base64,
                ttl_seconds: QR_TTL_SECONDS,
            });
        }
        if let Some(code) = body.pairing_code.or(body.code) {
            return Ok(QrCode {
                payload: code,
                kind: QrKind::PairingCode,
                ttl_seconds: QR_TTL_SECONDS,
            });
        }
        Err(WagateError::Provider {
            message: "connect response carried neither QR nor pairing code".to_string(),
            source: None,
        })
    }

    /// Folded connection status of the instance.
    pub async fn connection_status(&self, name: &str) -> Result<InstanceStatus, WagateError> {
        let response = self
            .client
            .get(self.url(&format!("/instance/connectionState/{name}")))
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("connection state", status, response).await);
        }
        let body: ConnectionStateResponse = parse_json(response).await?;

        let raw_state = body
            .instance
            .as_ref()
            .and_then(|i| i.state.as_deref())
            .or(body.state.as_deref())
            .unwrap_or("close");
        let phone = body
            .instance
            .as_ref()
            .and_then(|i| i.owner_jid.as_deref())
            .and_then(|jid| jid.split_once('@'))
            .map(|(number, _)| number.to_string());

        Ok(InstanceStatus {
            state: ConnectionState::fold(raw_state),
            phone,
        })
    }

    /// Log the instance out of WhatsApp.
    pub async fn disconnect(&self, name: &str) -> Result<(), WagateError> {
        let response = self
            .client
            .delete(self.url(&format!("/instance/logout/{name}")))
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("instance logout", status, response).await);
        }
        Ok(())
    }

    /// List group chats, merging the primary and fall-back endpoints.
    ///
    /// The upstream has versions responding to different paths; each
    /// attempt's failure is logged and does not abort the other. The
    /// result is the union without duplicate ids.
    pub async fn list_groups(&self, name: &str) -> Result<Vec<CatalogEntry>, WagateError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        let attempts = [
            format!("/group/fetchAllGroups/{name}?getParticipants=false"),
            format!("/group/findGroupInfos/{name}"),
        ];
        for path in &attempts {
            match self.fetch_groups(path).await {
                Ok(groups) => {
                    for group in groups {
                        if seen.insert(group.id.clone()) {
                            entries.push(group);
                        }
                    }
                }
                Err(e) => warn!(path = path.as_str(), error = %e, "group listing attempt failed"),
            }
        }
        debug!(count = entries.len(), "groups listed");
        Ok(entries)
    }

    async fn fetch_groups(&self, path: &str) -> Result<Vec<CatalogEntry>, WagateError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("group listing", status, response).await);
        }
        let groups: Vec<GroupInfo> = parse_json(response).await?;
        Ok(groups
            .into_iter()
            .map(|g| CatalogEntry {
                name: g.subject.unwrap_or_default(),
                id: g.id,
                phone: None,
                last_activity: None,
            })
            .collect())
    }

    /// List contacts, merging the primary and fall-back endpoints, same
    /// discipline as [`list_groups`](Self::list_groups).
    pub async fn list_contacts(&self, name: &str) -> Result<Vec<CatalogEntry>, WagateError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        let attempts = [
            format!("/chat/findContacts/{name}"),
            format!("/chat/findChats/{name}"),
        ];
        for path in &attempts {
            match self.fetch_contacts(path).await {
                Ok(contacts) => {
                    for contact in contacts {
                        if seen.insert(contact.id.clone()) {
                            entries.push(contact);
                        }
                    }
                }
                Err(e) => {
                    warn!(path = path.as_str(), error = %e, "contact listing attempt failed")
                }
            }
        }
        debug!(count = entries.len(), "contacts listed");
        Ok(entries)
    }

    async fn fetch_contacts(&self, path: &str) -> Result<Vec<CatalogEntry>, WagateError> {
        let response = self
            .client
            .post(self.url(path))
            .json(&serde_json::json!({"where": {}}))
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("contact listing", status, response).await);
        }
        let contacts: Vec<ContactInfo> = parse_json(response).await?;
        Ok(contacts
            .into_iter()
            .filter_map(|c| {
                let id = c.jid()?.to_string();
                let phone = match ChatKind::from_chat_id(&id) {
                    ChatKind::Direct => {
                        id.split_once('@').map(|(number, _)| number.to_string())
                    }
                    ChatKind::Group => None,
                };
                Some(CatalogEntry {
                    name: c.display_name().to_string(),
                    phone,
                    last_activity: c.updated_at.clone(),
                    id,
                })
            })
            .collect())
    }

    /// Send a text message. Returns the provider-assigned message id.
    pub async fn send_text(&self, name: &str, to: &str, text: &str) -> Result<String, WagateError> {
        let body = serde_json::json!({"number": to, "text": text});
        let response = self
            .client
            .post(self.url(&format!("/message/sendText/{name}")))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("send text", status, response).await);
        }
        extract_message_id(parse_json(response).await?)
    }

    /// Send media from a URL. Returns the provider-assigned message id.
    pub async fn send_media(
        &self,
        name: &str,
        to: &str,
        media_url: &str,
        kind: MediaKind,
        caption: Option<&str>,
    ) -> Result<String, WagateError> {
        let body = serde_json::json!({
            "number": to,
            "mediatype": kind.as_str(),
            "media": media_url,
            "caption": caption.unwrap_or(""),
        });
        let response = self
            .client
            .post(self.url(&format!("/message/sendMedia/{name}")))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("send media", status, response).await);
        }
        extract_message_id(parse_json(response).await?)
    }

    /// Point the instance's outbound webhook at `url` for the given event
    /// kinds. Idempotent.
    pub async fn configure_webhook(
        &self,
        name: &str,
        url: &str,
        events: &[&str],
    ) -> Result<(), WagateError> {
        let body = serde_json::json!({
            "webhook": {
                "enabled": true,
                "url": url,
                "webhookByEvents": false,
                "events": events,
            }
        });
        let response = self
            .client
            .post(self.url(&format!("/webhook/set/{name}")))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("webhook set", status, response).await);
        }
        debug!(instance = name, url, "webhook configured");
        Ok(())
    }

    /// Apply instance behaviour settings. Idempotent.
    pub async fn apply_settings(
        &self,
        name: &str,
        settings: &InstanceSettings,
    ) -> Result<(), WagateError> {
        let response = self
            .client
            .post(self.url(&format!("/settings/set/{name}")))
            .json(settings)
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_err("settings set", status, response).await);
        }
        Ok(())
    }
}

fn transport_err(e: reqwest::Error) -> WagateError {
    WagateError::Provider {
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
    WagateError::Provider {
        message: format!("{operation} returned {status}: {body}"),
        source: None,
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, WagateError> {
    let body = response.text().await.map_err(|e| WagateError::Provider {
        message: format!("failed to read response body: {e}"),
        source: Some(Box::new(e)),
    })?;
    serde_json::from_str(&body).map_err(|e| WagateError::Provider {
        message: format!("failed to parse response: {e}"),
        source: Some(Box::new(e)),
    })
}

fn extract_message_id(response: SendResponse) -> Result<String, WagateError> {
    response
        .key
        .and_then(|k| k.id)
        .ok_or_else(|| WagateError::Provider {
            message: "send response carried no message id".to_string(),
            source: None,
        })
}
