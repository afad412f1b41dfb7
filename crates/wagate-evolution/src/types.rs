// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response payload types for the Evolution API.
//!
//! The upstream is loosely versioned; response shapes drift between
//! releases, so most fields are optional and parsing is tolerant.

use serde::{Deserialize, Serialize};
use wagate_core::ConnectionState;

/// Outcome of `ensure_instance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

/// How a QR payload should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QrKind {
    /// A base64-encoded PNG for rendering.
    Base64,
    /// A textual pairing code the operator types into the phone.
    PairingCode,
}

/// QR (or pairing code) handed out while an instance is unauthenticated.
#[derive(Debug, Clone)]
pub struct QrCode {
    pub payload: String,
    pub kind: QrKind,
    /// Upstream QR codes rotate; this is how long the payload stays valid.
    pub ttl_seconds: u64,
}

/// Folded connection status of an instance.
#[derive(Debug, Clone)]
pub struct InstanceStatus {
    pub state: ConnectionState,
    /// Phone number of the connected account, when known.
    pub phone: Option<String>,
}

/// One catalogue entry from group or contact listing, normalised to the
/// fields the gateway keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    /// Upstream last-activity timestamp, when the endpoint reports one.
    pub last_activity: Option<String>,
}

/// Media kinds accepted by `send_media`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    /// Parse an operator-supplied media type string, defaulting to image.
    pub fn parse(s: &str) -> Self {
        match s {
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            "document" => MediaKind::Document,
            _ => MediaKind::Image,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }
}

/// Per-instance behaviour settings applied at provisioning time.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    pub reject_call: bool,
    pub groups_ignore: bool,
    pub always_online: bool,
    pub read_messages: bool,
    pub read_status: bool,
}

// --- wire types (deserialization only) ---

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectResponse {
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, rename = "pairingCode")]
    pub pairing_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectionStateResponse {
    #[serde(default)]
    pub instance: Option<ConnectionStateInner>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectionStateInner {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "ownerJid")]
    pub owner_jid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupInfo {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "remoteJid")]
    pub remote_jid: Option<String>,
    #[serde(default, rename = "pushName")]
    pub push_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<String>,
}

impl ContactInfo {
    pub(crate) fn jid(&self) -> Option<&str> {
        self.id.as_deref().or(self.remote_jid.as_deref())
    }

    pub(crate) fn display_name(&self) -> &str {
        self.push_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendResponse {
    #[serde(default)]
    pub key: Option<SendKey>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendKey {
    #[serde(default)]
    pub id: Option<String>,
}
