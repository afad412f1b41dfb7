// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types shared across the wagate workspace.

use serde::{Deserialize, Serialize};

/// Chat id suffix marking a group chat.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Chat id suffixes the provider hands out for well-formed chats.
/// Ids lacking all of these are treated as malformed during sync
/// reconciliation.
pub const KNOWN_CHAT_SUFFIXES: &[&str] = &["@g.us", "@s.whatsapp.net", "@c.us", "@lid"];

/// Whether a chat is a group or a direct conversation.
///
/// Derivable from the chat id: ids ending in `@g.us` are groups,
/// everything else is direct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Group,
    Direct,
}

impl ChatKind {
    /// Derive the chat kind from an opaque chat id.
    pub fn from_chat_id(chat_id: &str) -> Self {
        if chat_id.ends_with(GROUP_SUFFIX) {
            ChatKind::Group
        } else {
            ChatKind::Direct
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Group => "group",
            ChatKind::Direct => "direct",
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a provider instance, folded from the upstream's
/// native vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Qr,
    Connected,
}

impl ConnectionState {
    /// Fold the provider's native state strings into the gateway vocabulary.
    ///
    /// `open` means connected, `connecting` stays connecting, `close` and
    /// anything unrecognised mean disconnected.
    pub fn fold(upstream: &str) -> Self {
        match upstream {
            "open" => ConnectionState::Connected,
            "connecting" => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Qr => "qr",
            ConnectionState::Connected => "connected",
        }
    }
}

/// Normalise a provider event kind string.
///
/// Incoming kinds arrive in two conventions (`messages.upsert` and
/// `MESSAGES_UPSERT`); dots are replaced with underscores and the result
/// upper-cased so both compare equal.
pub fn normalize_event_type(raw: &str) -> String {
    raw.replace('.', "_").to_ascii_uppercase()
}

/// Provider event kind for new inbound messages, post-normalisation.
pub const EVENT_MESSAGES_UPSERT: &str = "MESSAGES_UPSERT";

/// A provider event after webhook normalisation, as consumed by the rule
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Normalised event kind (e.g. `MESSAGES_UPSERT`).
    pub event_type: String,
    /// Opaque chat id.
    pub chat_id: String,
    /// Group or direct, derived from the chat id suffix.
    pub chat_kind: ChatKind,
    /// Opaque sender id (a JID like `491701234567@s.whatsapp.net`).
    pub sender_id: String,
    /// Best-effort sender display name.
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Extracted message text; empty for non-message events.
    #[serde(default)]
    pub text: String,
    /// Provider-assigned message id, when the event carries one.
    #[serde(default)]
    pub provider_message_id: Option<String>,
}

impl NormalizedEvent {
    /// The numeric part of the sender id (everything before `@`).
    pub fn sender_number(&self) -> &str {
        self.sender_id
            .split_once('@')
            .map(|(n, _)| n)
            .unwrap_or(&self.sender_id)
    }
}

/// Outcome of a single rule action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Action kind (`ha_service`, `reply_whatsapp`).
    pub action: String,
    /// Human-readable description of what was attempted.
    pub detail: String,
    pub success: bool,
    /// Error message when the action failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-rule result of a test-only evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub matched: bool,
    /// Why the rule was skipped despite being a candidate (e.g.
    /// `cooldown active`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

/// Truncate a string to at most `max` characters on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
