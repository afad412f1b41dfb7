// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! These types represent the rows stored in the SQLite database. All
//! timestamps are RFC 3339 UTC strings at second resolution, written by
//! the store's clock.

use serde::{Deserialize, Serialize};
use wagate_core::ChatKind;

/// A WhatsApp chat known to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    /// Opaque chat id; the suffix determines the kind.
    pub id: String,
    /// Group or direct.
    pub kind: ChatKind,
    /// Display name.
    pub name: String,
    /// Phone number for direct chats, when known.
    pub phone: Option<String>,
    /// Whether rules may act on this chat. Operator-controlled.
    pub enabled: bool,
    /// Timestamp of the last received message, if any.
    pub last_message_at: Option<String>,
    /// Last store write touching this row.
    pub updated_at: String,
}

/// A received message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Surrogate id (UUID v4).
    pub id: String,
    /// Provider-assigned message id; unique when present.
    pub provider_message_id: Option<String>,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Extracted message text.
    pub text: String,
    /// Message kind reported by the provider (text, image, video, ...).
    pub message_type: String,
    /// Raw provider payload, JSON-encoded.
    pub raw: Option<String>,
    pub received_at: String,
    /// Set exactly once, after the rule engine has run for this row.
    pub processed: bool,
}

/// Fields for inserting a new message. The store assigns `received_at`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub provider_message_id: Option<String>,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub text: String,
    pub message_type: String,
    pub raw: Option<String>,
}

/// Outcome of a message insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row was inserted; carries the surrogate id.
    Inserted(String),
    /// A row with the same provider message id already exists.
    Duplicate,
}

/// The singleton rule-set row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetRow {
    /// Canonical YAML text as saved by the operator.
    pub yaml: String,
    /// Monotonic version, bumped on each save.
    pub version: i64,
    pub updated_at: String,
}

/// A persisted record of a rule that matched and had its actions attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFire {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    /// Triggering message, when the event carried one.
    pub message_id: Option<String>,
    pub chat_id: String,
    pub sender_id: String,
    /// Triggering text, truncated to 500 characters.
    pub matched_text: String,
    /// Per-action results, JSON-encoded `Vec<ActionOutcome>`.
    pub actions_json: String,
    /// Conjunction of the per-action successes.
    pub success: bool,
    /// Joined error messages from failed actions.
    pub error_message: Option<String>,
    pub fired_at: String,
}

/// Fields for inserting a new rule fire. The store assigns id and
/// `fired_at`.
#[derive(Debug, Clone)]
pub struct NewRuleFire {
    pub rule_id: String,
    pub rule_name: String,
    pub message_id: Option<String>,
    pub chat_id: String,
    pub sender_id: String,
    pub matched_text: String,
    pub actions_json: String,
    pub success: bool,
    pub error_message: Option<String>,
}

/// One row per webhook invocation, regardless of event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: String,
    pub event_type: String,
    pub instance: String,
    pub chat_id: Option<String>,
    pub sender_id: Option<String>,
    /// Short human-readable summary, at most 1000 characters.
    pub summary: String,
    pub raw: Option<String>,
    pub received_at: String,
}

/// Fields for inserting a new event-log row.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub instance: String,
    pub chat_id: Option<String>,
    pub sender_id: Option<String>,
    pub summary: String,
    pub raw: Option<String>,
}

/// Catalogue entry handed to the store by the sync coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUpsert {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    /// Upstream last-activity timestamp, when the catalogue reports one.
    pub last_activity: Option<String>,
}

/// One page of a listing, with the unpaged total for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}
