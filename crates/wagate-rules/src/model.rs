// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serde model of the operator-authored YAML rule document.
//!
//! Fields that the schema requires are deserialized with permissive
//! defaults so a structurally broken document still parses; the
//! validation pass then reports precise per-rule errors instead of one
//! opaque syntax error.

use serde::{Deserialize, Serialize};

/// The whole rule document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// One automation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Unique id within the set.
    #[serde(default)]
    pub id: String,

    /// Display name shown in logs and the UI.
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Evaluation order, lower first. Ties keep document order.
    #[serde(default = "default_priority")]
    pub priority: i64,

    /// Whether a match terminates the chain for this event.
    #[serde(default = "default_true")]
    pub stop_on_match: bool,

    /// Per-chat cooldown after this rule fires; 0 disables.
    #[serde(default)]
    pub cooldown_seconds: i64,

    /// Match conditions; an empty clause matches every event.
    #[serde(default, rename = "match")]
    pub match_clause: MatchClause,

    /// Ordered actions, executed sequentially.
    #[serde(default)]
    pub actions: Vec<Action>,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i64 {
    100
}

/// Conditions a normalised event must satisfy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchClause {
    /// Event kinds this rule subscribes to; empty means message events
    /// and anything else alike.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatMatch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderMatch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextMatch>,
}

/// Chat-scoped conditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatMatch {
    #[serde(default)]
    pub kind: ChatKindFilter,

    /// Exact chat ids; empty means any chat.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
}

/// Chat kind filter; `any` is the default and matches both kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKindFilter {
    #[default]
    Any,
    Group,
    Direct,
}

/// Sender-scoped conditions. When both `ids` and `numbers` are set, BOTH
/// must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SenderMatch {
    /// Full sender JIDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,

    /// Bare numbers, compared against the part of the JID before `@`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub numbers: Vec<String>,
}

/// Text condition: at least one pattern must match under the given mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextMatch {
    #[serde(default)]
    pub mode: TextMode,

    #[serde(default)]
    pub patterns: Vec<String>,
}

/// How text patterns are applied.
///
/// `contains` and `starts_with` compare ASCII-case-insensitively on
/// whitespace-trimmed text; `regex` compiles each pattern
/// case-insensitively against the raw text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    #[default]
    Contains,
    StartsWith,
    Regex,
}

/// One rule action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Call a Home Assistant service (subject to the allow-list).
    HaService {
        /// `domain.service` name.
        #[serde(default)]
        service: String,
        /// Target fields (entity_id and friends), merged into the call.
        #[serde(default)]
        target: serde_json::Value,
        /// Service data.
        #[serde(default)]
        data: serde_json::Value,
    },
    /// Reply into the triggering chat via the provider.
    ReplyWhatsapp {
        #[serde(default)]
        text: String,
    },
}

impl Action {
    /// Action kind string, as persisted in rule-fire records.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::HaService { .. } => "ha_service",
            Action::ReplyWhatsapp { .. } => "reply_whatsapp",
        }
    }

    /// Human-readable one-liner for previews.
    pub fn describe(&self) -> String {
        match self {
            Action::HaService { service, target, .. } => {
                if target.is_null() || target == &serde_json::json!({}) {
                    format!("call {service}")
                } else {
                    format!("call {service} target={target}")
                }
            }
            Action::ReplyWhatsapp { text } => format!("reply {text:?}"),
        }
    }
}
