// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the wagate gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Deserializer, Serialize};

/// Top-level wagate configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WagateConfig {
    /// Gateway HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Evolution API (WhatsApp provider) settings.
    #[serde(default)]
    pub evolution: EvolutionConfig,

    /// Home Assistant (orchestrator) settings.
    #[serde(default)]
    pub hass: HassConfig,

    /// Process-level settings.
    #[serde(default)]
    pub agent: AgentConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL of this gateway, used when
    /// configuring the provider's outbound webhook. Defaults to
    /// `http://{host}:{port}` when unset.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8099
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "wagate.db".to_string()
}

/// Evolution API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EvolutionConfig {
    /// Base URL of the Evolution API service.
    #[serde(default = "default_evolution_url")]
    pub base_url: String,

    /// API key sent in the `apikey` header. `None` disables auth.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Default instance name this gateway manages.
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Request timeout in seconds. Catalogue listing endpoints stream
    /// large responses, so this is generous by default.
    #[serde(default = "default_evolution_timeout")]
    pub timeout_secs: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            base_url: default_evolution_url(),
            api_key: None,
            instance: default_instance(),
            timeout_secs: default_evolution_timeout(),
        }
    }
}

fn default_evolution_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_instance() -> String {
    "wagate".to_string()
}

fn default_evolution_timeout() -> u64 {
    1800
}

/// Home Assistant configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HassConfig {
    /// Base URL of the Home Assistant instance.
    #[serde(default = "default_hass_url")]
    pub base_url: String,

    /// Long-lived access token. `None` disables auth headers.
    #[serde(default)]
    pub token: Option<String>,

    /// Services rules are allowed to call, as `domain.service` names.
    /// Accepts a TOML array or a comma-separated string (the latter is
    /// what the `WAGATE_HASS_ALLOWED_SERVICES` env override provides).
    #[serde(default = "default_allowed_services", deserialize_with = "string_or_seq")]
    pub allowed_services: Vec<String>,
}

impl Default for HassConfig {
    fn default() -> Self {
        Self {
            base_url: default_hass_url(),
            token: None,
            allowed_services: default_allowed_services(),
        }
    }
}

fn default_hass_url() -> String {
    "http://homeassistant.local:8123".to_string()
}

fn default_allowed_services() -> Vec<String> {
    vec![
        "script.turn_on".to_string(),
        "automation.trigger".to_string(),
        "notify.notify".to_string(),
    ]
}

/// Process-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Deserialize either a sequence of strings or a single comma-separated
/// string into a `Vec<String>`, trimming whitespace and dropping empties.
fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrSeq {
        Seq(Vec<String>),
        Str(String),
    }

    Ok(match StringOrSeq::deserialize(deserializer)? {
        StringOrSeq::Seq(v) => v,
        StringOrSeq::Str(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
    })
}

impl WagateConfig {
    /// The externally reachable base URL of this gateway.
    pub fn public_url(&self) -> String {
        self.server
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }
}
