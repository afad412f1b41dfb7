// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and well-formed service names.

use thiserror::Error;

use crate::model::WagateConfig;

/// A single configuration validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    Validation { message: String },
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with all collected validation errors (does not fail fast).
pub fn validate_config(config: &WagateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.evolution.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "evolution.base_url must not be empty".to_string(),
        });
    }

    if config.evolution.instance.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "evolution.instance must not be empty".to_string(),
        });
    }

    if config.evolution.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "evolution.timeout_secs must be at least 1".to_string(),
        });
    }

    if config.hass.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "hass.base_url must not be empty".to_string(),
        });
    }

    // Service names must be `domain.service` so allow-list comparisons are
    // unambiguous.
    for service in &config.hass.allowed_services {
        let mut parts = service.splitn(2, '.');
        let domain = parts.next().unwrap_or("");
        let name = parts.next().unwrap_or("");
        if domain.is_empty() || name.is_empty() {
            errors.push(ConfigError::Validation {
                message: format!(
                    "hass.allowed_services entry `{service}` is not a domain.service name"
                ),
            });
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
