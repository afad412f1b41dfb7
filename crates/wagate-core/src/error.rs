// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the wagate gateway.

use thiserror::Error;

/// The primary error type used across all wagate crates.
#[derive(Debug, Error)]
pub enum WagateError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database open, query failure, migration failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// WhatsApp provider (Evolution API) errors.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Home Assistant orchestrator errors.
    #[error("orchestrator error: {message}")]
    Orchestrator {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A service call was refused because the service is not allow-listed.
    /// The call never reaches the orchestrator.
    #[error("service `{service}` is not in the allowed services list")]
    PolicyRefused { service: String },

    /// Rule-set validation failures surfaced to the operator.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity (chat, rule) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
