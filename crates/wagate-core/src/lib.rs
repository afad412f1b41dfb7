// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the wagate gateway.
//!
//! Provides the shared error type and the domain types used across the
//! workspace: chat kinds, normalised provider events, action outcomes,
//! and connection states.

pub mod error;
pub mod types;

pub use error::WagateError;
pub use types::{
    ActionOutcome, ChatKind, ConnectionState, EvaluatedRule, NormalizedEvent,
    EVENT_MESSAGES_UPSERT, KNOWN_CHAT_SUFFIXES, normalize_event_type, truncate_chars,
};
