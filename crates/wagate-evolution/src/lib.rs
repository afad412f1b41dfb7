// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Evolution API client for the wagate gateway.
//!
//! Wraps the upstream WhatsApp-protocol provider's REST surface. The
//! upstream is loosely versioned; catalogue listing always tries a primary
//! and a fall-back endpoint and returns the union.

pub mod client;
pub mod types;

pub use client::EvolutionClient;
pub use types::{
    CatalogEntry, EnsureOutcome, InstanceSettings, InstanceStatus, MediaKind, QrCode, QrKind,
};
