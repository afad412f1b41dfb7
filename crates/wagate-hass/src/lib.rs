// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Home Assistant client for the wagate gateway.
//!
//! Service calls are guarded by an operator-configured allow-list; a
//! refused call never reaches Home Assistant.

pub mod client;

pub use client::{EntitySummary, HassClient, HassStatus};
