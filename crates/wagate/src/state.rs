// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared state for axum request handlers.

use std::sync::Arc;

use wagate_config::WagateConfig;
use wagate_evolution::EvolutionClient;
use wagate_hass::HassClient;
use wagate_rules::RuleEngine;
use wagate_storage::Database;

use crate::sync::SyncCoordinator;

/// Everything the HTTP surface needs. Cloning is cheap; all members are
/// handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WagateConfig>,
    pub db: Database,
    pub evolution: EvolutionClient,
    pub hass: HassClient,
    pub engine: Arc<RuleEngine>,
    pub sync: Arc<SyncCoordinator>,
}

impl AppState {
    /// The instance name this gateway manages.
    pub fn instance(&self) -> &str {
        &self.config.evolution.instance
    }
}
