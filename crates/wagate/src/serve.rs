// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wagate serve` command implementation.
//!
//! Brings up storage (fatal on failure), both upstream clients, the rule
//! engine, and the sync coordinator, provisions the provider webhook
//! best-effort, then serves the management API until SIGINT/SIGTERM.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wagate_config::{WagateConfig, validate_config};
use wagate_core::WagateError;
use wagate_evolution::{EvolutionClient, InstanceSettings};
use wagate_hass::HassClient;
use wagate_rules::RuleEngine;
use wagate_storage::Database;

use crate::api;
use crate::state::AppState;
use crate::sync::SyncCoordinator;

/// Event kinds the provider webhook is subscribed to.
const WEBHOOK_EVENTS: &[&str] = &["MESSAGES_UPSERT", "CONNECTION_UPDATE", "QRCODE_UPDATED"];

/// Runs the `wagate serve` command.
pub async fn run_serve(config: WagateConfig) -> Result<(), WagateError> {
    init_tracing(&config.agent.log_level);

    if let Err(errors) = validate_config(&config) {
        let joined = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(WagateError::Config(joined));
    }

    info!("starting wagate serve");

    // Storage is load-bearing: refuse to start without it.
    let db = Database::open(&config.storage.database_path)
        .await
        .map_err(|e| {
            error!(path = config.storage.database_path.as_str(), error = %e,
                   "storage unavailable at startup");
            e
        })?;
    info!(path = config.storage.database_path.as_str(), "storage ready");

    let evolution = EvolutionClient::new(&config.evolution)?;
    let hass = HassClient::new(&config.hass)?;

    let engine = Arc::new(RuleEngine::new(
        db.clone(),
        evolution.clone(),
        hass.clone(),
        config.evolution.instance.clone(),
        config.hass.allowed_services.clone(),
    ));
    let rule_count = engine.load_from_store().await?;
    info!(rules = rule_count, "rule engine ready");

    // Background tasks are gated on this token so shutdown can cancel
    // and drain them instead of dropping them with the runtime.
    let shutdown = CancellationToken::new();
    let sync = Arc::new(SyncCoordinator::new(
        db.clone(),
        evolution.clone(),
        config.evolution.instance.clone(),
        shutdown.clone(),
    ));

    provision_provider(&config, &evolution).await;

    let state = AppState {
        config: Arc::new(config.clone()),
        db: db.clone(),
        evolution,
        hass,
        engine,
        sync: Arc::clone(&sync),
    };
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WagateError::Internal(format!("failed to bind {addr}: {e}")))?;
    info!(address = addr.as_str(), "wagate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| WagateError::Internal(format!("server error: {e}")))?;

    info!("stopping background tasks");
    shutdown.cancel();
    sync.drain().await;

    db.close().await?;
    info!("wagate serve shutdown complete");
    Ok(())
}

/// Best-effort provider provisioning: ensure the instance exists, point
/// its webhook at this gateway, and apply settings. A fresh install
/// receives events without operator action; failures only log.
async fn provision_provider(config: &WagateConfig, evolution: &EvolutionClient) {
    let instance = &config.evolution.instance;

    match evolution.ensure_instance(instance).await {
        Ok(outcome) => info!(instance = instance.as_str(), ?outcome, "instance ensured"),
        Err(e) => warn!(error = %e, "instance provisioning failed, continuing"),
    }

    let webhook_url = format!("{}/webhook/evolution", config.public_url());
    match evolution
        .configure_webhook(instance, &webhook_url, WEBHOOK_EVENTS)
        .await
    {
        Ok(()) => info!(url = webhook_url.as_str(), "provider webhook configured"),
        Err(e) => warn!(error = %e, "webhook configuration failed, continuing"),
    }

    if let Err(e) = evolution
        .apply_settings(instance, &InstanceSettings::default())
        .await
    {
        warn!(error = %e, "settings application failed, continuing");
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wagate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
