// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-flight chat catalogue sync.
//!
//! Pulls groups and contacts from the provider, merges them by id,
//! upserts the result in one transaction, and reconciles away stale
//! malformed rows. Only one sync runs at a time; progress lives in a
//! single in-memory record owned by the running task.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wagate_evolution::{CatalogEntry, EvolutionClient};
use wagate_storage::models::ChatUpsert;
use wagate_storage::{Database, queries};

/// How long the Complete state stays visible before flipping back to
/// Idle.
const COMPLETE_LINGER: Duration = Duration::from_secs(30);

/// Outcome of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Phase of the current (or last) sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    FetchingGroups,
    FetchingContacts,
    Saving,
    Complete,
    Error,
}

/// Progress record exposed on the refresh-status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    pub state: SyncPhase,
    pub groups_found: usize,
    pub contacts_found: usize,
    pub chats_saved: usize,
    pub chats_removed: usize,
    /// Human-readable current step.
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self {
            state: SyncPhase::Idle,
            groups_found: 0,
            contacts_found: 0,
            chats_saved: 0,
            chats_removed: 0,
            step: "idle".to_string(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Coordinates catalogue syncs: single-flight via an atomic flag, with
/// the progress record behind a mutex that only the owning task writes.
///
/// Background tasks are gated on the shutdown token so serve can cancel
/// and drain an in-flight run instead of dropping it with the runtime.
pub struct SyncCoordinator {
    db: Database,
    evolution: EvolutionClient,
    instance: String,
    shutdown: CancellationToken,
    running: AtomicBool,
    progress: Mutex<SyncProgress>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        db: Database,
        evolution: EvolutionClient,
        instance: String,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            evolution,
            instance,
            shutdown,
            running: AtomicBool::new(false),
            progress: Mutex::new(SyncProgress::default()),
            task: Mutex::new(None),
        }
    }

    /// Start a sync on a background task. Exactly one caller observes
    /// `Started` while a run is in flight.
    pub fn start(self: &Arc<Self>) -> StartOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return StartOutcome::AlreadyRunning;
        }

        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = coordinator.run() => {}
                () = coordinator.shutdown.cancelled() => {
                    info!("sync interrupted by shutdown");
                    coordinator.update(|p| {
                        p.state = SyncPhase::Error;
                        p.step = "interrupted by shutdown".to_string();
                        p.error = Some("interrupted by shutdown".to_string());
                    });
                }
            }
            coordinator.running.store(false, Ordering::SeqCst);
        });
        *self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
        StartOutcome::Started
    }

    /// Wait for the in-flight run (if any) to wind down. Called by serve
    /// after cancelling the shutdown token.
    pub async fn drain(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "sync task join failed");
        }
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> SyncProgress {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut SyncProgress)) {
        let mut progress = self
            .progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut progress);
    }

    async fn run(self: &Arc<Self>) {
        // The start instant comes from the store's clock so the
        // reconciliation comparison is apples to apples.
        let started_at = match self.db.now().await {
            Ok(now) => now,
            Err(e) => {
                warn!(error = %e, "sync aborted: store unreachable");
                self.update(|p| {
                    *p = SyncProgress {
                        state: SyncPhase::Error,
                        step: "store unreachable".to_string(),
                        error: Some(e.to_string()),
                        ..SyncProgress::default()
                    }
                });
                return;
            }
        };

        self.update(|p| {
            *p = SyncProgress {
                state: SyncPhase::FetchingGroups,
                step: "fetching groups".to_string(),
                started_at: Some(started_at.clone()),
                ..SyncProgress::default()
            }
        });

        // Listing failures degrade to an empty catalogue side; the sync
        // carries on with whatever it got.
        let groups = match self.evolution.list_groups(&self.instance).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(error = %e, "group fetch failed, continuing");
                Vec::new()
            }
        };
        self.update(|p| {
            p.groups_found = groups.len();
            p.state = SyncPhase::FetchingContacts;
            p.step = "fetching contacts".to_string();
        });

        let contacts = match self.evolution.list_contacts(&self.instance).await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(error = %e, "contact fetch failed, continuing");
                Vec::new()
            }
        };
        self.update(|p| {
            p.contacts_found = contacts.len();
            p.state = SyncPhase::Saving;
            p.step = "saving chats".to_string();
        });

        let merged = merge_catalogues(groups, contacts);

        let saved = match queries::chats::upsert_chats(&self.db, merged).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "sync upsert failed");
                self.update(|p| {
                    p.state = SyncPhase::Error;
                    p.step = "saving chats failed".to_string();
                    p.error = Some(e.to_string());
                });
                return;
            }
        };

        let removed = match queries::chats::sync_reconcile(&self.db, &started_at).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "sync reconciliation failed");
                self.update(|p| {
                    p.state = SyncPhase::Error;
                    p.step = "reconciliation failed".to_string();
                    p.error = Some(e.to_string());
                });
                return;
            }
        };

        let completed_at = self.db.now().await.ok();
        info!(saved, removed, "chat sync complete");
        self.update(|p| {
            p.state = SyncPhase::Complete;
            p.step = format!("complete: {saved} chats saved, {removed} removed");
            p.chats_saved = saved;
            p.chats_removed = removed;
            p.completed_at = completed_at;
        });

        // Linger in Complete so the UI can show the result, then fall
        // back to Idle unless a newer run has taken over.
        let coordinator = Arc::clone(self);
        let this_run = started_at;
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(COMPLETE_LINGER) => {
                    coordinator.update(|p| {
                        if p.state == SyncPhase::Complete
                            && p.started_at.as_deref() == Some(&this_run)
                        {
                            p.state = SyncPhase::Idle;
                            p.step = "idle".to_string();
                        }
                    });
                }
                () = coordinator.shutdown.cancelled() => {}
            }
        });
    }
}

/// Merge group and contact catalogues by id. On collision the entry with
/// the longer name wins; a tie falls to the one carrying an activity
/// timestamp.
fn merge_catalogues(groups: Vec<CatalogEntry>, contacts: Vec<CatalogEntry>) -> Vec<ChatUpsert> {
    let mut by_id: HashMap<String, CatalogEntry> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for entry in groups.into_iter().chain(contacts) {
        match by_id.get_mut(&entry.id) {
            None => {
                order.push(entry.id.clone());
                by_id.insert(entry.id.clone(), entry);
            }
            Some(existing) => {
                if prefer_incoming(existing, &entry) {
                    *existing = entry;
                } else {
                    // Keep the existing entry but inherit what it lacks.
                    if existing.last_activity.is_none() {
                        existing.last_activity = entry.last_activity;
                    }
                    if existing.phone.is_none() {
                        existing.phone = entry.phone;
                    }
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .map(|entry| ChatUpsert {
            id: entry.id,
            name: entry.name,
            phone: entry.phone,
            last_activity: entry.last_activity,
        })
        .collect()
}

fn prefer_incoming(existing: &CatalogEntry, incoming: &CatalogEntry) -> bool {
    if incoming.name.len() != existing.name.len() {
        return incoming.name.len() > existing.name.len();
    }
    incoming.last_activity.is_some() && existing.last_activity.is_none()
}
