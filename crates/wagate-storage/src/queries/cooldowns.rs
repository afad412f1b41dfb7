// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooldown bookkeeping keyed by (rule id, scope key).
//!
//! The scope key is the chat id. Expired rows are swept at the start of
//! each check; the set path is a single conditional upsert, which keeps
//! the check/set race no wider than one in-flight event.

use rusqlite::params;
use wagate_core::WagateError;

use crate::database::{Database, NOW, map_tr_err};

/// Returns true when an unexpired cooldown exists for the key. Sweeps
/// expired rows first.
pub async fn is_on_cooldown(
    db: &Database,
    rule_id: &str,
    scope_key: &str,
) -> Result<bool, WagateError> {
    let rule_id = rule_id.to_string();
    let scope_key = scope_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!("DELETE FROM cooldowns WHERE expires_at <= {NOW}"),
                [],
            )?;
            let active: bool = conn.query_row(
                &format!(
                    "SELECT EXISTS(
                         SELECT 1 FROM cooldowns
                         WHERE rule_id = ?1 AND scope_key = ?2 AND expires_at > {NOW})"
                ),
                params![rule_id, scope_key],
                |row| row.get(0),
            )?;
            Ok(active)
        })
        .await
        .map_err(map_tr_err)
}

/// Arm (or extend) a cooldown expiring `seconds` from the store's clock.
pub async fn set_cooldown(
    db: &Database,
    rule_id: &str,
    scope_key: &str,
    seconds: i64,
) -> Result<(), WagateError> {
    let rule_id = rule_id.to_string();
    let scope_key = scope_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO cooldowns (rule_id, scope_key, expires_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%SZ', 'now', ?3 || ' seconds'))
                 ON CONFLICT(rule_id, scope_key) DO UPDATE SET expires_at = excluded.expires_at",
                params![rule_id, scope_key, seconds],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove expired rows. Returns the number removed.
pub async fn sweep_expired(db: &Database) -> Result<usize, WagateError> {
    db.connection()
        .call(|conn| {
            let removed = conn.execute(
                &format!("DELETE FROM cooldowns WHERE expires_at <= {NOW}"),
                [],
            )?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}
