// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Singleton rule-set row operations.
//!
//! The operator's YAML is kept verbatim so formatting survives the
//! save/load round trip; the version strictly increases on each save.

use rusqlite::params;
use wagate_core::WagateError;

use crate::database::{Database, NOW, map_tr_err};
use crate::models::RuleSetRow;

/// Get the current rule set, if one has been saved.
pub async fn get_ruleset(db: &Database) -> Result<Option<RuleSetRow>, WagateError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT yaml, version, updated_at FROM rule_sets WHERE id = 1")?;
            match stmt.query_row([], |row| {
                Ok(RuleSetRow {
                    yaml: row.get(0)?,
                    version: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            }) {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the rule set atomically, bumping the version. Returns the new
/// version (1 on first save).
pub async fn put_ruleset(db: &Database, yaml: &str) -> Result<i64, WagateError> {
    let yaml = yaml.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let current: i64 = tx
                .query_row("SELECT version FROM rule_sets WHERE id = 1", [], |row| {
                    row.get(0)
                })
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(0),
                    other => Err(other),
                })?;
            let next = current + 1;
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO rule_sets (id, yaml, version, updated_at)
                     VALUES (1, ?1, ?2, {NOW})"
                ),
                params![yaml, next],
            )?;
            tx.commit()?;
            Ok(next)
        })
        .await
        .map_err(map_tr_err)
}
