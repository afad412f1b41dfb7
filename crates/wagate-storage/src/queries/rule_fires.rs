// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only log of rule fires.

use rusqlite::params;
use wagate_core::WagateError;

use crate::database::{Database, NOW, map_tr_err};
use crate::models::{NewRuleFire, Page, RuleFire};

const FIRE_COLUMNS: &str = "id, rule_id, rule_name, message_id, chat_id, sender_id, \
                            matched_text, actions_json, success, error_message, fired_at";

fn row_to_fire(row: &rusqlite::Row<'_>) -> Result<RuleFire, rusqlite::Error> {
    Ok(RuleFire {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        rule_name: row.get(2)?,
        message_id: row.get(3)?,
        chat_id: row.get(4)?,
        sender_id: row.get(5)?,
        matched_text: row.get(6)?,
        actions_json: row.get(7)?,
        success: row.get(8)?,
        error_message: row.get(9)?,
        fired_at: row.get(10)?,
    })
}

/// Append one rule-fire row. Returns its id.
pub async fn insert_rule_fire(db: &Database, fire: NewRuleFire) -> Result<String, WagateError> {
    let id = uuid::Uuid::new_v4().to_string();
    let returned = id.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO rule_fires (id, rule_id, rule_name, message_id, chat_id,
                                             sender_id, matched_text, actions_json, success,
                                             error_message, fired_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, {NOW})"
                ),
                params![
                    id,
                    fire.rule_id,
                    fire.rule_name,
                    fire.message_id,
                    fire.chat_id,
                    fire.sender_id,
                    fire.matched_text,
                    fire.actions_json,
                    fire.success,
                    fire.error_message,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(returned)
}

/// List rule fires newest-first, optionally scoped to one rule.
pub async fn list_rule_fires(
    db: &Database,
    page: i64,
    limit: i64,
    rule_id: Option<String>,
) -> Result<Page<RuleFire>, WagateError> {
    let page = page.max(1);
    let limit = limit.clamp(1, 500);
    let offset = (page - 1) * limit;
    db.connection()
        .call(move |conn| {
            let (total, items) = match &rule_id {
                Some(rule) => {
                    let total: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM rule_fires WHERE rule_id = ?1",
                        params![rule],
                        |row| row.get(0),
                    )?;
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {FIRE_COLUMNS} FROM rule_fires WHERE rule_id = ?1
                         ORDER BY fired_at DESC, id DESC LIMIT ?2 OFFSET ?3"
                    ))?;
                    let rows = stmt.query_map(params![rule, limit, offset], row_to_fire)?;
                    let mut items = Vec::new();
                    for row in rows {
                        items.push(row?);
                    }
                    (total, items)
                }
                None => {
                    let total: i64 =
                        conn.query_row("SELECT COUNT(*) FROM rule_fires", [], |row| row.get(0))?;
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {FIRE_COLUMNS} FROM rule_fires
                         ORDER BY fired_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                    ))?;
                    let rows = stmt.query_map(params![limit, offset], row_to_fire)?;
                    let mut items = Vec::new();
                    for row in rows {
                        items.push(row?);
                    }
                    (total, items)
                }
            };
            Ok(Page {
                items,
                page,
                limit,
                total,
            })
        })
        .await
        .map_err(map_tr_err)
}
