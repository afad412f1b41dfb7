// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat catalogue operations.

use rusqlite::params;
use wagate_core::{ChatKind, KNOWN_CHAT_SUFFIXES, WagateError};

use crate::database::{Database, NOW, map_tr_err};
use crate::models::{Chat, ChatUpsert};

fn row_to_chat(row: &rusqlite::Row<'_>) -> Result<Chat, rusqlite::Error> {
    let kind: String = row.get(1)?;
    Ok(Chat {
        id: row.get(0)?,
        kind: if kind == "group" {
            ChatKind::Group
        } else {
            ChatKind::Direct
        },
        name: row.get(2)?,
        phone: row.get(3)?,
        enabled: row.get(4)?,
        last_message_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const CHAT_COLUMNS: &str = "id, kind, name, phone, enabled, last_message_at, updated_at";

/// Record message activity on a chat, creating the row on first sight.
///
/// On insert the kind is derived from the id suffix and the display name
/// falls back to the id; on conflict only the activity timestamps move.
pub async fn record_chat_activity(
    db: &Database,
    chat_id: &str,
    name_hint: Option<&str>,
) -> Result<(), WagateError> {
    let chat_id = chat_id.to_string();
    let kind = ChatKind::from_chat_id(&chat_id).as_str().to_string();
    let name = name_hint
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(&chat_id)
        .to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO chats (id, kind, name, phone, enabled, last_message_at, updated_at)
                     VALUES (?1, ?2, ?3, NULL, 1, {NOW}, {NOW})
                     ON CONFLICT(id) DO UPDATE SET
                         last_message_at = excluded.last_message_at,
                         updated_at = excluded.updated_at"
                ),
                params![chat_id, kind, name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert a batch of catalogue entries inside a single transaction.
///
/// Sync uses this after merging groups and contacts; a failure anywhere
/// rolls the whole batch back.
pub async fn upsert_chats(db: &Database, entries: Vec<ChatUpsert>) -> Result<usize, WagateError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut written = 0usize;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO chats (id, kind, name, phone, enabled, last_message_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 1, ?5, {NOW})
                     ON CONFLICT(id) DO UPDATE SET
                         name = CASE WHEN length(excluded.name) > 0
                                     THEN excluded.name ELSE chats.name END,
                         phone = COALESCE(excluded.phone, chats.phone),
                         last_message_at = COALESCE(excluded.last_message_at, chats.last_message_at),
                         updated_at = excluded.updated_at"
                ))?;
                for entry in &entries {
                    let kind = ChatKind::from_chat_id(&entry.id).as_str();
                    let name = if entry.name.trim().is_empty() {
                        entry.id.as_str()
                    } else {
                        entry.name.as_str()
                    };
                    stmt.execute(params![
                        entry.id,
                        kind,
                        name,
                        entry.phone,
                        entry.last_activity,
                    ])?;
                    written += 1;
                }
            }
            tx.commit()?;
            Ok(written)
        })
        .await
        .map_err(map_tr_err)
}

/// List chats, optionally filtered by kind and enabled flag, most recent
/// activity first.
pub async fn list_chats(
    db: &Database,
    kind: Option<ChatKind>,
    enabled: Option<bool>,
) -> Result<Vec<Chat>, WagateError> {
    db.connection()
        .call(move |conn| {
            let mut sql = format!("SELECT {CHAT_COLUMNS} FROM chats");
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(kind) = kind {
                clauses.push(format!("kind = ?{}", values.len() + 1));
                values.push(Box::new(kind.as_str().to_string()));
            }
            if let Some(enabled) = enabled {
                clauses.push(format!("enabled = ?{}", values.len() + 1));
                values.push(Box::new(enabled));
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY last_message_at DESC NULLS LAST, name ASC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                row_to_chat,
            )?;
            let mut chats = Vec::new();
            for row in rows {
                chats.push(row?);
            }
            Ok(chats)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a single chat by id.
pub async fn get_chat(db: &Database, id: &str) -> Result<Option<Chat>, WagateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"))?;
            match stmt.query_row(params![id], row_to_chat) {
                Ok(chat) => Ok(Some(chat)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Flip the operator-controlled enabled flag. Returns false when the chat
/// does not exist.
pub async fn set_chat_enabled(
    db: &Database,
    id: &str,
    enabled: bool,
) -> Result<bool, WagateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let affected = conn.execute(
                &format!("UPDATE chats SET enabled = ?1, updated_at = {NOW} WHERE id = ?2"),
                params![enabled, id],
            )?;
            Ok(affected > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete chats not seen by the sync that started at `sync_start` and
/// whose id lacks every known provider suffix. Returns the number of
/// removed rows.
pub async fn sync_reconcile(db: &Database, sync_start: &str) -> Result<usize, WagateError> {
    let sync_start = sync_start.to_string();
    let suffix_guard = KNOWN_CHAT_SUFFIXES
        .iter()
        .map(|s| format!("id NOT LIKE '%{s}'"))
        .collect::<Vec<_>>()
        .join(" AND ");
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                &format!("DELETE FROM chats WHERE updated_at < ?1 AND {suffix_guard}"),
                params![sync_start],
            )?;
            Ok(deleted)
        })
        .await
        .map_err(map_tr_err)
}
