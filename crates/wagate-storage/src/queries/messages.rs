// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence and paging.

use rusqlite::params;
use wagate_core::WagateError;

use crate::database::{Database, NOW, map_tr_err};
use crate::models::{InsertOutcome, NewMessage, Page, StoredMessage};

const MESSAGE_COLUMNS: &str = "id, provider_message_id, chat_id, sender_id, sender_name, \
                               text, message_type, raw, received_at, processed";

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<StoredMessage, rusqlite::Error> {
    Ok(StoredMessage {
        id: row.get(0)?,
        provider_message_id: row.get(1)?,
        chat_id: row.get(2)?,
        sender_id: row.get(3)?,
        sender_name: row.get(4)?,
        text: row.get(5)?,
        message_type: row.get(6)?,
        raw: row.get(7)?,
        received_at: row.get(8)?,
        processed: row.get(9)?,
    })
}

/// Insert a message, reporting a duplicate provider message id as a typed
/// outcome instead of an error.
pub async fn insert_message(db: &Database, msg: NewMessage) -> Result<InsertOutcome, WagateError> {
    let id = uuid::Uuid::new_v4().to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.execute(
                &format!(
                    "INSERT INTO messages (id, provider_message_id, chat_id, sender_id,
                                           sender_name, text, message_type, raw, received_at, processed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, {NOW}, 0)"
                ),
                params![
                    id,
                    msg.provider_message_id,
                    msg.chat_id,
                    msg.sender_id,
                    msg.sender_name,
                    msg.text,
                    msg.message_type,
                    msg.raw,
                ],
            );
            match result {
                Ok(_) => Ok(InsertOutcome::Inserted(id)),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(InsertOutcome::Duplicate)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Flip the processed flag after the rule engine has run for this row.
pub async fn mark_message_processed(db: &Database, id: &str) -> Result<(), WagateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("UPDATE messages SET processed = 1 WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a message by surrogate id.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<StoredMessage>, WagateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))?;
            match stmt.query_row(params![id], row_to_message) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List messages newest-first, optionally scoped to one chat.
pub async fn list_messages(
    db: &Database,
    page: i64,
    limit: i64,
    chat_id: Option<String>,
) -> Result<Page<StoredMessage>, WagateError> {
    let page = page.max(1);
    let limit = limit.clamp(1, 500);
    let offset = (page - 1) * limit;
    db.connection()
        .call(move |conn| {
            let (total, items) = match &chat_id {
                Some(chat) => {
                    let total: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
                        params![chat],
                        |row| row.get(0),
                    )?;
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1
                         ORDER BY received_at DESC, id DESC LIMIT ?2 OFFSET ?3"
                    ))?;
                    let rows = stmt.query_map(params![chat, limit, offset], row_to_message)?;
                    let mut items = Vec::new();
                    for row in rows {
                        items.push(row?);
                    }
                    (total, items)
                }
                None => {
                    let total: i64 =
                        conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages
                         ORDER BY received_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                    ))?;
                    let rows = stmt.query_map(params![limit, offset], row_to_message)?;
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
