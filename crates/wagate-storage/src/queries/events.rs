// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only webhook event log.

use rusqlite::params;
use wagate_core::{WagateError, truncate_chars};

use crate::database::{Database, NOW, map_tr_err};
use crate::models::{EventLogEntry, NewEvent, Page};

const EVENT_COLUMNS: &str =
    "id, event_type, instance, chat_id, sender_id, summary, raw, received_at";

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<EventLogEntry, rusqlite::Error> {
    Ok(EventLogEntry {
        id: row.get(0)?,
        event_type: row.get(1)?,
        instance: row.get(2)?,
        chat_id: row.get(3)?,
        sender_id: row.get(4)?,
        summary: row.get(5)?,
        raw: row.get(6)?,
        received_at: row.get(7)?,
    })
}

/// Append one event-log row. The summary is capped at 1000 characters.
pub async fn insert_event(db: &Database, event: NewEvent) -> Result<(), WagateError> {
    let id = uuid::Uuid::new_v4().to_string();
    let summary = truncate_chars(&event.summary, 1000);
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO events (id, event_type, instance, chat_id, sender_id,
                                         summary, raw, received_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, {NOW})"
                ),
                params![
                    id,
                    event.event_type,
                    event.instance,
                    event.chat_id,
                    event.sender_id,
                    summary,
                    event.raw,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// List events newest-first, optionally filtered by kind.
pub async fn list_events(
    db: &Database,
    page: i64,
    limit: i64,
    event_type: Option<String>,
) -> Result<Page<EventLogEntry>, WagateError> {
    let page = page.max(1);
    let limit = limit.clamp(1, 500);
    let offset = (page - 1) * limit;
    db.connection()
        .call(move |conn| {
            let (total, items) = match &event_type {
                Some(kind) => {
                    let total: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM events WHERE event_type = ?1",
                        params![kind],
                        |row| row.get(0),
                    )?;
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {EVENT_COLUMNS} FROM events WHERE event_type = ?1
                         ORDER BY received_at DESC, id DESC LIMIT ?2 OFFSET ?3"
                    ))?;
                    let rows = stmt.query_map(params![kind, limit, offset], row_to_event)?;
                    let mut items = Vec::new();
                    for row in rows {
                        items.push(row?);
                    }
                    (total, items)
                }
                None => {
                    let total: i64 =
                        conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {EVENT_COLUMNS} FROM events
                         ORDER BY received_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                    ))?;
                    let rows = stmt.query_map(params![limit, offset], row_to_event)?;
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
