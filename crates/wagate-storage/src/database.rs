// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use tokio_rusqlite::Connection;
use tracing::debug;
use wagate_core::WagateError;

use crate::migrations;

/// Timestamp expression used for every store-written timestamp column.
///
/// Second resolution, UTC, RFC 3339. The store's clock (SQLite), never
/// the caller's, fills `updated_at`/`received_at`/`fired_at`.
pub(crate) const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now')";

/// Handle to the SQLite database behind the single background write thread.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at `path`, apply PRAGMAs, and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, WagateError> {
        let conn = Connection::open(path).await.map_err(map_tr_err)?;
        let db = Self { conn };
        db.init().await?;
        debug!(path, "database opened");
        Ok(db)
    }

    /// Open an in-memory database, useful for testing.
    pub async fn open_in_memory() -> Result<Self, WagateError> {
        let conn = Connection::open_in_memory().await.map_err(map_tr_err)?;
        let db = Self { conn };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<(), WagateError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;
                     PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;",
                )?;
                migrations::run_migrations(conn)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Returns the underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The store's clock, as written into timestamp columns. Callers
    /// comparing against stored timestamps must use this, not their own
    /// clock.
    pub async fn now(&self) -> Result<String, WagateError> {
        self.conn
            .call(|conn| {
                let now: String = conn.query_row(&format!("SELECT {NOW}"), [], |row| row.get(0))?;
                Ok(now)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL and release the connection.
    pub async fn close(&self) -> Result<(), WagateError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into `WagateError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> WagateError {
    WagateError::Storage {
        source: Box::new(e),
    }
}
