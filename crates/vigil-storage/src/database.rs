// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use tracing::{debug, info};
use vigil_core::VigilError;

use crate::migrations::run_migrations;

/// Handle to the single SQLite writer.
///
/// Cloning is cheap; every clone talks to the same background thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, VigilError> {
        Self::open_with(path, true).await
    }

    /// Like [`Database::open`], with WAL mode selectable.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, VigilError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(VigilError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(VigilError::storage)?;

        conn.call(move |conn| -> Result<(), TxError> {
            apply_pragmas(conn, wal_mode)?;
            run_migrations(conn).map_err(TxError::Domain)?;
            Ok(())
        })
        .await
        .map_err(map_tx_err)?;

        info!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), VigilError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(VigilError::storage)?;
        debug!("database closed");
        Ok(())
    }
}

fn apply_pragmas(conn: &rusqlite::Connection, wal_mode: bool) -> Result<(), rusqlite::Error> {
    if wal_mode {
        // journal_mode returns a row, so it cannot go through execute_batch.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

/// Error type for closures that can fail with either SQL or domain errors.
///
/// Domain errors raised inside a transaction abort it: the transaction is
/// dropped without commit and rolls back.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TxError {
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error(transparent)]
    Domain(VigilError),
}

/// Convert a tokio-rusqlite error into VigilError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> VigilError {
    match e {
        tokio_rusqlite::Error::Error(inner) => VigilError::storage(inner),
        other => VigilError::storage(other),
    }
}

/// Convert a transactional closure error, passing domain errors through.
pub(crate) fn map_tx_err(e: tokio_rusqlite::Error<TxError>) -> VigilError {
    match e {
        tokio_rusqlite::Error::Error(TxError::Domain(domain)) => domain,
        tokio_rusqlite::Error::Error(TxError::Sql(sql)) => VigilError::storage(sql),
        other => VigilError::storage(other),
    }
}

/// True when `e` is a foreign-key constraint violation.
pub(crate) fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// Map a foreign-key violation on a channel-scoped insert to `UnknownChannel`.
pub(crate) fn unknown_channel_on_fk(e: rusqlite::Error, channel_id: &str) -> TxError {
    if is_foreign_key_violation(&e) {
        TxError::Domain(VigilError::UnknownChannel {
            channel_id: channel_id.to_string(),
        })
    } else {
        TxError::Sql(e)
    }
}

/// Wrap a JSON (de)serialization failure of a stored column.
pub(crate) fn json_err(e: serde_json::Error) -> TxError {
    TxError::Domain(VigilError::storage(e))
}

/// Current time in the format used by every TEXT time column.
pub(crate) fn now_timestamp() -> String {
    vigil_core::jobs::format_timestamp(chrono::Utc::now())
}
