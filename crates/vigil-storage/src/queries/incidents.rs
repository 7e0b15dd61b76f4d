// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incident open/close transitions and lookups.
//!
//! An incident is keyed by `(channel, service, alert, open ts)`. Opening the
//! same key twice returns the existing row. Closing picks the most recent
//! still-open incident for `(channel, service, alert)` opened strictly
//! before the close timestamp. Each transition tags the originating message
//! in the same transaction.

use std::str::FromStr;

use rusqlite::{OptionalExtension, params};
use vigil_core::incident::{CloseOutcome, OpenOutcome};
use vigil_core::{
    Incident, IncidentPriority, IncidentTag, SlackTs, Transition, VigilError,
};

use crate::database::{
    Database, TxError, map_tr_err, map_tx_err, now_timestamp, unknown_channel_on_fk,
};
use crate::queries::messages::tag_incident_tx;

const INCIDENT_COLUMNS: &str =
    "id, channel_id, service, alert, priority, open_ts, close_ts, duration_us";

type IncidentRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<i64>,
);

fn row_to_incident(row: &rusqlite::Row<'_>) -> Result<IncidentRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode_incident(
    (id, channel_id, service, alert, priority, open_ts, close_ts, duration_us): IncidentRow,
) -> Result<Incident, VigilError> {
    Ok(Incident {
        id,
        channel_id,
        service,
        alert,
        priority: priority.and_then(|p| IncidentPriority::from_str(&p).ok()),
        open_ts: SlackTs::parse(&open_ts)?,
        close_ts: close_ts.as_deref().map(SlackTs::parse).transpose()?,
        duration_us,
    })
}

/// Identity of an incident transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentKey {
    pub channel_id: String,
    pub service: String,
    pub alert: String,
}

impl IncidentKey {
    pub fn new(
        channel_id: impl Into<String>,
        service: impl Into<String>,
        alert: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            service: service.into(),
            alert: alert.into(),
        }
    }
}

/// Open an incident at `open_ts`, the timestamp of the triggering message.
///
/// Repeating the same open returns [`OpenOutcome::AlreadyOpen`] with the
/// existing id. Either way the message at `open_ts` is tagged with the
/// incident id and `"open"`.
pub async fn open_incident(
    db: &Database,
    key: &IncidentKey,
    open_ts: &SlackTs,
    priority: Option<IncidentPriority>,
) -> Result<OpenOutcome, VigilError> {
    let key = key.clone();
    let open_ts = open_ts.clone();
    db.connection()
        .call(move |conn| -> Result<OpenOutcome, TxError> {
            let tx = conn.transaction()?;
            let changed = tx
                .execute(
                    "INSERT INTO incidents (channel_id, service, alert, priority, open_ts, open_ts_us)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT (channel_id, service, alert, open_ts_us) DO NOTHING",
                    params![
                        key.channel_id,
                        key.service,
                        key.alert,
                        priority.map(|p| p.to_string()),
                        open_ts.as_str(),
                        open_ts.as_micros()
                    ],
                )
                .map_err(|e| unknown_channel_on_fk(e, &key.channel_id))?;

            let outcome = if changed == 1 {
                OpenOutcome::Created(tx.last_insert_rowid())
            } else {
                let id = tx.query_row(
                    "SELECT id FROM incidents
                     WHERE channel_id = ?1 AND service = ?2 AND alert = ?3 AND open_ts_us = ?4",
                    params![key.channel_id, key.service, key.alert, open_ts.as_micros()],
                    |row| row.get(0),
                )?;
                OpenOutcome::AlreadyOpen(id)
            };

            tag_incident_tx(
                &tx,
                &key.channel_id,
                &open_ts,
                IncidentTag {
                    incident_id: outcome.incident_id(),
                    action: Transition::Open,
                },
            )?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tx_err)
}

/// Close the latest open incident for `key` opened before `close_ts`.
///
/// Fails with [`VigilError::NoOpenIncident`] and leaves the store unchanged
/// when no such incident exists. Re-delivering a close that was already
/// applied returns [`CloseOutcome::AlreadyClosed`].
pub async fn close_incident(
    db: &Database,
    key: &IncidentKey,
    close_ts: &SlackTs,
) -> Result<CloseOutcome, VigilError> {
    let key = key.clone();
    let close_ts = close_ts.clone();
    db.connection()
        .call(move |conn| -> Result<CloseOutcome, TxError> {
            let tx = conn.transaction()?;

            let already: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT id, duration_us FROM incidents
                     WHERE channel_id = ?1 AND service = ?2 AND alert = ?3 AND close_ts_us = ?4
                     ORDER BY open_ts_us DESC
                     LIMIT 1",
                    params![key.channel_id, key.service, key.alert, close_ts.as_micros()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let outcome = if let Some((incident_id, duration_us)) = already {
                CloseOutcome::AlreadyClosed {
                    incident_id,
                    duration_us,
                }
            } else {
                let open: Option<(i64, i64)> = tx
                    .query_row(
                        "SELECT id, open_ts_us FROM incidents
                         WHERE channel_id = ?1 AND service = ?2 AND alert = ?3
                           AND open_ts_us < ?4 AND close_ts_us IS NULL
                         ORDER BY open_ts_us DESC
                         LIMIT 1",
                        params![key.channel_id, key.service, key.alert, close_ts.as_micros()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let Some((incident_id, open_ts_us)) = open else {
                    return Err(TxError::Domain(VigilError::NoOpenIncident {
                        channel_id: key.channel_id.clone(),
                        service: key.service.clone(),
                        alert: key.alert.clone(),
                        ts: close_ts.to_string(),
                    }));
                };

                let duration_us = close_ts.as_micros() - open_ts_us;
                tx.execute(
                    "UPDATE incidents
                     SET close_ts = ?1, close_ts_us = ?2, duration_us = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        close_ts.as_str(),
                        close_ts.as_micros(),
                        duration_us,
                        now_timestamp(),
                        incident_id
                    ],
                )?;
                CloseOutcome::Closed {
                    incident_id,
                    duration_us,
                }
            };

            tag_incident_tx(
                &tx,
                &key.channel_id,
                &close_ts,
                IncidentTag {
                    incident_id: outcome.incident_id(),
                    action: Transition::Close,
                },
            )?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tx_err)
}

pub async fn get_incident(db: &Database, id: i64) -> Result<Option<Incident>, VigilError> {
    let row = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1"),
                params![id],
                row_to_incident,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    row.map(decode_incident).transpose()
}

/// All incidents of a channel, oldest open first.
pub async fn list_incidents(db: &Database, channel_id: &str) -> Result<Vec<Incident>, VigilError> {
    let channel_id = channel_id.to_string();
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INCIDENT_COLUMNS} FROM incidents
                 WHERE channel_id = ?1
                 ORDER BY open_ts_us ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![channel_id], row_to_incident)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    rows.into_iter().map(decode_incident).collect()
}

/// The most recently opened incident for `key` that is still open.
pub async fn latest_open_incident(
    db: &Database,
    key: &IncidentKey,
) -> Result<Option<Incident>, VigilError> {
    let key = key.clone();
    let row = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {INCIDENT_COLUMNS} FROM incidents
                     WHERE channel_id = ?1 AND service = ?2 AND alert = ?3 AND close_ts_us IS NULL
                     ORDER BY open_ts_us DESC
                     LIMIT 1"
                ),
                params![key.channel_id, key.service, key.alert],
                row_to_incident,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    row.map(decode_incident).transpose()
}
