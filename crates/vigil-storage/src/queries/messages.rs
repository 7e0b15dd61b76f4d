// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level message persistence and attribute updates.

use rusqlite::{OptionalExtension, params};
use vigil_core::dispatch::{MessageSource, classification_job};
use vigil_core::{
    ChatMessage, IncidentAction, IncidentTag, MessageAttrs, SenderTag, SlackTs, StoredMessage,
    VigilError,
};

use crate::database::{
    Database, TxError, json_err, map_tr_err, map_tx_err, now_timestamp, unknown_channel_on_fk,
};
use crate::queries::jobs::insert_job_tx;

/// Convert an f32 vector to a little-endian BLOB.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a BLOB back to an f32 vector. Trailing partial chunks are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

type MessageRow = (String, String, String, Option<Vec<u8>>);

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<MessageRow, rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_message((channel_id, ts, attrs, embedding): MessageRow) -> Result<StoredMessage, VigilError> {
    Ok(StoredMessage {
        channel_id,
        ts: SlackTs::parse(&ts)?,
        attrs: serde_json::from_str(&attrs).map_err(VigilError::storage)?,
        embedding: embedding.map(|b| blob_to_vec(&b)),
    })
}

/// Insert a message unless `(channel_id, ts)` is already stored.
///
/// Returns `true` only for a new row. Fails with a foreign-key violation if
/// the channel is unknown.
pub(crate) fn insert_message_tx(
    conn: &rusqlite::Connection,
    channel_id: &str,
    msg: &ChatMessage,
) -> Result<bool, TxError> {
    let attrs = serde_json::to_string(&MessageAttrs::from_message(msg.clone())).map_err(json_err)?;
    let changed = conn
        .execute(
            "INSERT INTO messages (channel_id, ts, ts_us, attrs) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT DO NOTHING",
            params![channel_id, msg.ts.as_str(), msg.ts.as_micros(), attrs],
        )
        .map_err(|e| unknown_channel_on_fk(e, channel_id))?;
    Ok(changed == 1)
}

/// Store one top-level message and, if it is new, its classification job.
///
/// Both writes share a transaction. Returns `true` if the message was new.
pub async fn add_message(
    db: &Database,
    channel_id: &str,
    msg: &ChatMessage,
    source: MessageSource,
) -> Result<bool, VigilError> {
    let channel_id = channel_id.to_string();
    let msg = msg.clone();
    db.connection()
        .call(move |conn| -> Result<bool, TxError> {
            let tx = conn.transaction()?;
            let inserted = insert_message_tx(&tx, &channel_id, &msg)?;
            if inserted {
                let (args, opts) = classification_job(&channel_id, &msg.ts, source);
                insert_job_tx(&tx, &args, &opts)?;
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tx_err)
}

pub async fn get_message(
    db: &Database,
    channel_id: &str,
    ts: &SlackTs,
) -> Result<Option<StoredMessage>, VigilError> {
    let channel_id = channel_id.to_string();
    let ts_us = ts.as_micros();
    let row = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT channel_id, ts, attrs, embedding FROM messages
                 WHERE channel_id = ?1 AND ts_us = ?2",
                params![channel_id, ts_us],
                row_to_message,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    row.map(decode_message).transpose()
}

/// All stored messages of a channel, oldest first.
pub async fn list_messages(db: &Database, channel_id: &str) -> Result<Vec<StoredMessage>, VigilError> {
    let channel_id = channel_id.to_string();
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT channel_id, ts, attrs, embedding FROM messages
                 WHERE channel_id = ?1 ORDER BY ts_us ASC",
            )?;
            let rows = stmt.query_map(params![channel_id], row_to_message)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    rows.into_iter().map(decode_message).collect()
}

/// Read-modify-write of a message's attribute bag.
///
/// Returns `false` if the message does not exist.
pub(crate) fn modify_attrs_tx(
    conn: &rusqlite::Connection,
    channel_id: &str,
    ts: &SlackTs,
    embedding: Option<&[f32]>,
    f: impl FnOnce(&mut MessageAttrs),
) -> Result<bool, TxError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT attrs FROM messages WHERE channel_id = ?1 AND ts_us = ?2",
            params![channel_id, ts.as_micros()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(false);
    };

    let mut attrs: MessageAttrs = serde_json::from_str(&raw).map_err(json_err)?;
    f(&mut attrs);
    let updated = serde_json::to_string(&attrs).map_err(json_err)?;

    match embedding {
        Some(vector) => conn.execute(
            "UPDATE messages SET attrs = ?1, embedding = ?2, updated_at = ?3
             WHERE channel_id = ?4 AND ts_us = ?5",
            params![updated, vec_to_blob(vector), now_timestamp(), channel_id, ts.as_micros()],
        )?,
        None => conn.execute(
            "UPDATE messages SET attrs = ?1, updated_at = ?2
             WHERE channel_id = ?3 AND ts_us = ?4",
            params![updated, now_timestamp(), channel_id, ts.as_micros()],
        )?,
    };
    Ok(true)
}

async fn modify_attrs(
    db: &Database,
    channel_id: &str,
    ts: &SlackTs,
    embedding: Option<Vec<f32>>,
    f: impl FnOnce(&mut MessageAttrs) + Send + 'static,
) -> Result<(), VigilError> {
    let id = channel_id.to_string();
    let key = ts.clone();
    let found = db
        .connection()
        .call(move |conn| modify_attrs_tx(conn, &id, &key, embedding.as_deref(), f))
        .await
        .map_err(map_tx_err)?;
    if found {
        Ok(())
    } else {
        Err(VigilError::MessageNotFound {
            channel_id: channel_id.to_string(),
            ts: ts.to_string(),
        })
    }
}

/// Write classifier output and the embedding in a single update.
///
/// The action is only recorded when it is not `none`; the embedding is
/// always written.
pub async fn update_classification(
    db: &Database,
    channel_id: &str,
    ts: &SlackTs,
    action: &IncidentAction,
    embedding: Vec<f32>,
) -> Result<(), VigilError> {
    let action = (!action.is_none()).then(|| action.clone());
    modify_attrs(db, channel_id, ts, Some(embedding), move |attrs| {
        if let Some(action) = action {
            attrs.v1_mut().incident_action = Some(action);
        }
    })
    .await
}

/// Apply a reaction added (`+1`) or removed (`-1`) event.
pub async fn apply_reaction(
    db: &Database,
    channel_id: &str,
    ts: &SlackTs,
    reaction: &str,
    delta: i64,
) -> Result<(), VigilError> {
    let reaction = reaction.to_string();
    modify_attrs(db, channel_id, ts, None, move |attrs| {
        attrs.apply_reaction(&reaction, delta);
    })
    .await
}

pub async fn tag_sender(
    db: &Database,
    channel_id: &str,
    ts: &SlackTs,
    sender: SenderTag,
) -> Result<(), VigilError> {
    modify_attrs(db, channel_id, ts, None, move |attrs| {
        attrs.v1_mut().sender = Some(sender);
    })
    .await
}

/// Record which incident a message opened or closed.
pub(crate) fn tag_incident_tx(
    conn: &rusqlite::Connection,
    channel_id: &str,
    ts: &SlackTs,
    tag: IncidentTag,
) -> Result<bool, TxError> {
    modify_attrs_tx(conn, channel_id, ts, None, move |attrs| {
        attrs.v1_mut().incident = Some(tag);
    })
}
