// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread reply persistence.
//!
//! Replies may arrive before their parent. A reply whose parent is not
//! stored yet is skipped rather than failing the caller; thread backfill
//! picks it up once the parent exists.

use rusqlite::params;
use tracing::debug;
use vigil_core::{ChatMessage, MessageAttrs, SlackTs, StoredThreadMessage, VigilError};

use crate::database::{Database, TxError, is_foreign_key_violation, json_err, map_tr_err, map_tx_err};

/// Result of inserting one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyInsert {
    Inserted,
    Duplicate,
    /// The parent message is not stored (yet).
    MissingParent,
}

pub(crate) fn insert_reply_tx(
    conn: &rusqlite::Connection,
    channel_id: &str,
    parent_ts: &SlackTs,
    msg: &ChatMessage,
) -> Result<ReplyInsert, TxError> {
    let attrs = serde_json::to_string(&MessageAttrs::from_message(msg.clone())).map_err(json_err)?;
    let result = conn.execute(
        "INSERT INTO thread_messages (channel_id, parent_ts, parent_ts_us, ts, ts_us, attrs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT DO NOTHING",
        params![
            channel_id,
            parent_ts.as_str(),
            parent_ts.as_micros(),
            msg.ts.as_str(),
            msg.ts.as_micros(),
            attrs
        ],
    );
    match result {
        Ok(1) => Ok(ReplyInsert::Inserted),
        Ok(_) => Ok(ReplyInsert::Duplicate),
        Err(e) if is_foreign_key_violation(&e) => {
            debug!(channel_id, parent_ts = %parent_ts, ts = %msg.ts, "parent message not stored, skipping reply");
            Ok(ReplyInsert::MissingParent)
        }
        Err(e) => Err(e.into()),
    }
}

/// Store thread replies. Returns how many were newly inserted.
///
/// Replies whose parent is missing are skipped without error.
pub async fn add_thread_messages(
    db: &Database,
    channel_id: &str,
    parent_ts: &SlackTs,
    replies: &[ChatMessage],
) -> Result<usize, VigilError> {
    let channel_id = channel_id.to_string();
    let parent_ts = parent_ts.clone();
    let replies = replies.to_vec();
    db.connection()
        .call(move |conn| -> Result<usize, TxError> {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            for reply in &replies {
                if insert_reply_tx(&tx, &channel_id, &parent_ts, reply)? == ReplyInsert::Inserted {
                    inserted += 1;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tx_err)
}

/// Store a single reply.
pub async fn add_thread_message(
    db: &Database,
    channel_id: &str,
    parent_ts: &SlackTs,
    reply: &ChatMessage,
) -> Result<ReplyInsert, VigilError> {
    let channel_id = channel_id.to_string();
    let parent_ts = parent_ts.clone();
    let reply = reply.clone();
    db.connection()
        .call(move |conn| insert_reply_tx(conn, &channel_id, &parent_ts, &reply))
        .await
        .map_err(map_tx_err)
}

/// Replies to a message, oldest first.
pub async fn list_thread_messages(
    db: &Database,
    channel_id: &str,
    parent_ts: &SlackTs,
) -> Result<Vec<StoredThreadMessage>, VigilError> {
    let channel_id = channel_id.to_string();
    let parent_us = parent_ts.as_micros();
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT channel_id, parent_ts, ts, attrs FROM thread_messages
                 WHERE channel_id = ?1 AND parent_ts_us = ?2
                 ORDER BY ts_us ASC",
            )?;
            let rows = stmt.query_map(params![channel_id, parent_us], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter()
        .map(|(channel_id, parent_ts, ts, attrs)| {
            Ok(StoredThreadMessage {
                channel_id,
                parent_ts: SlackTs::parse(&parent_ts)?,
                ts: SlackTs::parse(&ts)?,
                attrs: serde_json::from_str(&attrs).map_err(VigilError::storage)?,
            })
        })
        .collect()
}
