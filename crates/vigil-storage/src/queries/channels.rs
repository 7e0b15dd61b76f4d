// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel registration, metadata, and the per-channel watermark.

use std::str::FromStr;

use rusqlite::{OptionalExtension, Transaction, params};
use vigil_core::{Channel, OnboardingStatus, SlackTs, VigilError};

use crate::database::{Database, map_tr_err, now_timestamp};

const CHANNEL_COLUMNS: &str = "channel_id, name, onboarding, watermark, enabled, created_at";

fn row_to_channel(row: &rusqlite::Row<'_>) -> Result<Channel, rusqlite::Error> {
    let onboarding: Option<String> = row.get(2)?;
    let watermark: Option<String> = row.get(3)?;
    Ok(Channel {
        channel_id: row.get(0)?,
        name: row.get(1)?,
        onboarding: onboarding.and_then(|s| OnboardingStatus::from_str(&s).ok()),
        watermark: watermark.and_then(|s| SlackTs::parse(&s).ok()),
        enabled: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

/// Register a channel. Returns `true` if it was newly created.
pub async fn add_channel(db: &Database, channel_id: &str) -> Result<bool, VigilError> {
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT INTO channels (channel_id) VALUES (?1) ON CONFLICT DO NOTHING",
                params![channel_id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_channel(db: &Database, channel_id: &str) -> Result<Option<Channel>, VigilError> {
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| get_channel_tx(conn, &channel_id))
        .await
        .map_err(map_tr_err)
}

pub(crate) fn get_channel_tx(
    conn: &rusqlite::Connection,
    channel_id: &str,
) -> Result<Option<Channel>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE channel_id = ?1"),
        params![channel_id],
        row_to_channel,
    )
    .optional()
}

/// List channels, oldest registration first.
pub async fn list_channels(db: &Database, enabled_only: bool) -> Result<Vec<Channel>, VigilError> {
    db.connection()
        .call(move |conn| {
            let sql = if enabled_only {
                format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels WHERE enabled = 1
                     ORDER BY created_at ASC, channel_id ASC"
                )
            } else {
                format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY created_at ASC, channel_id ASC"
                )
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_channel)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Enable or disable a channel. Disabled channels are never deleted.
pub async fn set_enabled(db: &Database, channel_id: &str, enabled: bool) -> Result<(), VigilError> {
    let id = channel_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE channels SET enabled = ?1, updated_at = ?2 WHERE channel_id = ?3",
                params![enabled as i64, now_timestamp(), id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    ensure_found(changed, channel_id)
}

pub async fn update_name(db: &Database, channel_id: &str, name: &str) -> Result<(), VigilError> {
    let id = channel_id.to_string();
    let name = name.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE channels SET name = ?1, updated_at = ?2 WHERE channel_id = ?3",
                params![name, now_timestamp(), id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    ensure_found(changed, channel_id)
}

pub async fn set_onboarding(
    db: &Database,
    channel_id: &str,
    status: OnboardingStatus,
) -> Result<(), VigilError> {
    let id = channel_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE channels SET onboarding = ?1, updated_at = ?2 WHERE channel_id = ?3",
                params![status.to_string(), now_timestamp(), id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    ensure_found(changed, channel_id)
}

/// Mark onboarding as started if the channel has never been onboarded.
///
/// Returns `true` when this call made the transition, so exactly one caller
/// schedules the onboarding job.
pub(crate) fn begin_onboarding_tx(
    tx: &Transaction<'_>,
    channel_id: &str,
) -> Result<bool, rusqlite::Error> {
    let changed = tx.execute(
        "UPDATE channels SET onboarding = 'started', updated_at = ?1
         WHERE channel_id = ?2 AND onboarding IS NULL",
        params![now_timestamp(), channel_id],
    )?;
    Ok(changed == 1)
}

/// Advance the watermark to `ts` unless it already points at or past it.
///
/// Returns the watermark after the call, or `None` if the channel does not
/// exist.
pub(crate) fn advance_watermark_tx(
    tx: &Transaction<'_>,
    channel_id: &str,
    ts: &SlackTs,
) -> Result<Option<SlackTs>, rusqlite::Error> {
    let current: Option<Option<String>> = tx
        .query_row(
            "SELECT watermark FROM channels WHERE channel_id = ?1",
            params![channel_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(current) = current else {
        return Ok(None);
    };
    let current = current.and_then(|s| SlackTs::parse(&s).ok());

    match current {
        Some(existing) if existing >= *ts => Ok(Some(existing)),
        _ => {
            tx.execute(
                "UPDATE channels SET watermark = ?1, updated_at = ?2 WHERE channel_id = ?3",
                params![ts.as_str(), now_timestamp(), channel_id],
            )?;
            Ok(Some(ts.clone()))
        }
    }
}

/// Advance the watermark outside of an ingestion page.
pub async fn advance_watermark(
    db: &Database,
    channel_id: &str,
    ts: &SlackTs,
) -> Result<SlackTs, VigilError> {
    let id = channel_id.to_string();
    let ts = ts.clone();
    let result = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let watermark = advance_watermark_tx(&tx, &id, &ts)?;
            tx.commit()?;
            Ok(watermark)
        })
        .await
        .map_err(map_tr_err)?;
    result.ok_or_else(|| VigilError::UnknownChannel {
        channel_id: channel_id.to_string(),
    })
}

fn ensure_found(changed: usize, channel_id: &str) -> Result<(), VigilError> {
    if changed == 0 {
        Err(VigilError::UnknownChannel {
            channel_id: channel_id.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn ts(s: &str) -> SlackTs {
        SlackTs::parse(s).unwrap()
    }

    #[tokio::test]
    async fn add_channel_is_idempotent() {
        let (db, _dir) = setup_db().await;
        assert!(add_channel(&db, "C1").await.unwrap());
        assert!(!add_channel(&db, "C1").await.unwrap());

        let channel = get_channel(&db, "C1").await.unwrap().unwrap();
        assert!(channel.enabled);
        assert!(channel.watermark.is_none());
        assert!(channel.onboarding.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn disabled_channels_are_kept_but_filtered() {
        let (db, _dir) = setup_db().await;
        add_channel(&db, "C1").await.unwrap();
        add_channel(&db, "C2").await.unwrap();
        set_enabled(&db, "C2", false).await.unwrap();

        assert_eq!(list_channels(&db, false).await.unwrap().len(), 2);
        let enabled = list_channels(&db, true).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].channel_id, "C1");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn updates_on_unknown_channel_fail() {
        let (db, _dir) = setup_db().await;
        let err = set_enabled(&db, "nope", false).await.unwrap_err();
        assert!(matches!(err, VigilError::UnknownChannel { .. }));
        let err = update_name(&db, "nope", "ops").await.unwrap_err();
        assert!(matches!(err, VigilError::UnknownChannel { .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn name_and_onboarding_are_stored() {
        let (db, _dir) = setup_db().await;
        add_channel(&db, "C1").await.unwrap();
        update_name(&db, "C1", "ops-alerts").await.unwrap();
        set_onboarding(&db, "C1", OnboardingStatus::Finished).await.unwrap();

        let channel = get_channel(&db, "C1").await.unwrap().unwrap();
        assert_eq!(channel.name.as_deref(), Some("ops-alerts"));
        assert_eq!(channel.onboarding, Some(OnboardingStatus::Finished));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn watermark_never_moves_backwards() {
        let (db, _dir) = setup_db().await;
        add_channel(&db, "C1").await.unwrap();

        assert_eq!(advance_watermark(&db, "C1", &ts("100.000000")).await.unwrap(), ts("100.000000"));
        assert_eq!(advance_watermark(&db, "C1", &ts("102.000000")).await.unwrap(), ts("102.000000"));
        // Older and equal timestamps leave it alone.
        assert_eq!(advance_watermark(&db, "C1", &ts("101.000000")).await.unwrap(), ts("102.000000"));
        assert_eq!(advance_watermark(&db, "C1", &ts("102.0")).await.unwrap(), ts("102.000000"));

        let channel = get_channel(&db, "C1").await.unwrap().unwrap();
        assert_eq!(channel.watermark.unwrap().as_str(), "102.000000");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn watermark_compares_numerically() {
        let (db, _dir) = setup_db().await;
        add_channel(&db, "C1").await.unwrap();
        advance_watermark(&db, "C1", &ts("99.000000")).await.unwrap();
        // Lexicographically "100..." < "99...", numerically it is newer.
        let wm = advance_watermark(&db, "C1", &ts("100.000000")).await.unwrap();
        assert_eq!(wm, ts("100.000000"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn watermark_on_unknown_channel_fails() {
        let (db, _dir) = setup_db().await;
        let err = advance_watermark(&db, "nope", &ts("1.0")).await.unwrap_err();
        assert!(matches!(err, VigilError::UnknownChannel { channel_id } if channel_id == "nope"));
        db.close().await.unwrap();
    }
}
