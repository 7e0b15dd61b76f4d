// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vigil status` command implementation.
//!
//! Reads queue depth per job kind and per-channel incident counts straight
//! from the store, so it works whether or not `vigil serve` is running.

use serde::Serialize;
use strum::IntoEnumIterator;
use vigil_config::VigilConfig;
use vigil_core::{JobKind, JobState, VigilError};
use vigil_storage::Database;
use vigil_storage::queries::{channels, incidents, jobs};

/// Job counts for one kind.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct QueueStatus {
    pub kind: String,
    pub available: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ChannelStatus {
    pub channel_id: String,
    pub enabled: bool,
    pub watermark: Option<String>,
    pub open_incidents: usize,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub queues: Vec<QueueStatus>,
    pub channels: Vec<ChannelStatus>,
}

pub async fn run_status(config: &VigilConfig, json: bool) -> Result<(), VigilError> {
    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    let status = collect_status(&db).await;
    db.close().await?;
    let status = status?;

    if json {
        let rendered = serde_json::to_string_pretty(&status)
            .map_err(|e| VigilError::Internal(format!("failed to encode status: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    println!();
    println!(
        "  {:<18} {:>9} {:>8} {:>10} {:>7} {:>10}",
        "JOB KIND", "AVAILABLE", "RUNNING", "COMPLETED", "FAILED", "CANCELLED"
    );
    for q in &status.queues {
        println!(
            "  {:<18} {:>9} {:>8} {:>10} {:>7} {:>10}",
            q.kind, q.available, q.running, q.completed, q.failed, q.cancelled
        );
    }
    println!();
    for c in &status.channels {
        let flag = if c.enabled { "" } else { " (disabled)" };
        println!(
            "  {}{flag}: watermark {}, {} open incident(s)",
            c.channel_id,
            c.watermark.as_deref().unwrap_or("-"),
            c.open_incidents
        );
    }
    if status.channels.is_empty() {
        println!("  no channels registered");
    }
    println!();
    Ok(())
}

pub async fn collect_status(db: &Database) -> Result<StatusResponse, VigilError> {
    let mut queues = Vec::new();
    for kind in JobKind::iter() {
        let mut queue = QueueStatus {
            kind: kind.to_string(),
            ..QueueStatus::default()
        };
        for (state, count) in jobs::count_by_state(db, kind).await? {
            let slot = match state {
                JobState::Available => &mut queue.available,
                JobState::Running => &mut queue.running,
                JobState::Completed => &mut queue.completed,
                JobState::Failed => &mut queue.failed,
                JobState::Cancelled => &mut queue.cancelled,
            };
            *slot = count;
        }
        queues.push(queue);
    }

    let mut channel_rows = Vec::new();
    for channel in channels::list_channels(db, false).await? {
        let open_incidents = incidents::list_incidents(db, &channel.channel_id)
            .await?
            .iter()
            .filter(|i| i.is_open())
            .count();
        channel_rows.push(ChannelStatus {
            watermark: channel.watermark.map(|ts| ts.as_str().to_string()),
            channel_id: channel.channel_id,
            enabled: channel.enabled,
            open_incidents,
        });
    }

    Ok(StatusResponse {
        queues,
        channels: channel_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vigil_core::dispatch::rescan_job;
    use vigil_core::{ChatMessage, IncidentPriority, MessageSource, SlackTs};
    use vigil_storage::queries::incidents::IncidentKey;
    use vigil_storage::queries::messages;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn empty_store_lists_every_kind() {
        let (db, _dir) = setup_db().await;
        let status = collect_status(&db).await.unwrap();
        assert_eq!(status.queues.len(), JobKind::iter().count());
        assert!(status.queues.iter().all(|q| q.available == 0));
        assert!(status.channels.is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn counts_jobs_and_open_incidents() {
        let (db, _dir) = setup_db().await;
        channels::add_channel(&db, "C1").await.unwrap();
        let (args, opts) = rescan_job("C1", false, std::time::Duration::ZERO);
        jobs::enqueue(&db, &args, &opts).await.unwrap();

        let at = SlackTs::parse("100.000000").unwrap();
        let alert = ChatMessage::new(at.clone(), "U1", "db is down");
        messages::add_message(&db, "C1", &alert, MessageSource::Live)
            .await
            .unwrap();
        let key = IncidentKey::new("C1", "db", "down");
        incidents::open_incident(&db, &key, &at, Some(IncidentPriority::High))
            .await
            .unwrap();

        let status = collect_status(&db).await.unwrap();
        let ingest = status
            .queues
            .iter()
            .find(|q| q.kind == "ingest_channel")
            .unwrap();
        assert_eq!(ingest.available, 1);
        assert_eq!(status.channels.len(), 1);
        assert_eq!(status.channels[0].open_incidents, 1);
        db.close().await.unwrap();
    }
}
