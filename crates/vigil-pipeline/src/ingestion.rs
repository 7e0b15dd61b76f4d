// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watermark-based channel ingestion.
//!
//! One run reads every message newer than the channel's watermark, page by
//! page. Each page is committed on its own together with its classification
//! jobs. Pages arrive newest first, so the watermark is held until the last
//! (oldest) page, which advances it to the newest message of the whole run
//! and schedules the next run. An interrupted run leaves the watermark where
//! it was; the rerun fetches the same range again and stored messages are
//! skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vigil_core::dispatch::rescan_job;
use vigil_core::{ChatClient, Job, JobArgs, JobKind, MessageSource, SlackTs, VigilError};
use vigil_storage::queries::{channels, ingest};
use vigil_storage::{Database, IngestBatch, WatermarkAdvance};

use crate::runner::{JobWorker, unexpected_job};

/// Totals for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionRun {
    pub pages: usize,
    pub inserted: usize,
}

pub struct IngestionWorker {
    db: Database,
    chat: Arc<dyn ChatClient>,
    empty_backoff: Duration,
}

impl IngestionWorker {
    pub fn new(db: Database, chat: Arc<dyn ChatClient>, empty_backoff: Duration) -> Self {
        Self {
            db,
            chat,
            empty_backoff,
        }
    }

    /// Ingest everything after the watermark of `channel_id`.
    ///
    /// A disabled channel is skipped and not rescheduled.
    pub async fn ingest(
        &self,
        channel_id: &str,
        cancel: &CancellationToken,
    ) -> Result<IngestionRun, VigilError> {
        let channel = channels::get_channel(&self.db, channel_id)
            .await?
            .ok_or_else(|| VigilError::UnknownChannel {
                channel_id: channel_id.to_string(),
            })?;
        if !channel.enabled {
            info!(channel_id, "channel disabled, ingestion stopped");
            return Ok(IngestionRun::default());
        }

        // `since` stays fixed for the whole run; the cursor walks the pages.
        let since = channel.watermark;
        let mut cursor: Option<String> = None;
        let mut newest: Option<SlackTs> = None;
        let mut run = IngestionRun::default();

        loop {
            if cancel.is_cancelled() {
                info!(channel_id, pages = run.pages, "ingestion cancelled between pages");
                return Err(VigilError::Cancelled);
            }

            let page = self
                .chat
                .fetch_history(channel_id, since.as_ref(), cursor.as_deref())
                .await?;
            let last = page.is_last();
            if let Some(page_newest) = page.messages.iter().map(|m| &m.ts).max()
                && newest.as_ref().is_none_or(|n| page_newest > n)
            {
                newest = Some(page_newest.clone());
            }

            let mut batch = IngestBatch::new(channel_id, page.messages, MessageSource::Live)
                .with_watermark(WatermarkAdvance::Hold);
            if last {
                batch = batch.with_follow_up(rescan_job(
                    channel_id,
                    newest.is_none(),
                    self.empty_backoff,
                ));
                if let Some(newest) = &newest {
                    batch = batch.with_watermark(WatermarkAdvance::To(newest.clone()));
                }
            }
            let outcome = ingest::ingest_page(&self.db, batch).await?;

            run.pages += 1;
            run.inserted += outcome.inserted.len();
            debug!(
                channel_id,
                page = run.pages,
                inserted = outcome.inserted.len(),
                watermark = ?outcome.watermark.as_ref().map(|t| t.as_str()),
                "page ingested"
            );

            if last {
                break;
            }
            cursor = page.next_cursor;
        }

        if run.inserted > 0 {
            info!(channel_id, pages = run.pages, inserted = run.inserted, "channel ingested");
        }
        Ok(run)
    }
}

#[async_trait]
impl JobWorker for IngestionWorker {
    fn kind(&self) -> JobKind {
        JobKind::IngestChannel
    }

    async fn work(&self, job: &Job, cancel: &CancellationToken) -> Result<(), VigilError> {
        let JobArgs::IngestChannel(args) = &job.args else {
            return Err(unexpected_job(self.kind(), job));
        };
        self.ingest(&args.channel_id, cancel).await.map(|_| ())
    }
}
