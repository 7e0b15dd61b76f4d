// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel onboarding, channel metadata refresh, and thread backfill.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vigil_core::dispatch::rescan_job;
use vigil_core::jobs::{BackfillThreadArgs, InsertOpts, Priority};
use vigil_core::{ChatClient, Job, JobArgs, JobKind, MessageSource, SlackTs, VigilError};
use vigil_storage::queries::{channels, ingest, threads};
use vigil_storage::{Database, IngestBatch, IngestOutcome};

use crate::runner::{JobWorker, unexpected_job};

/// Replies are mostly fetched right after onboarding, when rate limits bite.
const THREAD_RETRY: Duration = Duration::from_secs(30);

/// Imports recent history for a newly seen channel and starts ingestion.
pub struct OnboardWorker {
    db: Database,
    chat: Arc<dyn ChatClient>,
    empty_backoff: Duration,
}

impl OnboardWorker {
    pub fn new(db: Database, chat: Arc<dyn ChatClient>, empty_backoff: Duration) -> Self {
        Self {
            db,
            chat,
            empty_backoff,
        }
    }

    /// Store the last `last_n_msgs` messages as backfill.
    ///
    /// The messages, their backfill-priority classification jobs, one
    /// thread backfill job per message with replies, the finished marker,
    /// and the first ingestion run are committed together.
    pub async fn onboard(
        &self,
        channel_id: &str,
        last_n_msgs: u32,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, VigilError> {
        let info = self.chat.channel_info(channel_id).await?;
        let recent = self.chat.fetch_recent(channel_id, last_n_msgs).await?;
        if cancel.is_cancelled() {
            return Err(VigilError::Cancelled);
        }

        channels::update_name(&self.db, channel_id, &info.name).await?;

        let threads: Vec<SlackTs> = recent
            .iter()
            .filter(|m| m.reply_count > 0 && !m.is_thread_reply())
            .map(|m| m.ts.clone())
            .collect();

        let mut batch = IngestBatch::new(channel_id, recent, MessageSource::Backfill);
        batch.finish_onboarding = true;
        for parent_ts in threads {
            batch = batch.with_follow_up(backfill_thread_job(channel_id, parent_ts));
        }
        batch = batch.with_follow_up(rescan_job(channel_id, false, self.empty_backoff));

        let outcome = ingest::ingest_page(&self.db, batch).await?;
        info!(
            channel_id,
            name = %info.name,
            backfilled = outcome.inserted.len(),
            watermark = ?outcome.watermark.as_ref().map(|t| t.as_str()),
            "channel onboarded"
        );
        Ok(outcome)
    }
}

fn backfill_thread_job(channel_id: &str, parent_ts: SlackTs) -> (JobArgs, InsertOpts) {
    let args = JobArgs::BackfillThread(BackfillThreadArgs {
        channel_id: channel_id.to_string(),
        parent_ts,
    });
    (args, InsertOpts::default().with_priority(Priority::BACKFILL))
}

#[async_trait]
impl JobWorker for OnboardWorker {
    fn kind(&self) -> JobKind {
        JobKind::ChannelOnboard
    }

    async fn work(&self, job: &Job, cancel: &CancellationToken) -> Result<(), VigilError> {
        let JobArgs::ChannelOnboard(args) = &job.args else {
            return Err(unexpected_job(self.kind(), job));
        };
        self.onboard(&args.channel_id, args.last_n_msgs, cancel)
            .await
            .map(|_| ())
    }
}

/// Refreshes a channel's display name.
pub struct ChannelInfoWorker {
    db: Database,
    chat: Arc<dyn ChatClient>,
}

impl ChannelInfoWorker {
    pub fn new(db: Database, chat: Arc<dyn ChatClient>) -> Self {
        Self { db, chat }
    }
}

#[async_trait]
impl JobWorker for ChannelInfoWorker {
    fn kind(&self) -> JobKind {
        JobKind::ChannelInfo
    }

    async fn work(&self, job: &Job, _cancel: &CancellationToken) -> Result<(), VigilError> {
        let JobArgs::ChannelInfo(args) = &job.args else {
            return Err(unexpected_job(self.kind(), job));
        };
        let info = self.chat.channel_info(&args.channel_id).await?;
        channels::update_name(&self.db, &args.channel_id, &info.name).await?;
        debug!(channel_id = %args.channel_id, name = %info.name, "channel info refreshed");
        Ok(())
    }
}

/// Stores the replies of one thread.
pub struct BackfillThreadWorker {
    db: Database,
    chat: Arc<dyn ChatClient>,
}

impl BackfillThreadWorker {
    pub fn new(db: Database, chat: Arc<dyn ChatClient>) -> Self {
        Self { db, chat }
    }

    /// Returns how many replies were newly stored. Replies whose parent is
    /// not stored are skipped.
    pub async fn backfill(&self, channel_id: &str, parent_ts: &SlackTs) -> Result<usize, VigilError> {
        let replies = self.chat.fetch_replies(channel_id, parent_ts).await?;
        if replies.is_empty() {
            return Ok(0);
        }
        let inserted = threads::add_thread_messages(&self.db, channel_id, parent_ts, &replies).await?;
        debug!(channel_id, parent_ts = %parent_ts, fetched = replies.len(), inserted, "thread backfilled");
        Ok(inserted)
    }
}

#[async_trait]
impl JobWorker for BackfillThreadWorker {
    fn kind(&self) -> JobKind {
        JobKind::BackfillThread
    }

    fn next_retry(&self, _job: &Job) -> Option<Duration> {
        Some(THREAD_RETRY)
    }

    async fn work(&self, job: &Job, _cancel: &CancellationToken) -> Result<(), VigilError> {
        let JobArgs::BackfillThread(args) = &job.args else {
            return Err(unexpected_job(self.kind(), job));
        };
        self.backfill(&args.channel_id, &args.parent_ts)
            .await
            .map(|_| ())
    }
}
