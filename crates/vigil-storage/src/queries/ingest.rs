// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Page-at-a-time ingestion and channel intake.
//!
//! A page is applied in one transaction: messages, their classification
//! jobs, the watermark advance and any follow-up jobs commit together or not
//! at all.
//!
//! By default a page advances the watermark to its newest message. Callers
//! walking history newest-first hold the watermark on every page but the
//! last, so a failed run never leaves it above unfetched messages.

use rusqlite::params;
use tracing::debug;
use vigil_core::dispatch::{MessageSource, classification_job};
use vigil_core::jobs::InsertOpts;
use vigil_core::{ChatMessage, JobArgs, SlackTs, VigilError};

use crate::database::{Database, TxError, map_tx_err, now_timestamp};
use crate::queries::channels::{advance_watermark_tx, begin_onboarding_tx, get_channel_tx};
use crate::queries::jobs::insert_job_tx;
use crate::queries::messages::insert_message_tx;
use crate::queries::threads::{ReplyInsert, insert_reply_tx};

/// How a committed page moves the channel watermark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WatermarkAdvance {
    /// Advance to the newest message on the page.
    #[default]
    PageNewest,
    /// Leave the watermark where it is.
    Hold,
    /// Advance to this timestamp.
    To(SlackTs),
}

/// One page of channel history to persist.
#[derive(Debug, Clone)]
pub struct IngestBatch {
    pub channel_id: String,
    /// Messages in timestamp order. Thread replies are routed to the thread
    /// table and never produce classification jobs.
    pub messages: Vec<ChatMessage>,
    pub source: MessageSource,
    /// Extra jobs committed with the page, such as the next ingestion run.
    pub follow_up: Vec<(JobArgs, InsertOpts)>,
    /// Mark the channel's onboarding as finished in the same transaction.
    pub finish_onboarding: bool,
    pub watermark: WatermarkAdvance,
}

impl IngestBatch {
    pub fn new(channel_id: impl Into<String>, messages: Vec<ChatMessage>, source: MessageSource) -> Self {
        Self {
            channel_id: channel_id.into(),
            messages,
            source,
            follow_up: Vec::new(),
            finish_onboarding: false,
            watermark: WatermarkAdvance::PageNewest,
        }
    }

    pub fn with_watermark(mut self, watermark: WatermarkAdvance) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn with_follow_up(mut self, job: (JobArgs, InsertOpts)) -> Self {
        self.follow_up.push(job);
        self
    }
}

/// What a committed page changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Top-level messages newly stored, each with one classification job.
    pub inserted: Vec<SlackTs>,
    /// Thread replies newly stored.
    pub replies: usize,
    /// Watermark after the page. `None` only if the channel never had one
    /// and the page was empty.
    pub watermark: Option<SlackTs>,
    /// Classification and follow-up jobs that produced or matched a row.
    pub jobs_enqueued: usize,
}

/// Persist one page of history.
///
/// Fails with [`VigilError::UnknownChannel`] before writing anything if the
/// channel is not registered.
pub async fn ingest_page(db: &Database, batch: IngestBatch) -> Result<IngestOutcome, VigilError> {
    db.connection()
        .call(move |conn| -> Result<IngestOutcome, TxError> {
            let tx = conn.transaction()?;
            let channel_id = batch.channel_id.as_str();

            let Some(channel) = get_channel_tx(&tx, channel_id)? else {
                return Err(TxError::Domain(VigilError::UnknownChannel {
                    channel_id: channel_id.to_string(),
                }));
            };

            let mut outcome = IngestOutcome {
                watermark: channel.watermark,
                ..IngestOutcome::default()
            };

            for msg in &batch.messages {
                if let Some(parent) = msg.thread_ts.as_ref().filter(|_| msg.is_thread_reply()) {
                    if insert_reply_tx(&tx, channel_id, parent, msg)? == ReplyInsert::Inserted {
                        outcome.replies += 1;
                    }
                    continue;
                }
                if insert_message_tx(&tx, channel_id, msg)? {
                    let (args, opts) = classification_job(channel_id, &msg.ts, batch.source);
                    insert_job_tx(&tx, &args, &opts)?;
                    outcome.jobs_enqueued += 1;
                    outcome.inserted.push(msg.ts.clone());
                }
            }

            let target = match &batch.watermark {
                WatermarkAdvance::PageNewest => batch.messages.iter().map(|m| &m.ts).max(),
                WatermarkAdvance::Hold => None,
                WatermarkAdvance::To(ts) => Some(ts),
            };
            if let Some(target) = target {
                outcome.watermark = advance_watermark_tx(&tx, channel_id, target)?;
            }

            for (args, opts) in &batch.follow_up {
                insert_job_tx(&tx, args, opts)?;
                outcome.jobs_enqueued += 1;
            }

            if batch.finish_onboarding {
                tx.execute(
                    "UPDATE channels SET onboarding = 'finished', updated_at = ?1
                     WHERE channel_id = ?2",
                    params![now_timestamp(), channel_id],
                )?;
            }

            tx.commit()?;
            debug!(
                channel_id,
                inserted = outcome.inserted.len(),
                replies = outcome.replies,
                watermark = ?outcome.watermark,
                "ingested page"
            );
            Ok(outcome)
        })
        .await
        .map_err(map_tx_err)
}

/// Make sure a channel seen in live traffic is registered.
///
/// The first call for a never-onboarded channel marks onboarding as started
/// and enqueues `onboarding`. Returns `true` if that happened.
pub async fn observe_channel(
    db: &Database,
    channel_id: &str,
    onboarding: (JobArgs, InsertOpts),
) -> Result<bool, VigilError> {
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, TxError> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO channels (channel_id) VALUES (?1) ON CONFLICT DO NOTHING",
                params![channel_id],
            )?;
            let started = begin_onboarding_tx(&tx, &channel_id)?;
            if started {
                let (args, opts) = &onboarding;
                insert_job_tx(&tx, args, opts)?;
            }
            tx.commit()?;
            Ok(started)
        })
        .await
        .map_err(map_tx_err)
}
