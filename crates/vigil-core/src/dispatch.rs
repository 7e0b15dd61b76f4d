// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Which jobs a stored message or ingestion page produces, and at what priority.

use std::time::Duration;

use crate::jobs::{ClassifyMessageArgs, IngestChannelArgs, InsertOpts, JobArgs, Priority};
use crate::types::SlackTs;

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// Events and incremental ingestion.
    Live,
    /// Historical import during onboarding.
    Backfill,
}

impl MessageSource {
    pub fn is_backfill(self) -> bool {
        self == Self::Backfill
    }

    pub fn priority(self) -> Priority {
        match self {
            Self::Live => Priority::LIVE,
            Self::Backfill => Priority::BACKFILL,
        }
    }
}

/// The classification job for one newly stored top-level message.
pub fn classification_job(
    channel_id: &str,
    ts: &SlackTs,
    source: MessageSource,
) -> (JobArgs, InsertOpts) {
    let args = JobArgs::ClassifyMessage(ClassifyMessageArgs {
        channel_id: channel_id.to_string(),
        ts: ts.clone(),
        is_backfill: source.is_backfill(),
    });
    (args, InsertOpts::default().with_priority(source.priority()))
}

/// The follow-up ingestion run for a channel.
///
/// A non-empty page may be followed by more history, so the next run is
/// immediate. An empty page means the channel is quiet and the next run
/// waits `empty_backoff`.
pub fn rescan_job(
    channel_id: &str,
    page_was_empty: bool,
    empty_backoff: Duration,
) -> (JobArgs, InsertOpts) {
    let args = JobArgs::IngestChannel(IngestChannelArgs {
        channel_id: channel_id.to_string(),
    });
    let opts = if page_was_empty {
        InsertOpts::default().scheduled_in(empty_backoff)
    } else {
        InsertOpts::default()
    };
    (args, opts)
}
