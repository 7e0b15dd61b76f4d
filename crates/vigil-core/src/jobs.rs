// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background job payloads and queue options.
//!
//! Every job is persisted as a tagged JSON payload in the `jobs` table. The
//! tag doubles as the job kind workers subscribe to.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::types::SlackTs;

/// Job kinds, one per worker.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    IngestChannel,
    ClassifyMessage,
    ChannelInfo,
    ChannelOnboard,
    BackfillThread,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestChannelArgs {
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyMessageArgs {
    pub channel_id: String,
    pub ts: SlackTs,
    pub is_backfill: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfoArgs {
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOnboardArgs {
    pub channel_id: String,
    pub last_n_msgs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillThreadArgs {
    pub channel_id: String,
    pub parent_ts: SlackTs,
}

/// Typed job payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobArgs {
    IngestChannel(IngestChannelArgs),
    ClassifyMessage(ClassifyMessageArgs),
    ChannelInfo(ChannelInfoArgs),
    ChannelOnboard(ChannelOnboardArgs),
    BackfillThread(BackfillThreadArgs),
}

impl JobArgs {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::IngestChannel(_) => JobKind::IngestChannel,
            Self::ClassifyMessage(_) => JobKind::ClassifyMessage,
            Self::ChannelInfo(_) => JobKind::ChannelInfo,
            Self::ChannelOnboard(_) => JobKind::ChannelOnboard,
            Self::BackfillThread(_) => JobKind::BackfillThread,
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Self::IngestChannel(a) => &a.channel_id,
            Self::ClassifyMessage(a) => &a.channel_id,
            Self::ChannelInfo(a) => &a.channel_id,
            Self::ChannelOnboard(a) => &a.channel_id,
            Self::BackfillThread(a) => &a.channel_id,
        }
    }

    /// Identity used to collapse duplicate pending jobs.
    ///
    /// Classification jobs carry none: one is created per newly stored
    /// message, and message inserts are already deduplicated.
    pub fn unique_key(&self) -> Option<String> {
        match self {
            Self::IngestChannel(a) => Some(a.channel_id.clone()),
            Self::ChannelInfo(a) => Some(a.channel_id.clone()),
            Self::ChannelOnboard(a) => Some(a.channel_id.clone()),
            Self::BackfillThread(a) => Some(format!("{}:{}", a.channel_id, a.parent_ts)),
            Self::ClassifyMessage(_) => None,
        }
    }
}

/// Attempt budget for jobs inserted without an explicit override.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Queue priority. Lower numbers run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub u8);

impl Priority {
    /// Interactive traffic.
    pub const LIVE: Priority = Priority(1);
    /// Historical imports; never starves live traffic.
    pub const BACKFILL: Priority = Priority(4);
}

impl Default for Priority {
    fn default() -> Self {
        Self::LIVE
    }
}

/// Options for inserting a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOpts {
    pub priority: Priority,
    /// `None` runs as soon as a worker is free.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Collapse into an existing pending job with the same unique key.
    pub unique_by_args: bool,
    /// Overrides the queue-wide attempt budget.
    pub max_attempts: Option<u32>,
}

impl Default for InsertOpts {
    fn default() -> Self {
        Self {
            priority: Priority::LIVE,
            scheduled_at: None,
            unique_by_args: true,
            max_attempts: None,
        }
    }
}

impl InsertOpts {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn scheduled_in(mut self, delay: Duration) -> Self {
        self.scheduled_at = chrono::Duration::from_std(delay)
            .ok()
            .map(|d| Utc::now() + d);
        self
    }
}

/// Lifecycle state of a job row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Available,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A job row claimed by a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i64,
    pub args: JobArgs,
    pub priority: Priority,
    pub state: JobState,
    /// Attempts started so far, including the current one.
    pub attempt: u32,
    pub max_attempts: u32,
    pub scheduled_at: String,
    pub last_error: Option<String>,
}

impl Job {
    pub fn kind(&self) -> JobKind {
        self.args.kind()
    }

    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Timestamp format used for every TEXT time column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
