// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live chat events: new messages and reaction changes.

use tracing::{debug, info};
use vigil_core::jobs::{ChannelOnboardArgs, InsertOpts};
use vigil_core::{ChatMessage, JobArgs, MessageSource, SlackTs, VigilError};
use vigil_storage::Database;
use vigil_storage::queries::threads::{self, ReplyInsert};
use vigil_storage::queries::{ingest, messages};

/// What storing a live message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageIntake {
    /// New top-level message, with a live classification job.
    Stored,
    /// New thread reply.
    Reply,
    /// Already stored.
    Duplicate,
    /// Reply to a message that is not stored; dropped.
    Orphan,
}

/// Stores live chat events.
pub struct EventIntake {
    db: Database,
    onboard_last_n_msgs: u32,
}

impl EventIntake {
    pub fn new(db: Database, onboard_last_n_msgs: u32) -> Self {
        Self {
            db,
            onboard_last_n_msgs,
        }
    }

    /// Register `channel_id` if needed; the first sighting schedules onboarding.
    pub async fn observe_channel(&self, channel_id: &str) -> Result<bool, VigilError> {
        let onboarding = JobArgs::ChannelOnboard(ChannelOnboardArgs {
            channel_id: channel_id.to_string(),
            last_n_msgs: self.onboard_last_n_msgs,
        });
        let scheduled = ingest::observe_channel(&self.db, channel_id, (onboarding, InsertOpts::default()))
            .await?;
        if scheduled {
            info!(channel_id, "new channel, onboarding scheduled");
        }
        Ok(scheduled)
    }

    pub async fn notify_message(
        &self,
        channel_id: &str,
        message: &ChatMessage,
    ) -> Result<MessageIntake, VigilError> {
        self.observe_channel(channel_id).await?;

        let intake = match message.thread_ts.as_ref() {
            Some(parent_ts) if message.is_thread_reply() => {
                match threads::add_thread_message(&self.db, channel_id, parent_ts, message).await? {
                    ReplyInsert::Inserted => MessageIntake::Reply,
                    ReplyInsert::Duplicate => MessageIntake::Duplicate,
                    ReplyInsert::MissingParent => MessageIntake::Orphan,
                }
            }
            _ => {
                if messages::add_message(&self.db, channel_id, message, MessageSource::Live).await? {
                    MessageIntake::Stored
                } else {
                    MessageIntake::Duplicate
                }
            }
        };
        debug!(channel_id, ts = %message.ts, ?intake, "live message");
        Ok(intake)
    }

    /// Apply a reaction added or removed event.
    ///
    /// Returns `false` when the message is not stored.
    pub async fn notify_reaction(
        &self,
        channel_id: &str,
        ts: &SlackTs,
        reaction: &str,
        added: bool,
    ) -> Result<bool, VigilError> {
        let delta = if added { 1 } else { -1 };
        match messages::apply_reaction(&self.db, channel_id, ts, reaction, delta).await {
            Ok(()) => Ok(true),
            Err(VigilError::MessageNotFound { .. }) => {
                debug!(channel_id, ts = %ts, reaction, "reaction on unknown message ignored");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
