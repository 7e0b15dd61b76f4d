// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat platform collaborator.

use async_trait::async_trait;

use crate::error::VigilError;
use crate::traits::adapter::Adapter;
use crate::types::{ChannelInfo, ChatMessage, HistoryPage, SlackTs};

/// Paginated history retrieval and outbound posting.
///
/// Rate limiting must surface as [`VigilError::RateLimited`].
#[async_trait]
pub trait ChatClient: Adapter {
    /// Fetch one page of top-level messages strictly newer than `since`.
    /// `cursor` is the opaque value from the previous page.
    ///
    /// Pages run newest to oldest: the first page holds the newest messages
    /// and each cursor steps further back. Messages within a page are
    /// oldest first.
    async fn fetch_history(
        &self,
        channel_id: &str,
        since: Option<&SlackTs>,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, VigilError>;

    /// The most recent `limit` top-level messages, oldest first.
    async fn fetch_recent(&self, channel_id: &str, limit: u32)
    -> Result<Vec<ChatMessage>, VigilError>;

    /// All replies in a thread, excluding the parent, oldest first.
    async fn fetch_replies(
        &self,
        channel_id: &str,
        parent_ts: &SlackTs,
    ) -> Result<Vec<ChatMessage>, VigilError>;

    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, VigilError>;

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<SlackTs, VigilError>;

    async fn post_thread_reply(
        &self,
        channel_id: &str,
        parent_ts: &SlackTs,
        text: &str,
    ) -> Result<SlackTs, VigilError>;
}
