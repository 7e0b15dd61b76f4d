// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory chat platform for deterministic testing.
//!
//! `MockChat` implements `ChatClient` over seeded channel histories, with
//! cursor pagination, injectable failures, and capture of posted messages.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use vigil_core::{
    Adapter, ChannelInfo, ChatClient, ChatMessage, HealthStatus, HistoryPage, SlackTs, VigilError,
};

/// A message posted through the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel_id: String,
    pub thread_ts: Option<SlackTs>,
    pub text: String,
    pub ts: SlackTs,
}

/// A mock chat platform.
///
/// History pages hold at most `page_size` messages and run newest to
/// oldest, like Slack. Cursors count the messages already returned, encoded
/// as a string.
pub struct MockChat {
    page_size: usize,
    history: Mutex<HashMap<String, Vec<ChatMessage>>>,
    replies: Mutex<HashMap<(String, SlackTs), Vec<ChatMessage>>>,
    names: Mutex<HashMap<String, String>>,
    failures: Mutex<VecDeque<VigilError>>,
    history_failure: Mutex<Option<(usize, VigilError)>>,
    posted: Mutex<Vec<PostedMessage>>,
    history_calls: AtomicUsize,
}

impl MockChat {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            history: Mutex::new(HashMap::new()),
            replies: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            history_failure: Mutex::new(None),
            posted: Mutex::new(Vec::new()),
            history_calls: AtomicUsize::new(0),
        }
    }

    /// Append top-level messages to a channel's history.
    pub async fn push_messages(&self, channel_id: &str, messages: Vec<ChatMessage>) {
        let mut history = self.history.lock().await;
        let entry = history.entry(channel_id.to_string()).or_default();
        entry.extend(messages);
        entry.sort_by(|a, b| a.ts.cmp(&b.ts));
    }

    pub async fn set_replies(&self, channel_id: &str, parent_ts: &SlackTs, replies: Vec<ChatMessage>) {
        self.replies
            .lock()
            .await
            .insert((channel_id.to_string(), parent_ts.clone()), replies);
    }

    pub async fn set_channel_name(&self, channel_id: &str, name: &str) {
        self.names
            .lock()
            .await
            .insert(channel_id.to_string(), name.to_string());
    }

    /// Make the next platform call fail with `error`.
    pub async fn fail_next(&self, error: VigilError) {
        self.failures.lock().await.push_back(error);
    }

    /// Make the `call`-th history fetch (1-based, counted over the mock's
    /// lifetime) fail with `error`.
    pub async fn fail_history_call(&self, call: usize, error: VigilError) {
        *self.history_failure.lock().await = Some((call, error));
    }

    pub async fn posted(&self) -> Vec<PostedMessage> {
        self.posted.lock().await.clone()
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    async fn take_failure(&self) -> Result<(), VigilError> {
        match self.failures.lock().await.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn post(
        &self,
        channel_id: &str,
        thread_ts: Option<&SlackTs>,
        text: &str,
    ) -> Result<SlackTs, VigilError> {
        self.take_failure().await?;
        let mut posted = self.posted.lock().await;
        let ts = SlackTs::from_micros(1_900_000_000_000_000 + posted.len() as i64);
        posted.push(PostedMessage {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.cloned(),
            text: text.to_string(),
            ts: ts.clone(),
        });
        Ok(ts)
    }
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MockChat {
    fn name(&self) -> &str {
        "mock-chat"
    }

    async fn health_check(&self) -> Result<HealthStatus, VigilError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ChatClient for MockChat {
    async fn fetch_history(
        &self,
        channel_id: &str,
        since: Option<&SlackTs>,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, VigilError> {
        let call = self.history_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.take_failure().await?;
        {
            let mut planned = self.history_failure.lock().await;
            if planned.as_ref().is_some_and(|(at, _)| *at == call)
                && let Some((_, error)) = planned.take()
            {
                return Err(error);
            }
        }

        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| VigilError::Chat {
                    message: format!("invalid cursor `{c}`"),
                    source: None,
                })?,
            None => 0,
        };
        let history = self.history.lock().await;
        let newer: Vec<&ChatMessage> = history
            .get(channel_id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| !m.is_thread_reply())
                    .filter(|m| since.is_none_or(|s| m.ts > *s))
                    .collect()
            })
            .unwrap_or_default();

        let end = newer.len().saturating_sub(offset);
        let start = end.saturating_sub(self.page_size);
        let messages = newer
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|m| (*m).clone())
            .collect();
        let next_cursor = (start > 0).then(|| (newer.len() - start).to_string());
        Ok(HistoryPage {
            messages,
            next_cursor,
        })
    }

    async fn fetch_recent(
        &self,
        channel_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, VigilError> {
        self.take_failure().await?;
        let history = self.history.lock().await;
        let top_level: Vec<ChatMessage> = history
            .get(channel_id)
            .map(|msgs| msgs.iter().filter(|m| !m.is_thread_reply()).cloned().collect())
            .unwrap_or_default();
        let skip = top_level.len().saturating_sub(limit as usize);
        Ok(top_level.into_iter().skip(skip).collect())
    }

    async fn fetch_replies(
        &self,
        channel_id: &str,
        parent_ts: &SlackTs,
    ) -> Result<Vec<ChatMessage>, VigilError> {
        self.take_failure().await?;
        Ok(self
            .replies
            .lock()
            .await
            .get(&(channel_id.to_string(), parent_ts.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, VigilError> {
        self.take_failure().await?;
        let name = self
            .names
            .lock()
            .await
            .get(channel_id)
            .cloned()
            .unwrap_or_else(|| format!("channel-{}", channel_id.to_lowercase()));
        Ok(ChannelInfo {
            channel_id: channel_id.to_string(),
            name,
        })
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<SlackTs, VigilError> {
        self.post(channel_id, None, text).await
    }

    async fn post_thread_reply(
        &self,
        channel_id: &str,
        parent_ts: &SlackTs,
        text: &str,
    ) -> Result<SlackTs, VigilError> {
        self.post(channel_id, Some(parent_ts), text).await
    }
}
