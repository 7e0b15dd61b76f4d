// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slack chat client for Vigil.
//!
//! Implements [`ChatClient`] on top of the Slack Web API: channel history,
//! thread replies, channel metadata, and posting.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use vigil_config::VigilConfig;
use vigil_core::{
    Adapter, ChannelInfo, ChatClient, ChatMessage, HealthStatus, HistoryPage, SlackTs, VigilError,
};

use crate::client::SlackClient;
use crate::types::{
    AuthTestResponse, ChannelInfoResponse, HistoryResponse, PostMessageRequest,
    PostMessageResponse,
};

/// Upper bound on reply pages fetched for one thread.
const MAX_REPLY_PAGES: usize = 50;

/// Slack implementation of [`ChatClient`].
///
/// Token resolution order: `slack.bot_token` -> `SLACK_BOT_TOKEN` -> error.
pub struct SlackChat {
    client: SlackClient,
    page_size: u32,
}

impl SlackChat {
    pub fn new(config: &VigilConfig) -> Result<Self, VigilError> {
        let token = resolve_token(&config.slack.bot_token)?;
        let client = SlackClient::new(
            &token,
            &config.slack.api_base_url,
            Duration::from_secs(config.slack.timeout_secs),
        )?;
        info!(base_url = %config.slack.api_base_url, "slack client initialized");
        Ok(Self::with_client(client, config.slack.history_page_size))
    }

    pub fn with_client(client: SlackClient, page_size: u32) -> Self {
        Self { client, page_size }
    }

    async fn history(&self, params: Vec<(&str, String)>) -> Result<HistoryResponse, VigilError> {
        self.client.get("conversations.history", &params).await
    }

    async fn post(
        &self,
        channel_id: &str,
        thread_ts: Option<&SlackTs>,
        text: &str,
    ) -> Result<SlackTs, VigilError> {
        let request = PostMessageRequest {
            channel: channel_id,
            text,
            thread_ts: thread_ts.map(SlackTs::as_str),
        };
        let response: PostMessageResponse =
            self.client.post("chat.postMessage", &request).await?;
        SlackTs::parse(&response.ts)
    }
}

fn resolve_token(config_token: &Option<String>) -> Result<String, VigilError> {
    if let Some(token) = config_token
        && !token.is_empty()
    {
        return Ok(token.clone());
    }

    std::env::var("SLACK_BOT_TOKEN").map_err(|_| {
        VigilError::Config(
            "Slack bot token not found. Set slack.bot_token in config or SLACK_BOT_TOKEN environment variable.".into(),
        )
    })
}

/// Convert a Slack page, newest first, into chat messages oldest first.
fn into_messages(messages: Vec<types::ApiMessage>) -> Result<Vec<ChatMessage>, VigilError> {
    let mut out = messages
        .into_iter()
        .map(ChatMessage::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    out.sort_by(|a, b| a.ts.cmp(&b.ts));
    Ok(out)
}

#[async_trait]
impl Adapter for SlackChat {
    fn name(&self) -> &str {
        "slack"
    }

    async fn health_check(&self) -> Result<HealthStatus, VigilError> {
        match self.client.get::<AuthTestResponse>("auth.test", &[]).await {
            Ok(auth) => {
                debug!(team = ?auth.team, user = ?auth.user, "slack auth ok");
                Ok(HealthStatus::Healthy)
            }
            Err(VigilError::RateLimited { .. }) => {
                Ok(HealthStatus::Degraded("rate limited".to_string()))
            }
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl ChatClient for SlackChat {
    async fn fetch_history(
        &self,
        channel_id: &str,
        since: Option<&SlackTs>,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, VigilError> {
        let mut params = vec![
            ("channel", channel_id.to_string()),
            ("limit", self.page_size.to_string()),
            ("inclusive", "false".to_string()),
        ];
        if let Some(since) = since {
            params.push(("oldest", since.to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }

        let response = self.history(params).await?;
        let next_cursor = if response.has_more {
            response.response_metadata.cursor()
        } else {
            None
        };
        let messages = into_messages(response.messages)?;
        debug!(
            channel_id,
            count = messages.len(),
            has_more = next_cursor.is_some(),
            "fetched history page"
        );
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
        let mut collected = Vec::new();
        let mut cursor: Option<String> = None;

        while collected.len() < limit as usize {
            let remaining = limit as usize - collected.len();
            let mut params = vec![
                ("channel", channel_id.to_string()),
                ("limit", remaining.min(self.page_size as usize).to_string()),
            ];
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }

            let response = self.history(params).await?;
            collected.extend(response.messages);
            cursor = response.response_metadata.cursor();
            if !response.has_more || cursor.is_none() {
                break;
            }
        }

        collected.truncate(limit as usize);
        into_messages(collected)
    }

    async fn fetch_replies(
        &self,
        channel_id: &str,
        parent_ts: &SlackTs,
    ) -> Result<Vec<ChatMessage>, VigilError> {
        let mut replies = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_REPLY_PAGES {
            let mut params = vec![
                ("channel", channel_id.to_string()),
                ("ts", parent_ts.to_string()),
                ("limit", self.page_size.to_string()),
            ];
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }

            let response: HistoryResponse =
                self.client.get("conversations.replies", &params).await?;
            replies.extend(response.messages);
            cursor = response.response_metadata.cursor();
            if !response.has_more || cursor.is_none() {
                break;
            }
        }

        // The parent comes back as the first element of every thread.
        let replies = into_messages(replies)?
            .into_iter()
            .filter(|m| m.ts != *parent_ts)
            .collect();
        Ok(replies)
    }

    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, VigilError> {
        let response: ChannelInfoResponse = self
            .client
            .get("conversations.info", &[("channel", channel_id.to_string())])
            .await?;
        Ok(ChannelInfo {
            name: response
                .channel
                .name
                .unwrap_or_else(|| response.channel.id.clone()),
            channel_id: response.channel.id,
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
