// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slack Web API payloads.
//!
//! Only the fields Vigil reads are modelled; everything else Slack sends is
//! ignored.

use serde::{Deserialize, Serialize};
use vigil_core::{ChatMessage, SlackTs, VigilError};

/// Fields shared by every Web API response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl ResponseMetadata {
    /// Slack signals the last page with an empty string.
    pub fn cursor(self) -> Option<String> {
        self.next_cursor.filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotProfile {
    #[serde(default)]
    pub name: Option<String>,
}

/// A message as returned by `conversations.history` and `conversations.replies`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub bot_profile: Option<BotProfile>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reply_count: u32,
}

impl TryFrom<ApiMessage> for ChatMessage {
    type Error = VigilError;

    fn try_from(msg: ApiMessage) -> Result<Self, Self::Error> {
        let bot_username = msg
            .username
            .or_else(|| msg.bot_profile.and_then(|p| p.name));
        Ok(ChatMessage {
            ts: SlackTs::parse(&msg.ts)?,
            thread_ts: msg.thread_ts.as_deref().map(SlackTs::parse).transpose()?,
            user: msg.user,
            bot_id: msg.bot_id,
            bot_username,
            subtype: msg.subtype,
            text: msg.text,
            reply_count: msg.reply_count,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfoResponse {
    pub channel: ApiChannel,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostMessageRequest<'a> {
    pub channel: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageResponse {
    pub ts: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthTestResponse {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}
