// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the store, the workers, and the collaborators.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::VigilError;

const MICROS_PER_SEC: i64 = 1_000_000;

/// A chat platform timestamp of the form `"<seconds>.<micros>"`.
///
/// The original string is kept verbatim so it can be handed back to the
/// platform unmodified, while ordering and equality use the numeric value.
/// `"101.5"` and `"101.500000"` compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlackTs {
    raw: String,
    secs: i64,
    micros: u32,
}

impl SlackTs {
    /// Parse a timestamp string.
    pub fn parse(raw: &str) -> Result<Self, VigilError> {
        let invalid = || VigilError::InvalidTimestamp(raw.to_string());

        let (secs_part, frac_part) = match raw.split_once('.') {
            Some((s, f)) => (s, f),
            None => (raw, ""),
        };
        if secs_part.is_empty()
            || secs_part.len() > 12
            || !secs_part.bytes().all(|b| b.is_ascii_digit())
            || frac_part.len() > 6
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let secs: i64 = secs_part.parse().map_err(|_| invalid())?;
        let micros = if frac_part.is_empty() {
            0
        } else {
            let scale = 10u32.pow(6 - frac_part.len() as u32);
            frac_part.parse::<u32>().map_err(|_| invalid())? * scale
        };

        Ok(Self {
            raw: raw.to_string(),
            secs,
            micros,
        })
    }

    /// Build a canonical timestamp from microseconds since the epoch.
    pub fn from_micros(total: i64) -> Self {
        let secs = total.div_euclid(MICROS_PER_SEC);
        let micros = total.rem_euclid(MICROS_PER_SEC) as u32;
        Self {
            raw: format!("{secs}.{micros:06}"),
            secs,
            micros,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Microseconds since the epoch.
    pub fn as_micros(&self) -> i64 {
        self.secs * MICROS_PER_SEC + i64::from(self.micros)
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    /// Signed distance `self - earlier` in microseconds.
    pub fn micros_since(&self, earlier: &SlackTs) -> i64 {
        self.as_micros() - earlier.as_micros()
    }

    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_micros(self.as_micros())
    }
}

impl fmt::Display for SlackTs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for SlackTs {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SlackTs {
    type Error = VigilError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SlackTs> for String {
    fn from(ts: SlackTs) -> Self {
        ts.raw
    }
}

impl PartialEq for SlackTs {
    fn eq(&self, other: &Self) -> bool {
        self.secs == other.secs && self.micros == other.micros
    }
}

impl Eq for SlackTs {}

impl Hash for SlackTs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.secs.hash(state);
        self.micros.hash(state);
    }
}

impl PartialOrd for SlackTs {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlackTs {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.secs, self.micros).cmp(&(other.secs, other.micros))
    }
}

/// A message as delivered by the chat platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub ts: SlackTs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<SlackTs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reply_count: u32,
}

impl ChatMessage {
    /// A plain user message, mostly useful for tests and fixtures.
    pub fn new(ts: SlackTs, user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ts,
            thread_ts: None,
            user: Some(user.into()),
            bot_id: None,
            bot_username: None,
            subtype: None,
            text: text.into(),
            reply_count: 0,
        }
    }

    /// True when this message is a reply inside someone else's thread.
    pub fn is_thread_reply(&self) -> bool {
        self.thread_ts.as_ref().is_some_and(|parent| *parent != self.ts)
    }

    pub fn is_bot(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    /// Name handed to the classifier as the sender.
    pub fn sender(&self) -> &str {
        self.bot_username
            .as_deref()
            .or(self.user.as_deref())
            .unwrap_or("unknown")
    }
}

/// Onboarding progress of a channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    Started,
    Finished,
}

/// A registered channel as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub channel_id: String,
    pub name: Option<String>,
    pub onboarding: Option<OnboardingStatus>,
    /// Timestamp of the last ingested message. Never moves backwards.
    pub watermark: Option<SlackTs>,
    pub enabled: bool,
    pub created_at: String,
}

/// Channel metadata returned by the chat platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub name: String,
}

/// One page of channel history, oldest message first within the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    /// Opaque cursor for the next page. Passed back to the platform unmodified.
    pub next_cursor: Option<String>,
}

impl HistoryPage {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Task hint passed to the embedding model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingTask {
    SearchDocument,
    SearchQuery,
}

/// Health status reported by collaborator health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Collaborator is fully operational.
    Healthy,
    /// Collaborator is operational but experiencing issues.
    Degraded(String),
    /// Collaborator is not operational.
    Unhealthy(String),
}
