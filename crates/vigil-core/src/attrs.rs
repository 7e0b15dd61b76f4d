// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned attribute bag persisted alongside every message.
//!
//! The bag is stored as JSON and discriminated by `schema_version`. New
//! fields are added to the current version with `#[serde(default)]`; a
//! breaking change gets a new variant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::incident::{IncidentAction, IncidentTag};
use crate::types::{ChatMessage, SlackTs};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema_version")]
pub enum MessageAttrs {
    #[serde(rename = "v1")]
    V1(MessageAttrsV1),
}

/// Who sent a message, as resolved by the sender tagger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SenderTag {
    Bot { name: String },
    User { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAttrsV1 {
    pub message: ChatMessage,
    /// Reaction name to current count.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_action: Option<IncidentAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident: Option<IncidentTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderTag>,
}

impl MessageAttrs {
    pub fn from_message(message: ChatMessage) -> Self {
        Self::V1(MessageAttrsV1 {
            message,
            reactions: BTreeMap::new(),
            incident_action: None,
            incident: None,
            sender: None,
        })
    }

    pub fn v1(&self) -> &MessageAttrsV1 {
        match self {
            Self::V1(v1) => v1,
        }
    }

    pub fn v1_mut(&mut self) -> &mut MessageAttrsV1 {
        match self {
            Self::V1(v1) => v1,
        }
    }

    pub fn message(&self) -> &ChatMessage {
        &self.v1().message
    }

    /// Apply a reaction delta. Counts never go below zero and zeroed
    /// reactions are removed.
    pub fn apply_reaction(&mut self, name: &str, delta: i64) {
        let reactions = &mut self.v1_mut().reactions;
        let count = reactions.entry(name.to_string()).or_insert(0);
        *count = (*count + delta).max(0);
        if *count == 0 {
            reactions.remove(name);
        }
    }
}

/// A top-level message as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub channel_id: String,
    pub ts: SlackTs,
    pub attrs: MessageAttrs,
    pub embedding: Option<Vec<f32>>,
}

impl StoredMessage {
    pub fn text(&self) -> &str {
        &self.attrs.message().text
    }
}

/// A thread reply as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredThreadMessage {
    pub channel_id: String,
    pub parent_ts: SlackTs,
    pub ts: SlackTs,
    pub attrs: MessageAttrs,
}
