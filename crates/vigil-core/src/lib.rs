// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Vigil chat-ops pipeline.
//!
//! This crate provides the domain types, job payloads, dispatch policy,
//! collaborator traits, and the shared error type used throughout the
//! Vigil workspace.

pub mod attrs;
pub mod dispatch;
pub mod error;
pub mod incident;
pub mod jobs;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use attrs::{MessageAttrs, MessageAttrsV1, SenderTag, StoredMessage, StoredThreadMessage};
pub use dispatch::MessageSource;
pub use error::VigilError;
pub use incident::{Action, Incident, IncidentAction, IncidentPriority, IncidentTag, Transition};
pub use jobs::{Job, JobArgs, JobKind, JobState, Priority};
pub use types::{
    Channel, ChannelInfo, ChatMessage, EmbeddingTask, HealthStatus, HistoryPage,
    OnboardingStatus, SlackTs,
};

pub use traits::{Adapter, ChatClient, Embedder, IncidentClassifier};
