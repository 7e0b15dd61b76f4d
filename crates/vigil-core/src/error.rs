// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Vigil pipeline.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Vigil crates.
#[derive(Debug, Error)]
pub enum VigilError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A write referenced a channel that has not been registered.
    #[error("unknown channel: {channel_id}")]
    UnknownChannel { channel_id: String },

    /// A message lookup by primary key found nothing.
    #[error("message not found: {channel_id}/{ts}")]
    MessageNotFound { channel_id: String, ts: String },

    /// A close transition found no still-open incident for its key.
    #[error("no open incident for {channel_id}/{service}/{alert} before {ts}")]
    NoOpenIncident {
        channel_id: String,
        service: String,
        alert: String,
        ts: String,
    },

    /// Chat platform errors (request failure, API error payloads).
    #[error("chat error: {message}")]
    Chat {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An upstream collaborator asked us to slow down.
    #[error("rate limited by {service}")]
    RateLimited {
        service: String,
        retry_after: Option<Duration>,
    },

    /// LLM collaborator errors (embedding request failure, malformed response).
    #[error("llm error: {message}")]
    Llm {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The external classifier process failed or produced unusable output.
    #[error("classifier error: {message}")]
    Classifier {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A chat timestamp could not be parsed.
    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Work was abandoned because shutdown was requested.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VigilError {
    /// Shorthand for wrapping any error as a storage failure.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Whether the failure is expected to clear up on its own.
    ///
    /// The queue retries every failure with the same fixed backoff, so this
    /// only influences log levels.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Cancelled
        )
    }
}
