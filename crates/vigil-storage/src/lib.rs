// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Vigil chat-ops pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed operations for channels,
//! messages, thread replies, incidents, and the background job queue.
//!
//! Every multi-step write (message insert plus job enqueue, incident
//! transition plus message tag) runs as one SQLite transaction inside a
//! single `call`, so partial application is never observable.

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::Database;
pub use queries::ingest::{IngestBatch, IngestOutcome, WatermarkAdvance};
