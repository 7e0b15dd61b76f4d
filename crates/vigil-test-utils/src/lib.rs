// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Vigil integration tests.
//!
//! Provides mock collaborators and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without Slack, an LLM, or a classifier
//! binary.
//!
//! # Components
//!
//! - [`MockChat`] - In-memory chat platform with paginated history
//! - [`MockClassifier`] - Substring-rule incident classifier
//! - [`MockEmbedder`] - Deterministic embedding vectors
//! - [`TestHarness`] - Temp database, config, and the mocks above

pub mod harness;
pub mod mock_chat;
pub mod mock_models;

pub use harness::{TestHarness, bot_message, reply, ts, user_message};
pub use mock_chat::{MockChat, PostedMessage};
pub use mock_models::{MockClassifier, MockEmbedder};
