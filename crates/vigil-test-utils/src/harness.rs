// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` bundles a temp SQLite database, a config pointing at it,
//! and mock collaborators, so tests can wire real workers against fakes.

use std::sync::Arc;

use vigil_config::VigilConfig;
use vigil_core::{ChatMessage, IncidentAction, SlackTs, VigilError};
use vigil_storage::Database;
use vigil_storage::queries::channels;

use crate::mock_chat::MockChat;
use crate::mock_models::{MockClassifier, MockEmbedder};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    page_size: usize,
    rules: Vec<(String, IncidentAction)>,
    channels: Vec<String>,
    dimensions: usize,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            page_size: 100,
            rules: Vec::new(),
            channels: Vec::new(),
            dimensions: 4,
        }
    }

    /// Messages per history page served by the mock chat.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Classify messages containing `needle` as `action`.
    pub fn with_rule(mut self, needle: &str, action: IncidentAction) -> Self {
        self.rules.push((needle.to_string(), action));
        self
    }

    /// Register a channel before the test starts.
    pub fn with_channel(mut self, channel_id: &str) -> Self {
        self.channels.push(channel_id.to_string());
        self
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Build the test harness, creating the database and mocks.
    pub async fn build(self) -> Result<TestHarness, VigilError> {
        let temp_dir = tempfile::TempDir::new().map_err(VigilError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let db_path = db_path.to_string_lossy().to_string();

        let db = Database::open(&db_path).await?;
        for channel_id in &self.channels {
            channels::add_channel(&db, channel_id).await?;
        }

        let mut config = VigilConfig::default();
        config.storage.database_path = db_path;
        config.ingestion.channels = self.channels;

        let classifier = self
            .rules
            .into_iter()
            .fold(MockClassifier::new(), |c, (needle, action)| {
                c.with_rule(&needle, action)
            });

        Ok(TestHarness {
            db,
            config,
            chat: Arc::new(MockChat::with_page_size(self.page_size)),
            classifier: Arc::new(classifier),
            embedder: Arc::new(MockEmbedder::new(self.dimensions)),
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock collaborators and temp storage.
pub struct TestHarness {
    pub db: Database,
    pub config: VigilConfig,
    pub chat: Arc<MockChat>,
    pub classifier: Arc<MockClassifier>,
    pub embedder: Arc<MockEmbedder>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with defaults and no channels.
    pub async fn new() -> Result<Self, VigilError> {
        Self::builder().build().await
    }

    /// Close the database. The temp directory is removed on drop.
    pub async fn close(self) -> Result<(), VigilError> {
        self.db.close().await
    }
}

/// Parse a timestamp literal. Panics on malformed input.
pub fn ts(raw: &str) -> SlackTs {
    match SlackTs::parse(raw) {
        Ok(ts) => ts,
        Err(e) => panic!("bad test timestamp {raw}: {e}"),
    }
}

/// A plain user message at `raw_ts`.
pub fn user_message(raw_ts: &str, user: &str, text: &str) -> ChatMessage {
    ChatMessage::new(ts(raw_ts), user, text)
}

/// A bot message at `raw_ts`, as alerting integrations post them.
pub fn bot_message(raw_ts: &str, bot_name: &str, text: &str) -> ChatMessage {
    let mut msg = ChatMessage::new(ts(raw_ts), "", text);
    msg.user = None;
    msg.bot_id = Some(format!("B{}", bot_name.len()));
    msg.bot_username = Some(bot_name.to_string());
    msg.subtype = Some("bot_message".to_string());
    msg
}

/// A reply to `parent_ts`.
pub fn reply(raw_ts: &str, parent_ts: &str, user: &str, text: &str) -> ChatMessage {
    let mut msg = user_message(raw_ts, user, text);
    msg.thread_ts = Some(ts(parent_ts));
    msg
}
