// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock classifier and embedder.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;
use vigil_core::{
    Adapter, Embedder, EmbeddingTask, HealthStatus, IncidentAction, IncidentClassifier,
    VigilError,
};

/// Classifies by substring match.
///
/// The first rule whose needle occurs in the text wins; anything else is
/// `none`. Every call is recorded as `(sender, text)`.
pub struct MockClassifier {
    rules: Vec<(String, IncidentAction)>,
    failures: Mutex<VecDeque<VigilError>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rule(mut self, needle: &str, action: IncidentAction) -> Self {
        self.rules.push((needle.to_string(), action));
        self
    }

    pub async fn fail_next(&self, error: VigilError) {
        self.failures.lock().await.push_back(error);
    }

    pub async fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().await.clone()
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MockClassifier {
    fn name(&self) -> &str {
        "mock-classifier"
    }

    async fn health_check(&self) -> Result<HealthStatus, VigilError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl IncidentClassifier for MockClassifier {
    async fn classify(&self, sender: &str, text: &str) -> Result<IncidentAction, VigilError> {
        self.calls
            .lock()
            .await
            .push((sender.to_string(), text.to_string()));
        if let Some(e) = self.failures.lock().await.pop_front() {
            return Err(e);
        }
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, action)| action.clone())
            .unwrap_or_default())
    }
}

/// Deterministic embedder: a vector of `dimensions` values derived from the
/// text length.
pub struct MockEmbedder {
    dimensions: usize,
    failures: Mutex<VecDeque<VigilError>>,
    requests: Mutex<Vec<(EmbeddingTask, String)>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn fail_next(&self, error: VigilError) {
        self.failures.lock().await.push_back(error);
    }

    pub async fn requests(&self) -> Vec<(EmbeddingTask, String)> {
        self.requests.lock().await.clone()
    }

    /// The vector `embed` returns for `text`.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let len = text.chars().count() as f32;
        (0..self.dimensions).map(|i| len + i as f32 / 10.0).collect()
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl Adapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    async fn health_check(&self) -> Result<HealthStatus, VigilError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, task: EmbeddingTask, text: &str) -> Result<Vec<f32>, VigilError> {
        self.requests.lock().await.push((task, text.to_string()));
        if let Some(e) = self.failures.lock().await.pop_front() {
            return Err(e);
        }
        Ok(self.vector_for(text))
    }
}
