// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding collaborator.

use async_trait::async_trait;

use crate::error::VigilError;
use crate::traits::adapter::Adapter;
use crate::types::EmbeddingTask;

/// Converts message text into a vector for semantic search.
#[async_trait]
pub trait Embedder: Adapter {
    async fn embed(&self, task: EmbeddingTask, text: &str) -> Result<Vec<f32>, VigilError>;
}
