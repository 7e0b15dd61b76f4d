// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! Every external collaborator extends the [`Adapter`] base trait and uses
//! `#[async_trait]` so it can be held as `Arc<dyn Trait>`.

pub mod adapter;
pub mod chat;
pub mod classifier;
pub mod embedding;

pub use adapter::Adapter;
pub use chat::ChatClient;
pub use classifier::IncidentClassifier;
pub use embedding::Embedder;
