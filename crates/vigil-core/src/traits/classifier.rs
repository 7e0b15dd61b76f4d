// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incident classification collaborator.

use async_trait::async_trait;

use crate::error::VigilError;
use crate::incident::IncidentAction;
use crate::traits::adapter::Adapter;

/// Decides whether a message opens or closes an incident.
#[async_trait]
pub trait IncidentClassifier: Adapter {
    async fn classify(&self, sender: &str, text: &str) -> Result<IncidentAction, VigilError>;
}
