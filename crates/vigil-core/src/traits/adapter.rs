// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait shared by all collaborators.

use async_trait::async_trait;

use crate::error::VigilError;
use crate::types::HealthStatus;

/// Identity and health reporting for an external collaborator.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Returns the human-readable name of this collaborator.
    fn name(&self) -> &str;

    /// Performs a health check and returns the collaborator's current status.
    async fn health_check(&self) -> Result<HealthStatus, VigilError>;
}
