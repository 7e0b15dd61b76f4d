// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of stored top-level messages.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vigil_core::jobs::ClassifyMessageArgs;
use vigil_core::{
    Embedder, EmbeddingTask, IncidentClassifier, Job, JobArgs, JobKind, VigilError,
};
use vigil_storage::Database;
use vigil_storage::queries::messages;

use crate::handlers::HandlerChain;
use crate::runner::{JobWorker, unexpected_job};

/// Classifies a message, embeds it, stores both, and runs the handler chain.
pub struct ClassifyWorker {
    db: Database,
    classifier: Arc<dyn IncidentClassifier>,
    embedder: Arc<dyn Embedder>,
    handlers: HandlerChain,
}

impl ClassifyWorker {
    pub fn new(
        db: Database,
        classifier: Arc<dyn IncidentClassifier>,
        embedder: Arc<dyn Embedder>,
        handlers: HandlerChain,
    ) -> Self {
        Self {
            db,
            classifier,
            embedder,
            handlers,
        }
    }

    pub async fn classify(
        &self,
        args: &ClassifyMessageArgs,
        cancel: &CancellationToken,
    ) -> Result<(), VigilError> {
        let Some(message) = messages::get_message(&self.db, &args.channel_id, &args.ts).await?
        else {
            warn!(channel_id = %args.channel_id, ts = %args.ts, "message not found");
            return Ok(());
        };

        let msg = message.attrs.message();
        let action = self.classifier.classify(msg.sender(), &msg.text).await?;
        if cancel.is_cancelled() {
            return Err(VigilError::Cancelled);
        }
        let embedding = self
            .embedder
            .embed(EmbeddingTask::SearchDocument, &msg.text)
            .await?;

        messages::update_classification(&self.db, &args.channel_id, &args.ts, &action, embedding)
            .await?;
        debug!(
            channel_id = %args.channel_id,
            ts = %args.ts,
            action = %action.action,
            backfill = args.is_backfill,
            "message classified"
        );

        let Some(updated) = messages::get_message(&self.db, &args.channel_id, &args.ts).await?
        else {
            return Ok(());
        };
        self.handlers.run(&updated, args.is_backfill).await
    }
}

#[async_trait]
impl JobWorker for ClassifyWorker {
    fn kind(&self) -> JobKind {
        JobKind::ClassifyMessage
    }

    async fn work(&self, job: &Job, cancel: &CancellationToken) -> Result<(), VigilError> {
        let JobArgs::ClassifyMessage(args) = &job.args else {
            return Err(unexpected_job(self.kind(), job));
        };
        self.classify(args, cancel).await
    }
}
