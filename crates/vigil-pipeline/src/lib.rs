// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background processing for the Vigil chat-ops pipeline.
//!
//! Live events enter through [`EventIntake`]. Everything else runs as queued
//! jobs executed by a [`WorkerPool`]:
//!
//! - `ingest_channel`: [`IngestionWorker`] pulls history after the watermark
//! - `classify_message`: [`ClassifyWorker`] classifies, embeds, and runs the
//!   [`HandlerChain`] (sender tagging, incident tracking)
//! - `channel_onboard`: [`OnboardWorker`] imports recent history as backfill
//! - `channel_info`: [`ChannelInfoWorker`] refreshes channel names
//! - `backfill_thread`: [`BackfillThreadWorker`] stores thread replies

pub mod classifier;
pub mod handlers;
pub mod incidents;
pub mod ingestion;
pub mod intake;
pub mod onboarding;
pub mod runner;
pub mod sandbox;
pub mod shutdown;

use std::sync::Arc;

use vigil_config::VigilConfig;
use vigil_core::{ChatClient, Embedder, IncidentClassifier};
use vigil_storage::Database;

pub use classifier::ClassifyWorker;
pub use handlers::{HandlerChain, MessageHandler, SenderTagger};
pub use incidents::{IncidentHandler, TransitionResult};
pub use ingestion::IngestionWorker;
pub use intake::{EventIntake, MessageIntake};
pub use onboarding::{BackfillThreadWorker, ChannelInfoWorker, OnboardWorker};
pub use runner::{JobOutcome, JobWorker, RunnerSettings, WorkerPool};
pub use sandbox::SubprocessClassifier;

/// External services the workers talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub chat: Arc<dyn ChatClient>,
    pub classifier: Arc<dyn IncidentClassifier>,
    pub embedder: Arc<dyn Embedder>,
}

/// A pool with every worker registered at its configured concurrency.
pub fn build_worker_pool(
    db: &Database,
    config: &VigilConfig,
    collaborators: &Collaborators,
) -> WorkerPool {
    let empty_backoff = config.ingestion.empty_backoff();
    let counts = &config.queue.workers;
    let mut pool = WorkerPool::new(db.clone(), RunnerSettings::from(&config.queue));

    pool.register(
        Arc::new(IngestionWorker::new(
            db.clone(),
            collaborators.chat.clone(),
            empty_backoff,
        )),
        counts.ingest_channel,
    );
    pool.register(
        Arc::new(ClassifyWorker::new(
            db.clone(),
            collaborators.classifier.clone(),
            collaborators.embedder.clone(),
            HandlerChain::builtin(db.clone()),
        )),
        counts.classify_message,
    );
    pool.register(
        Arc::new(ChannelInfoWorker::new(db.clone(), collaborators.chat.clone())),
        counts.channel_info,
    );
    pool.register(
        Arc::new(OnboardWorker::new(
            db.clone(),
            collaborators.chat.clone(),
            empty_backoff,
        )),
        counts.channel_onboard,
    );
    pool.register(
        Arc::new(BackfillThreadWorker::new(
            db.clone(),
            collaborators.chat.clone(),
        )),
        counts.backfill_thread,
    );
    pool
}
