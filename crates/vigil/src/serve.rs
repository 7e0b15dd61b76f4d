// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vigil serve` command implementation.
//!
//! Opens the store, builds the Slack, embedding, and classifier clients,
//! registers the configured channels, and runs the worker pool until
//! SIGTERM or Ctrl+C.

use std::sync::Arc;

use tracing::{info, warn};
use vigil_config::VigilConfig;
use vigil_core::dispatch::rescan_job;
use vigil_core::{OnboardingStatus, VigilError};
use vigil_llm::OpenAiEmbedder;
use vigil_pipeline::shutdown::install_signal_handler;
use vigil_pipeline::{Collaborators, EventIntake, SubprocessClassifier, build_worker_pool};
use vigil_slack::SlackChat;
use vigil_storage::Database;
use vigil_storage::queries::{channels, jobs};

/// Run the `vigil serve` command.
pub async fn run_serve(config: VigilConfig) -> Result<(), VigilError> {
    init_tracing(&config.bot.log_level);
    info!(name = %config.bot.name, "starting vigil");

    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    info!(path = %config.storage.database_path, "database opened");

    let collaborators = Collaborators {
        chat: Arc::new(SlackChat::new(&config)?),
        classifier: Arc::new(SubprocessClassifier::from_config(&config.classifier)?),
        embedder: Arc::new(OpenAiEmbedder::new(&config)?),
    };

    let seeded = seed_channels(&db, &config).await?;
    info!(
        configured = config.ingestion.channels.len(),
        seeded, "configured channels registered"
    );

    let pool = build_worker_pool(&db, &config, &collaborators);
    let cancel = install_signal_handler();
    pool.run(cancel).await?;

    db.close().await?;
    info!("vigil stopped");
    Ok(())
}

/// Register every configured channel.
///
/// Channels seen for the first time get an onboarding job, which starts
/// ingestion when it finishes. Enabled channels that finished onboarding
/// earlier get an immediate ingestion run; a pending one is reused. Returns
/// how many jobs were scheduled.
pub async fn seed_channels(db: &Database, config: &VigilConfig) -> Result<usize, VigilError> {
    let intake = EventIntake::new(db.clone(), config.ingestion.onboard_last_n_msgs);
    let mut scheduled = 0;

    for channel_id in &config.ingestion.channels {
        if intake.observe_channel(channel_id).await? {
            scheduled += 1;
            continue;
        }
        let Some(channel) = channels::get_channel(db, channel_id).await? else {
            continue;
        };
        if !channel.enabled {
            warn!(%channel_id, "configured channel is disabled, skipping");
            continue;
        }
        if channel.onboarding == Some(OnboardingStatus::Finished) {
            let (args, opts) = rescan_job(channel_id, false, config.ingestion.empty_backoff());
            jobs::enqueue(db, &args, &opts).await?;
            scheduled += 1;
        }
    }
    Ok(scheduled)
}

/// Initialize the tracing subscriber with an env filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vigil={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
