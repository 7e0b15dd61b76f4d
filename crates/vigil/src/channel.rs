// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vigil channel` subcommands.

use vigil_config::VigilConfig;
use vigil_core::{Channel, OnboardingStatus, VigilError};
use vigil_pipeline::EventIntake;
use vigil_storage::Database;
use vigil_storage::queries::channels;

pub async fn run_add(config: &VigilConfig, channel_id: &str) -> Result<(), VigilError> {
    let db = open(config).await?;
    let scheduled = add_channel(&db, config, channel_id).await;
    db.close().await?;
    if scheduled? {
        println!("{channel_id}: registered, onboarding scheduled");
    } else {
        println!("{channel_id}: already registered");
    }
    Ok(())
}

pub async fn run_list(config: &VigilConfig, enabled_only: bool) -> Result<(), VigilError> {
    let db = open(config).await?;
    let listed = channels::list_channels(&db, enabled_only).await;
    db.close().await?;
    let listed = listed?;

    if listed.is_empty() {
        println!("no channels registered");
        return Ok(());
    }
    println!(
        "{:<14} {:<24} {:<10} {:<9} WATERMARK",
        "CHANNEL", "NAME", "ONBOARDING", "ENABLED"
    );
    for channel in &listed {
        println!("{}", format_row(channel));
    }
    Ok(())
}

pub async fn run_set_enabled(
    config: &VigilConfig,
    channel_id: &str,
    enabled: bool,
) -> Result<(), VigilError> {
    let db = open(config).await?;
    let result = channels::set_enabled(&db, channel_id, enabled).await;
    db.close().await?;
    result?;
    let state = if enabled { "enabled" } else { "disabled" };
    println!("{channel_id}: {state}");
    Ok(())
}

async fn open(config: &VigilConfig) -> Result<Database, VigilError> {
    Database::open_with(&config.storage.database_path, config.storage.wal_mode).await
}

/// Register `channel_id`; returns whether onboarding was scheduled.
async fn add_channel(
    db: &Database,
    config: &VigilConfig,
    channel_id: &str,
) -> Result<bool, VigilError> {
    EventIntake::new(db.clone(), config.ingestion.onboard_last_n_msgs)
        .observe_channel(channel_id)
        .await
}

fn format_row(channel: &Channel) -> String {
    let onboarding = match channel.onboarding {
        Some(OnboardingStatus::Started) => "started",
        Some(OnboardingStatus::Finished) => "finished",
        None => "-",
    };
    format!(
        "{:<14} {:<24} {:<10} {:<9} {}",
        channel.channel_id,
        channel.name.as_deref().unwrap_or("-"),
        onboarding,
        if channel.enabled { "yes" } else { "no" },
        channel.watermark.as_ref().map_or("-", |ts| ts.as_str()),
    )
}
