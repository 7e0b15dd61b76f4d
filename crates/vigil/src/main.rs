// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vigil - a chat-ops bot that watches alert channels.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod channel;
mod doctor;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Vigil - a chat-ops bot that watches alert channels.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about, long_about = None)]
struct Cli {
    /// Load this config file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ingestion and classification workers until interrupted.
    Serve,
    /// Check configuration, storage, and external services.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Show job queue and channel counts.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Manage watched channels.
    Channel {
        #[command(subcommand)]
        action: ChannelCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ChannelCommand {
    /// Register a channel and schedule its onboarding.
    Add { channel_id: String },
    /// List registered channels.
    List {
        /// Only show enabled channels.
        #[arg(long)]
        enabled: bool,
    },
    /// Stop ingesting a channel. Stored history is kept.
    Disable { channel_id: String },
    /// Resume ingesting a disabled channel.
    Enable { channel_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => vigil_config::load_and_validate_path(path),
        None => vigil_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            vigil_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Doctor { plain }) => doctor::run_doctor(&config, plain).await,
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        Some(Commands::Channel { action }) => match action {
            ChannelCommand::Add { channel_id } => channel::run_add(&config, &channel_id).await,
            ChannelCommand::List { enabled } => channel::run_list(&config, enabled).await,
            ChannelCommand::Disable { channel_id } => {
                channel::run_set_enabled(&config, &channel_id, false).await
            }
            ChannelCommand::Enable { channel_id } => {
                channel::run_set_enabled(&config, &channel_id, true).await
            }
        },
        None => {
            println!("vigil: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("vigil: {e}");
        std::process::exit(1);
    }
}
