// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vigil doctor` command implementation.
//!
//! Runs diagnostic checks against the store and every external service the
//! workers depend on, so misconfiguration shows up before `vigil serve`.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use vigil_config::VigilConfig;
use vigil_core::{Adapter, HealthStatus, VigilError};
use vigil_llm::OpenAiEmbedder;
use vigil_pipeline::SubprocessClassifier;
use vigil_slack::SlackChat;
use vigil_storage::Database;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `vigil doctor` command. Fails if any check failed.
pub async fn run_doctor(config: &VigilConfig, plain: bool) -> Result<(), VigilError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        CheckResult::new(
            "Configuration",
            CheckStatus::Pass,
            format!("valid ({} channel(s) configured)", config.ingestion.channels.len()),
            Instant::now(),
        ),
        check_database(config).await,
        check_adapter(
            "Slack API",
            SlackChat::new(config).map(|c| Box::new(c) as Box<dyn Adapter>),
        )
        .await,
        check_adapter(
            "Embeddings API",
            OpenAiEmbedder::new(config).map(|e| Box::new(e) as Box<dyn Adapter>),
        )
        .await,
        check_adapter(
            "Classifier",
            SubprocessClassifier::from_config(&config.classifier)
                .map(|c| Box::new(c) as Box<dyn Adapter>),
        )
        .await,
    ];

    println!();
    println!("  {} doctor", config.bot.name);
    println!("  {}", "-".repeat(50));

    for result in &results {
        println!("{}", render_line(result, use_color));
    }
    println!();

    let fail_count = results
        .iter()
        .filter(|r| r.status == CheckStatus::Fail)
        .count();
    let warn_count = results
        .iter()
        .filter(|r| r.status == CheckStatus::Warn)
        .count();

    if fail_count + warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    if fail_count > 0 {
        return Err(VigilError::Internal(format!("{fail_count} check(s) failed")));
    }
    Ok(())
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red()),
        };
        format!(
            "    {symbol} {:<20} {message} ({duration_ms}ms)",
            result.name
        )
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

/// Check the database file exists and can be opened and migrated.
async fn check_database(config: &VigilConfig) -> CheckResult {
    let start = Instant::now();
    let path = &config.storage.database_path;

    if !std::path::Path::new(path).exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {path} (will be created on first run)"),
            start,
        );
    }

    match Database::open_with(path, config.storage.wal_mode).await {
        Ok(db) => match db.close().await {
            Ok(()) => CheckResult::new("Database", CheckStatus::Pass, "connected", start),
            Err(e) => CheckResult::new("Database", CheckStatus::Fail, format!("close failed: {e}"), start),
        },
        Err(e) => CheckResult::new("Database", CheckStatus::Fail, format!("open failed: {e}"), start),
    }
}

/// Build a collaborator and ask it for its health.
///
/// Missing credentials or paths are warnings; the rest of the report is
/// still useful without them.
async fn check_adapter(name: &str, built: Result<Box<dyn Adapter>, VigilError>) -> CheckResult {
    let start = Instant::now();
    let adapter = match built {
        Ok(adapter) => adapter,
        Err(VigilError::Config(msg)) => {
            return CheckResult::new(name, CheckStatus::Warn, format!("not configured: {msg}"), start);
        }
        Err(e) => return CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    };

    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => {
            CheckResult::new(name, CheckStatus::Pass, format!("{} healthy", adapter.name()), start)
        }
        Ok(HealthStatus::Degraded(reason)) => {
            CheckResult::new(name, CheckStatus::Warn, reason, start)
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new(name, CheckStatus::Fail, reason, start)
        }
        Err(e) => CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    }
}
