// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints serde cannot express. All failures are collected
//! rather than stopping at the first.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::VigilConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &VigilConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.bot.log_level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "bot.log_level `{}` must be one of {}",
            config.bot.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    for (key, url) in [
        ("slack.api_base_url", &config.slack.api_base_url),
        ("llm.base_url", &config.llm.base_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            fail(format!("{key} `{url}` must start with http:// or https://"));
        }
    }

    if let Some(token) = &config.slack.bot_token
        && token.trim().is_empty()
    {
        fail("slack.bot_token must not be empty when set".to_string());
    }

    if let Some(path) = &config.classifier.binary_path
        && path.trim().is_empty()
    {
        fail("classifier.binary_path must not be empty when set".to_string());
    }

    for (key, value) in [
        ("slack.timeout_secs", config.slack.timeout_secs),
        ("llm.timeout_secs", config.llm.timeout_secs),
        ("classifier.timeout_secs", config.classifier.timeout_secs),
        ("queue.poll_interval_ms", config.queue.poll_interval_ms),
        ("queue.job_timeout_secs", config.queue.job_timeout_secs),
        ("queue.prune_interval_secs", config.queue.prune_interval_secs),
    ] {
        if value == 0 {
            fail(format!("{key} must be greater than 0"));
        }
    }

    if config.slack.history_page_size == 0 || config.slack.history_page_size > 999 {
        fail(format!(
            "slack.history_page_size must be between 1 and 999, got {}",
            config.slack.history_page_size
        ));
    }

    if config.llm.embedding_dimensions == 0 {
        fail("llm.embedding_dimensions must be greater than 0".to_string());
    }

    let workers = &config.queue.workers;
    for (kind, count) in [
        ("ingest_channel", workers.ingest_channel),
        ("classify_message", workers.classify_message),
        ("channel_info", workers.channel_info),
        ("channel_onboard", workers.channel_onboard),
        ("backfill_thread", workers.backfill_thread),
    ] {
        if count == 0 {
            fail(format!("queue.workers.{kind} must be at least 1"));
        }
    }

    let mut seen = HashSet::new();
    for channel in &config.ingestion.channels {
        if channel.trim().is_empty() {
            fail("ingestion.channels must not contain empty ids".to_string());
        } else if !seen.insert(channel) {
            fail(format!("duplicate channel `{channel}` in ingestion.channels"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&VigilConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = VigilConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn zero_workers_fail_validation() {
        let mut config = VigilConfig::default();
        config.queue.workers.classify_message = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "queue.workers.classify_message"));
    }

    #[test]
    fn errors_are_collected_not_short_circuited() {
        let mut config = VigilConfig::default();
        config.bot.log_level = "loud".to_string();
        config.llm.base_url = "localhost:11434".to_string();
        config.classifier.timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(has_error(&errors, "bot.log_level"));
        assert!(has_error(&errors, "llm.base_url"));
        assert!(has_error(&errors, "classifier.timeout_secs"));
    }

    #[test]
    fn duplicate_channels_fail_validation() {
        let mut config = VigilConfig::default();
        config.ingestion.channels = vec!["C1".into(), "C2".into(), "C1".into()];
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "duplicate channel `C1`"));
    }
}
