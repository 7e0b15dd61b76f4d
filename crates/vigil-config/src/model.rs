// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Vigil.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Vigil configuration.
///
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VigilConfig {
    #[serde(default)]
    pub bot: BotConfig,

    /// Slack Web API settings.
    #[serde(default)]
    pub slack: SlackConfig,

    /// OpenAI-compatible endpoint used for embeddings.
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Incident classifier subprocess.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Background job queue and worker pool.
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Display name used in logs and the doctor report.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_bot_name() -> String {
    "vigil".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`). `None` disables every Slack-backed job.
    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default = "default_slack_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_slack_timeout_secs")]
    pub timeout_secs: u64,

    /// Page size for `conversations.history`.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: default_slack_api_base_url(),
            timeout_secs: default_slack_timeout_secs(),
            history_page_size: default_history_page_size(),
        }
    }
}

fn default_slack_api_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_slack_timeout_secs() -> u64 {
    30
}

fn default_history_page_size() -> u32 {
    200
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// API key, sent as a bearer token when set.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Requested embedding width.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_dimensions() -> u32 {
    768
}

fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("vigil").join("vigil.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("vigil.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Executable that reads `{"username","text"}` on stdin and writes an
    /// incident action on stdout. Required by `serve`.
    #[serde(default)]
    pub binary_path: Option<String>,

    /// Wall-clock limit for one classifier run.
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            timeout_secs: default_classifier_timeout_secs(),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_classifier_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestionConfig {
    /// Delay before re-polling a channel whose last page was empty.
    #[serde(default = "default_empty_backoff_secs")]
    pub empty_backoff_secs: u64,

    /// How many recent messages onboarding imports.
    #[serde(default = "default_onboard_last_n_msgs")]
    pub onboard_last_n_msgs: u32,

    /// Channels registered (and onboarded) at startup.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            empty_backoff_secs: default_empty_backoff_secs(),
            onboard_last_n_msgs: default_onboard_last_n_msgs(),
            channels: Vec::new(),
        }
    }
}

impl IngestionConfig {
    pub fn empty_backoff(&self) -> Duration {
        Duration::from_secs(self.empty_backoff_secs)
    }
}

fn default_empty_backoff_secs() -> u64 {
    60
}

fn default_onboard_last_n_msgs() -> u32 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// How long an idle worker sleeps before polling again.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for a single job attempt.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Fixed delay before a failed job is retried.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Completed, failed and cancelled jobs older than this are deleted.
    #[serde(default = "default_finalized_retention_hours")]
    pub finalized_retention_hours: u64,

    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    #[serde(default)]
    pub workers: WorkerCounts,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            job_timeout_secs: default_job_timeout_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
            finalized_retention_hours: default_finalized_retention_hours(),
            prune_interval_secs: default_prune_interval_secs(),
            workers: WorkerCounts::default(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn finalized_retention(&self) -> Duration {
        Duration::from_secs(self.finalized_retention_hours * 3600)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_retry_backoff_secs() -> u64 {
    30
}

fn default_finalized_retention_hours() -> u64 {
    24
}

fn default_prune_interval_secs() -> u64 {
    3600
}

/// Concurrent workers per job kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerCounts {
    #[serde(default = "one")]
    pub ingest_channel: usize,

    #[serde(default = "default_classify_workers")]
    pub classify_message: usize,

    #[serde(default = "one")]
    pub channel_info: usize,

    #[serde(default = "one")]
    pub channel_onboard: usize,

    #[serde(default = "one")]
    pub backfill_thread: usize,
}

impl Default for WorkerCounts {
    fn default() -> Self {
        Self {
            ingest_channel: one(),
            classify_message: default_classify_workers(),
            channel_info: one(),
            channel_onboard: one(),
            backfill_thread: one(),
        }
    }
}

fn one() -> usize {
    1
}

fn default_classify_workers() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = VigilConfig::default();
        assert_eq!(config.ingestion.empty_backoff(), Duration::from_secs(60));
        assert_eq!(config.queue.retry_backoff(), Duration::from_secs(30));
        assert_eq!(config.queue.workers.classify_message, 4);
        assert_eq!(config.llm.embedding_dimensions, 768);
        assert!(config.classifier.binary_path.is_none());
        assert!(config.storage.database_path.ends_with("vigil.db"));
    }

    #[test]
    fn partial_worker_table_keeps_other_defaults() {
        let toml_str = r#"
[queue.workers]
classify_message = 8
"#;
        let config: VigilConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.queue.workers.classify_message, 8);
        assert_eq!(config.queue.workers.ingest_channel, 1);
        assert_eq!(config.queue.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn workers_deny_unknown_fields() {
        let toml_str = r#"
[queue.workers]
classify = 8
"#;
        assert!(toml::from_str::<VigilConfig>(toml_str).is_err());
    }
}
