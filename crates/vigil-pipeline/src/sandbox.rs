// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incident classification in an external process.
//!
//! The classifier binary is untrusted: it runs as a child process with no
//! access to Vigil's state, receives `{"username","text"}` as JSON on stdin,
//! and must print one `IncidentAction` JSON document on stdout before the
//! deadline. Anything else is a classifier error. Output is read through
//! fixed caps; a classifier that prints more than that is rejected.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};
use vigil_config::model::ClassifierConfig;
use vigil_core::{Adapter, HealthStatus, IncidentAction, IncidentClassifier, VigilError};

/// Stderr is truncated to this many bytes in error messages.
const MAX_STDERR_BYTES: usize = 512;

/// Largest stdout accepted as a classifier answer.
const MAX_STDOUT_BYTES: usize = 64 * 1024;

struct ChildOutput {
    status: ExitStatus,
    /// At most `MAX_STDOUT_BYTES + 1` bytes, so oversized output is visible.
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Keep up to `limit + 1` bytes and discard the rest, so the child never
/// blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(reader: R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut kept = Vec::new();
    let mut head = reader.take(limit as u64 + 1);
    head.read_to_end(&mut kept).await?;
    tokio::io::copy(&mut head.into_inner(), &mut tokio::io::sink()).await?;
    Ok(kept)
}

#[derive(Debug, Serialize)]
struct ClassifierInput<'a> {
    username: &'a str,
    text: &'a str,
}

fn classifier_error(message: String) -> VigilError {
    VigilError::Classifier {
        message,
        source: None,
    }
}

/// [`IncidentClassifier`] that runs one child process per message.
#[derive(Debug, Clone)]
pub struct SubprocessClassifier {
    binary: PathBuf,
    timeout: Duration,
}

impl SubprocessClassifier {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Builds the classifier from `[classifier]`. The binary path is required.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, VigilError> {
        let binary = config
            .binary_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| VigilError::Config("classifier.binary_path is not set".to_string()))?;
        Ok(Self::new(binary, config.timeout()))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, input: Vec<u8>) -> Result<ChildOutput, VigilError> {
        let mut child = Command::new(&self.binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VigilError::Classifier {
                message: format!("failed to spawn {}: {e}", self.binary.display()),
                source: Some(Box::new(e)),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| classifier_error("child stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| classifier_error("child stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| classifier_error("child stderr was not captured".to_string()))?;

        let exchange = async move {
            // A classifier may decide without reading all of its input.
            if let Err(e) = stdin.write_all(&input).await
                && e.kind() != ErrorKind::BrokenPipe
            {
                return Err(e);
            }
            drop(stdin);
            let (stdout, stderr, status) = tokio::try_join!(
                read_capped(stdout, MAX_STDOUT_BYTES),
                read_capped(stderr, MAX_STDERR_BYTES),
                child.wait(),
            )?;
            Ok(ChildOutput {
                status,
                stdout,
                stderr,
            })
        };

        // Dropping `exchange` on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(VigilError::Classifier {
                message: format!("classifier i/o failed: {e}"),
                source: Some(Box::new(e)),
            }),
            Err(_) => {
                warn!(
                    binary = %self.binary.display(),
                    timeout = ?self.timeout,
                    "classifier timed out, child killed"
                );
                Err(VigilError::Timeout {
                    duration: self.timeout,
                })
            }
        }
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let end = stderr.len().min(MAX_STDERR_BYTES);
    String::from_utf8_lossy(&stderr[..end]).trim().to_string()
}

#[async_trait]
impl Adapter for SubprocessClassifier {
    fn name(&self) -> &str {
        "subprocess-classifier"
    }

    async fn health_check(&self) -> Result<HealthStatus, VigilError> {
        Ok(match tokio::fs::metadata(&self.binary).await {
            Ok(meta) if meta.is_file() => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Unhealthy(format!("{} is not a file", self.binary.display())),
            Err(e) => HealthStatus::Unhealthy(format!("{}: {e}", self.binary.display())),
        })
    }
}

#[async_trait]
impl IncidentClassifier for SubprocessClassifier {
    async fn classify(&self, sender: &str, text: &str) -> Result<IncidentAction, VigilError> {
        let input = serde_json::to_vec(&ClassifierInput {
            username: sender,
            text,
        })
        .map_err(|e| VigilError::Internal(format!("failed to encode classifier input: {e}")))?;

        let output = self.run(input).await?;

        if !output.status.success() {
            return Err(classifier_error(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr_excerpt(&output.stderr)
            )));
        }

        if output.stdout.len() > MAX_STDOUT_BYTES {
            return Err(classifier_error(format!(
                "classifier output exceeds {MAX_STDOUT_BYTES} bytes"
            )));
        }

        let action: IncidentAction =
            serde_json::from_slice(&output.stdout).map_err(|e| VigilError::Classifier {
                message: format!("malformed classifier output: {e}"),
                source: Some(Box::new(e)),
            })?;

        debug!(sender, action = %action.action, service = %action.service, "message classified");
        Ok(action)
    }
}
