// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding client for OpenAI-compatible endpoints (OpenAI, Ollama, vLLM).
//!
//! The task hint is prepended to the input as `"<task>: <text>"`, the
//! convention used by nomic-style embedding models.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vigil_config::VigilConfig;
use vigil_core::{Adapter, Embedder, EmbeddingTask, HealthStatus, VigilError};

const SERVICE: &str = "llm";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: String,
    encoding_format: &'static str,
    dimensions: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// [`Embedder`] backed by a `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: u32,
}

impl OpenAiEmbedder {
    /// Builds the embedder from `[llm]`. The API key falls back to
    /// `OPENAI_API_KEY`; local servers need none.
    pub fn new(config: &VigilConfig) -> Result<Self, VigilError> {
        let api_key = config
            .llm
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        let embedder = Self::with_settings(
            &config.llm.base_url,
            &config.llm.embedding_model,
            config.llm.embedding_dimensions,
            api_key.as_deref(),
            Duration::from_secs(config.llm.timeout_secs),
        )?;
        info!(
            base_url = %config.llm.base_url,
            model = %config.llm.embedding_model,
            "embedding client initialized"
        );
        Ok(embedder)
    }

    pub fn with_settings(
        base_url: &str,
        model: &str,
        dimensions: u32,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, VigilError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                    VigilError::Config(format!("invalid API key header value: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| VigilError::Llm {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        })
    }
}

fn request_failed(e: reqwest::Error) -> VigilError {
    if e.is_timeout() {
        warn!(error = %e, "embedding request timed out");
    }
    VigilError::Llm {
        message: format!("HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl Adapter for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai-embeddings"
    }

    async fn health_check(&self) -> Result<HealthStatus, VigilError> {
        let response = match self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(HealthStatus::Unhealthy(e.to_string())),
        };
        let status = response.status();
        Ok(if status.is_success() {
            HealthStatus::Healthy
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            HealthStatus::Degraded("rate limited".to_string())
        } else {
            HealthStatus::Unhealthy(format!("GET /models returned {status}"))
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, task: EmbeddingTask, text: &str) -> Result<Vec<f32>, VigilError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: format!("{task}: {text}"),
            encoding_format: "float",
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(request_failed)?;

        let status = response.status();
        debug!(status = %status, model = %self.model, "embedding response received");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(VigilError::RateLimited {
                service: SERVICE.to_string(),
                retry_after,
            });
        }

        let body = response.text().await.map_err(|e| VigilError::Llm {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!("embedding API error ({status}): {}", api_err.error.message),
                Err(_) => format!("embedding API returned {status}: {body}"),
            };
            return Err(VigilError::Llm {
                message,
                source: None,
            });
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body).map_err(|e| VigilError::Llm {
            message: format!("failed to parse embedding response: {e}"),
            source: Some(Box::new(e)),
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| VigilError::Llm {
                message: "embedding response contained no vectors".to_string(),
                source: None,
            })
    }
}
