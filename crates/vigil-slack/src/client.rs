// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Slack Web API.
//!
//! Provides [`SlackClient`], which handles bearer authentication, URL
//! construction, and mapping of Slack's `{"ok": false}` envelopes and HTTP
//! 429 responses onto [`VigilError`].

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use vigil_core::VigilError;

use crate::types::Envelope;

const SERVICE: &str = "slack";

/// Authenticated Slack Web API client.
#[derive(Debug, Clone)]
pub struct SlackClient {
    client: reqwest::Client,
    base_url: String,
}

impl SlackClient {
    /// Creates a client for `base_url` (normally `https://slack.com/api`).
    pub fn new(token: &str, base_url: &str, timeout: Duration) -> Result<Self, VigilError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                VigilError::Config(format!("invalid Slack token header value: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| VigilError::Chat {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, method: &str, params: &[(&str, String)]) -> Result<reqwest::Url, VigilError> {
        let base = format!("{}/{method}", self.base_url);
        reqwest::Url::parse_with_params(&base, params)
            .map_err(|e| VigilError::Config(format!("invalid Slack API URL `{base}`: {e}")))
    }

    /// Calls a read method with query parameters.
    pub async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, VigilError> {
        let response = self
            .client
            .get(self.url(method, params)?)
            .send()
            .await
            .map_err(|e| request_failed(method, e))?;
        decode(method, response).await
    }

    /// Calls a write method with a JSON body.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, VigilError> {
        let response = self
            .client
            .post(self.url(method, &[])?)
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(method, e))?;
        decode(method, response).await
    }
}

fn request_failed(method: &str, e: reqwest::Error) -> VigilError {
    if e.is_timeout() {
        return VigilError::Chat {
            message: format!("{method} timed out"),
            source: Some(Box::new(e)),
        };
    }
    VigilError::Chat {
        message: format!("{method} request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn decode<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<T, VigilError> {
    let status = response.status();
    debug!(method, status = %status, "slack response received");

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after(&response);
        warn!(method, ?retry_after, "slack rate limit hit");
        return Err(VigilError::RateLimited {
            service: SERVICE.to_string(),
            retry_after,
        });
    }

    let body = response.text().await.map_err(|e| VigilError::Chat {
        message: format!("failed to read {method} response body: {e}"),
        source: Some(Box::new(e)),
    })?;

    if !status.is_success() {
        return Err(VigilError::Chat {
            message: format!("{method} returned {status}: {body}"),
            source: None,
        });
    }

    let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| VigilError::Chat {
        message: format!("failed to parse {method} response: {e}"),
        source: Some(Box::new(e)),
    })?;

    let envelope: Envelope = serde_json::from_value(value.clone()).map_err(|e| VigilError::Chat {
        message: format!("{method} response has no `ok` field: {e}"),
        source: Some(Box::new(e)),
    })?;

    if !envelope.ok {
        let error = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
        if error == "ratelimited" {
            return Err(VigilError::RateLimited {
                service: SERVICE.to_string(),
                retry_after: None,
            });
        }
        return Err(VigilError::Chat {
            message: format!("{method} failed: {error}"),
            source: None,
        });
    }

    serde_json::from_value(value).map_err(|e| VigilError::Chat {
        message: format!("unexpected {method} response shape: {e}"),
        source: Some(Box::new(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostMessageResponse;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> SlackClient {
        SlackClient::new("xoxb-test", base_url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn get_sends_token_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth.test"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(query_param("probe", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let envelope: Envelope = client
            .get("auth.test", &[("probe", "1".to_string())])
            .await
            .unwrap();
        assert!(envelope.ok);
    }

    #[tokio::test]
    async fn http_429_maps_to_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .get::<Envelope>("conversations.history", &[])
            .await
            .unwrap_err();
        match err {
            VigilError::RateLimited {
                service,
                retry_after,
            } => {
                assert_eq!(service, "slack");
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ratelimited_envelope_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"ok": false, "error": "ratelimited"}),
            ))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .get::<Envelope>("conversations.history", &[])
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn api_error_names_the_method() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"ok": false, "error": "channel_not_found"}),
            ))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .get::<Envelope>("conversations.info", &[])
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        let msg = err.to_string();
        assert!(msg.contains("conversations.info") && msg.contains("channel_not_found"), "got: {msg}");
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_json(serde_json::json!({"channel": "C1", "text": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"ok": true, "ts": "1700000000.000200"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let response: PostMessageResponse = test_client(&server.uri())
            .post(
                "chat.postMessage",
                &serde_json::json!({"channel": "C1", "text": "hi"}),
            )
            .await
            .unwrap();
        assert_eq!(response.ts, "1700000000.000200");
    }
}
