//! HTTP model endpoint with retry on transient failures

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::roles::{ProviderKind, Role};

use super::anthropic::{self, ANTHROPIC_VERSION};
use super::openai;
use super::search;
use super::types::{ChatRequest, ModelEndpoint};

/// One failed attempt and whether another attempt may succeed
#[derive(Debug)]
struct AttemptError {
    error: anyhow::Error,
    retryable: bool,
}

impl AttemptError {
    fn fatal(error: anyhow::Error) -> Self {
        Self {
            error,
            retryable: false,
        }
    }

    /// Transport failures are retried when the connection or the attempt
    /// timed out; anything else (bad URL, TLS, redirect loop) is final.
    fn transport(provider: ProviderKind, err: reqwest::Error) -> Self {
        let retryable = err.is_timeout() || err.is_connect();
        Self {
            error: anyhow::Error::new(err)
                .context(format!("Failed to send request to {} API", provider)),
            retryable,
        }
    }

    fn status(provider: ProviderKind, status: StatusCode, body: &str) -> Self {
        Self {
            error: anyhow!(
                "{} API request failed with status {}: {}",
                provider,
                status,
                body
            ),
            retryable: is_retryable_status(status),
        }
    }
}

/// Talks to the real provider APIs over HTTPS
pub struct HttpEndpoint {
    client: Client,
    /// Extra attempts after the first one, for retryable errors only
    max_retries: u32,
    /// Base delay for exponential backoff
    base_retry_delay: Duration,
}

impl std::fmt::Debug for HttpEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEndpoint")
            .field("max_retries", &self.max_retries)
            .field("base_retry_delay", &self.base_retry_delay)
            .finish()
    }
}

impl HttpEndpoint {
    /// `request_timeout` bounds a single HTTP attempt; the dispatcher applies
    /// its own overall deadline on top.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            max_retries: 1,
            base_retry_delay: Duration::from_millis(500),
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }

    fn build_request(&self, role: &Role, request: &ChatRequest) -> RequestBuilder {
        let base_url = &role.credentials.base_url;
        let (url, body) = match role.provider {
            ProviderKind::Openai => (openai::chat_url(base_url), openai::request_body(request)),
            ProviderKind::Search => (openai::chat_url(base_url), search::request_body(request)),
            ProviderKind::Anthropic => (
                anthropic::messages_url(base_url),
                anthropic::request_body(request),
            ),
        };

        let builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);

        let api_key = &role.credentials.api_key;
        if api_key.is_empty() {
            // Local OpenAI-compatible servers usually run without auth
            return builder;
        }
        match role.provider {
            ProviderKind::Anthropic => builder
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ProviderKind::Openai | ProviderKind::Search => {
                builder.header("Authorization", format!("Bearer {}", api_key))
            }
        }
    }

    async fn send_once(&self, role: &Role, request: &ChatRequest) -> Result<Value, AttemptError> {
        debug!(
            "{} request for {}: model={}, messages={}",
            role.provider,
            role.id,
            request.model,
            request.messages.len()
        );

        let response = self
            .build_request(role, request)
            .send()
            .await
            .map_err(|e| AttemptError::transport(role.provider, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AttemptError::status(role.provider, status, &error_text));
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to parse {} API response", role.provider))
            .map_err(AttemptError::fatal)
    }
}

#[async_trait]
impl ModelEndpoint for HttpEndpoint {
    async fn complete(&self, role: &Role, request: &ChatRequest) -> Result<Value> {
        let attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.send_once(role, request).await {
                Ok(raw) => return Ok(raw),
                Err(AttemptError { error, retryable }) => {
                    warn!(
                        "{} ({}) failed (attempt {}/{}, retryable={}): {:#}",
                        role.id,
                        role.model.engine,
                        attempt + 1,
                        attempts,
                        retryable,
                        error,
                    );
                    last_error = Some(error);

                    if !retryable {
                        break;
                    }
                    if attempt + 1 < attempts {
                        let delay = self.base_retry_delay * 2u32.pow(attempt);
                        debug!("Backing off for {:?} before retry", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No request attempted for {}", role.id)))
    }
}

/// Rate limits and server-side failures (including Anthropic's 529
/// overloaded) are worth another attempt; other statuses are final.
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
