//! Client for the remote generative-model endpoint.
//!
//! The endpoint is an opaque chat-completion API: POST a JSON body with a Bearer token,
//! read back an answer plus token accounting. Transient transport failures (connection
//! errors, 429, 5xx) are retried with exponential backoff and jitter up to a bounded
//! attempt count; other 4xx responses fail fast; exceeding the per-call wall clock is a
//! distinct timeout failure so the proxy can answer 504 instead of 502.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::get_config;
use crate::error::{ErrorKind, ToolFault};

/// Errors surfaced from the completion endpoint.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Transient transport failure that survived the retry budget.
    #[error("Completion endpoint unavailable: {0}")]
    Transient(String),
    /// Non-retryable upstream rejection.
    #[error("Completion endpoint rejected the request ({status}): {detail}")]
    Permanent {
        /// HTTP status returned by the endpoint.
        status: u16,
        /// Upstream diagnostic body.
        detail: String,
    },
    /// The call exceeded its wall-clock bound.
    #[error("Completion call timed out: {0}")]
    Timeout(String),
    /// The endpoint answered with a body this client cannot interpret.
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Convert into the wire-level fault payload.
    pub fn to_fault(&self) -> ToolFault {
        let kind = match self {
            Self::Transient(_) => ErrorKind::ModelTransient,
            Self::Permanent { .. } | Self::InvalidResponse(_) => ErrorKind::ModelPermanent,
            Self::Timeout(_) => ErrorKind::ModelTimeout,
        };
        ToolFault::new(kind, self.to_string())
    }
}

/// Parameters for a single completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully assembled prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional completion token cap.
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// A low-temperature request suitable for grounded answering.
    pub fn grounded(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.1,
            max_tokens: None,
        }
    }
}

/// Token accounting reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens produced in the completion.
    pub completion_tokens: u64,
    /// Total billed tokens.
    pub total_tokens: u64,
}

/// A completed model call.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Raw answer text.
    pub answer_text: String,
    /// Model that produced the answer.
    pub model_id: String,
    /// Token accounting, when the endpoint reports it.
    pub token_usage: Option<TokenUsage>,
}

/// Interface over the completion endpoint, stubbed in tests.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Execute one completion call, applying the retry policy.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError>;
}

/// Retry policy for transient completion failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Exponential multiplier applied per attempt.
    pub backoff_multiplier: f64,
    /// Random jitter fraction (0.0 to 1.0) to avoid thundering herds.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay for the given zero-based attempt, with exponential backoff and jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64;
        let exponential = base * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_millis() as f64);
        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range - jitter_range / 2.0;
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Completion client speaking the chat-completions wire format.
pub struct HttpCompletionClient {
    http: Client,
    api_url: String,
    api_key: String,
    model_id: String,
    retry: RetryConfig,
}

enum CallError {
    Retryable(String),
    Fatal(CompletionError),
}

impl HttpCompletionClient {
    /// Build a client from explicit parameters.
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model_id: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        let http = Client::builder()
            .user_agent(concat!("askpdf/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .expect("Failed to construct reqwest::Client for completions");
        Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
            model_id: model_id.into(),
            retry,
        }
    }

    /// Build a client from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            config.model_api_url.clone(),
            config.model_api_key.clone(),
            config.model_id.clone(),
            Duration::from_secs(config.model_timeout_secs),
            RetryConfig::default(),
        )
    }

    async fn try_complete(&self, request: &CompletionRequest) -> Result<Completion, CallError> {
        let mut payload = json!({
            "model": self.model_id,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    CallError::Fatal(CompletionError::Timeout(error.to_string()))
                } else {
                    CallError::Retryable(error.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(CallError::Retryable(format!(
                "endpoint answered {status}"
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CallError::Fatal(CompletionError::Permanent {
                status: status.as_u16(),
                detail,
            }));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            CallError::Fatal(CompletionError::InvalidResponse(error.to_string()))
        })?;
        let answer_text = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                CallError::Fatal(CompletionError::InvalidResponse(
                    "response carried no choices".into(),
                ))
            })?;

        Ok(Completion {
            answer_text,
            model_id: body.model.unwrap_or_else(|| self.model_id.clone()),
            token_usage: body.usage,
        })
    }
}

#[async_trait]
impl CompletionApi for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let mut attempt = 0u32;
        loop {
            match self.try_complete(&request).await {
                Ok(completion) => return Ok(completion),
                Err(CallError::Fatal(error)) => return Err(error),
                Err(CallError::Retryable(detail)) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(CompletionError::Transient(detail));
                    }
                    let delay = self.retry.delay_for(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        detail = %detail,
                        "Retrying completion call"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}
